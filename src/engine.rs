use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, RecvTimeoutError},
        Arc, Condvar, Mutex, PoisonError,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use crate::{
    discovery::{DeviceScanner, DiscoveryOutcome, DiscoveryResolver},
    error::{PadError, Result},
    events::{EngineEvent, EventBus},
    session::SessionFactory,
    supervisor::{LoopRequest, SharedState, Supervisor},
    types::{BeltCommand, PadConfig, StatusSnapshot, TimingConfig},
    DEFAULT_SPEED_STEP_KMH,
};

/// Synchronous control surface for a WalkingPad treadmill
///
/// `PadEngine` owns the connection supervisor and the single-threaded I/O
/// loop it runs on, and bridges arbitrary caller threads onto that loop.
/// Callers get a well-formed [`StatusSnapshot`] back from every operation:
/// device faults are absorbed into the snapshot's `ok`/`error` fields and
/// never propagate as panics or unbounded waits.
///
/// The device transport and discovery transport are injected as
/// capabilities ([`SessionFactory`], [`DeviceScanner`]); the engine only
/// sequences calls to them.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use padlink::PadEngine;
/// # fn adapters() -> (Arc<dyn padlink::SessionFactory>, Arc<dyn padlink::DeviceScanner>) {
/// #     unimplemented!()
/// # }
///
/// fn main() -> padlink::Result<()> {
///     let (factory, scanner) = adapters();
///     let engine = PadEngine::new(factory, scanner)?;
///
///     engine.configure("192.168.1.40", "0123456789abcdef", "");
///     let status = engine.start_belt();
///     println!("belt running: {}", status.running);
///
///     engine.shutdown();
///     Ok(())
/// }
/// ```
pub struct PadEngine {
    shared: Arc<SharedState>,
    requests: mpsc::Sender<LoopRequest>,
    events: EventBus,
    stop_signal: watch::Sender<bool>,
    timing: TimingConfig,
    stopped: AtomicBool,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
    loop_done: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    exited: Arc<(Mutex<bool>, Condvar)>,
}

impl PadEngine {
    /// Start an engine with the default timing configuration
    ///
    /// Spawns the dedicated I/O thread and its current-thread runtime; the
    /// supervisor begins its connection cycle immediately (reporting
    /// `missing_config` until [`configure`](Self::configure) is called).
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Io`] if the I/O thread cannot be spawned.
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        scanner: Arc<dyn DeviceScanner>,
    ) -> Result<Self> {
        Self::with_timing(factory, scanner, TimingConfig::default())
    }

    /// Start an engine with custom intervals and timeouts
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Io`] if the I/O thread cannot be spawned.
    pub fn with_timing(
        factory: Arc<dyn SessionFactory>,
        scanner: Arc<dyn DeviceScanner>,
        timing: TimingConfig,
    ) -> Result<Self> {
        let shared = Arc::new(SharedState::new());
        let events = EventBus::default();
        let (request_tx, request_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let supervisor = Supervisor::new(
            shared.clone(),
            factory,
            DiscoveryResolver::new(scanner),
            events.clone(),
            request_rx,
            stop_rx,
            timing.clone(),
        );

        let handle = std::thread::Builder::new()
            .name("padlink-io".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(supervisor.run()),
                    Err(err) => error!("Failed to build I/O runtime: {}", err),
                }
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            shared,
            requests: request_tx,
            events,
            stop_signal: stop_tx,
            timing,
            stopped: AtomicBool::new(false),
            loop_thread: Mutex::new(Some(handle)),
            loop_done: Mutex::new(Some(done_rx)),
            exited: Arc::new((Mutex::new(false), Condvar::new())),
        })
    }

    /// Apply a connection configuration
    ///
    /// Always invalidates the current session, even when the fields are
    /// unchanged, because the caller cannot know whether the session is
    /// stale. Connectivity drops immediately; cached telemetry stays
    /// last-known-good until the next successful refresh.
    pub fn configure(&self, address: &str, auth_token: &str, device_id: &str) -> StatusSnapshot {
        self.shared
            .apply_config(PadConfig::new(address, auth_token, device_id));
        self.shared.with_cache(|cache| {
            cache.connected = false;
            cache.running = false;
        });
        info!("Configuration applied; forcing reconnect");
        self.get_status()
    }

    /// Snapshot the last-known device state
    ///
    /// A plain cache read; never touches the device. `ok` mirrors
    /// `connected` here.
    #[must_use]
    pub fn get_status(&self) -> StatusSnapshot {
        self.shared.read_cache(|cache| {
            let ok = cache.connected;
            cache.snapshot(ok)
        })
    }

    /// Start the belt
    #[must_use]
    pub fn start_belt(&self) -> StatusSnapshot {
        self.run_command(BeltCommand::Start)
    }

    /// Stop the belt
    #[must_use]
    pub fn stop_belt(&self) -> StatusSnapshot {
        self.run_command(BeltCommand::Stop)
    }

    /// Increase the belt speed by the default step (0.5 km/h)
    #[must_use]
    pub fn increase_speed(&self) -> StatusSnapshot {
        self.increase_speed_by(DEFAULT_SPEED_STEP_KMH)
    }

    /// Increase the belt speed by `step` km/h
    ///
    /// A no-op while the belt is stopped; the target is clamped to the
    /// supported speed range.
    #[must_use]
    pub fn increase_speed_by(&self, step: f64) -> StatusSnapshot {
        self.run_command(BeltCommand::AdjustSpeed(step.abs()))
    }

    /// Decrease the belt speed by the default step (0.5 km/h)
    #[must_use]
    pub fn decrease_speed(&self) -> StatusSnapshot {
        self.decrease_speed_by(DEFAULT_SPEED_STEP_KMH)
    }

    /// Decrease the belt speed by `step` km/h
    ///
    /// Reaching the speed floor stops the belt.
    #[must_use]
    pub fn decrease_speed_by(&self, step: f64) -> StatusSnapshot {
        self.run_command(BeltCommand::AdjustSpeed(-step.abs()))
    }

    /// List compatible devices visible during a default scan window
    #[must_use]
    pub fn discover_devices(&self, token: &str) -> DiscoveryOutcome {
        self.discover_devices_with_timeout(token, self.timing.scan_timeout)
    }

    /// List compatible devices visible during a bounded scan window
    ///
    /// An empty token short-circuits to a `token_required` failure without
    /// invoking the scan capability. The scan itself is sequenced through
    /// the I/O loop so it can never interleave with a device call.
    #[must_use]
    pub fn discover_devices_with_timeout(
        &self,
        token: &str,
        timeout: Duration,
    ) -> DiscoveryOutcome {
        if token.trim().is_empty() {
            return DiscoveryOutcome::failure(&PadError::TokenRequired);
        }

        let (reply_tx, reply_rx) = sync_channel(1);
        let request = LoopRequest::Discover {
            token: token.to_string(),
            timeout,
            reply: reply_tx,
        };
        if self.requests.blocking_send(request).is_err() {
            return DiscoveryOutcome::failure(&PadError::ChannelClosed);
        }

        // The scan occupies the loop for up to `timeout`; allow the usual
        // command slack on top before giving up.
        match reply_rx.recv_timeout(timeout + self.timing.command_timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                DiscoveryOutcome::failure(&PadError::Timeout {
                    timeout_ms: millis(timeout + self.timing.command_timeout),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                DiscoveryOutcome::failure(&PadError::ChannelClosed)
            }
        }
    }

    /// Subscribe to the engine's telemetry events
    ///
    /// Best-effort: events published while no subscriber is attached are
    /// dropped.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Perform the cooperative shutdown sequence
    ///
    /// Raises the stop signal, gives the supervisor task a bounded grace
    /// period to unwind, then waits (bounded) for the I/O thread to exit.
    /// Idempotent: safe to invoke more than once and from [`Drop`].
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Engine shutdown requested");

        let _ = self.stop_signal.send(true);

        let done = self
            .loop_done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut clean_exit = false;
        if let Some(done) = done {
            clean_exit = done.recv_timeout(self.timing.shutdown_grace).is_ok()
                || done.recv_timeout(self.timing.thread_join_wait).is_ok();
        }

        let handle = self
            .loop_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if clean_exit {
                if handle.join().is_err() {
                    warn!("I/O loop thread panicked during shutdown");
                }
            } else {
                warn!("I/O loop did not stop within the grace period; detaching its thread");
            }
        }

        let (flag, condvar) = &*self.exited;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
        info!("Engine shutdown complete");
    }

    /// Block the calling thread until [`shutdown`](Self::shutdown) runs
    ///
    /// Keeps a host process resident for as long as the engine is alive.
    pub fn wait_for_shutdown(&self) {
        let (flag, condvar) = &*self.exited;
        let mut exited = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*exited {
            exited = condvar.wait(exited).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marshal a belt command onto the I/O loop and wait, bounded
    fn run_command(&self, command: BeltCommand) -> StatusSnapshot {
        let (reply_tx, reply_rx) = sync_channel(1);
        let request = LoopRequest::Command {
            command,
            enqueued: Instant::now(),
            reply: reply_tx,
        };
        if self.requests.blocking_send(request).is_err() {
            return self.command_failure(&PadError::ChannelClosed);
        }

        match reply_rx.recv_timeout(self.timing.command_timeout) {
            Ok(snapshot) => snapshot,
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = millis(self.timing.command_timeout);
                warn!(
                    "Belt command {} exceeded its {}ms bound",
                    command.operation(),
                    timeout_ms
                );
                self.command_failure(&PadError::Timeout { timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => self.command_failure(&PadError::ChannelClosed),
        }
    }

    /// Current snapshot re-tagged with a command failure
    ///
    /// Command failures never touch connectivity state.
    fn command_failure(&self, err: &PadError) -> StatusSnapshot {
        self.shared
            .read_cache(|cache| cache.snapshot(true))
            .with_error(err)
    }
}

impl Drop for PadEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
