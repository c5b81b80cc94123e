use std::{
    future::Future,
    sync::{Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};

use std::sync::mpsc::SyncSender;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    discovery::{DiscoveryOutcome, DiscoveryResolver},
    error::{PadError, Result},
    events::{EngineEvent, ErrorEvent, EventBus, OperationEvent},
    session::{fetch_status, DeviceSession, SessionFactory},
    types::{clamp_speed, BeltCommand, PadConfig, StatusCache, StatusSnapshot, TimingConfig},
    WALKINGPAD_MODEL,
};

/// State shared between caller threads and the supervisor's I/O loop
///
/// The status cache has a single logical writer (the I/O loop, plus the
/// engine's `configure` which only clears connectivity); arbitrary caller
/// threads take short read locks. The configuration fields sit behind their
/// own mutex, independent of the I/O loop.
pub(crate) struct SharedState {
    cache: RwLock<StatusCache>,
    config: Mutex<ConfigState>,
}

struct ConfigState {
    config: PadConfig,
    epoch: u64,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            cache: RwLock::new(StatusCache::default()),
            config: Mutex::new(ConfigState {
                config: PadConfig::default(),
                epoch: 0,
            }),
        }
    }

    pub(crate) fn with_cache<T>(&self, f: impl FnOnce(&mut StatusCache) -> T) -> T {
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub(crate) fn read_cache<T>(&self, f: impl FnOnce(&StatusCache) -> T) -> T {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Replace the configuration and bump the epoch so the supervisor
    /// force-rebuilds the session even when the fields are unchanged
    pub(crate) fn apply_config(&self, config: PadConfig) {
        let mut guard = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        guard.config = config;
        guard.epoch += 1;
    }

    fn config_snapshot(&self) -> (PadConfig, u64) {
        let guard = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        (guard.config.clone(), guard.epoch)
    }
}

/// A caller request marshalled onto the I/O loop
pub(crate) enum LoopRequest {
    /// Execute a belt command and reply with a snapshot
    Command {
        command: BeltCommand,
        enqueued: Instant,
        reply: SyncSender<StatusSnapshot>,
    },
    /// Run a bounded passive scan and reply with the outcome
    Discover {
        token: String,
        timeout: Duration,
        reply: SyncSender<DiscoveryOutcome>,
    },
}

/// The configuration a session was established for
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveTarget {
    address: String,
    token: String,
    epoch: u64,
}

/// Owns the device session lifecycle and keeps the status cache fresh
///
/// Runs as a single task on the engine's dedicated I/O runtime. All device
/// I/O, polling and caller commands alike, executes inline here, so at
/// most one device operation is ever in flight and no worker pool can be
/// torn down underneath a pending call.
pub(crate) struct Supervisor {
    shared: std::sync::Arc<SharedState>,
    factory: std::sync::Arc<dyn SessionFactory>,
    resolver: DiscoveryResolver,
    events: EventBus,
    requests: mpsc::Receiver<LoopRequest>,
    shutdown: watch::Receiver<bool>,
    timing: TimingConfig,
    session: Option<Box<dyn DeviceSession>>,
    active: Option<ActiveTarget>,
}

impl Supervisor {
    pub(crate) fn new(
        shared: std::sync::Arc<SharedState>,
        factory: std::sync::Arc<dyn SessionFactory>,
        resolver: DiscoveryResolver,
        events: EventBus,
        requests: mpsc::Receiver<LoopRequest>,
        shutdown: watch::Receiver<bool>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            shared,
            factory,
            resolver,
            events,
            requests,
            shutdown,
            timing,
            session: None,
            active: None,
        }
    }

    /// Drive the connection state machine until the stop signal is observed
    ///
    /// Caller requests are serviced between cycles; the cycle deadline is
    /// preserved across request handling so commands do not starve polling.
    pub(crate) async fn run(mut self) {
        let mut next_cycle = tokio::time::Instant::now();

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await,
                        // Engine dropped; nothing left to serve.
                        None => break,
                    }
                }
                () = tokio::time::sleep_until(next_cycle) => {
                    let delay = self.cycle().await;
                    next_cycle = tokio::time::Instant::now() + delay;
                }
            }
        }

        self.drop_session();
        info!("Supervisor loop exited");
    }

    /// One pass of the state machine; returns the delay before the next pass
    async fn cycle(&mut self) -> Duration {
        let (config, epoch) = self.shared.config_snapshot();

        // Unconfigured
        if !config.is_usable() {
            self.drop_session();
            self.shared
                .with_cache(|cache| cache.set_disconnected(&PadError::MissingConfig.to_string()));
            return self.timing.retry_interval;
        }

        // Resolving: adopt a scanned address for this cycle only.
        let address = match &config.address {
            Some(address) => address.clone(),
            None => {
                let device_id = config.device_id.as_deref().unwrap_or_default();
                match self
                    .resolver
                    .resolve(device_id, &config.auth_token, self.timing.scan_timeout)
                    .await
                {
                    Ok(Some(address)) => address,
                    Ok(None) => {
                        self.drop_session();
                        self.shared.with_cache(|cache| {
                            cache.set_disconnected(&PadError::DeviceNotFound.to_string());
                        });
                        warn!("Discovery could not resolve device {}", device_id);
                        return self.timing.retry_interval;
                    }
                    Err(err) => {
                        self.drop_session();
                        self.shared
                            .with_cache(|cache| cache.set_disconnected(&err.to_string()));
                        warn!("Discovery scan failed: {}", err);
                        return self.timing.retry_interval;
                    }
                }
            }
        };

        // Connecting: rebuild only when the target changed or no session exists.
        let target = ActiveTarget {
            address,
            token: config.auth_token.clone(),
            epoch,
        };
        if self.session.is_none() || self.active.as_ref() != Some(&target) {
            if let Err(err) = self.establish(&target).await {
                self.drop_session();
                self.shared
                    .with_cache(|cache| cache.set_disconnected(&err.to_string()));
                warn!("WalkingPad connect failed: {}", err);
                return self.timing.retry_interval;
            }
        }

        // Polling
        match self.poll().await {
            Ok(()) => self.timing.poll_interval,
            Err(err) => {
                self.drop_session();
                self.shared
                    .with_cache(|cache| cache.set_disconnected(&err.to_string()));
                warn!("WalkingPad connection lost: {}", err);
                self.timing.retry_interval
            }
        }
    }

    /// Build a session for the target and load an initial status reading
    async fn establish(&mut self, target: &ActiveTarget) -> Result<()> {
        self.drop_session();

        let mut session = timed(
            &self.events,
            "connect",
            Instant::now(),
            self.factory
                .connect(&target.address, &target.token, WALKINGPAD_MODEL),
        )
        .await?;

        let reading = timed(
            &self.events,
            "get_status",
            Instant::now(),
            fetch_status(session.as_mut()),
        )
        .await?;

        self.session = Some(session);
        self.active = Some(target.clone());
        self.shared.with_cache(|cache| {
            cache.set_connected();
            cache.apply_reading(&reading);
        });
        info!("WalkingPad connected at {}", target.address);
        Ok(())
    }

    /// Refresh the cache from the established session
    async fn poll(&mut self) -> Result<()> {
        let session = self.session.as_deref_mut().ok_or(PadError::NotConnected)?;
        let reading = timed(
            &self.events,
            "get_status",
            Instant::now(),
            fetch_status(session),
        )
        .await?;

        self.shared.with_cache(|cache| {
            cache.set_connected();
            cache.apply_reading(&reading);
        });
        debug!("Status cache refreshed");
        Ok(())
    }

    async fn handle_request(&mut self, request: LoopRequest) {
        match request {
            LoopRequest::Command {
                command,
                enqueued,
                reply,
            } => {
                let snapshot = self.execute_command(command, enqueued).await;
                // The caller may already have given up on its bounded wait.
                let _ = reply.send(snapshot);
            }
            LoopRequest::Discover {
                token,
                timeout,
                reply,
            } => {
                let outcome = self.resolver.discover_outcome(&token, timeout).await;
                let _ = reply.send(outcome);
            }
        }
    }

    /// Execute a belt command, absorbing any failure into the snapshot
    ///
    /// A failed command is never treated as a connectivity-loss signal;
    /// only the polling path changes `connected`.
    async fn execute_command(&mut self, command: BeltCommand, enqueued: Instant) -> StatusSnapshot {
        match self.run_command(command, enqueued).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Belt command {} failed: {}", command.operation(), err);
                self.shared
                    .read_cache(|cache| cache.snapshot(true))
                    .with_error(&err)
            }
        }
    }

    async fn run_command(
        &mut self,
        command: BeltCommand,
        enqueued: Instant,
    ) -> Result<StatusSnapshot> {
        let connected = self.shared.read_cache(|cache| cache.connected);
        if self.session.is_none() || !connected {
            return Err(PadError::NotConnected);
        }

        match command {
            BeltCommand::Start => {
                let session = self.session.as_deref_mut().ok_or(PadError::NotConnected)?;
                timed(&self.events, "start", enqueued, session.start()).await?;
                // Optimistic until the next poll confirms.
                self.shared.with_cache(|cache| cache.running = true);
            }
            BeltCommand::Stop => {
                let session = self.session.as_deref_mut().ok_or(PadError::NotConnected)?;
                timed(&self.events, "stop", enqueued, session.stop()).await?;
                self.shared.with_cache(|cache| cache.running = false);
            }
            BeltCommand::AdjustSpeed(delta) => {
                let (running, speed) = self.shared.read_cache(|cache| (cache.running, cache.speed));
                if running {
                    let current = speed.ok_or(PadError::SpeedUnavailable)?;
                    let target = clamp_speed(current + delta);
                    let session = self.session.as_deref_mut().ok_or(PadError::NotConnected)?;
                    timed(&self.events, "set_speed", enqueued, session.set_speed(target)).await?;
                    self.shared.with_cache(|cache| {
                        cache.speed = Some(target);
                        // Driving the speed to the floor stops the belt.
                        if target <= 0.0 {
                            cache.running = false;
                        }
                    });
                }
                // Adjusting speed must never implicitly start a stopped belt.
            }
        }

        Ok(self.shared.read_cache(|cache| cache.snapshot(true)))
    }

    fn drop_session(&mut self) {
        self.session = None;
        self.active = None;
    }
}

/// Run a device call, emitting its timing and any failure on the event bus
async fn timed<T, F>(
    events: &EventBus,
    operation: &'static str,
    enqueued: Instant,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let wait_ms = start.duration_since(enqueued).as_secs_f64() * 1000.0;

    let result = call.await;

    let run_ms = start.elapsed().as_secs_f64() * 1000.0;
    events.publish(EngineEvent::Operation(OperationEvent {
        operation,
        wait_ms,
        run_ms,
        total_ms: enqueued.elapsed().as_secs_f64() * 1000.0,
        success: result.is_ok(),
    }));
    if let Err(err) = &result {
        events.publish(EngineEvent::Error(ErrorEvent {
            operation,
            message: err.to_string(),
        }));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DeviceScanner;
    use crate::types::{DiscoveredDevice, StatusReading};
    use crate::{POLL_INTERVAL, RETRY_INTERVAL};
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    };

    /// Scripted device state shared between the mock factory and sessions
    #[derive(Default)]
    struct PadScript {
        fail_connect: AtomicBool,
        fail_status: AtomicBool,
        fail_commands: AtomicBool,
        connect_calls: AtomicU32,
        connected_address: Mutex<Option<String>>,
        start_calls: AtomicU32,
        stop_calls: AtomicU32,
        set_speed_values: Mutex<Vec<f64>>,
        reading: Mutex<StatusReading>,
    }

    impl PadScript {
        fn with_reading(reading: StatusReading) -> Arc<Self> {
            let script = Self::default();
            *script.reading.lock().unwrap() = reading;
            Arc::new(script)
        }

        fn running_at(speed: f64) -> Arc<Self> {
            Self::with_reading(StatusReading {
                is_on: Some(true),
                speed_kmh: Some(speed),
                walking_time_s: Some(125),
                step_count: Some(40),
                distance_m: Some(60.0),
            })
        }
    }

    struct ScriptedSession {
        script: Arc<PadScript>,
    }

    #[async_trait]
    impl DeviceSession for ScriptedSession {
        async fn get_status(&mut self, _accurate: bool) -> Result<StatusReading> {
            if self.script.fail_status.load(Ordering::SeqCst) {
                return Err(PadError::Transport("read timeout".to_string()));
            }
            Ok(*self.script.reading.lock().unwrap())
        }

        async fn start(&mut self) -> Result<()> {
            if self.script.fail_commands.load(Ordering::SeqCst) {
                return Err(PadError::Transport("write failed".to_string()));
            }
            self.script.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            if self.script.fail_commands.load(Ordering::SeqCst) {
                return Err(PadError::Transport("write failed".to_string()));
            }
            self.script.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_speed(&mut self, speed_kmh: f64) -> Result<()> {
            if self.script.fail_commands.load(Ordering::SeqCst) {
                return Err(PadError::Transport("write failed".to_string()));
            }
            self.script.set_speed_values.lock().unwrap().push(speed_kmh);
            Ok(())
        }
    }

    struct ScriptedFactory {
        script: Arc<PadScript>,
    }

    #[async_trait]
    impl SessionFactory for ScriptedFactory {
        async fn connect(
            &self,
            address: &str,
            _token: &str,
            _model: &str,
        ) -> Result<Box<dyn DeviceSession>> {
            self.script.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_connect.load(Ordering::SeqCst) {
                return Err(PadError::Transport("connection refused".to_string()));
            }
            *self.script.connected_address.lock().unwrap() = Some(address.to_string());
            Ok(Box::new(ScriptedSession {
                script: self.script.clone(),
            }))
        }
    }

    struct EmptyScanner;

    #[async_trait]
    impl DeviceScanner for EmptyScanner {
        async fn scan(
            &self,
            _timeout: Duration,
            _token: Option<&str>,
        ) -> Result<Vec<DiscoveredDevice>> {
            Ok(Vec::new())
        }
    }

    struct OnePadScanner {
        device_id: String,
        address: String,
    }

    #[async_trait]
    impl DeviceScanner for OnePadScanner {
        async fn scan(
            &self,
            _timeout: Duration,
            token: Option<&str>,
        ) -> Result<Vec<DiscoveredDevice>> {
            Ok(vec![DiscoveredDevice {
                address: self.address.clone(),
                device_id: self.device_id.clone(),
                auth_token: token.unwrap_or_default().to_string(),
                auth_ok: true,
                auth_error: None,
                model: "ksmb.walkingpad.v1".to_string(),
            }])
        }
    }

    fn supervisor_with(
        script: &Arc<PadScript>,
        scanner: Arc<dyn DeviceScanner>,
    ) -> (Supervisor, Arc<SharedState>) {
        let shared = Arc::new(SharedState::new());
        // Tests drive cycle()/execute_command() directly, so the channel
        // senders are not needed.
        let (_, request_rx) = mpsc::channel(8);
        let (_, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor::new(
            shared.clone(),
            Arc::new(ScriptedFactory {
                script: script.clone(),
            }),
            DiscoveryResolver::new(scanner),
            EventBus::default(),
            request_rx,
            shutdown_rx,
            TimingConfig::default(),
        );
        (supervisor, shared)
    }

    fn configured(shared: &SharedState, address: &str) {
        shared.apply_config(PadConfig::new(address, "token", ""));
    }

    #[tokio::test]
    async fn test_unconfigured_cycle_records_missing_config() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));

        let delay = supervisor.cycle().await;

        assert_eq!(delay, RETRY_INTERVAL);
        shared.read_cache(|cache| {
            assert!(!cache.connected);
            assert_eq!(cache.last_error, "missing_config");
        });
        assert_eq!(script.connect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_retries_without_session() {
        let script = PadScript::running_at(3.2);
        script.fail_connect.store(true, Ordering::SeqCst);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");

        let delay = supervisor.cycle().await;

        assert_eq!(delay, RETRY_INTERVAL);
        assert!(supervisor.session.is_none());
        shared.read_cache(|cache| {
            assert!(!cache.connected);
            assert_eq!(cache.last_error, "transport error: connection refused");
        });
    }

    #[tokio::test]
    async fn test_successful_cycle_populates_cache() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");

        let delay = supervisor.cycle().await;

        assert_eq!(delay, POLL_INTERVAL);
        shared.read_cache(|cache| {
            assert!(cache.connected);
            assert!(cache.running);
            assert_eq!(cache.speed, Some(3.2));
            assert_eq!(cache.runtime_seconds, 125);
            assert_eq!(cache.steps, 40);
            assert!((cache.distance_km - 0.06).abs() < 1e-9);
            assert!(cache.last_error.is_empty());
        });
    }

    #[tokio::test]
    async fn test_unchanged_config_does_not_rebuild_session() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");

        supervisor.cycle().await;
        supervisor.cycle().await;
        supervisor.cycle().await;

        assert_eq!(script.connect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reapplied_config_forces_reconnect() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        // Same fields, new epoch: the session may be stale.
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        assert_eq!(script.connect_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_polling_failure_flips_connected_and_recovers() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;
        shared.read_cache(|cache| assert!(cache.connected));

        script.fail_status.store(true, Ordering::SeqCst);
        let delay = supervisor.cycle().await;

        assert_eq!(delay, RETRY_INTERVAL);
        assert!(supervisor.session.is_none());
        shared.read_cache(|cache| {
            assert!(!cache.connected);
            assert!(!cache.running);
            assert!(!cache.last_error.is_empty());
        });

        // Next cycle re-attempts Connecting.
        script.fail_status.store(false, Ordering::SeqCst);
        let delay = supervisor.cycle().await;
        assert_eq!(delay, POLL_INTERVAL);
        assert_eq!(script.connect_calls.load(Ordering::SeqCst), 2);
        shared.read_cache(|cache| assert!(cache.connected));
    }

    #[tokio::test]
    async fn test_resolving_adopts_scanned_address() {
        let script = PadScript::running_at(3.2);
        let scanner = Arc::new(OnePadScanner {
            device_id: "pad-01".to_string(),
            address: "192.168.1.77".to_string(),
        });
        let (mut supervisor, shared) = supervisor_with(&script, scanner);
        shared.apply_config(PadConfig::new("", "token", "PAD-01"));

        let delay = supervisor.cycle().await;

        assert_eq!(delay, POLL_INTERVAL);
        assert_eq!(
            script.connected_address.lock().unwrap().as_deref(),
            Some("192.168.1.77")
        );
        // The resolved address is adopted per cycle, never persisted.
        let (config, _) = shared.config_snapshot();
        assert!(config.address.is_none());
    }

    #[tokio::test]
    async fn test_resolving_no_match_records_device_not_found() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        shared.apply_config(PadConfig::new("", "token", "pad-01"));

        let delay = supervisor.cycle().await;

        assert_eq!(delay, RETRY_INTERVAL);
        shared.read_cache(|cache| {
            assert!(!cache.connected);
            assert_eq!(cache.last_error, "device_not_found");
        });
        assert_eq!(script.connect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_command_while_disconnected_fails_fast() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));

        let before = shared.read_cache(Clone::clone);
        let snapshot = supervisor
            .execute_command(BeltCommand::Start, Instant::now())
            .await;

        assert!(!snapshot.ok);
        assert_eq!(snapshot.error, "not_connected");
        assert_eq!(shared.read_cache(Clone::clone), before);
        assert_eq!(script.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_sets_running_optimistically() {
        let script = PadScript::with_reading(StatusReading {
            is_on: Some(false),
            speed_kmh: Some(0.0),
            ..StatusReading::default()
        });
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        let snapshot = supervisor
            .execute_command(BeltCommand::Start, Instant::now())
            .await;

        assert!(snapshot.ok);
        assert!(snapshot.running);
        assert_eq!(script.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_clears_running() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        let snapshot = supervisor
            .execute_command(BeltCommand::Stop, Instant::now())
            .await;

        assert!(snapshot.ok);
        assert!(!snapshot.running);
        assert_eq!(script.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_adjust_speed_is_noop_while_stopped() {
        let script = PadScript::with_reading(StatusReading {
            is_on: Some(false),
            speed_kmh: Some(2.0),
            ..StatusReading::default()
        });
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        let before = shared.read_cache(|cache| cache.snapshot(true));
        let snapshot = supervisor
            .execute_command(BeltCommand::AdjustSpeed(0.5), Instant::now())
            .await;

        assert_eq!(snapshot, before);
        assert!(script.set_speed_values.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_speed_clamps_to_ceiling() {
        let script = PadScript::running_at(5.8);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        let snapshot = supervisor
            .execute_command(BeltCommand::AdjustSpeed(0.5), Instant::now())
            .await;

        assert!(snapshot.ok);
        assert_eq!(snapshot.speed, Some(6.0));
        assert_eq!(*script.set_speed_values.lock().unwrap(), vec![6.0]);
    }

    #[tokio::test]
    async fn test_adjust_speed_to_floor_stops_belt() {
        let script = PadScript::running_at(4.0);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        let snapshot = supervisor
            .execute_command(BeltCommand::AdjustSpeed(-6.0), Instant::now())
            .await;

        assert!(snapshot.ok);
        assert_eq!(snapshot.speed, Some(0.0));
        assert!(!snapshot.running);
        assert_eq!(*script.set_speed_values.lock().unwrap(), vec![0.0]);
    }

    #[tokio::test]
    async fn test_adjust_speed_without_telemetry_reports_unavailable() {
        let script = PadScript::with_reading(StatusReading::default());
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;
        // Belt reported running without a speed observation yet.
        shared.with_cache(|cache| cache.running = true);

        let snapshot = supervisor
            .execute_command(BeltCommand::AdjustSpeed(0.5), Instant::now())
            .await;

        assert!(!snapshot.ok);
        assert_eq!(snapshot.error, "speed_unavailable");
    }

    #[tokio::test]
    async fn test_command_failure_does_not_flip_connected() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        configured(&shared, "192.168.1.40");
        supervisor.cycle().await;

        script.fail_commands.store(true, Ordering::SeqCst);
        let snapshot = supervisor
            .execute_command(BeltCommand::Stop, Instant::now())
            .await;

        assert!(!snapshot.ok);
        assert_eq!(snapshot.error, "transport error: write failed");
        assert!(snapshot.connected);
        shared.read_cache(|cache| {
            assert!(cache.connected);
            // Connectivity errors belong to the supervisor, not commands.
            assert!(cache.last_error.is_empty());
        });
    }

    #[tokio::test]
    async fn test_device_calls_emit_timing_events() {
        let script = PadScript::running_at(3.2);
        let (mut supervisor, shared) = supervisor_with(&script, Arc::new(EmptyScanner));
        let mut events = supervisor.events.subscribe();
        configured(&shared, "192.168.1.40");

        supervisor.cycle().await;

        // connect + initial status + poll status.
        let mut operations = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Operation(op) = event {
                operations.push((op.operation, op.success));
            }
        }
        assert_eq!(
            operations,
            vec![
                ("connect", true),
                ("get_status", true),
                ("get_status", true)
            ]
        );
    }
}
