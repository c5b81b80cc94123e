use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use padlink::{
    DeviceScanner, DeviceSession, DiscoveredDevice, PadEngine, Result, SessionFactory,
    StatusReading, TimingConfig,
};

/// Shared state of the simulated pad
#[derive(Default)]
struct SimState {
    on: bool,
    speed_kmh: f64,
    walking_time_s: u64,
    step_count: i64,
    distance_m: f64,
}

/// A simulated WalkingPad that lives in process memory
///
/// Stands in for a real transport adapter so the engine can be exercised
/// without hardware on the network.
#[derive(Default)]
struct SimulatedPad {
    state: Arc<Mutex<SimState>>,
}

struct SimulatedSession {
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl DeviceSession for SimulatedSession {
    async fn get_status(&mut self, _accurate: bool) -> Result<StatusReading> {
        let mut state = self.state.lock().unwrap();
        if state.on {
            // Advance the walk a little on every poll.
            state.walking_time_s += 2;
            state.step_count += 3;
            state.distance_m += state.speed_kmh * 2.0 / 3.6;
        }
        Ok(StatusReading {
            is_on: Some(state.on),
            speed_kmh: Some(state.speed_kmh),
            walking_time_s: Some(state.walking_time_s),
            step_count: Some(state.step_count),
            distance_m: Some(state.distance_m),
        })
    }

    async fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.on = true;
        if state.speed_kmh <= 0.0 {
            state.speed_kmh = 2.0;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.on = false;
        state.speed_kmh = 0.0;
        Ok(())
    }

    async fn set_speed(&mut self, speed_kmh: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.speed_kmh = speed_kmh;
        if speed_kmh <= 0.0 {
            state.on = false;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for SimulatedPad {
    async fn connect(
        &self,
        address: &str,
        _token: &str,
        model: &str,
    ) -> Result<Box<dyn DeviceSession>> {
        info!("🔗 Simulated connect to {} ({})", address, model);
        Ok(Box::new(SimulatedSession {
            state: self.state.clone(),
        }))
    }
}

struct NoScanner;

#[async_trait]
impl DeviceScanner for NoScanner {
    async fn scan(
        &self,
        _timeout: Duration,
        _token: Option<&str>,
    ) -> Result<Vec<DiscoveredDevice>> {
        Ok(Vec::new())
    }
}

fn print_status(label: &str, status: &padlink::StatusSnapshot) {
    println!(
        "📊 {label}: ok={} connected={} running={} speed={:?} steps={} distance={:.3}km error={:?}",
        status.ok,
        status.connected,
        status.running,
        status.speed,
        status.steps,
        status.distance_km,
        if status.error.is_empty() {
            None
        } else {
            Some(status.error.as_str())
        }
    );
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚶 Padlink Resident Engine Example");

    // Tight intervals so the demo is responsive to watch.
    let timing = TimingConfig {
        retry_interval: Duration::from_millis(500),
        poll_interval: Duration::from_millis(500),
        ..TimingConfig::default()
    };
    let engine = PadEngine::with_timing(
        Arc::new(SimulatedPad::default()),
        Arc::new(NoScanner),
        timing,
    )?;

    // Before configuration the engine reports missing_config.
    print_status("unconfigured", &engine.get_status());

    info!("⚙️  Applying configuration...");
    engine.configure("192.168.1.40", "0123456789abcdef", "");

    // Give the supervisor a moment to establish the session.
    std::thread::sleep(Duration::from_secs(1));
    print_status("connected", &engine.get_status());

    info!("▶️  Starting the belt");
    print_status("start", &engine.start_belt());

    info!("⏩ Speeding up twice");
    print_status("speed +0.5", &engine.increase_speed());
    print_status("speed +0.5", &engine.increase_speed());

    // Let a few polls land so telemetry accumulates.
    std::thread::sleep(Duration::from_secs(2));
    print_status("walking", &engine.get_status());

    info!("⏪ Slowing down");
    print_status("speed -0.5", &engine.decrease_speed());

    info!("⏹️  Stopping the belt");
    print_status("stop", &engine.stop_belt());

    info!("🔌 Shutting down");
    engine.shutdown();
    info!("🎉 Done");
    Ok(())
}
