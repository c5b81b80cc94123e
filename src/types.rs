use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{MAX_SPEED_KMH, MIN_SPEED_KMH, RUNNING_SPEED_THRESHOLD_KMH};

/// Connection configuration for a WalkingPad
///
/// Mutated only through [`PadEngine::configure`]; applying a configuration
/// always invalidates the current device session, even when the fields are
/// unchanged, because the caller cannot know whether the session is stale.
///
/// [`PadEngine::configure`]: crate::engine::PadEngine::configure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadConfig {
    /// Network address of the device, if known
    pub address: Option<String>,
    /// Authentication token for the device
    pub auth_token: String,
    /// Device identifier for discovery when no address is configured
    pub device_id: Option<String>,
}

impl PadConfig {
    /// Create a configuration, normalizing empty strings to absent fields
    #[must_use]
    pub fn new(address: &str, auth_token: &str, device_id: &str) -> Self {
        let trimmed = |s: &str| {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        Self {
            address: trimmed(address),
            auth_token: auth_token.trim().to_string(),
            device_id: trimmed(device_id),
        }
    }

    /// Whether this configuration can produce a connection attempt
    ///
    /// Requires a token plus either an explicit address or a device
    /// identifier the resolver can look up.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.auth_token.is_empty() && (self.address.is_some() || self.device_id.is_some())
    }
}

/// A raw telemetry reading returned by a device session
///
/// Fields are optional because fast readings and some firmware revisions omit
/// parts of the record; absent fields must not reset cached values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReading {
    /// Explicit belt on/off flag, when the device reports one
    pub is_on: Option<bool>,
    /// Belt speed in km/h
    pub speed_kmh: Option<f64>,
    /// Accumulated walking time in seconds
    pub walking_time_s: Option<u64>,
    /// Accumulated step count
    pub step_count: Option<i64>,
    /// Accumulated distance in meters
    pub distance_m: Option<f64>,
}

/// Last-known device telemetry and connectivity state
///
/// Written only from the supervisor's I/O loop; read concurrently by any
/// caller thread through a short read lock. `running` and `connected` obey
/// two invariants: `running` implies the last observed speed exceeded
/// [`RUNNING_SPEED_THRESHOLD_KMH`], and losing the connection always clears
/// `running`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusCache {
    /// Whether a device session is currently established
    pub connected: bool,
    /// Whether the belt is in motion
    pub running: bool,
    /// Last observed belt speed in km/h, if any telemetry arrived yet
    pub speed: Option<f64>,
    /// Accumulated walking time in seconds
    pub runtime_seconds: u64,
    /// Accumulated step count
    pub steps: u64,
    /// Accumulated distance in kilometers
    pub distance_km: f64,
    /// Last connectivity error, empty while healthy
    pub last_error: String,
}

impl StatusCache {
    /// Fold a telemetry reading into the cache
    ///
    /// Absent fields keep their cached values (last-known-good semantics);
    /// present numeric fields are clamped to be non-negative. When the
    /// device reports no explicit on/off flag, `running` is inferred from
    /// the speed threshold alone.
    pub fn apply_reading(&mut self, reading: &StatusReading) {
        if let Some(speed) = reading.speed_kmh {
            self.speed = Some(speed.max(0.0));
        }

        let above_threshold = self.speed.unwrap_or(0.0) > RUNNING_SPEED_THRESHOLD_KMH;
        match reading.is_on {
            Some(is_on) => self.running = is_on && above_threshold,
            None => {
                if self.speed.is_some() {
                    self.running = above_threshold;
                }
            }
        }

        if let Some(walking_time) = reading.walking_time_s {
            self.runtime_seconds = walking_time;
        }
        if let Some(steps) = reading.step_count {
            self.steps = u64::try_from(steps.max(0)).unwrap_or(0);
        }
        if let Some(distance_m) = reading.distance_m {
            self.distance_km = (distance_m / 1000.0).max(0.0);
        }
    }

    /// Mark the device disconnected, recording why
    ///
    /// A disconnect always clears `running`; telemetry fields keep their
    /// last-known values until the next successful refresh.
    pub fn set_disconnected(&mut self, reason: &str) {
        self.connected = false;
        self.running = false;
        self.last_error = reason.to_string();
    }

    /// Mark the device connected and clear the last error
    pub fn set_connected(&mut self) {
        self.connected = true;
        self.last_error.clear();
    }

    /// Produce an immutable snapshot for a caller, tagged with `ok`
    #[must_use]
    pub fn snapshot(&self, ok: bool) -> StatusSnapshot {
        StatusSnapshot {
            ok,
            connected: self.connected,
            running: self.running,
            speed: self.speed.map(round2),
            runtime_seconds: self.runtime_seconds,
            steps: self.steps,
            distance_km: round3(self.distance_km),
            error: self.last_error.clone(),
        }
    }
}

/// Point-in-time copy of the status cache returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether the operation that produced this snapshot succeeded
    pub ok: bool,
    /// Whether a device session is currently established
    pub connected: bool,
    /// Whether the belt is in motion
    pub running: bool,
    /// Last observed belt speed in km/h, rounded to 2 decimals
    pub speed: Option<f64>,
    /// Accumulated walking time in seconds
    pub runtime_seconds: u64,
    /// Accumulated step count
    pub steps: u64,
    /// Accumulated distance in kilometers, rounded to 3 decimals
    pub distance_km: f64,
    /// Error text, empty on success
    pub error: String,
}

impl StatusSnapshot {
    /// Re-tag this snapshot with a command failure
    #[must_use]
    pub fn with_error(mut self, error: &crate::PadError) -> Self {
        self.ok = false;
        self.error = error.to_string();
        self
    }
}

/// A device found during a passive scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Network address the device answered from
    pub address: String,
    /// Advertised device identifier
    pub device_id: String,
    /// Token the scan authenticated with
    pub auth_token: String,
    /// Whether the token was accepted by the device
    pub auth_ok: bool,
    /// Authentication failure detail, if any
    pub auth_error: Option<String>,
    /// Advertised model string
    pub model: String,
}

impl DiscoveredDevice {
    /// Whether the advertised model identifies a compatible treadmill
    #[must_use]
    pub fn is_compatible(&self) -> bool {
        self.model
            .to_lowercase()
            .contains(crate::COMPATIBLE_MODEL_KEYWORD)
    }
}

/// A belt command accepted from a caller thread
///
/// At most one command is ever in flight: execution happens inline on the
/// supervisor's I/O loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeltCommand {
    /// Start the belt
    Start,
    /// Stop the belt
    Stop,
    /// Change speed by a signed delta in km/h
    AdjustSpeed(f64),
}

impl BeltCommand {
    /// Short operation name used in telemetry events
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::AdjustSpeed(_) => "set_speed",
        }
    }
}

/// Interval and timeout configuration for the engine
///
/// Defaults match the production cadence (5 s retry/poll, 20 s command
/// wait); tests shrink these to keep the state machine fast.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Sleep between failed connection attempts and other retry paths
    pub retry_interval: Duration,
    /// Sleep between successful telemetry polls
    pub poll_interval: Duration,
    /// Bounded wait for a caller command round-trip
    pub command_timeout: Duration,
    /// Bounded duration of a passive discovery scan
    pub scan_timeout: Duration,
    /// Grace period for the supervisor task to unwind at shutdown
    pub shutdown_grace: Duration,
    /// Additional bounded wait for the I/O thread to exit
    pub thread_join_wait: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            retry_interval: crate::RETRY_INTERVAL,
            poll_interval: crate::POLL_INTERVAL,
            command_timeout: crate::COMMAND_TIMEOUT,
            scan_timeout: crate::DEFAULT_SCAN_TIMEOUT,
            shutdown_grace: crate::SHUTDOWN_GRACE,
            thread_join_wait: crate::THREAD_JOIN_WAIT,
        }
    }
}

/// Clamp a target speed into the supported belt range
#[must_use]
pub fn clamp_speed(speed: f64) -> f64 {
    speed.clamp(MIN_SPEED_KMH, MAX_SPEED_KMH)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
