#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Padlink 🚶
//!
//! A Rust library for running a network-attached WalkingPad treadmill as a
//! resident background service.
//!
//! The library keeps a single supervised connection to one WalkingPad and
//! exposes a synchronous facade ([`PadEngine`]) that host applications can
//! call from any thread. Device I/O is confined to one dedicated loop, so a
//! command, a status poll, and a discovery scan can never interleave on the
//! wire.
//!
//! The core behaviors:
//!
//! - **Connection supervision**: resolve, connect, poll, and reconnect with
//!   fixed backoff, forever, without host involvement
//! - **Command execution**: start/stop and relative speed adjustments with a
//!   bounded wait and structured failure reporting
//! - **Status caching**: every read is served from a last-known-good cache;
//!   commands and faults update it, they never block on the device
//! - **Discovery**: scan the local network for compatible pads and resolve a
//!   stable device identifier to its current address
//!
//! The actual transport is injected through the [`SessionFactory`] and
//! [`DeviceScanner`] traits, which keeps the supervision logic independent of
//! any particular protocol stack and makes the whole engine testable against
//! scripted devices.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use padlink::PadEngine;
//! # fn adapters() -> (Arc<dyn padlink::SessionFactory>, Arc<dyn padlink::DeviceScanner>) {
//! #     unimplemented!()
//! # }
//!
//! fn main() -> padlink::Result<()> {
//!     let (factory, scanner) = adapters();
//!     let engine = PadEngine::new(factory, scanner)?;
//!
//!     // Credentials for the pad; the supervisor takes it from here.
//!     engine.configure("192.168.1.40", "0123456789abcdef", "");
//!
//!     let status = engine.start_belt();
//!     println!("running: {}, speed: {:?}", status.running, status.speed);
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

/// Device discovery and identifier resolution
pub mod discovery;
/// Synchronous engine facade and I/O thread lifecycle
pub mod engine;
/// Error types and handling
pub mod error;
/// Observability event types and broadcast bus
pub mod events;
/// Device session and transport capability traits
pub mod session;
/// Connection supervisor loop
pub mod supervisor;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use discovery::{DeviceScanner, DiscoveryOutcome, DiscoveryResolver};
pub use engine::PadEngine;
pub use error::{PadError, Result};
pub use events::{EngineEvent, ErrorEvent, EventBus, OperationEvent};
pub use session::{DeviceSession, SessionFactory};
pub use types::{
    BeltCommand, DiscoveredDevice, PadConfig, StatusReading, StatusSnapshot, TimingConfig,
};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Miio model string identifying the supported WalkingPad generation
///
/// Sessions are established against this model so the transport layer can
/// select the right property mapping.
pub const WALKINGPAD_MODEL: &str = "ksmb.walkingpad.v1";

/// Substring that marks a discovered device model as a compatible pad
///
/// Discovery results whose model string does not contain this keyword are
/// filtered out before they reach the host.
pub const COMPATIBLE_MODEL_KEYWORD: &str = "walkingpad";

/// Lowest commandable belt speed in km/h
pub const MIN_SPEED_KMH: f64 = 0.0;

/// Highest commandable belt speed in km/h
///
/// Speed targets are clamped to this ceiling before they are sent, so a
/// large relative adjustment can never push the belt past the hardware's
/// supported range.
pub const MAX_SPEED_KMH: f64 = 6.0;

/// Speed below which the belt is considered stopped, in km/h
///
/// Readings at or under this threshold clear the running flag even when the
/// device still reports its motor as powered.
pub const RUNNING_SPEED_THRESHOLD_KMH: f64 = 0.01;

/// Default relative speed adjustment step in km/h
pub const DEFAULT_SPEED_STEP_KMH: f64 = 0.5;

/// Pause between reconnection attempts while the pad is unreachable
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Pause between status polls while the pad is connected
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Bounded wait for a belt command to complete end to end
///
/// Covers queueing onto the I/O loop plus the device call itself. A command
/// that exceeds this bound is reported as a timeout without disturbing the
/// connection.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

/// Default discovery scan window
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period granted to the supervisor task during shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Additional bounded wait for the I/O thread to exit during shutdown
pub const THREAD_JOIN_WAIT: Duration = Duration::from_secs(1);
