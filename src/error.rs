use thiserror::Error;

/// Errors that can occur while supervising or commanding a WalkingPad
///
/// Display strings for the configuration/discovery variants are the stable
/// snake_case tokens surfaced to hosts through [`StatusSnapshot::error`] and
/// [`DiscoveryOutcome::error`], so UIs can match on them.
///
/// [`StatusSnapshot::error`]: crate::types::StatusSnapshot
/// [`DiscoveryOutcome::error`]: crate::discovery::DiscoveryOutcome
#[derive(Error, Debug)]
pub enum PadError {
    /// No usable address/token has been configured yet
    #[error("missing_config")]
    MissingConfig,

    /// Discovery could not resolve the configured device identifier
    #[error("device_not_found")]
    DeviceNotFound,

    /// A command was issued while no live session exists
    #[error("not_connected")]
    NotConnected,

    /// A speed delta was requested before any telemetry was observed
    #[error("speed_unavailable")]
    SpeedUnavailable,

    /// Discovery was requested without an auth token
    #[error("token_required")]
    TokenRequired,

    /// The device rejected an operation as unsupported
    #[error("not_supported: {0}")]
    NotSupported(String),

    /// Any I/O failure talking to the device
    #[error("transport error: {0}")]
    Transport(String),

    /// A command exceeded its bounded wait
    #[error("command timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The engine is shutting down and can no longer accept requests
    #[error("engine is shutting down")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for padlink operations
pub type Result<T> = std::result::Result<T, PadError>;

impl PadError {
    /// Check if this error means the device rejected an operation as
    /// unsupported (the accurate-status fallback trigger)
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        match self {
            Self::NotSupported(_) => true,
            Self::Transport(msg) => msg.to_lowercase().contains("not_supported"),
            _ => false,
        }
    }

    /// Check if this error indicates a connectivity problem
    ///
    /// Only the supervisor acts on these; command paths report them without
    /// touching connectivity state.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NotConnected | Self::DeviceNotFound
        )
    }
}
