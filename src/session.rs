use async_trait::async_trait;

use crate::{error::Result, types::StatusReading};

/// Live handle to an authenticated connection with the treadmill
///
/// The wire protocol behind this trait is supplied by an external device
/// adapter; padlink only sequences calls to it. Sessions are ephemeral: the
/// supervisor destroys and recreates them whenever the configuration changes
/// or any I/O call fails.
///
/// All methods are fallible and may return [`PadError::Transport`] on any
/// transport problem. `get_status(true)` may additionally be rejected with a
/// not-supported error on firmware without the accurate query; callers use
/// [`fetch_status`] to fall back to the fast read.
///
/// [`PadError::Transport`]: crate::PadError::Transport
#[async_trait]
pub trait DeviceSession: Send {
    /// Fetch a telemetry reading
    ///
    /// `accurate` requests the higher-fidelity query; `false` requests the
    /// fast/approximate one.
    ///
    /// # Errors
    ///
    /// Returns a transport error on I/O failure, or a not-supported error
    /// when `accurate` is rejected by the device.
    async fn get_status(&mut self, accurate: bool) -> Result<StatusReading>;

    /// Start the belt
    ///
    /// # Errors
    ///
    /// Returns a transport error on I/O failure.
    async fn start(&mut self) -> Result<()>;

    /// Stop the belt
    ///
    /// # Errors
    ///
    /// Returns a transport error on I/O failure.
    async fn stop(&mut self) -> Result<()>;

    /// Set the belt speed in km/h
    ///
    /// # Errors
    ///
    /// Returns a transport error on I/O failure.
    async fn set_speed(&mut self, speed_kmh: f64) -> Result<()>;
}

/// Builds device sessions for `(address, token)` pairs
///
/// Injected into the engine so the transport stays an external capability and
/// tests can substitute a mock.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open an authenticated session to the device at `address`
    ///
    /// # Errors
    ///
    /// Returns a transport error when the device is unreachable or rejects
    /// the token.
    async fn connect(
        &self,
        address: &str,
        token: &str,
        model: &str,
    ) -> Result<Box<dyn DeviceSession>>;
}

/// Fetch a status reading, preferring the accurate query
///
/// Falls back to the fast read when the device rejects the accurate one as
/// unsupported. Any other failure propagates unchanged.
///
/// # Errors
///
/// Returns the underlying transport error when both paths fail, or the
/// original error when it is not a not-supported rejection.
pub async fn fetch_status(session: &mut dyn DeviceSession) -> Result<StatusReading> {
    match session.get_status(true).await {
        Ok(reading) => Ok(reading),
        Err(err) if err.is_not_supported() => session.get_status(false).await,
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PadError;

    struct FallbackSession {
        accurate_supported: bool,
        accurate_calls: u32,
        fast_calls: u32,
    }

    #[async_trait]
    impl DeviceSession for FallbackSession {
        async fn get_status(&mut self, accurate: bool) -> Result<StatusReading> {
            if accurate {
                self.accurate_calls += 1;
                if !self.accurate_supported {
                    return Err(PadError::NotSupported("accurate status".to_string()));
                }
                return Ok(StatusReading {
                    speed_kmh: Some(2.0),
                    ..StatusReading::default()
                });
            }
            self.fast_calls += 1;
            Ok(StatusReading {
                speed_kmh: Some(1.5),
                ..StatusReading::default()
            })
        }

        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        async fn set_speed(&mut self, _speed_kmh: f64) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_accurate_read_preferred() {
        let mut session = FallbackSession {
            accurate_supported: true,
            accurate_calls: 0,
            fast_calls: 0,
        };
        let reading = fetch_status(&mut session).await.unwrap();
        assert_eq!(reading.speed_kmh, Some(2.0));
        assert_eq!(session.accurate_calls, 1);
        assert_eq!(session.fast_calls, 0);
    }

    #[tokio::test]
    async fn test_fast_fallback_on_unsupported() {
        let mut session = FallbackSession {
            accurate_supported: false,
            accurate_calls: 0,
            fast_calls: 0,
        };
        let reading = fetch_status(&mut session).await.unwrap();
        assert_eq!(reading.speed_kmh, Some(1.5));
        assert_eq!(session.accurate_calls, 1);
        assert_eq!(session.fast_calls, 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates_without_fallback() {
        struct FailingSession;

        #[async_trait]
        impl DeviceSession for FailingSession {
            async fn get_status(&mut self, _accurate: bool) -> Result<StatusReading> {
                Err(PadError::Transport("connection reset".to_string()))
            }
            async fn start(&mut self) -> Result<()> {
                Ok(())
            }
            async fn stop(&mut self) -> Result<()> {
                Ok(())
            }
            async fn set_speed(&mut self, _speed_kmh: f64) -> Result<()> {
                Ok(())
            }
        }

        let err = fetch_status(&mut FailingSession).await.unwrap_err();
        assert!(matches!(err, PadError::Transport(_)));
    }
}
