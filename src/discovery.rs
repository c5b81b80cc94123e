use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{PadError, Result},
    types::DiscoveredDevice,
};

/// Passive scan capability consumed by the resolver
///
/// Supplied by an external discovery adapter; padlink only filters and
/// sequences its results.
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    /// Run a bounded passive scan, optionally authenticating with `token`
    ///
    /// # Errors
    ///
    /// Returns a transport error when the scan itself fails.
    async fn scan(&self, timeout: Duration, token: Option<&str>) -> Result<Vec<DiscoveredDevice>>;
}

/// Structured result of a user-facing discovery request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    /// Whether the scan ran and produced a (possibly empty) device list
    pub ok: bool,
    /// Compatible devices visible during the scan window
    pub devices: Vec<DiscoveredDevice>,
    /// Failure detail when `ok` is false
    pub error: Option<String>,
}

impl DiscoveryOutcome {
    /// Successful outcome wrapping a filtered device list
    #[must_use]
    pub const fn success(devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            ok: true,
            devices,
            error: None,
        }
    }

    /// Failed outcome carrying the error text
    #[must_use]
    pub fn failure(error: &PadError) -> Self {
        Self {
            ok: false,
            devices: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Resolves device identifiers to network addresses via passive scanning
///
/// Used by the supervisor when no explicit address is configured, and by the
/// engine's user-facing device listing.
pub struct DiscoveryResolver {
    scanner: Arc<dyn DeviceScanner>,
}

impl DiscoveryResolver {
    /// Create a resolver over a scan capability
    #[must_use]
    pub fn new(scanner: Arc<dyn DeviceScanner>) -> Self {
        Self { scanner }
    }

    /// Resolve a device identifier to a network address
    ///
    /// Runs a bounded scan, keeps compatible models only, and returns the
    /// first entry whose identifier matches `device_id` case-insensitively.
    /// `Ok(None)` means the scan ran but nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the scanner's transport error when the scan fails.
    pub async fn resolve(
        &self,
        device_id: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let wanted = device_id.to_lowercase();
        let devices = self.compatible_devices(token, timeout).await?;

        let resolved = devices
            .into_iter()
            .find(|device| device.device_id.to_lowercase() == wanted)
            .map(|device| device.address);

        match &resolved {
            Some(address) => info!("Resolved device {} to {}", device_id, address),
            None => debug!("Device {} not visible during scan window", device_id),
        }

        Ok(resolved)
    }

    /// List all compatible devices visible during the scan window
    ///
    /// Independent of any specific target identifier; intended for
    /// user-facing device selection.
    ///
    /// # Errors
    ///
    /// Returns [`PadError::TokenRequired`] for an empty token without
    /// invoking the scanner, or the scanner's transport error when the scan
    /// fails.
    pub async fn discover_all(
        &self,
        token: &str,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        if token.trim().is_empty() {
            return Err(PadError::TokenRequired);
        }
        self.compatible_devices(token, timeout).await
    }

    /// Run [`discover_all`](Self::discover_all) and fold the result into a
    /// structured outcome that never propagates a fault to the caller
    pub async fn discover_outcome(&self, token: &str, timeout: Duration) -> DiscoveryOutcome {
        match self.discover_all(token, timeout).await {
            Ok(devices) => {
                info!("Discovery found {} compatible device(s)", devices.len());
                DiscoveryOutcome::success(devices)
            }
            Err(err) => DiscoveryOutcome::failure(&err),
        }
    }

    async fn compatible_devices(
        &self,
        token: &str,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredDevice>> {
        let found = self.scanner.scan(timeout, Some(token)).await?;
        Ok(found
            .into_iter()
            .filter(DiscoveredDevice::is_compatible)
            .collect())
    }
}
