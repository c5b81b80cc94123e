use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use padlink::{
    DeviceScanner, DeviceSession, DiscoveredDevice, PadEngine, Result, SessionFactory,
};

/// A scanner returning a fixed neighborhood of miio devices
///
/// One compatible pad, one unrelated device that discovery must filter out.
struct FixedScanner;

#[async_trait]
impl DeviceScanner for FixedScanner {
    async fn scan(
        &self,
        _timeout: Duration,
        token: Option<&str>,
    ) -> Result<Vec<DiscoveredDevice>> {
        Ok(vec![
            DiscoveredDevice {
                address: "192.168.1.40".to_string(),
                device_id: "ksmb-walkingpad-v1_mibt1234".to_string(),
                auth_token: token.unwrap_or_default().to_string(),
                auth_ok: true,
                auth_error: None,
                model: "ksmb.walkingpad.v1".to_string(),
            },
            DiscoveredDevice {
                address: "192.168.1.77".to_string(),
                device_id: "yeelink-light-color1_mibt9876".to_string(),
                auth_token: token.unwrap_or_default().to_string(),
                auth_ok: true,
                auth_error: None,
                model: "yeelink.light.color1".to_string(),
            },
        ])
    }
}

/// Discovery never needs a live session; connecting is out of scope here.
struct NoFactory;

#[async_trait]
impl SessionFactory for NoFactory {
    async fn connect(
        &self,
        _address: &str,
        _token: &str,
        _model: &str,
    ) -> Result<Box<dyn DeviceSession>> {
        Err(padlink::PadError::NotConnected)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🔍 Padlink Discovery Example");

    let engine = PadEngine::new(Arc::new(NoFactory), Arc::new(FixedScanner))?;

    // Discovery requires a cloud token; without one it fails fast.
    let denied = engine.discover_devices("");
    println!("without token: ok={} error={:?}", denied.ok, denied.error);

    info!("Scanning the local network...");
    let outcome = engine.discover_devices("0123456789abcdef");
    if outcome.ok {
        println!("found {} compatible pad(s):", outcome.devices.len());
        for device in &outcome.devices {
            println!(
                "  📟 {} at {} (model {}, auth {})",
                device.device_id,
                device.address,
                device.model,
                if device.auth_ok { "ok" } else { "failed" }
            );
        }
    } else {
        println!("discovery failed: {:?}", outcome.error);
    }

    engine.shutdown();
    info!("🎉 Done");
    Ok(())
}
