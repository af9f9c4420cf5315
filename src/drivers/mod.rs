//! LED Controller Drivers
//!
//! Provides one driver per controller family:
//! - Network batch: HTTP controller taking whole lamp maps
//! - Serial proxy: binary frames to a serial shelf through a local proxy
//! - Socket row/lamp: text row patterns over TCP
//! - No-op: hardware-less racks

pub mod network;
pub mod noop;
pub mod serial;
pub mod socket;

#[cfg(test)]
pub(crate) mod recording;

pub use network::*;
pub use noop::*;
pub use serial::*;
pub use socket::*;

use crate::config::{DeviceConfig, DriverOptions};
use crate::domain::model::Storage;
use crate::domain::ports::LedDriverRef;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

/// Factory for creating LED drivers
pub struct DriverFactory;

impl DriverFactory {
    /// Build the driver matching a storage's device configuration
    pub fn create(storage: &Storage, options: &DriverOptions) -> Result<LedDriverRef> {
        if options.disable_hardware {
            return Ok(Arc::new(NoopDriver::new(&storage.name)));
        }

        let timeout = options
            .request_timeout
            .or_else(|| storage.device.timeout())
            .unwrap_or(Duration::from_millis(crate::config::DEFAULT_DEVICE_TIMEOUT_MS));

        let driver: LedDriverRef = match &storage.device {
            DeviceConfig::NetworkBatch(config) => Arc::new(NetworkBatchDriver::new(config.clone(), timeout)?),
            DeviceConfig::SerialProxy(config) => Arc::new(SerialProxyDriver::new(config.clone(), timeout)?),
            DeviceConfig::SocketRowLamp(config) => Arc::new(SocketRowLampDriver::new(config.clone(), timeout)?),
            DeviceConfig::Noop => Arc::new(NoopDriver::new(&storage.name)),
        };

        info!(
            "Created {} driver for storage {} ({})",
            driver.family(),
            storage.name,
            driver.endpoint()
        );
        Ok(driver)
    }
}

/// Open a connection, write one payload and close
pub(crate) async fn send_over_tcp(addr: &str, payload: &[u8], timeout: Duration) -> Result<()> {
    let unreachable = |reason: String| Error::DeviceUnreachable {
        device: addr.to_string(),
        reason,
    };

    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| unreachable("connect timed out".into()))?
        .map_err(|e| unreachable(e.to_string()))?;

    tokio::time::timeout(timeout, async {
        stream.write_all(payload).await?;
        stream.flush().await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| unreachable("write timed out".into()))?
    .map_err(|e| unreachable(e.to_string()))?;

    Ok(())
}

/// Whether a TCP endpoint accepts connections within the timeout
pub(crate) async fn probe_tcp(addr: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceFamily, NetworkBatchConfig, SerialProxyConfig, SocketRowLampConfig};

    #[test]
    fn test_factory_selects_family() {
        let options = DriverOptions::default();
        let cases = [
            (DeviceConfig::NetworkBatch(NetworkBatchConfig::default()), DeviceFamily::NetworkBatch),
            (DeviceConfig::SerialProxy(SerialProxyConfig::default()), DeviceFamily::SerialProxy),
            (DeviceConfig::SocketRowLamp(SocketRowLampConfig::default()), DeviceFamily::SocketRowLamp),
            (DeviceConfig::Noop, DeviceFamily::Noop),
        ];

        for (device, family) in cases {
            let driver = DriverFactory::create(&Storage::new("S1", device), &options).unwrap();
            assert_eq!(driver.family(), family);
        }
    }

    #[test]
    fn test_factory_disable_hardware_forces_noop() {
        let options = DriverOptions {
            disable_hardware: true,
            ..Default::default()
        };
        let storage = Storage::new("S1", DeviceConfig::NetworkBatch(NetworkBatchConfig::default()));
        let driver = DriverFactory::create(&storage, &options).unwrap();
        assert_eq!(driver.family(), DeviceFamily::Noop);
    }

    #[tokio::test]
    async fn test_send_over_tcp_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = send_over_tcp(&addr, b"x", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::DeviceUnreachable { .. })));
    }
}
