//! Controller configuration
//!
//! Each storage carries one [`DeviceConfig`], a serde-tagged enum selecting
//! the controller family and holding its connection parameters:
//!
//! ```yaml
//! device:
//!   family: network_batch
//!   host: 10.0.4.21
//!   port: 8000
//!   lamp_count: 400
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default I/O timeout for controller requests; LEDs are advisory feedback
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 1500;

fn default_timeout_ms() -> u64 {
    DEFAULT_DEVICE_TIMEOUT_MS
}

// =============================================================================
// Device Family
// =============================================================================

/// LED controller families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    NetworkBatch,
    SerialProxy,
    SocketRowLamp,
    Noop,
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFamily::NetworkBatch => write!(f, "network_batch"),
            DeviceFamily::SerialProxy => write!(f, "serial_proxy"),
            DeviceFamily::SocketRowLamp => write!(f, "socket_row_lamp"),
            DeviceFamily::Noop => write!(f, "noop"),
        }
    }
}

// =============================================================================
// Family Configurations
// =============================================================================

/// HTTP controller accepting a whole lamp map per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkBatchConfig {
    pub host: String,
    pub port: u16,
    /// Highest lamp number wired on the rack, if known
    pub lamp_count: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NetworkBatchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            lamp_count: None,
            timeout_ms: DEFAULT_DEVICE_TIMEOUT_MS,
        }
    }
}

impl NetworkBatchConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// One row of the slot number -> strip position wiring table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripEntry {
    pub slot: u16,
    pub channel: u8,
    pub position: u16,
}

/// Single-shelf serial controller reached through a local proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialProxyConfig {
    /// TCP address of the proxy owning the serial port
    pub proxy_addr: String,
    pub gateway: u8,
    pub controller: u8,
    /// Blink instead of steady light
    pub blink: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Wiring table override; the built-in table is used when absent
    pub slot_table: Option<Vec<StripEntry>>,
}

impl Default for SerialProxyConfig {
    fn default() -> Self {
        Self {
            proxy_addr: "127.0.0.1:5555".to_string(),
            gateway: 1,
            controller: 1,
            blink: false,
            timeout_ms: DEFAULT_DEVICE_TIMEOUT_MS,
            slot_table: None,
        }
    }
}

/// Socket controller driving whole rows of lamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketRowLampConfig {
    pub addr: String,
    pub lamps_per_row: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SocketRowLampConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9100".to_string(),
            lamps_per_row: 40,
            timeout_ms: DEFAULT_DEVICE_TIMEOUT_MS,
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Controller family plus connection parameters for one storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DeviceConfig {
    NetworkBatch(NetworkBatchConfig),
    SerialProxy(SerialProxyConfig),
    SocketRowLamp(SocketRowLampConfig),
    #[default]
    Noop,
}

impl DeviceConfig {
    pub fn family(&self) -> DeviceFamily {
        match self {
            DeviceConfig::NetworkBatch(_) => DeviceFamily::NetworkBatch,
            DeviceConfig::SerialProxy(_) => DeviceFamily::SerialProxy,
            DeviceConfig::SocketRowLamp(_) => DeviceFamily::SocketRowLamp,
            DeviceConfig::Noop => DeviceFamily::Noop,
        }
    }

    /// Configured I/O timeout, `None` for the no-op family
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            DeviceConfig::NetworkBatch(c) => Some(Duration::from_millis(c.timeout_ms)),
            DeviceConfig::SerialProxy(c) => Some(Duration::from_millis(c.timeout_ms)),
            DeviceConfig::SocketRowLamp(c) => Some(Duration::from_millis(c.timeout_ms)),
            DeviceConfig::Noop => None,
        }
    }
}

/// Process-wide overrides applied when drivers are built
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Replace every configured timeout
    pub request_timeout: Option<Duration>,
    /// Build the no-op driver regardless of the storage's family
    pub disable_hardware: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_tagged_yaml() {
        let yaml = "family: network_batch\nhost: 10.0.4.21\nlamp_count: 400\n";
        let config: DeviceConfig = serde_yaml::from_str(yaml).unwrap();

        match &config {
            DeviceConfig::NetworkBatch(c) => {
                assert_eq!(c.host, "10.0.4.21");
                assert_eq!(c.port, 8000);
                assert_eq!(c.lamp_count, Some(400));
                assert_eq!(c.base_url(), "http://10.0.4.21:8000");
            }
            other => panic!("unexpected config: {:?}", other),
        }
        assert_eq!(config.family(), DeviceFamily::NetworkBatch);
        assert_eq!(config.timeout(), Some(Duration::from_millis(DEFAULT_DEVICE_TIMEOUT_MS)));
    }

    #[test]
    fn test_noop_is_default() {
        let config: DeviceConfig = serde_yaml::from_str("family: noop\n").unwrap();
        assert_eq!(config, DeviceConfig::Noop);
        assert_eq!(DeviceConfig::default().family(), DeviceFamily::Noop);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_serial_slot_table_override() {
        let yaml = r#"
family: serial_proxy
proxy_addr: 127.0.0.1:6000
slot_table:
  - { slot: 1, channel: 0, position: 3 }
"#;
        let config: DeviceConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            DeviceConfig::SerialProxy(c) => {
                assert_eq!(c.gateway, 1);
                let table = c.slot_table.unwrap();
                assert_eq!(table[0], StripEntry { slot: 1, channel: 0, position: 3 });
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }
}
