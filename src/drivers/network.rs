//! Network Batch Controller Driver
//!
//! HTTP controller on the local network. A whole lamp map goes out in one
//! request, and the rack has two independent working lights (sides A/B).

use crate::config::{DeviceFamily, NetworkBatchConfig};
use crate::domain::led::{Color, NativeAddress, Side};
use crate::domain::ports::LedDriver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const OFF: &str = "off";

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct LampsRequest {
    lamps: IndexMap<String, String>,
}

#[derive(Debug, Serialize)]
struct LighthouseRequest {
    lighthouses: IndexMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ResetRequest {
    lighthouses: bool,
}

// =============================================================================
// Network Batch Driver
// =============================================================================

/// Driver for the HTTP batch LED controller
pub struct NetworkBatchDriver {
    config: NetworkBatchConfig,
    base_url: String,
    client: reqwest::Client,
}

impl NetworkBatchDriver {
    /// Create a driver with a request timeout
    pub fn new(config: NetworkBatchConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client for {}: {}", config.base_url(), e)))?;

        Ok(Self {
            base_url: config.base_url(),
            config,
            client,
        })
    }

    /// Lamp number if the controller has it; out of range lamps are logged and skipped
    fn lamp_key(&self, address: &NativeAddress) -> Result<Option<String>> {
        let lamp = match address {
            NativeAddress::Numeric(n) => *n,
            other => {
                return Err(Error::InvalidAddress {
                    address: other.to_string(),
                    reason: "network controller takes numeric lamp addresses".into(),
                })
            }
        };

        let in_range = lamp >= 1 && self.config.lamp_count.map_or(true, |max| lamp <= max);
        if !in_range {
            warn!(
                "{}: lamp {} outside 1..={}, skipping",
                self.base_url,
                lamp,
                self.config.lamp_count.map_or("?".to_string(), |m| m.to_string())
            );
            return Ok(None);
        }
        Ok(Some(lamp.to_string()))
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::DeviceUnreachable {
                device: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::DeviceUnreachable {
                device: url,
                reason: format!("controller answered {}", response.status()),
            });
        }
        Ok(())
    }

    async fn send_lamps(&self, lamps: IndexMap<String, String>) -> Result<()> {
        if lamps.is_empty() {
            return Ok(());
        }
        debug!("{}: {} lamps", self.base_url, lamps.len());
        self.post("/lamps", &LampsRequest { lamps }).await
    }

    async fn send_lighthouse(&self, side: Side, value: &str) -> Result<()> {
        let mut lighthouses = IndexMap::new();
        lighthouses.insert(side.to_string(), value.to_string());
        self.post("/lighthouses", &LighthouseRequest { lighthouses }).await
    }
}

#[async_trait]
impl LedDriver for NetworkBatchDriver {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::NetworkBatch
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    fn address_of(&self, slot_name: &str) -> Result<NativeAddress> {
        slot_name
            .trim()
            .parse::<u32>()
            .map(NativeAddress::Numeric)
            .map_err(|_| Error::InvalidAddress {
                address: slot_name.to_string(),
                reason: "not a numeric lamp address".into(),
            })
    }

    async fn led_on(&self, address: NativeAddress, color: Color) -> Result<()> {
        self.batch_on(&[(address, color)]).await
    }

    async fn led_off(&self, address: NativeAddress) -> Result<()> {
        self.batch_off(&[address], false).await
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn batch_on(&self, lamps: &[(NativeAddress, Color)]) -> Result<()> {
        let mut map = IndexMap::with_capacity(lamps.len());
        for (address, color) in lamps {
            if let Some(key) = self.lamp_key(address)? {
                map.insert(key, color.to_string());
            }
        }
        self.send_lamps(map).await
    }

    async fn batch_off(&self, addresses: &[NativeAddress], working_light: bool) -> Result<()> {
        let mut map = IndexMap::with_capacity(addresses.len());
        for address in addresses {
            if let Some(key) = self.lamp_key(address)? {
                map.insert(key, OFF.to_string());
            }
        }
        self.send_lamps(map).await?;

        if working_light {
            self.working_light_off(Side::A).await?;
            self.working_light_off(Side::B).await?;
        }
        Ok(())
    }

    async fn reset(&self, working_light: bool) -> Result<()> {
        self.post("/reset", &ResetRequest { lighthouses: working_light }).await
    }

    fn supports_working_light(&self) -> bool {
        true
    }

    async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        self.send_lighthouse(side, color.as_str()).await
    }

    async fn working_light_off(&self, side: Side) -> Result<()> {
        self.send_lighthouse(side, OFF).await
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/status", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                debug!("{} health check failed: {}", url, e);
                Ok(false)
            }
        }
    }
}
