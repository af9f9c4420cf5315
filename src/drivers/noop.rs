//! No-op driver for racks without a controller

use crate::config::DeviceFamily;
use crate::domain::led::{Color, NativeAddress, Side};
use crate::domain::ports::LedDriver;
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// Accepts every command and only logs it
#[derive(Debug, Clone)]
pub struct NoopDriver {
    storage: String,
}

impl NoopDriver {
    pub fn new(storage: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
        }
    }
}

#[async_trait]
impl LedDriver for NoopDriver {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Noop
    }

    fn endpoint(&self) -> String {
        format!("noop://{}", self.storage)
    }

    fn address_of(&self, slot_name: &str) -> Result<NativeAddress> {
        Ok(NativeAddress::Named(slot_name.to_string()))
    }

    async fn led_on(&self, address: NativeAddress, color: Color) -> Result<()> {
        debug!("[{}] led {} -> {}", self.storage, address, color);
        Ok(())
    }

    async fn led_off(&self, address: NativeAddress) -> Result<()> {
        debug!("[{}] led {} -> off", self.storage, address);
        Ok(())
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn batch_on(&self, lamps: &[(NativeAddress, Color)]) -> Result<()> {
        debug!("[{}] batch on, {} lamps", self.storage, lamps.len());
        Ok(())
    }

    async fn batch_off(&self, addresses: &[NativeAddress], working_light: bool) -> Result<()> {
        debug!(
            "[{}] batch off, {} lamps (working light: {})",
            self.storage,
            addresses.len(),
            working_light
        );
        Ok(())
    }

    async fn reset(&self, working_light: bool) -> Result<()> {
        debug!("[{}] reset (working light: {})", self.storage, working_light);
        Ok(())
    }

    fn supports_working_light(&self) -> bool {
        true
    }

    async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        debug!("[{}] working light {} -> {}", self.storage, side, color);
        Ok(())
    }

    async fn working_light_off(&self, side: Side) -> Result<()> {
        debug!("[{}] working light {} -> off", self.storage, side);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
