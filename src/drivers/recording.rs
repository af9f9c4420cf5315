//! Driver recording every command, for dispatcher and workflow tests

use crate::config::DeviceFamily;
use crate::domain::led::{Color, NativeAddress, Side};
use crate::domain::ports::LedDriver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedCall {
    On(String, Color),
    Off(String),
    Reset,
    LightOn(Side, Color),
    LightOff(Side),
}

#[derive(Debug, Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<LedCall>>,
    failing: AtomicBool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent command fail as unreachable
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<LedCall> {
        self.calls.lock().clone()
    }

    /// Slot names currently lit, replaying the recorded calls
    pub fn lit(&self) -> std::collections::BTreeMap<String, Color> {
        let mut lit = std::collections::BTreeMap::new();
        for call in self.calls.lock().iter() {
            match call {
                LedCall::On(name, color) => {
                    lit.insert(name.clone(), *color);
                }
                LedCall::Off(name) => {
                    lit.remove(name);
                }
                LedCall::Reset => lit.clear(),
                _ => {}
            }
        }
        lit
    }

    fn record(&self, call: LedCall) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnreachable {
                device: "recording".into(),
                reason: "simulated failure".into(),
            });
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl LedDriver for RecordingDriver {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Noop
    }

    fn endpoint(&self) -> String {
        "recording".into()
    }

    fn address_of(&self, slot_name: &str) -> Result<NativeAddress> {
        if slot_name.starts_with('!') {
            return Err(Error::InvalidAddress {
                address: slot_name.to_string(),
                reason: "unmapped".into(),
            });
        }
        Ok(NativeAddress::Named(slot_name.to_string()))
    }

    async fn led_on(&self, address: NativeAddress, color: Color) -> Result<()> {
        self.record(LedCall::On(address.to_string(), color))
    }

    async fn led_off(&self, address: NativeAddress) -> Result<()> {
        self.record(LedCall::Off(address.to_string()))
    }

    async fn reset(&self, _working_light: bool) -> Result<()> {
        self.record(LedCall::Reset)
    }

    fn supports_working_light(&self) -> bool {
        true
    }

    async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        self.record(LedCall::LightOn(side, color))
    }

    async fn working_light_off(&self, side: Side) -> Result<()> {
        self.record(LedCall::LightOff(side))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.failing.load(Ordering::SeqCst))
    }
}
