//! Socket Row/Lamp Driver
//!
//! Text controller driving whole rows. There is no single-lamp command, so
//! the driver keeps the set of active lamps per row and resends the full
//! row pattern on every change.
//!
//! Wire format, one newline-terminated line per command:
//!
//! ```text
//! ROW 13 0000000000011000000000000000000000000000
//! LIGHTHOUSE A yellow
//! RESET
//! ```

use crate::config::{DeviceFamily, SocketRowLampConfig};
use crate::domain::led::{Color, NativeAddress, Side};
use crate::domain::ports::LedDriver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{probe_tcp, send_over_tcp};

/// Rows per row letter
const ROWS_PER_LETTER: u16 = 10;

/// Parse a label like `B3-12` into `(row, lamp)`; letter `A` is row offset 0,
/// `B` is 10 and so on
pub fn parse_label(label: &str) -> Result<(u16, u16)> {
    let invalid = |reason: &str| Error::InvalidAddress {
        address: label.to_string(),
        reason: reason.to_string(),
    };

    let label = label.trim();
    let (row_part, lamp_part) = label.split_once('-').ok_or_else(|| invalid("expected <letter><row>-<lamp>"))?;

    let mut chars = row_part.chars();
    let letter = chars
        .next()
        .filter(|c| c.is_ascii_alphabetic())
        .ok_or_else(|| invalid("row must start with a letter"))?
        .to_ascii_uppercase();
    let row_number: u16 = chars.as_str().parse().map_err(|_| invalid("row number is not numeric"))?;
    let lamp: u16 = lamp_part.parse().map_err(|_| invalid("lamp number is not numeric"))?;

    let row = (letter as u16 - 'A' as u16)
        .checked_mul(ROWS_PER_LETTER)
        .and_then(|offset| offset.checked_add(row_number))
        .ok_or_else(|| invalid("row number out of range"))?;
    Ok((row, lamp))
}

/// Driver for the socket row/lamp controller
pub struct SocketRowLampDriver {
    config: SocketRowLampConfig,
    timeout: Duration,
    /// Lit lamps per row; held while a row goes out so patterns stay ordered
    active: Mutex<BTreeMap<u16, BTreeSet<u16>>>,
}

impl SocketRowLampDriver {
    pub fn new(config: SocketRowLampConfig, timeout: Duration) -> Result<Self> {
        if config.lamps_per_row == 0 {
            return Err(Error::Configuration(format!(
                "{}: lamps_per_row must be positive",
                config.addr
            )));
        }
        Ok(Self {
            config,
            timeout,
            active: Mutex::new(BTreeMap::new()),
        })
    }

    fn row_lamp(&self, address: &NativeAddress) -> Result<(u16, u16)> {
        match address {
            NativeAddress::RowLamp { row, lamp } => Ok((*row, *lamp)),
            other => Err(Error::InvalidAddress {
                address: other.to_string(),
                reason: "socket controller takes row/lamp addresses".into(),
            }),
        }
    }

    /// `ROW` line for one row given its lit lamps
    fn row_line(&self, row: u16, lit: Option<&BTreeSet<u16>>) -> String {
        let pattern: String = (1..=self.config.lamps_per_row)
            .map(|lamp| if lit.map_or(false, |set| set.contains(&lamp)) { '1' } else { '0' })
            .collect();
        format!("ROW {} {}\n", row, pattern)
    }

    async fn send(&self, payload: String) -> Result<()> {
        debug!("{} <- {}", self.config.addr, payload.trim_end());
        send_over_tcp(&self.config.addr, payload.as_bytes(), self.timeout).await
    }

    /// Apply on/off changes and resend each touched row once
    async fn apply(&self, changes: &[(NativeAddress, bool)]) -> Result<()> {
        let mut parsed = Vec::with_capacity(changes.len());
        for (address, on) in changes {
            parsed.push((self.row_lamp(address)?, *on));
        }

        let mut active = self.active.lock().await;
        let mut touched = BTreeSet::new();
        for ((row, lamp), on) in parsed {
            let lamps = active.entry(row).or_default();
            if on {
                lamps.insert(lamp);
            } else {
                lamps.remove(&lamp);
            }
            touched.insert(row);
        }
        if touched.is_empty() {
            return Ok(());
        }

        let payload: String = touched.iter().map(|row| self.row_line(*row, active.get(row))).collect();
        active.retain(|_, lamps| !lamps.is_empty());
        self.send(payload).await
    }

    /// Rows with at least one lamp lit
    pub async fn active_rows(&self) -> BTreeMap<u16, BTreeSet<u16>> {
        self.active.lock().await.clone()
    }
}

#[async_trait]
impl LedDriver for SocketRowLampDriver {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::SocketRowLamp
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.config.addr)
    }

    fn address_of(&self, slot_name: &str) -> Result<NativeAddress> {
        let (row, lamp) = parse_label(slot_name)?;
        if lamp == 0 || lamp > self.config.lamps_per_row {
            return Err(Error::InvalidAddress {
                address: slot_name.to_string(),
                reason: format!("lamp outside 1..={}", self.config.lamps_per_row),
            });
        }
        Ok(NativeAddress::RowLamp { row, lamp })
    }

    async fn led_on(&self, address: NativeAddress, _color: Color) -> Result<()> {
        self.apply(&[(address, true)]).await
    }

    async fn led_off(&self, address: NativeAddress) -> Result<()> {
        self.apply(&[(address, false)]).await
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn batch_on(&self, lamps: &[(NativeAddress, Color)]) -> Result<()> {
        let changes: Vec<_> = lamps.iter().map(|(address, _)| (address.clone(), true)).collect();
        self.apply(&changes).await
    }

    async fn batch_off(&self, addresses: &[NativeAddress], working_light: bool) -> Result<()> {
        let changes: Vec<_> = addresses.iter().map(|address| (address.clone(), false)).collect();
        self.apply(&changes).await?;
        if working_light {
            self.send("LIGHTHOUSE A off\nLIGHTHOUSE B off\n".to_string()).await?;
        }
        Ok(())
    }

    async fn reset(&self, working_light: bool) -> Result<()> {
        let mut active = self.active.lock().await;
        active.clear();

        let mut payload = String::from("RESET\n");
        if working_light {
            payload.push_str("LIGHTHOUSE A off\nLIGHTHOUSE B off\n");
        }
        self.send(payload).await
    }

    fn supports_working_light(&self) -> bool {
        true
    }

    async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        self.send(format!("LIGHTHOUSE {} {}\n", side, color)).await
    }

    async fn working_light_off(&self, side: Side) -> Result<()> {
        self.send(format!("LIGHTHOUSE {} off\n", side)).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(probe_tcp(&self.config.addr, self.timeout).await)
    }
}
