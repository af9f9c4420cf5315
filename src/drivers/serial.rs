//! Serial Proxy Shelf Driver
//!
//! Single-shelf controller on a serial line. The serial port is owned by a
//! local proxy process; this driver writes 12-byte command frames to the
//! proxy over TCP. The controller has no batch command, so batches are
//! sent as sequential single frames.
//!
//! Frame layout:
//!
//! ```text
//! [STX][gateway][controller][command][channel][pos/100][pos%100][R][G][B][blink][0x00]
//! ```

use crate::config::{DeviceFamily, SerialProxyConfig, StripEntry};
use crate::domain::led::{Color, NativeAddress};
use crate::domain::ports::LedDriver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{probe_tcp, send_over_tcp};

/// Frame length in bytes
pub const FRAME_LEN: usize = 12;

/// Start-of-text marker opening every frame
pub const STX: u8 = 0x02;

/// Highest strip position expressible by the two address bytes
pub const MAX_POSITION: u16 = 999;

/// Slot number -> strip position wiring of the standard shelf. The strips
/// are not wired uniformly (connector gaps, a reversed strip, a skipped
/// dead pixel), so this is a table rather than a formula.
pub const DEFAULT_SLOT_TABLE: &[StripEntry] = &[
    StripEntry { slot: 1, channel: 1, position: 2 },
    StripEntry { slot: 2, channel: 1, position: 5 },
    StripEntry { slot: 3, channel: 1, position: 8 },
    StripEntry { slot: 4, channel: 1, position: 11 },
    StripEntry { slot: 5, channel: 1, position: 14 },
    StripEntry { slot: 6, channel: 1, position: 17 },
    StripEntry { slot: 7, channel: 1, position: 20 },
    StripEntry { slot: 8, channel: 1, position: 23 },
    StripEntry { slot: 9, channel: 1, position: 26 },
    StripEntry { slot: 10, channel: 1, position: 29 },
    StripEntry { slot: 11, channel: 1, position: 33 },
    StripEntry { slot: 12, channel: 1, position: 36 },
    StripEntry { slot: 13, channel: 2, position: 35 },
    StripEntry { slot: 14, channel: 2, position: 32 },
    StripEntry { slot: 15, channel: 2, position: 29 },
    StripEntry { slot: 16, channel: 2, position: 26 },
    StripEntry { slot: 17, channel: 2, position: 23 },
    StripEntry { slot: 18, channel: 2, position: 20 },
    StripEntry { slot: 19, channel: 2, position: 17 },
    StripEntry { slot: 20, channel: 2, position: 14 },
    StripEntry { slot: 21, channel: 2, position: 11 },
    StripEntry { slot: 22, channel: 2, position: 8 },
    StripEntry { slot: 23, channel: 2, position: 5 },
    StripEntry { slot: 24, channel: 2, position: 2 },
    StripEntry { slot: 25, channel: 3, position: 1 },
    StripEntry { slot: 26, channel: 3, position: 4 },
    StripEntry { slot: 27, channel: 3, position: 7 },
    StripEntry { slot: 28, channel: 3, position: 10 },
    StripEntry { slot: 29, channel: 3, position: 13 },
    StripEntry { slot: 30, channel: 3, position: 16 },
    StripEntry { slot: 31, channel: 3, position: 20 },
    StripEntry { slot: 32, channel: 3, position: 23 },
    StripEntry { slot: 33, channel: 3, position: 26 },
    StripEntry { slot: 34, channel: 3, position: 29 },
    StripEntry { slot: 35, channel: 3, position: 32 },
    StripEntry { slot: 36, channel: 3, position: 35 },
    StripEntry { slot: 37, channel: 4, position: 4 },
    StripEntry { slot: 38, channel: 4, position: 9 },
    StripEntry { slot: 39, channel: 4, position: 14 },
    StripEntry { slot: 40, channel: 4, position: 19 },
    StripEntry { slot: 41, channel: 4, position: 24 },
    StripEntry { slot: 42, channel: 4, position: 29 },
    StripEntry { slot: 43, channel: 4, position: 34 },
    StripEntry { slot: 44, channel: 4, position: 39 },
];

// =============================================================================
// Command Frames
// =============================================================================

/// Command codes understood by the shelf controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SerialCommand {
    LedOn = 0x01,
    LedOff = 0x02,
    ChannelOff = 0x03,
    AllOff = 0x04,
}

/// One command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFrame {
    pub gateway: u8,
    pub controller: u8,
    pub command: SerialCommand,
    pub channel: u8,
    pub position: u16,
    pub rgb: (u8, u8, u8),
    pub blink: bool,
}

impl SerialFrame {
    /// Encode into the 12-byte wire form
    pub fn encode(&self) -> Result<Bytes> {
        if self.position > MAX_POSITION {
            return Err(Error::InvalidAddress {
                address: self.position.to_string(),
                reason: format!("strip position above {}", MAX_POSITION),
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        buf.put_u8(STX);
        buf.put_u8(self.gateway);
        buf.put_u8(self.controller);
        buf.put_u8(self.command as u8);
        buf.put_u8(self.channel);
        buf.put_u8((self.position / 100) as u8);
        buf.put_u8((self.position % 100) as u8);
        buf.put_u8(self.rgb.0);
        buf.put_u8(self.rgb.1);
        buf.put_u8(self.rgb.2);
        buf.put_u8(u8::from(self.blink));
        buf.put_u8(0x00);
        Ok(buf.freeze())
    }
}

// =============================================================================
// Serial Proxy Driver
// =============================================================================

/// Driver for the serial shelf behind a local proxy
pub struct SerialProxyDriver {
    config: SerialProxyConfig,
    table: IndexMap<u16, (u8, u16)>,
    timeout: Duration,
    /// One frame on the line at a time
    line: Mutex<()>,
}

impl SerialProxyDriver {
    pub fn new(config: SerialProxyConfig, timeout: Duration) -> Result<Self> {
        let entries = config.slot_table.as_deref().unwrap_or(DEFAULT_SLOT_TABLE);
        let mut table = IndexMap::with_capacity(entries.len());
        for entry in entries {
            if entry.position > MAX_POSITION {
                return Err(Error::Configuration(format!(
                    "slot {} wired to position {} beyond {}",
                    entry.slot, entry.position, MAX_POSITION
                )));
            }
            if table.insert(entry.slot, (entry.channel, entry.position)).is_some() {
                return Err(Error::Configuration(format!(
                    "slot {} appears twice in the wiring table",
                    entry.slot
                )));
            }
        }

        Ok(Self {
            config,
            table,
            timeout,
            line: Mutex::new(()),
        })
    }

    fn frame(&self, command: SerialCommand, channel: u8, position: u16, color: Option<Color>) -> SerialFrame {
        SerialFrame {
            gateway: self.config.gateway,
            controller: self.config.controller,
            command,
            channel,
            position,
            rgb: color.map(|c| c.rgb()).unwrap_or((0, 0, 0)),
            blink: color.is_some() && self.config.blink,
        }
    }

    async fn send(&self, frame: SerialFrame) -> Result<()> {
        let bytes = frame.encode()?;
        let _line = self.line.lock().await;
        debug!("{} <- {:02x?}", self.config.proxy_addr, bytes.as_ref());
        send_over_tcp(&self.config.proxy_addr, &bytes, self.timeout).await
    }

    fn strip(address: &NativeAddress) -> Result<(u8, u16)> {
        match address {
            NativeAddress::Strip { channel, position } => Ok((*channel, *position)),
            other => Err(Error::InvalidAddress {
                address: other.to_string(),
                reason: "serial shelf takes channel/position addresses".into(),
            }),
        }
    }

    /// Turn a whole channel off
    pub async fn channel_off(&self, channel: u8) -> Result<()> {
        self.send(self.frame(SerialCommand::ChannelOff, channel, 0, None)).await
    }
}

#[async_trait]
impl LedDriver for SerialProxyDriver {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::SerialProxy
    }

    fn endpoint(&self) -> String {
        format!(
            "serial://{}/gw{}/c{}",
            self.config.proxy_addr, self.config.gateway, self.config.controller
        )
    }

    fn address_of(&self, slot_name: &str) -> Result<NativeAddress> {
        let slot: u16 = slot_name.trim().parse().map_err(|_| Error::InvalidAddress {
            address: slot_name.to_string(),
            reason: "not a slot number".into(),
        })?;
        let (channel, position) = self.table.get(&slot).copied().ok_or_else(|| Error::InvalidAddress {
            address: slot_name.to_string(),
            reason: "slot not in wiring table".into(),
        })?;
        Ok(NativeAddress::Strip { channel, position })
    }

    async fn led_on(&self, address: NativeAddress, color: Color) -> Result<()> {
        let (channel, position) = Self::strip(&address)?;
        self.send(self.frame(SerialCommand::LedOn, channel, position, Some(color))).await
    }

    async fn led_off(&self, address: NativeAddress) -> Result<()> {
        let (channel, position) = Self::strip(&address)?;
        self.send(self.frame(SerialCommand::LedOff, channel, position, None)).await
    }

    async fn reset(&self, _working_light: bool) -> Result<()> {
        self.send(self.frame(SerialCommand::AllOff, 0, 0, None)).await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(probe_tcp(&self.config.proxy_addr, self.timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Proxy stand-in forwarding every received frame
    async fn fake_proxy() -> (String, mpsc::UnboundedReceiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut frame = Vec::new();
                let _ = socket.read_to_end(&mut frame).await;
                let _ = tx.send(frame);
            }
        });
        (addr, rx)
    }

    fn driver(addr: &str) -> SerialProxyDriver {
        let config = SerialProxyConfig {
            proxy_addr: addr.to_string(),
            gateway: 3,
            controller: 7,
            ..Default::default()
        };
        SerialProxyDriver::new(config, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_led_on_frame_layout() {
        let frame = SerialFrame {
            gateway: 1,
            controller: 2,
            command: SerialCommand::LedOn,
            channel: 4,
            position: 137,
            rgb: Color::Yellow.rgb(),
            blink: true,
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), FRAME_LEN);
        assert_eq!(
            bytes.as_ref(),
            &[0x02, 1, 2, 0x01, 4, 1, 37, 255, 255, 0, 1, 0x00]
        );
    }

    #[test]
    fn test_position_beyond_three_digits_rejected() {
        let frame = SerialFrame {
            gateway: 1,
            controller: 1,
            command: SerialCommand::LedOff,
            channel: 1,
            position: 1000,
            rgb: (0, 0, 0),
            blink: false,
        };
        assert!(matches!(frame.encode(), Err(Error::InvalidAddress { .. })));
    }

    #[test]
    fn test_wiring_table_lookup() {
        let driver = driver("127.0.0.1:1");
        assert_eq!(
            driver.address_of("013").unwrap(),
            NativeAddress::Strip { channel: 2, position: 35 }
        );
        // dead pixel at 19 on channel 3
        assert_eq!(
            driver.address_of("31").unwrap(),
            NativeAddress::Strip { channel: 3, position: 20 }
        );
        assert!(driver.address_of("45").is_err());
        assert!(driver.address_of("A1-01").is_err());
    }

    #[test]
    fn test_duplicate_wiring_rejected() {
        let config = SerialProxyConfig {
            slot_table: Some(vec![
                StripEntry { slot: 1, channel: 1, position: 1 },
                StripEntry { slot: 1, channel: 1, position: 4 },
            ]),
            ..Default::default()
        };
        assert!(matches!(
            SerialProxyDriver::new(config, Duration::from_secs(1)),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_emulated_with_single_frames() {
        let (addr, mut rx) = fake_proxy().await;
        let driver = driver(&addr);

        let a = driver.address_of("1").unwrap();
        let b = driver.address_of("2").unwrap();
        driver.batch_on(&[(a, Color::Blue), (b, Color::Blue)]).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, vec![0x02, 3, 7, 0x01, 1, 0, 2, 0, 0, 255, 0, 0]);
        assert_eq!(second, vec![0x02, 3, 7, 0x01, 1, 0, 5, 0, 0, 255, 0, 0]);
    }

    #[tokio::test]
    async fn test_reset_and_channel_off_frames() {
        let (addr, mut rx) = fake_proxy().await;
        let driver = driver(&addr);

        driver.reset(true).await.unwrap();
        assert_eq!(rx.recv().await.unwrap()[3], SerialCommand::AllOff as u8);

        driver.channel_off(2).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame[3], SerialCommand::ChannelOff as u8);
        assert_eq!(frame[4], 2);
    }
}
