//! LED command vocabulary shared by every driver

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fixed LED palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
    White,
    Cyan,
    Magenta,
}

impl Color {
    pub const ALL: [Color; 7] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::White,
        Color::Cyan,
        Color::Magenta,
    ];

    /// RGB triple sent to controllers that take raw channels
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Color::Red => (255, 0, 0),
            Color::Green => (0, 255, 0),
            Color::Blue => (0, 0, 255),
            Color::Yellow => (255, 255, 0),
            Color::White => (255, 255, 255),
            Color::Cyan => (0, 255, 255),
            Color::Magenta => (255, 0, 255),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Yellow => "yellow",
            Color::White => "white",
            Color::Cyan => "cyan",
            Color::Magenta => "magenta",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Color::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| Error::InvalidColor(s.to_string()))
    }
}

/// Side of a rack carrying a working light (status tower)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Side::A),
            "B" | "b" => Ok(Side::B),
            other => Err(Error::Configuration(format!("unknown rack side: {}", other))),
        }
    }
}

/// A physical address in a driver's own addressing scheme
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeAddress {
    /// Lamp number on a network-batch controller
    Numeric(u32),
    /// Channel and strip position on a serial shelf
    Strip { channel: u8, position: u16 },
    /// Row and lamp on a socket row controller
    RowLamp { row: u16, lamp: u16 },
    /// Untranslated slot name, for controllers without addressing
    Named(String),
}

impl std::fmt::Display for NativeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeAddress::Numeric(n) => write!(f, "{}", n),
            NativeAddress::Strip { channel, position } => write!(f, "ch{}:{}", channel, position),
            NativeAddress::RowLamp { row, lamp } => write!(f, "row{}:{}", row, lamp),
            NativeAddress::Named(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        assert_eq!("red".parse::<Color>().unwrap(), Color::Red);
        assert_eq!(" Yellow ".parse::<Color>().unwrap(), Color::Yellow);
        assert!("purple".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_rgb() {
        assert_eq!(Color::Yellow.rgb(), (255, 255, 0));
        assert_eq!(Color::Blue.rgb(), (0, 0, 255));
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("a".parse::<Side>().unwrap(), Side::A);
        assert_eq!("B".parse::<Side>().unwrap(), Side::B);
        assert!("C".parse::<Side>().is_err());
    }
}
