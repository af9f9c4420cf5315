//! Domain Model - Inventory entities the core reads and mutates
//!
//! These mirror the records held by the external data store. Only the
//! attributes the slot topology and the workflows need are modelled.

use crate::config::DeviceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Storage
// =============================================================================

/// A physical rack with exactly one LED controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    /// Unique storage name
    pub name: String,
    /// Controller family and its connection parameters
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Storage {
    pub fn new(name: impl Into<String>, device: DeviceConfig) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }
}

// =============================================================================
// Storage Slot
// =============================================================================

/// Reference to a slot by storage and physical name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
    pub storage: String,
    pub name: String,
}

impl SlotRef {
    pub fn new(storage: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.storage, self.name)
    }
}

/// LED state of a slot as seen by the workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    #[default]
    Off,
    /// Reserved for one carrier, awaiting its scan
    Nominated,
    /// Lit as one of several candidates, awaiting a choice
    Confirming,
}

impl std::fmt::Display for LedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedState::Off => write!(f, "off"),
            LedState::Nominated => write!(f, "nominated"),
            LedState::Confirming => write!(f, "confirming"),
        }
    }
}

/// A physical, LED addressable position within a storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    /// Owning storage name
    pub storage: String,
    /// Physical address / lamp id, unique within the storage
    pub name: String,
    /// Primary scannable code
    pub qr_value: String,
    /// Codes acquired through merges
    #[serde(default)]
    pub qr_codes: BTreeSet<String>,
    /// Other physical slots this logical slot also controls
    #[serde(default)]
    pub related_names: BTreeSet<String>,
    #[serde(default)]
    pub led_state: LedState,
    /// Carrier a lit candidate was offered to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offered_to: Option<String>,
    #[serde(default)]
    pub diameter: u32,
    #[serde(default)]
    pub width: u32,
}

impl StorageSlot {
    /// Create a stand-alone slot whose code equals its name
    pub fn new(storage: impl Into<String>, name: impl Into<String>, diameter: u32, width: u32) -> Self {
        let name = name.into();
        Self {
            storage: storage.into(),
            qr_value: name.clone(),
            name,
            qr_codes: BTreeSet::new(),
            related_names: BTreeSet::new(),
            led_state: LedState::Off,
            offered_to: None,
            diameter,
            width,
        }
    }

    pub fn slot_ref(&self) -> SlotRef {
        SlotRef::new(&self.storage, &self.name)
    }

    /// Physical names this logical slot controls, itself included
    pub fn closure(&self) -> BTreeSet<String> {
        let mut names = self.related_names.clone();
        names.insert(self.name.clone());
        names
    }

    /// Every code that resolves to this slot
    pub fn codes(&self) -> BTreeSet<String> {
        let mut codes = self.qr_codes.clone();
        codes.insert(self.qr_value.clone());
        codes
    }

    pub fn answers_to(&self, code: &str) -> bool {
        self.qr_value == code || self.qr_codes.contains(code)
    }

    pub fn is_combined(&self) -> bool {
        !self.related_names.is_empty()
    }

    /// Whether a carrier of the given dimensions fits
    pub fn fits(&self, diameter: u32, width: u32) -> bool {
        self.diameter >= diameter && self.width >= width
    }
}

// =============================================================================
// Carrier
// =============================================================================

/// A reel, tray or bag of components; the unit that occupies a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub diameter: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub storage_slot: Option<SlotRef>,
    #[serde(default)]
    pub nominated_for_slot: Option<SlotRef>,
    #[serde(default)]
    pub machine_slot: Option<String>,
    #[serde(default)]
    pub collecting: bool,
    /// When the carrier joined the collect queue
    #[serde(default)]
    pub collecting_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub delivered: bool,
}

impl Carrier {
    /// Create a delivered, unstored carrier
    pub fn new(name: impl Into<String>, diameter: u32, width: u32) -> Self {
        Self {
            name: name.into(),
            article: None,
            diameter,
            width,
            storage_slot: None,
            nominated_for_slot: None,
            machine_slot: None,
            collecting: false,
            collecting_since: None,
            archived: false,
            delivered: true,
        }
    }

    pub fn with_article(mut self, article: impl Into<String>) -> Self {
        self.article = Some(article.into());
        self
    }

    pub fn stored_at(mut self, slot: SlotRef) -> Self {
        self.storage_slot = Some(slot);
        self
    }

    pub fn is_stored(&self) -> bool {
        self.storage_slot.is_some()
    }
}

// =============================================================================
// Article & Job
// =============================================================================

/// A component type; carriers hold one article each
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Production job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Created,
    Prepared,
    Finished,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Prepared => write!(f, "prepared"),
            JobStatus::Finished => write!(f, "finished"),
        }
    }
}

/// A production job and the carriers linked to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub carriers: Vec<String>,
}
