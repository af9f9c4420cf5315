//! Store and Collect Workflows
//!
//! Every operation mutates the inventory first and then fires LED commands
//! in the background. Hardware failures are logged and never fail the
//! operation. Each public operation returns an [`Outcome`]: a success flag,
//! a human readable message on failure and the operation's payload.

pub mod collect;
pub mod store;

pub use collect::*;
pub use store::*;

use crate::dispatch::{Shelf, ShelfRegistry};
use crate::domain::led::Color;
use crate::domain::model::{Carrier, LedState, SlotRef, Storage, StorageSlot};
use crate::domain::ports::{CarrierFilter, InventoryStoreRef, SlotSelector};
use crate::error::{Error, Result};
use crate::topology::SlotTopology;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Confirmation flash color
pub const CONFIRM_COLOR: Color = Color::Green;

/// Rejection flash color
pub const REJECT_COLOR: Color = Color::Red;

// =============================================================================
// Configuration
// =============================================================================

/// Workflow tuning
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// How long confirm/reject flashes stay lit
    pub flash: Duration,
    /// Color of nominated and candidate slots
    pub nominate_color: Color,
    /// Color of slots awaiting collection
    pub collect_color: Color,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            flash: Duration::from_millis(2000),
            nominate_color: Color::Yellow,
            collect_color: Color::Blue,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of a workflow operation as reported to callers
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error category on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            error: None,
            data: Some(data),
        }
    }

    pub fn fail(error: &Error) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            error: Some(error.kind()),
            data: None,
        }
    }

    /// Convert an operation result, logging failures
    pub fn from_result(operation: &str, result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) if e.is_device_error() => {
                warn!(error = e.kind(), "{} failed: {}", operation, e);
                Self::fail(&e)
            }
            Err(e) => {
                info!(error = e.kind(), "{} rejected: {}", operation, e);
                Self::fail(&e)
            }
        }
    }
}

// =============================================================================
// Shared Payloads
// =============================================================================

/// One carrier waiting for collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub carrier: String,
    pub storage: String,
    /// Scannable code of the carrier's slot
    pub slot: String,
}

/// A free logical slot
#[derive(Debug, Clone, Serialize)]
pub struct FreeSlot {
    pub name: String,
    pub code: String,
    pub closure: Vec<String>,
    pub diameter: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreeSlots {
    pub storage: String,
    pub slots: Vec<FreeSlot>,
}

/// A logical slot after a merge
#[derive(Debug, Clone, Serialize)]
pub struct MergedSlot {
    pub storage: String,
    pub slot: String,
    pub closure: Vec<String>,
    pub codes: Vec<String>,
    pub diameter: u32,
    pub width: u32,
}

// =============================================================================
// Workflows
// =============================================================================

/// Entry point for every store, collect and slot operation
pub struct Workflows {
    pub(crate) store: InventoryStoreRef,
    pub(crate) topology: SlotTopology,
    pub(crate) shelves: Arc<ShelfRegistry>,
    pub(crate) config: WorkflowConfig,
}

impl Workflows {
    pub fn new(store: InventoryStoreRef, shelves: Arc<ShelfRegistry>, config: WorkflowConfig) -> Self {
        Self {
            topology: SlotTopology::new(store.clone()),
            store,
            shelves,
            config,
        }
    }

    pub fn topology(&self) -> &SlotTopology {
        &self.topology
    }

    pub fn shelves(&self) -> &Arc<ShelfRegistry> {
        &self.shelves
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Slot operations
    // -------------------------------------------------------------------------

    /// Free logical slots of a storage fitting the given dimensions
    pub async fn free_slots(&self, storage: &str, diameter: u32, width: u32) -> Outcome<FreeSlots> {
        let result: Result<FreeSlots> = async {
            self.storage(storage).await?;
            let slots = self.topology.free_slots(storage, diameter, width).await?;
            Ok(FreeSlots {
                storage: storage.to_string(),
                slots: slots
                    .into_iter()
                    .map(|slot| FreeSlot {
                        closure: slot.closure().into_iter().collect(),
                        code: slot.qr_value,
                        name: slot.name,
                        diameter: slot.diameter,
                        width: slot.width,
                    })
                    .collect(),
            })
        }
        .await;
        Outcome::from_result("free_slots", result)
    }

    /// Combine slots of one storage into a single logical slot
    pub async fn merge_slots(&self, storage: &str, primary: &str, others: &[String]) -> Outcome<MergedSlot> {
        let result: Result<MergedSlot> = async {
            let primary = SlotRef::new(storage, primary);
            let others: Vec<SlotRef> = others.iter().map(|name| SlotRef::new(storage, name)).collect();
            let merged = self.topology.merge(&primary, &others).await?;
            Ok(MergedSlot {
                storage: merged.storage.clone(),
                slot: merged.name.clone(),
                closure: merged.closure().into_iter().collect(),
                codes: merged.codes().into_iter().collect(),
                diameter: merged.diameter,
                width: merged.width,
            })
        }
        .await;
        Outcome::from_result("merge_slots", result)
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub(crate) async fn storage(&self, name: &str) -> Result<Storage> {
        self.store
            .get_storage(name)
            .await?
            .ok_or_else(|| Error::not_found("Storage", name))
    }

    pub(crate) async fn carrier(&self, name: &str) -> Result<Carrier> {
        self.store
            .get_carrier(name)
            .await?
            .ok_or_else(|| Error::not_found("Carrier", name))
    }

    /// Scannable code of a slot, falling back to its name
    pub(crate) async fn slot_code(&self, slot: &SlotRef) -> Result<String> {
        Ok(self
            .store
            .get_slot(&slot.storage, &slot.name)
            .await?
            .map(|s| s.qr_value)
            .unwrap_or_else(|| slot.name.clone()))
    }

    // -------------------------------------------------------------------------
    // LED side effects
    // -------------------------------------------------------------------------

    /// Shelf of a storage; LED work is skipped when none can be built
    pub(crate) async fn shelf(&self, storage: &str) -> Option<Arc<Shelf>> {
        let storage = match self.store.get_storage(storage).await {
            Ok(Some(storage)) => storage,
            Ok(None) => {
                warn!("No storage {}, skipping LEDs", storage);
                return None;
            }
            Err(e) => {
                warn!("Cannot load storage {}: {}, skipping LEDs", storage, e);
                return None;
            }
        };
        match self.shelves.shelf_for(&storage) {
            Ok(shelf) => Some(shelf),
            Err(e) => {
                warn!(error = e.kind(), "No shelf for {}: {}, skipping LEDs", storage.name, e);
                None
            }
        }
    }

    /// Physical names per storage over several logical slots
    fn by_storage(slots: &[StorageSlot]) -> IndexMap<String, Vec<String>> {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for slot in slots {
            let names = grouped.entry(slot.storage.clone()).or_default();
            for name in slot.closure() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        grouped
    }

    pub(crate) async fn light(&self, slots: &[StorageSlot], color: Color) {
        for (storage, names) in Self::by_storage(slots) {
            if let Some(shelf) = self.shelf(&storage).await {
                shelf.light(names, color);
            }
        }
    }

    pub(crate) async fn clear(&self, slots: &[StorageSlot]) {
        for (storage, names) in Self::by_storage(slots) {
            if let Some(shelf) = self.shelf(&storage).await {
                shelf.clear(names);
            }
        }
    }

    pub(crate) async fn flash(&self, slot: &StorageSlot, color: Color, restore: Option<Color>) {
        if let Some(shelf) = self.shelf(&slot.storage).await {
            shelf.flash(slot.closure().into_iter().collect(), color, self.config.flash, restore);
        }
    }

    /// Color a slot is lit with while it guides an operator, if any
    ///
    /// A stored carrier's slot is blue while the carrier is queued or offered
    /// for collection. An empty slot is yellow while nominated or offered.
    pub(crate) async fn guidance_color(&self, slot: &StorageSlot) -> Result<Option<Color>> {
        let selector = SlotSelector::new(&slot.storage, slot.closure());
        let stored = self
            .store
            .filter_carriers(&CarrierFilter::new().stored_at(selector))
            .await?;
        Ok(match stored.first() {
            Some(carrier) if carrier.collecting || slot.led_state == LedState::Confirming => {
                Some(self.config.collect_color)
            }
            Some(_) => None,
            None if slot.led_state != LedState::Off => Some(self.config.nominate_color),
            None => None,
        })
    }

    /// Red flash on a wrongly scanned slot, then back to its guidance color
    pub(crate) async fn reject_scan(&self, scanned: &StorageSlot) {
        let restore = match self.guidance_color(scanned).await {
            Ok(restore) => restore,
            Err(e) => {
                warn!("Cannot tell how {} was lit: {}", scanned.slot_ref(), e);
                None
            }
        };
        info!("Rejected scan of {}", scanned.slot_ref());
        self.flash(scanned, REJECT_COLOR, restore).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for workflow tests

    use super::*;
    use crate::config::{DeviceConfig, DriverOptions};
    use crate::dispatch::LedTaskRunner;
    use crate::drivers::recording::RecordingDriver;
    use crate::inventory::MemoryInventory;

    pub struct Rig {
        pub inventory: Arc<MemoryInventory>,
        pub driver: Arc<RecordingDriver>,
        pub workflows: Workflows,
    }

    impl Rig {
        pub async fn settle(&self) {
            self.workflows.shelves().runner().wait_idle().await;
        }
    }

    /// Storage S1 with slots 001..=012, all 7x12, behind a recording driver
    pub fn rig() -> Rig {
        let inventory = Arc::new(MemoryInventory::new());
        let storage = Storage::new("S1", DeviceConfig::Noop);
        inventory.insert_storage(storage.clone());
        for i in 1..=12 {
            inventory.insert_slot(StorageSlot::new("S1", format!("{:03}", i), 7, 12));
        }

        let shelves = Arc::new(ShelfRegistry::new(DriverOptions::default(), LedTaskRunner::new()));
        let driver = Arc::new(RecordingDriver::new());
        shelves.insert(&storage, driver.clone());

        let config = WorkflowConfig {
            flash: Duration::from_millis(5),
            ..Default::default()
        };
        let workflows = Workflows::new(inventory.clone(), shelves, config);
        Rig {
            inventory,
            driver,
            workflows,
        }
    }
}
