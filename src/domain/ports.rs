//! Domain Ports - Core trait definitions for the shelf dispatcher
//!
//! These traits define the boundaries between the workflows and external
//! systems: the inventory data store and the LED controllers.

use super::led::{Color, NativeAddress, Side};
use super::model::{Article, Carrier, Job, SlotRef, Storage, StorageSlot};
use crate::config::DeviceFamily;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Carrier Queries
// =============================================================================

/// A set of physical slot names within one storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSelector {
    pub storage: String,
    pub names: BTreeSet<String>,
}

impl SlotSelector {
    pub fn new(storage: impl Into<String>, names: BTreeSet<String>) -> Self {
        Self {
            storage: storage.into(),
            names,
        }
    }

    pub fn contains(&self, slot: &SlotRef) -> bool {
        slot.storage == self.storage && self.names.contains(&slot.name)
    }
}

/// Filter for carrier queries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct CarrierFilter {
    pub collecting: Option<bool>,
    pub stored: Option<bool>,
    pub archived: Option<bool>,
    pub article: Option<String>,
    pub names: Option<BTreeSet<String>>,
    /// Carriers whose storage slot is in the selector
    pub stored_at: Option<SlotSelector>,
    /// Carriers nominated for a slot in the selector
    pub nominated_at: Option<SlotSelector>,
}

impl CarrierFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collecting(mut self, collecting: bool) -> Self {
        self.collecting = Some(collecting);
        self
    }

    pub fn stored(mut self, stored: bool) -> Self {
        self.stored = Some(stored);
        self
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn article(mut self, article: impl Into<String>) -> Self {
        self.article = Some(article.into());
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn stored_at(mut self, selector: SlotSelector) -> Self {
        self.stored_at = Some(selector);
        self
    }

    pub fn nominated_at(mut self, selector: SlotSelector) -> Self {
        self.nominated_at = Some(selector);
        self
    }

    /// Evaluate the filter against one carrier
    pub fn matches(&self, carrier: &Carrier) -> bool {
        if let Some(collecting) = self.collecting {
            if carrier.collecting != collecting {
                return false;
            }
        }
        if let Some(stored) = self.stored {
            if carrier.is_stored() != stored {
                return false;
            }
        }
        if let Some(archived) = self.archived {
            if carrier.archived != archived {
                return false;
            }
        }
        if let Some(article) = &self.article {
            if carrier.article.as_deref() != Some(article.as_str()) {
                return false;
            }
        }
        if let Some(names) = &self.names {
            if !names.contains(&carrier.name) {
                return false;
            }
        }
        if let Some(selector) = &self.stored_at {
            match &carrier.storage_slot {
                Some(slot) if selector.contains(slot) => {}
                _ => return false,
            }
        }
        if let Some(selector) = &self.nominated_at {
            match &carrier.nominated_for_slot {
                Some(slot) if selector.contains(slot) => {}
                _ => return false,
            }
        }
        true
    }
}

// =============================================================================
// Inventory Store Port
// =============================================================================

/// Port for the external data store holding slots, carriers and jobs
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Get a storage by name
    async fn get_storage(&self, name: &str) -> Result<Option<Storage>>;

    /// List all storages
    async fn list_storages(&self) -> Result<Vec<Storage>>;

    /// Get a carrier by name
    async fn get_carrier(&self, name: &str) -> Result<Option<Carrier>>;

    /// Carriers matching a filter, in store order
    async fn filter_carriers(&self, filter: &CarrierFilter) -> Result<Vec<Carrier>>;

    /// Persist a carrier
    async fn update_carrier(&self, carrier: &Carrier) -> Result<()>;

    /// Persist several carriers at once; either all are written or none
    async fn update_carriers(&self, carriers: &[Carrier]) -> Result<()>;

    /// Get a slot by storage and physical name
    async fn get_slot(&self, storage: &str, name: &str) -> Result<Option<StorageSlot>>;

    /// All slots of a storage ordered by name
    async fn list_slots(&self, storage: &str) -> Result<Vec<StorageSlot>>;

    /// Slot whose primary or additional code equals `code`
    async fn find_slot_by_code(&self, code: &str, storage: Option<&str>) -> Result<Option<StorageSlot>>;

    /// Which of `names` in `storage` currently hold a carrier, in one query
    async fn occupied_names(&self, storage: &str, names: &BTreeSet<String>) -> Result<BTreeSet<String>>;

    /// Persist several slots at once; either all are written or none
    async fn update_slots(&self, slots: &[StorageSlot]) -> Result<()>;

    /// Get an article by name
    async fn get_article(&self, name: &str) -> Result<Option<Article>>;

    /// Get a job by name
    async fn get_job(&self, name: &str) -> Result<Option<Job>>;
}

// =============================================================================
// LED Driver Port
// =============================================================================

/// Capability contract every LED controller family implements
///
/// Addresses arrive already translated by [`LedDriver::address_of`]; the
/// dispatcher never hands a driver another family's address.
#[async_trait]
pub trait LedDriver: Send + Sync {
    /// Controller family
    fn family(&self) -> DeviceFamily;

    /// Human readable endpoint, used in logs and errors
    fn endpoint(&self) -> String;

    /// Translate a physical slot name into this driver's addressing
    fn address_of(&self, slot_name: &str) -> Result<NativeAddress>;

    /// Turn one address on
    async fn led_on(&self, address: NativeAddress, color: Color) -> Result<()>;

    /// Turn one address off
    async fn led_off(&self, address: NativeAddress) -> Result<()>;

    /// Whether batch calls map to a single device request
    fn supports_batch(&self) -> bool {
        false
    }

    /// Turn many addresses on; loops single commands unless overridden
    async fn batch_on(&self, lamps: &[(NativeAddress, Color)]) -> Result<()> {
        for (address, color) in lamps {
            self.led_on(address.clone(), *color).await?;
        }
        Ok(())
    }

    /// Turn many addresses off, optionally the working lights too
    async fn batch_off(&self, addresses: &[NativeAddress], working_light: bool) -> Result<()> {
        for address in addresses {
            self.led_off(address.clone()).await?;
        }
        if working_light && self.supports_working_light() {
            self.working_light_off(Side::A).await?;
            self.working_light_off(Side::B).await?;
        }
        Ok(())
    }

    /// Turn everything off
    async fn reset(&self, working_light: bool) -> Result<()>;

    /// Whether the rack has a status tower
    fn supports_working_light(&self) -> bool {
        false
    }

    /// Light one side's working light
    async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        debug!("{} has no working light ({} -> {})", self.endpoint(), side, color);
        Ok(())
    }

    /// Turn one side's working light off
    async fn working_light_off(&self, side: Side) -> Result<()> {
        debug!("{} has no working light ({} -> off)", self.endpoint(), side);
        Ok(())
    }

    /// Check the controller is reachable
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type InventoryStoreRef = Arc<dyn InventoryStore>;
pub type LedDriverRef = Arc<dyn LedDriver>;

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, slot: &str) -> Carrier {
        Carrier::new(name, 7, 12).stored_at(SlotRef::new("S1", slot))
    }

    #[test]
    fn test_filter_matches_everything_by_default() {
        assert!(CarrierFilter::new().matches(&Carrier::new("C1", 7, 8)));
    }

    #[test]
    fn test_filter_stored_at_selector() {
        let selector = SlotSelector::new("S1", ["002".to_string(), "003".to_string()].into());
        let filter = CarrierFilter::new().stored_at(selector);

        assert!(filter.matches(&stored("C1", "003")));
        assert!(!filter.matches(&stored("C2", "004")));
        assert!(!filter.matches(&Carrier::new("C3", 7, 8)));
    }

    #[test]
    fn test_filter_collecting_and_article() {
        let mut carrier = stored("C1", "001").with_article("R-10K");
        carrier.collecting = true;

        assert!(CarrierFilter::new().collecting(true).article("R-10K").matches(&carrier));
        assert!(!CarrierFilter::new().collecting(false).matches(&carrier));
        assert!(!CarrierFilter::new().article("C-100N").matches(&carrier));
    }
}
