//! In-Memory Inventory Store
//!
//! Lock-guarded maps standing in for the external data store. Used by the
//! command line tool (loaded from and written back to a snapshot file) and by
//! tests.

use super::snapshot::InventorySnapshot;
use crate::domain::model::{Article, Carrier, Job, Storage, StorageSlot};
use crate::domain::ports::{CarrierFilter, InventoryStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

type SlotKey = (String, String);

#[derive(Debug, Default)]
struct InventoryState {
    storages: IndexMap<String, Storage>,
    /// Ordered by (storage, name)
    slots: BTreeMap<SlotKey, StorageSlot>,
    /// Insertion order is the store's natural query order
    carriers: IndexMap<String, Carrier>,
    articles: IndexMap<String, Article>,
    jobs: IndexMap<String, Job>,
}

/// In-memory adapter for [`InventoryStore`]
#[derive(Debug, Default)]
pub struct MemoryInventory {
    state: RwLock<InventoryState>,
    /// Number of write operations served
    writes: AtomicU64,
}

impl MemoryInventory {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a snapshot's records
    pub fn from_snapshot(snapshot: InventorySnapshot) -> Self {
        let store = Self::new();
        for storage in snapshot.storages {
            store.insert_storage(storage);
        }
        for slot in snapshot.slots {
            store.insert_slot(slot);
        }
        for carrier in snapshot.carriers {
            store.insert_carrier(carrier);
        }
        for article in snapshot.articles {
            store.insert_article(article);
        }
        for job in snapshot.jobs {
            store.insert_job(job);
        }
        store
    }

    /// Export every record
    pub fn snapshot(&self) -> InventorySnapshot {
        let state = self.state.read();
        InventorySnapshot {
            storages: state.storages.values().cloned().collect(),
            slots: state.slots.values().cloned().collect(),
            carriers: state.carriers.values().cloned().collect(),
            articles: state.articles.values().cloned().collect(),
            jobs: state.jobs.values().cloned().collect(),
        }
    }

    pub fn insert_storage(&self, storage: Storage) {
        self.state.write().storages.insert(storage.name.clone(), storage);
    }

    pub fn insert_slot(&self, slot: StorageSlot) {
        let key = (slot.storage.clone(), slot.name.clone());
        self.state.write().slots.insert(key, slot);
    }

    pub fn insert_carrier(&self, carrier: Carrier) {
        self.state.write().carriers.insert(carrier.name.clone(), carrier);
    }

    pub fn insert_article(&self, article: Article) {
        self.state.write().articles.insert(article.name.clone(), article);
    }

    pub fn insert_job(&self, job: Job) {
        self.state.write().jobs.insert(job.name.clone(), job);
    }

    /// Number of write operations served so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn get_storage(&self, name: &str) -> Result<Option<Storage>> {
        Ok(self.state.read().storages.get(name).cloned())
    }

    async fn list_storages(&self) -> Result<Vec<Storage>> {
        Ok(self.state.read().storages.values().cloned().collect())
    }

    async fn get_carrier(&self, name: &str) -> Result<Option<Carrier>> {
        Ok(self.state.read().carriers.get(name).cloned())
    }

    async fn filter_carriers(&self, filter: &CarrierFilter) -> Result<Vec<Carrier>> {
        let state = self.state.read();
        Ok(state
            .carriers
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn update_carrier(&self, carrier: &Carrier) -> Result<()> {
        let mut state = self.state.write();
        let entry = state
            .carriers
            .get_mut(&carrier.name)
            .ok_or_else(|| Error::not_found("Carrier", &carrier.name))?;
        *entry = carrier.clone();
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Updated carrier {}", carrier.name);
        Ok(())
    }

    async fn update_carriers(&self, carriers: &[Carrier]) -> Result<()> {
        let mut state = self.state.write();

        if let Some(missing) = carriers.iter().find(|c| !state.carriers.contains_key(&c.name)) {
            return Err(Error::not_found("Carrier", &missing.name));
        }

        for carrier in carriers {
            state.carriers.insert(carrier.name.clone(), carrier.clone());
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Updated {} carriers", carriers.len());
        Ok(())
    }

    async fn get_slot(&self, storage: &str, name: &str) -> Result<Option<StorageSlot>> {
        let key = (storage.to_string(), name.to_string());
        Ok(self.state.read().slots.get(&key).cloned())
    }

    async fn list_slots(&self, storage: &str) -> Result<Vec<StorageSlot>> {
        let state = self.state.read();
        Ok(state
            .slots
            .values()
            .filter(|s| s.storage == storage)
            .cloned()
            .collect())
    }

    async fn find_slot_by_code(&self, code: &str, storage: Option<&str>) -> Result<Option<StorageSlot>> {
        let state = self.state.read();
        Ok(state
            .slots
            .values()
            .filter(|s| storage.map_or(true, |name| s.storage == name))
            .find(|s| s.answers_to(code))
            .cloned())
    }

    async fn occupied_names(&self, storage: &str, names: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let state = self.state.read();
        Ok(state
            .carriers
            .values()
            .filter_map(|c| c.storage_slot.as_ref())
            .filter(|slot| slot.storage == storage && names.contains(&slot.name))
            .map(|slot| slot.name.clone())
            .collect())
    }

    async fn update_slots(&self, slots: &[StorageSlot]) -> Result<()> {
        let mut state = self.state.write();

        if let Some(missing) = slots
            .iter()
            .find(|s| !state.slots.contains_key(&(s.storage.clone(), s.name.clone())))
        {
            return Err(Error::not_found("StorageSlot", missing.slot_ref().to_string()));
        }

        for slot in slots {
            state
                .slots
                .insert((slot.storage.clone(), slot.name.clone()), slot.clone());
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Updated {} slots", slots.len());
        Ok(())
    }

    async fn get_article(&self, name: &str) -> Result<Option<Article>> {
        Ok(self.state.read().articles.get(name).cloned())
    }

    async fn get_job(&self, name: &str) -> Result<Option<Job>> {
        Ok(self.state.read().jobs.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SlotRef;

    fn seeded() -> MemoryInventory {
        let store = MemoryInventory::new();
        for name in ["003", "001", "002"] {
            store.insert_slot(StorageSlot::new("S1", name, 7, 12));
        }
        store.insert_slot(StorageSlot::new("S2", "001", 7, 12));
        store.insert_carrier(Carrier::new("C1", 7, 12).stored_at(SlotRef::new("S1", "002")));
        store.insert_carrier(Carrier::new("C2", 7, 12));
        store
    }

    #[tokio::test]
    async fn test_list_slots_in_name_order() {
        let store = seeded();
        let names: Vec<_> = store
            .list_slots("S1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["001", "002", "003"]);
    }

    #[tokio::test]
    async fn test_find_slot_by_code_scoped() {
        let store = seeded();
        let slot = store.find_slot_by_code("001", Some("S2")).await.unwrap().unwrap();
        assert_eq!(slot.storage, "S2");
        assert!(store.find_slot_by_code("009", Some("S1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_occupied_names_batched() {
        let store = seeded();
        let names: BTreeSet<String> = ["001", "002", "003"].iter().map(|s| s.to_string()).collect();
        let occupied = store.occupied_names("S1", &names).await.unwrap();
        assert_eq!(occupied.into_iter().collect::<Vec<_>>(), vec!["002".to_string()]);
        assert!(store.occupied_names("S2", &names).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_slots_is_all_or_nothing() {
        let store = seeded();
        let mut known = store.get_slot("S1", "001").await.unwrap().unwrap();
        known.diameter = 13;
        let unknown = StorageSlot::new("S1", "999", 7, 12);

        assert!(store.update_slots(&[known, unknown]).await.is_err());
        let unchanged = store.get_slot("S1", "001").await.unwrap().unwrap();
        assert_eq!(unchanged.diameter, 7);
    }

    #[tokio::test]
    async fn test_update_carriers_is_all_or_nothing() {
        let store = seeded();
        let mut known = store.get_carrier("C1").await.unwrap().unwrap();
        known.collecting = true;
        let unknown = Carrier::new("C9", 7, 12);

        let result = store.update_carriers(&[known, unknown]).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(!store.get_carrier("C1").await.unwrap().unwrap().collecting);
    }

    #[tokio::test]
    async fn test_update_unknown_carrier_fails() {
        let store = seeded();
        let result = store.update_carrier(&Carrier::new("C9", 7, 12)).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
