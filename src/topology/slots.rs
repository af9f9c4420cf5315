//! Slot Topology
//!
//! Logical slots over physical LED addresses. A logical slot controls its
//! closure: its own name plus every related name acquired through merges.
//! All members of a closure share every code, so lookup works from any
//! member and any code. Occupancy is the OR over the whole closure.

use crate::domain::model::{LedState, SlotRef, StorageSlot};
use crate::domain::ports::{CarrierFilter, InventoryStoreRef, SlotSelector};
use crate::error::{Error, MergeConflictReason, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Whether two slots are the same logical slot
pub fn same_logical_slot(a: &StorageSlot, b: &StorageSlot) -> bool {
    a.storage == b.storage && a.closure() == b.closure()
}

/// Topology queries and merges over the inventory store
#[derive(Clone)]
pub struct SlotTopology {
    store: InventoryStoreRef,
}

impl SlotTopology {
    pub fn new(store: InventoryStoreRef) -> Self {
        Self { store }
    }

    /// Find the slot answering to a scanned code
    pub async fn resolve(&self, code: &str, storage: Option<&str>) -> Result<StorageSlot> {
        let code = code.trim();
        self.store
            .find_slot_by_code(code, storage)
            .await?
            .ok_or_else(|| match storage {
                Some(storage) => Error::not_found("StorageSlot", format!("{}/{}", storage, code)),
                None => Error::not_found("StorageSlot", code),
            })
    }

    /// Load a slot by reference
    pub async fn slot(&self, slot: &SlotRef) -> Result<StorageSlot> {
        self.store
            .get_slot(&slot.storage, &slot.name)
            .await?
            .ok_or_else(|| Error::not_found("StorageSlot", slot.to_string()))
    }

    /// Physical names controlled by a logical slot
    pub fn closure(slot: &StorageSlot) -> BTreeSet<String> {
        slot.closure()
    }

    /// Every slot record in a slot's closure, in name order
    pub async fn members(&self, slot: &StorageSlot) -> Result<Vec<StorageSlot>> {
        let mut members = Vec::new();
        for name in slot.closure() {
            if name == slot.name {
                members.push(slot.clone());
                continue;
            }
            let member = self
                .store
                .get_slot(&slot.storage, &name)
                .await?
                .ok_or_else(|| Error::not_found("StorageSlot", format!("{}/{}", slot.storage, name)))?;
            members.push(member);
        }
        Ok(members)
    }

    /// True when any physical member of the closure holds a carrier
    pub async fn is_occupied(&self, slot: &StorageSlot) -> Result<bool> {
        let occupied = self.store.occupied_names(&slot.storage, &slot.closure()).await?;
        Ok(!occupied.is_empty())
    }

    /// Set the LED state on every member of a logical slot
    pub async fn set_led_state(&self, slot: &StorageSlot, state: LedState) -> Result<()> {
        let mut members = self.members(slot).await?;
        for member in &mut members {
            member.led_state = state;
            member.offered_to = None;
        }
        self.store.update_slots(&members).await
    }

    /// Logical slots of a storage whose whole closure is free and which fit
    ///
    /// Combined slots appear once, represented by their lowest-named member.
    /// Results are in slot name order. Occupancy for all candidates is
    /// fetched in a single store query.
    pub async fn free_slots(&self, storage: &str, min_diameter: u32, min_width: u32) -> Result<Vec<StorageSlot>> {
        let slots = self.store.list_slots(storage).await?;

        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for slot in slots {
            if seen.contains(&slot.name) {
                continue;
            }
            let closure = slot.closure();
            seen.extend(closure.iter().cloned());
            if slot.fits(min_diameter, min_width) {
                candidates.push((slot, closure));
            }
        }

        let all_names: BTreeSet<String> = candidates
            .iter()
            .flat_map(|(_, closure)| closure.iter().cloned())
            .collect();
        let occupied = self.store.occupied_names(storage, &all_names).await?;

        let free: Vec<StorageSlot> = candidates
            .into_iter()
            .filter(|(_, closure)| closure.is_disjoint(&occupied))
            .map(|(slot, _)| slot)
            .collect();

        debug!(
            "Storage {}: {} free slots for diameter {} width {}",
            storage,
            free.len(),
            min_diameter,
            min_width
        );
        Ok(free)
    }

    /// Combine slots into one logical slot
    ///
    /// All candidates must share a storage, hold no carrier, carry no
    /// nomination and not already overlap. On success every member of the
    /// resulting closure references all others, shares every code and gets
    /// the largest diameter and width of the group. Nothing is written when
    /// validation fails.
    pub async fn merge(&self, primary: &SlotRef, others: &[SlotRef]) -> Result<StorageSlot> {
        let mut refs: Vec<&SlotRef> = vec![primary];
        for other in others {
            if !refs.contains(&other) {
                refs.push(other);
            }
        }
        if refs.len() < 2 {
            return Err(Error::MergeConflict {
                reason: MergeConflictReason::NothingToMerge,
                slots: refs.iter().map(|r| r.to_string()).collect(),
            });
        }

        let mut candidates = Vec::with_capacity(refs.len());
        for slot_ref in &refs {
            candidates.push(self.slot(slot_ref).await?);
        }

        let cross: Vec<String> = candidates
            .iter()
            .filter(|s| s.storage != primary.storage)
            .map(|s| s.slot_ref().to_string())
            .collect();
        if !cross.is_empty() {
            return Err(Error::MergeConflict {
                reason: MergeConflictReason::CrossStorage,
                slots: cross,
            });
        }

        let mut overlapping = BTreeSet::new();
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                if !a.closure().is_disjoint(&b.closure()) {
                    overlapping.insert(a.name.clone());
                    overlapping.insert(b.name.clone());
                }
            }
        }
        if !overlapping.is_empty() {
            return Err(Error::MergeConflict {
                reason: MergeConflictReason::AlreadyCombined,
                slots: overlapping.into_iter().collect(),
            });
        }

        // Existing groups join whole
        let mut members: BTreeMap<String, StorageSlot> = BTreeMap::new();
        for candidate in &candidates {
            for member in self.members(candidate).await? {
                members.insert(member.name.clone(), member);
            }
        }
        let names: BTreeSet<String> = members.keys().cloned().collect();

        let occupied = self.store.occupied_names(&primary.storage, &names).await?;
        if !occupied.is_empty() {
            return Err(Error::MergeConflict {
                reason: MergeConflictReason::Occupied,
                slots: occupied.into_iter().collect(),
            });
        }

        let mut nominated: BTreeSet<String> = members
            .values()
            .filter(|m| m.led_state != LedState::Off)
            .map(|m| m.name.clone())
            .collect();
        let selector = SlotSelector::new(&primary.storage, names.clone());
        for carrier in self
            .store
            .filter_carriers(&CarrierFilter::new().nominated_at(selector))
            .await?
        {
            if let Some(slot) = carrier.nominated_for_slot {
                nominated.insert(slot.name);
            }
        }
        if !nominated.is_empty() {
            return Err(Error::MergeConflict {
                reason: MergeConflictReason::Nominated,
                slots: nominated.into_iter().collect(),
            });
        }

        let codes: BTreeSet<String> = members.values().flat_map(|m| m.codes()).collect();
        let diameter = members.values().map(|m| m.diameter).max().unwrap_or(0);
        let width = members.values().map(|m| m.width).max().unwrap_or(0);

        let updated: Vec<StorageSlot> = members
            .into_values()
            .map(|mut member| {
                member.related_names = names.iter().filter(|n| **n != member.name).cloned().collect();
                member.qr_codes = codes.iter().filter(|c| **c != member.qr_value).cloned().collect();
                member.diameter = diameter;
                member.width = width;
                member
            })
            .collect();

        self.store.update_slots(&updated).await?;

        info!(
            "Combined slots in {}: {} (diameter {}, width {})",
            primary.storage,
            names.iter().cloned().collect::<Vec<_>>().join(", "),
            diameter,
            width
        );

        updated
            .into_iter()
            .find(|s| s.name == primary.name)
            .ok_or_else(|| Error::Internal(format!("merged slot {} vanished", primary)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Carrier, SlotRef};
    use crate::domain::ports::InventoryStore;
    use crate::inventory::MemoryInventory;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn rack() -> (Arc<MemoryInventory>, SlotTopology) {
        let store = Arc::new(MemoryInventory::new());
        for i in 1..=5 {
            store.insert_slot(StorageSlot::new("S1", format!("{:03}", i), 7, 12));
        }
        store.insert_slot(StorageSlot::new("S2", "001", 7, 12));
        let topology = SlotTopology::new(store.clone());
        (store, topology)
    }

    fn r(storage: &str, name: &str) -> SlotRef {
        SlotRef::new(storage, name)
    }

    fn names(slots: &[StorageSlot]) -> Vec<&str> {
        slots.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_free_slots_in_name_order() {
        let (_, topology) = rack();
        let free = topology.free_slots("S1", 7, 12).await.unwrap();
        assert_eq!(names(&free), vec!["001", "002", "003", "004", "005"]);
    }

    #[tokio::test]
    async fn test_free_slots_respects_dimensions() {
        let (store, topology) = rack();
        let mut wide = store.get_slot("S1", "004").await.unwrap().unwrap();
        wide.width = 16;
        store.update_slots(&[wide]).await.unwrap();

        let free = topology.free_slots("S1", 7, 16).await.unwrap();
        assert_eq!(names(&free), vec!["004"]);
    }

    #[tokio::test]
    async fn test_merge_makes_closures_equal_and_shares_codes() {
        let (store, topology) = rack();
        topology.merge(&r("S1", "002"), &[r("S1", "003")]).await.unwrap();

        let a = store.get_slot("S1", "002").await.unwrap().unwrap();
        let b = store.get_slot("S1", "003").await.unwrap().unwrap();
        assert_eq!(a.closure(), b.closure());
        assert!(same_logical_slot(&a, &b));

        let via_alias = topology.resolve("003", Some("S1")).await.unwrap();
        assert_eq!(via_alias.closure(), a.closure());
        assert!(a.answers_to("003"));
        assert!(b.answers_to("002"));
    }

    #[tokio::test]
    async fn test_merged_slot_listed_once_with_max_dimensions() {
        let (store, topology) = rack();
        let mut narrow = store.get_slot("S1", "002").await.unwrap().unwrap();
        narrow.width = 8;
        let mut tall = store.get_slot("S1", "003").await.unwrap().unwrap();
        tall.diameter = 13;
        store.update_slots(&[narrow, tall]).await.unwrap();

        let before = topology.free_slots("S1", 7, 12).await.unwrap();
        assert_eq!(names(&before), vec!["001", "003", "004", "005"]);

        let merged = topology.merge(&r("S1", "002"), &[r("S1", "003")]).await.unwrap();
        assert_eq!(merged.diameter, 13);
        assert_eq!(merged.width, 12);

        let after = topology.free_slots("S1", 7, 12).await.unwrap();
        assert_eq!(names(&after), vec!["001", "002", "004", "005"]);
    }

    #[tokio::test]
    async fn test_combined_slot_with_one_occupied_member_is_not_free() {
        let (store, topology) = rack();
        topology.merge(&r("S1", "002"), &[r("S1", "003")]).await.unwrap();
        store.insert_carrier(Carrier::new("C1", 7, 12).stored_at(r("S1", "003")));

        let free = topology.free_slots("S1", 7, 12).await.unwrap();
        assert_eq!(names(&free), vec!["001", "004", "005"]);

        let primary = store.get_slot("S1", "002").await.unwrap().unwrap();
        assert!(topology.is_occupied(&primary).await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_occupied_slot_conflicts_without_changes() {
        let (store, topology) = rack();
        store.insert_carrier(Carrier::new("C1", 7, 12).stored_at(r("S1", "003")));

        let result = topology.merge(&r("S1", "002"), &[r("S1", "003")]).await;
        assert_matches!(
            result,
            Err(Error::MergeConflict { reason: MergeConflictReason::Occupied, ref slots }) if slots == &vec!["003".to_string()]
        );

        let a = store.get_slot("S1", "002").await.unwrap().unwrap();
        let b = store.get_slot("S1", "003").await.unwrap().unwrap();
        assert_eq!(a.closure().len(), 1);
        assert_eq!(b.closure().len(), 1);
        assert!(a.qr_codes.is_empty());
    }

    #[tokio::test]
    async fn test_merge_cross_storage_conflicts() {
        let (_, topology) = rack();
        let result = topology.merge(&r("S1", "001"), &[r("S2", "001")]).await;
        assert_matches!(
            result,
            Err(Error::MergeConflict { reason: MergeConflictReason::CrossStorage, .. })
        );
    }

    #[tokio::test]
    async fn test_merge_already_combined_conflicts() {
        let (_, topology) = rack();
        topology.merge(&r("S1", "002"), &[r("S1", "003")]).await.unwrap();
        let result = topology.merge(&r("S1", "003"), &[r("S1", "002")]).await;
        assert_matches!(
            result,
            Err(Error::MergeConflict { reason: MergeConflictReason::AlreadyCombined, .. })
        );
    }

    #[tokio::test]
    async fn test_merge_nominated_slot_conflicts() {
        let (store, topology) = rack();
        let mut carrier = Carrier::new("C1", 7, 12);
        carrier.nominated_for_slot = Some(r("S1", "004"));
        store.insert_carrier(carrier);

        let result = topology.merge(&r("S1", "004"), &[r("S1", "005")]).await;
        assert_matches!(
            result,
            Err(Error::MergeConflict { reason: MergeConflictReason::Nominated, .. })
        );
    }

    #[tokio::test]
    async fn test_merge_group_with_new_slot_updates_every_member() {
        let (store, topology) = rack();
        topology.merge(&r("S1", "002"), &[r("S1", "003")]).await.unwrap();
        topology.merge(&r("S1", "004"), &[r("S1", "003")]).await.unwrap();

        for name in ["002", "003", "004"] {
            let slot = store.get_slot("S1", name).await.unwrap().unwrap();
            assert_eq!(slot.closure().len(), 3, "slot {}", name);
            assert_eq!(slot.codes().len(), 3, "slot {}", name);
        }
    }

    #[tokio::test]
    async fn test_merge_single_slot_is_rejected() {
        let (_, topology) = rack();
        let result = topology.merge(&r("S1", "001"), &[r("S1", "001")]).await;
        assert_matches!(
            result,
            Err(Error::MergeConflict { reason: MergeConflictReason::NothingToMerge, .. })
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_code() {
        let (_, topology) = rack();
        assert_matches!(
            topology.resolve("XYZ", Some("S1")).await,
            Err(Error::NotFound { .. })
        );
    }
}
