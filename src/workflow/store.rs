//! Store workflow
//!
//! `Idle -> Nominated -> Confirmed`, or `Nominated -> Cancelled`.
//!
//! Two variants share the confirm step semantics: the first free fitting
//! slot is reserved for the carrier (`store_carrier`), or every free
//! fitting slot is lit and the operator scans the one they pick
//! (`store_carrier_choose_slot`).

use super::{Outcome, Workflows, CONFIRM_COLOR, REJECT_COLOR};
use crate::domain::model::{Carrier, LedState, SlotRef, StorageSlot};
use crate::domain::ports::{CarrierFilter, SlotSelector};
use crate::error::{Error, Result};
use crate::topology::same_logical_slot;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

// =============================================================================
// Payloads
// =============================================================================

/// A slot reserved for a carrier
#[derive(Debug, Clone, Serialize)]
pub struct StoreNomination {
    pub storage: String,
    /// Code of the nominated slot
    pub slot: String,
    pub carrier: String,
}

/// Candidate slots lit for the operator to choose from
#[derive(Debug, Clone, Serialize)]
pub struct SlotCandidates {
    pub storage: String,
    pub carrier: String,
    /// Codes of every lit candidate
    pub slot: Vec<String>,
}

/// A carrier placed into its slot
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfirmation {
    pub carrier: String,
    pub storage: String,
    pub slot: String,
}

/// A dropped nomination
#[derive(Debug, Clone, Serialize)]
pub struct StoreCancellation {
    pub carrier: String,
    /// Slot whose nomination was dropped, if there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// Candidate slots switched off
#[derive(Debug, Clone, Serialize)]
pub struct CandidatesCleared {
    pub storage: String,
    pub slots: Vec<String>,
}

fn check_storable(carrier: &Carrier) -> Result<()> {
    if carrier.archived {
        return Err(Error::precondition(format!("Carrier {} is archived", carrier.name)));
    }
    if carrier.collecting {
        return Err(Error::precondition(format!(
            "Carrier {} is queued for collection",
            carrier.name
        )));
    }
    if !carrier.delivered {
        return Err(Error::precondition(format!("Carrier {} is not delivered", carrier.name)));
    }
    if let Some(slot) = &carrier.storage_slot {
        return Err(Error::precondition(format!(
            "Carrier {} is already stored in {}",
            carrier.name, slot
        )));
    }
    if let Some(machine_slot) = &carrier.machine_slot {
        return Err(Error::precondition(format!(
            "Carrier {} is loaded on machine slot {}",
            carrier.name, machine_slot
        )));
    }
    Ok(())
}

impl Workflows {
    // -------------------------------------------------------------------------
    // First free slot
    // -------------------------------------------------------------------------

    /// Reserve the first free fitting slot of a storage for a carrier
    pub async fn store_carrier(&self, carrier: &str, storage: &str) -> Outcome<StoreNomination> {
        Outcome::from_result("store_carrier", self.nominate(carrier, storage).await)
    }

    /// Commit a nomination once the operator scanned the slot
    pub async fn store_carrier_confirm(&self, carrier: &str, storage: &str, code: &str) -> Outcome<StoreConfirmation> {
        Outcome::from_result(
            "store_carrier_confirm",
            self.confirm_nomination(carrier, storage, code).await,
        )
    }

    /// Drop a carrier's nomination; nothing to drop is not an error
    pub async fn store_carrier_cancel(&self, carrier: &str) -> Outcome<StoreCancellation> {
        Outcome::from_result("store_carrier_cancel", self.cancel_nomination(carrier).await)
    }

    async fn nominate(&self, carrier_name: &str, storage_name: &str) -> Result<StoreNomination> {
        let mut carrier = self.carrier(carrier_name).await?;
        check_storable(&carrier)?;
        let storage = self.storage(storage_name).await?;

        let slot = self
            .topology
            .free_slots(&storage.name, carrier.diameter, carrier.width)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::precondition(format!(
                    "No free slot in {} fits carrier {} ({}x{})",
                    storage.name, carrier.name, carrier.diameter, carrier.width
                ))
            })?;
        let closure = slot.closure();

        if let Some(previous) = carrier.nominated_for_slot.clone() {
            let renominated = previous.storage == slot.storage && closure.contains(&previous.name);
            if !renominated {
                self.release_nomination(&previous).await?;
            }
        }

        // Last nominator wins
        let selector = SlotSelector::new(&storage.name, closure.clone());
        for mut other in self
            .store
            .filter_carriers(&CarrierFilter::new().nominated_at(selector))
            .await?
        {
            if other.name == carrier.name {
                continue;
            }
            info!(
                "Carrier {} loses its nomination of {} to {}",
                other.name,
                slot.slot_ref(),
                carrier.name
            );
            other.nominated_for_slot = None;
            self.store.update_carrier(&other).await?;
        }

        carrier.nominated_for_slot = Some(slot.slot_ref());
        self.store.update_carrier(&carrier).await?;
        self.topology.set_led_state(&slot, LedState::Nominated).await?;

        info!("Nominated {} for carrier {}", slot.slot_ref(), carrier.name);
        self.light(std::slice::from_ref(&slot), self.config.nominate_color).await;

        Ok(StoreNomination {
            storage: storage.name,
            slot: slot.qr_value,
            carrier: carrier.name,
        })
    }

    async fn confirm_nomination(&self, carrier_name: &str, storage_name: &str, code: &str) -> Result<StoreConfirmation> {
        let mut carrier = self.carrier(carrier_name).await?;
        // may have changed since the nomination
        check_storable(&carrier)?;
        let nominated = carrier
            .nominated_for_slot
            .clone()
            .ok_or_else(|| Error::precondition(format!("Carrier {} has no nominated slot", carrier.name)))?;
        if nominated.storage != storage_name {
            return Err(Error::precondition(format!(
                "Carrier {} is nominated for storage {}, not {}",
                carrier.name, nominated.storage, storage_name
            )));
        }

        let scanned = self.topology.resolve(code, Some(storage_name)).await?;
        let expected = self.topology.slot(&nominated).await?;
        if !same_logical_slot(&scanned, &expected) {
            self.reject_scan(&scanned).await;
            return Err(Error::SlotMismatch {
                expected: expected.qr_value,
                scanned: code.to_string(),
            });
        }
        if self.topology.is_occupied(&scanned).await? {
            return Err(Error::precondition(format!(
                "Slot {} is already occupied",
                scanned.slot_ref()
            )));
        }

        carrier.storage_slot = Some(scanned.slot_ref());
        carrier.nominated_for_slot = None;
        self.store.update_carrier(&carrier).await?;
        self.topology.set_led_state(&expected, LedState::Off).await?;

        info!("Stored carrier {} in {}", carrier.name, scanned.slot_ref());
        self.flash(&scanned, CONFIRM_COLOR, None).await;

        Ok(StoreConfirmation {
            carrier: carrier.name,
            storage: scanned.storage,
            slot: scanned.qr_value,
        })
    }

    async fn cancel_nomination(&self, carrier_name: &str) -> Result<StoreCancellation> {
        let mut carrier = self.carrier(carrier_name).await?;
        let Some(nominated) = carrier.nominated_for_slot.take() else {
            return Ok(StoreCancellation {
                carrier: carrier.name,
                slot: None,
            });
        };

        self.store.update_carrier(&carrier).await?;
        let code = self.slot_code(&nominated).await?;
        if let Ok(slot) = self.topology.slot(&nominated).await {
            self.topology.set_led_state(&slot, LedState::Off).await?;
            self.flash(&slot, REJECT_COLOR, None).await;
        }

        info!("Cancelled nomination of {} for carrier {}", nominated, carrier.name);
        Ok(StoreCancellation {
            carrier: carrier.name,
            slot: Some(code),
        })
    }

    /// Turn a stale nomination's slot back off
    async fn release_nomination(&self, previous: &SlotRef) -> Result<()> {
        match self.topology.slot(previous).await {
            Ok(slot) => {
                self.topology.set_led_state(&slot, LedState::Off).await?;
                self.clear(std::slice::from_ref(&slot)).await;
                Ok(())
            }
            Err(Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Operator chooses the slot
    // -------------------------------------------------------------------------

    /// Light every free fitting slot and let the operator pick one by scanning
    pub async fn store_carrier_choose_slot(&self, carrier: &str, storage: &str) -> Outcome<SlotCandidates> {
        Outcome::from_result("store_carrier_choose_slot", self.offer_slots(carrier, storage).await)
    }

    /// Store a carrier in the candidate the operator scanned
    pub async fn store_carrier_choose_slot_confirm(
        &self,
        carrier: &str,
        storage: &str,
        code: &str,
    ) -> Outcome<StoreConfirmation> {
        Outcome::from_result(
            "store_carrier_choose_slot_confirm",
            self.confirm_choice(carrier, storage, code).await,
        )
    }

    /// Switch off every candidate lit for a choice in a storage
    pub async fn store_carrier_choose_slot_cancel(&self, storage: &str) -> Outcome<CandidatesCleared> {
        Outcome::from_result("store_carrier_choose_slot_cancel", self.withdraw_candidates(storage).await)
    }

    async fn offer_slots(&self, carrier_name: &str, storage_name: &str) -> Result<SlotCandidates> {
        let mut carrier = self.carrier(carrier_name).await?;
        check_storable(&carrier)?;
        let storage = self.storage(storage_name).await?;

        if let Some(previous) = carrier.nominated_for_slot.take() {
            self.release_nomination(&previous).await?;
            self.store.update_carrier(&carrier).await?;
        }

        // Slots reserved for someone else are not offered
        let candidates: Vec<StorageSlot> = self
            .topology
            .free_slots(&storage.name, carrier.diameter, carrier.width)
            .await?
            .into_iter()
            .filter(|slot| slot.led_state != LedState::Nominated)
            .collect();
        if candidates.is_empty() {
            return Err(Error::precondition(format!(
                "No free slot in {} fits carrier {} ({}x{})",
                storage.name, carrier.name, carrier.diameter, carrier.width
            )));
        }

        let mut members = Vec::new();
        for slot in &candidates {
            for mut member in self.topology.members(slot).await? {
                member.led_state = LedState::Confirming;
                member.offered_to = Some(carrier.name.clone());
                members.push(member);
            }
        }
        self.store.update_slots(&members).await?;

        info!(
            "Offering {} slots in {} to carrier {}",
            candidates.len(),
            storage.name,
            carrier.name
        );
        self.light(&candidates, self.config.nominate_color).await;

        Ok(SlotCandidates {
            storage: storage.name,
            carrier: carrier.name,
            slot: candidates.into_iter().map(|s| s.qr_value).collect(),
        })
    }

    async fn confirm_choice(&self, carrier_name: &str, storage_name: &str, code: &str) -> Result<StoreConfirmation> {
        let mut carrier = self.carrier(carrier_name).await?;
        check_storable(&carrier)?;
        self.storage(storage_name).await?;

        let scanned = self.topology.resolve(code, Some(storage_name)).await?;
        let offered = scanned.led_state == LedState::Confirming
            && scanned.offered_to.as_deref() == Some(carrier.name.as_str());
        let fits = scanned.fits(carrier.diameter, carrier.width);
        if !offered || !fits || self.topology.is_occupied(&scanned).await? {
            self.reject_scan(&scanned).await;
            return Err(Error::SlotMismatch {
                expected: format!("one of the slots lit for {} in {}", carrier.name, storage_name),
                scanned: code.to_string(),
            });
        }

        if let Some(previous) = carrier.nominated_for_slot.take() {
            self.release_nomination(&previous).await?;
        }
        carrier.storage_slot = Some(scanned.slot_ref());
        self.store.update_carrier(&carrier).await?;

        let chosen = scanned.closure();
        let lit = self.confirming_slots(storage_name).await?;
        let (picked, others): (Vec<_>, Vec<_>) = lit.into_iter().partition(|s| chosen.contains(&s.name));
        let reset: Vec<StorageSlot> = picked
            .iter()
            .chain(others.iter())
            .cloned()
            .map(|mut s| {
                s.led_state = LedState::Off;
                s.offered_to = None;
                s
            })
            .collect();
        self.store.update_slots(&reset).await?;

        info!("Stored carrier {} in chosen slot {}", carrier.name, scanned.slot_ref());
        self.clear(&others).await;
        self.flash(&scanned, CONFIRM_COLOR, None).await;

        Ok(StoreConfirmation {
            carrier: carrier.name,
            storage: scanned.storage,
            slot: scanned.qr_value,
        })
    }

    async fn withdraw_candidates(&self, storage_name: &str) -> Result<CandidatesCleared> {
        self.storage(storage_name).await?;
        let lit = self.confirming_slots(storage_name).await?;
        let reset: Vec<StorageSlot> = lit
            .iter()
            .cloned()
            .map(|mut s| {
                s.led_state = LedState::Off;
                s.offered_to = None;
                s
            })
            .collect();
        self.store.update_slots(&reset).await?;
        self.clear(&lit).await;

        let names: BTreeSet<String> = lit.into_iter().map(|s| s.name).collect();
        info!("Withdrew {} candidate slots in {}", names.len(), storage_name);
        Ok(CandidatesCleared {
            storage: storage_name.to_string(),
            slots: names.into_iter().collect(),
        })
    }

    /// Physical slots of a storage currently lit as store candidates
    async fn confirming_slots(&self, storage: &str) -> Result<Vec<StorageSlot>> {
        Ok(self
            .store
            .list_slots(storage)
            .await?
            .into_iter()
            .filter(|s| s.led_state == LedState::Confirming && s.offered_to.is_some())
            .collect())
    }
}
