//! Collect workflow
//!
//! Per carrier: `Idle -> Queued -> Confirmed`, or `Queued -> Cancelled`.
//! The collect queue is every stored carrier flagged `collecting`, oldest
//! first. Carriers enter the queue one at a time, per job, or as one pick
//! among all carriers of an article.

use super::{Outcome, QueueEntry, Workflows, CONFIRM_COLOR, REJECT_COLOR};
use crate::domain::model::{Carrier, Job, JobStatus, LedState, StorageSlot};
use crate::domain::ports::{CarrierFilter, SlotSelector};
use crate::error::{Error, Result};
use crate::topology::same_logical_slot;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

// =============================================================================
// Payloads
// =============================================================================

/// A carrier added to the collect queue
#[derive(Debug, Clone, Serialize)]
pub struct CollectEnqueued {
    pub storage: String,
    pub slot: String,
    pub carrier: String,
    pub queue: Vec<QueueEntry>,
}

/// A carrier taken out of its slot
#[derive(Debug, Clone, Serialize)]
pub struct CollectConfirmation {
    pub carrier: String,
    pub storage: String,
    pub slot: String,
    /// Queue left after this carrier
    pub queue: Vec<QueueEntry>,
}

/// A carrier removed from the queue without collecting it
#[derive(Debug, Clone, Serialize)]
pub struct CollectCancellation {
    pub carrier: String,
    /// False when the carrier was not queued
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectQueue {
    pub queue: Vec<QueueEntry>,
}

/// Carriers of an article lit for the operator to pick from
#[derive(Debug, Clone, Serialize)]
pub struct ArticleCandidates {
    pub article: String,
    pub carriers: Vec<QueueEntry>,
}

/// Article candidates switched off
#[derive(Debug, Clone, Serialize)]
pub struct ArticleCleared {
    pub article: String,
    pub carriers: Vec<String>,
}

/// Carriers of a job queued for collection
#[derive(Debug, Clone, Serialize)]
pub struct JobCollect {
    pub job: String,
    pub carriers: Vec<String>,
    pub queue: Vec<QueueEntry>,
}

/// Carriers of a job taken off the queue
#[derive(Debug, Clone, Serialize)]
pub struct JobCancellation {
    pub job: String,
    pub carriers: Vec<String>,
}

impl Workflows {
    // -------------------------------------------------------------------------
    // Queue
    // -------------------------------------------------------------------------

    /// The current collect queue
    pub async fn collect_queue(&self) -> Outcome<CollectQueue> {
        let result = self.queue(None).await.map(|queue| CollectQueue { queue });
        Outcome::from_result("collect_queue", result)
    }

    /// Stored carriers being collected, oldest first, ties by name
    async fn queue(&self, excluding: Option<&str>) -> Result<Vec<QueueEntry>> {
        let mut queued = self
            .store
            .filter_carriers(&CarrierFilter::new().collecting(true).stored(true))
            .await?;
        queued.retain(|c| Some(c.name.as_str()) != excluding);
        queued.sort_by(|a, b| {
            (a.collecting_since.is_none(), a.collecting_since, &a.name).cmp(&(
                b.collecting_since.is_none(),
                b.collecting_since,
                &b.name,
            ))
        });

        let mut entries = Vec::with_capacity(queued.len());
        for carrier in queued {
            if let Some(slot) = &carrier.storage_slot {
                entries.push(QueueEntry {
                    slot: self.slot_code(slot).await?,
                    storage: slot.storage.clone(),
                    carrier: carrier.name,
                });
            }
        }
        Ok(entries)
    }

    /// Slot a carrier is stored in, or a graceful refusal
    async fn stored_slot(&self, carrier: &Carrier) -> Result<StorageSlot> {
        let slot = carrier
            .storage_slot
            .as_ref()
            .ok_or_else(|| Error::precondition(format!("Carrier {} is not stored", carrier.name)))?;
        self.topology.slot(slot).await
    }

    /// Carrier stored anywhere in a slot's closure
    async fn carrier_in(&self, slot: &StorageSlot) -> Result<Option<Carrier>> {
        let selector = SlotSelector::new(&slot.storage, slot.closure());
        Ok(self
            .store
            .filter_carriers(&CarrierFilter::new().stored_at(selector))
            .await?
            .into_iter()
            .next())
    }

    /// Take a carrier out of its slot and report the queue left behind
    async fn release(&self, mut carrier: Carrier, slot: &StorageSlot) -> Result<CollectConfirmation> {
        // Captured before the update so the carrier is excluded exactly once
        let queue = self.queue(Some(&carrier.name)).await?;

        carrier.storage_slot = None;
        carrier.collecting = false;
        carrier.collecting_since = None;
        self.store.update_carrier(&carrier).await?;
        if slot.led_state != LedState::Off {
            self.topology.set_led_state(slot, LedState::Off).await?;
        }

        info!("Collected carrier {} from {}", carrier.name, slot.slot_ref());
        self.flash(slot, CONFIRM_COLOR, None).await;

        Ok(CollectConfirmation {
            carrier: carrier.name,
            storage: slot.storage.clone(),
            slot: slot.qr_value.clone(),
            queue,
        })
    }

    // -------------------------------------------------------------------------
    // Single carrier
    // -------------------------------------------------------------------------

    /// Queue a stored carrier for collection and light its slot
    pub async fn collect_carrier(&self, carrier: &str) -> Outcome<CollectEnqueued> {
        Outcome::from_result("collect_carrier", self.enqueue(carrier).await)
    }

    /// Take a queued carrier out once its slot was scanned
    pub async fn collect_carrier_confirm(&self, carrier: &str, storage: &str, code: &str) -> Outcome<CollectConfirmation> {
        Outcome::from_result(
            "collect_carrier_confirm",
            self.confirm_collect(carrier, storage, code).await,
        )
    }

    /// Remove a carrier from the queue, leaving it stored
    pub async fn collect_carrier_cancel(&self, carrier: &str) -> Outcome<CollectCancellation> {
        Outcome::from_result("collect_carrier_cancel", self.dequeue(carrier).await)
    }

    async fn enqueue(&self, carrier_name: &str) -> Result<CollectEnqueued> {
        let mut carrier = self.carrier(carrier_name).await?;
        if carrier.archived {
            return Err(Error::precondition(format!("Carrier {} is archived", carrier.name)));
        }
        if carrier.collecting {
            return Err(Error::precondition(format!(
                "Carrier {} is already queued for collection",
                carrier.name
            )));
        }
        let slot = self.stored_slot(&carrier).await?;

        carrier.collecting = true;
        carrier.collecting_since = Some(Utc::now());
        self.store.update_carrier(&carrier).await?;

        info!("Queued carrier {} from {} for collection", carrier.name, slot.slot_ref());
        self.light(std::slice::from_ref(&slot), self.config.collect_color).await;

        Ok(CollectEnqueued {
            queue: self.queue(None).await?,
            storage: slot.storage,
            slot: slot.qr_value,
            carrier: carrier.name,
        })
    }

    async fn confirm_collect(&self, carrier_name: &str, storage_name: &str, code: &str) -> Result<CollectConfirmation> {
        let carrier = self.carrier(carrier_name).await?;
        if !carrier.collecting {
            return Err(Error::precondition(format!(
                "Carrier {} is not queued for collection",
                carrier.name
            )));
        }
        let expected = self.stored_slot(&carrier).await?;
        if expected.storage != storage_name {
            return Err(Error::precondition(format!(
                "Carrier {} is stored in {}, not {}",
                carrier.name, expected.storage, storage_name
            )));
        }

        let scanned = self.topology.resolve(code, Some(storage_name)).await?;
        if !same_logical_slot(&scanned, &expected) {
            self.reject_scan(&scanned).await;
            return Err(Error::SlotMismatch {
                expected: expected.qr_value,
                scanned: code.to_string(),
            });
        }

        self.release(carrier, &expected).await
    }

    async fn dequeue(&self, carrier_name: &str) -> Result<CollectCancellation> {
        let mut carrier = self.carrier(carrier_name).await?;
        if !carrier.collecting {
            return Ok(CollectCancellation {
                carrier: carrier.name,
                cancelled: false,
            });
        }
        let slot = self.stored_slot(&carrier).await?;

        carrier.collecting = false;
        carrier.collecting_since = None;
        self.store.update_carrier(&carrier).await?;

        info!("Carrier {} left the collect queue", carrier.name);
        self.flash(&slot, REJECT_COLOR, None).await;

        Ok(CollectCancellation {
            carrier: carrier.name,
            cancelled: true,
        })
    }

    // -------------------------------------------------------------------------
    // By article
    // -------------------------------------------------------------------------

    /// Light every stored carrier of an article so the operator can pick one
    pub async fn collect_carrier_by_article(&self, article: &str) -> Outcome<ArticleCandidates> {
        Outcome::from_result("collect_carrier_by_article", self.offer_article(article).await)
    }

    /// Collect the carrier of the article found in the scanned slot
    pub async fn collect_carrier_by_article_confirm(
        &self,
        article: &str,
        storage: &str,
        code: &str,
    ) -> Outcome<CollectConfirmation> {
        Outcome::from_result(
            "collect_carrier_by_article_confirm",
            self.confirm_article(article, storage, code).await,
        )
    }

    /// Switch off the candidates lit for an article
    pub async fn collect_carrier_by_article_cancel(&self, article: &str) -> Outcome<ArticleCleared> {
        Outcome::from_result("collect_carrier_by_article_cancel", self.withdraw_article(article).await)
    }

    /// Stored, active carriers of an article not already queued
    async fn article_carriers(&self, article: &str) -> Result<Vec<Carrier>> {
        self.store
            .get_article(article)
            .await?
            .ok_or_else(|| Error::not_found("Article", article))?;
        self.store
            .filter_carriers(
                &CarrierFilter::new()
                    .article(article)
                    .stored(true)
                    .archived(false)
                    .collecting(false),
            )
            .await
    }

    async fn offer_article(&self, article: &str) -> Result<ArticleCandidates> {
        let carriers = self.article_carriers(article).await?;
        if carriers.is_empty() {
            return Err(Error::precondition(format!("No stored carrier holds article {}", article)));
        }

        let mut slots = Vec::with_capacity(carriers.len());
        let mut members = Vec::new();
        let mut entries = Vec::with_capacity(carriers.len());
        for carrier in &carriers {
            let slot = self.stored_slot(carrier).await?;
            for mut member in self.topology.members(&slot).await? {
                member.led_state = LedState::Confirming;
                members.push(member);
            }
            entries.push(QueueEntry {
                carrier: carrier.name.clone(),
                storage: slot.storage.clone(),
                slot: slot.qr_value.clone(),
            });
            slots.push(slot);
        }
        self.store.update_slots(&members).await?;

        info!("Lit {} carriers of article {}", slots.len(), article);
        self.light(&slots, self.config.collect_color).await;

        Ok(ArticleCandidates {
            article: article.to_string(),
            carriers: entries,
        })
    }

    async fn confirm_article(&self, article: &str, storage_name: &str, code: &str) -> Result<CollectConfirmation> {
        let candidates = self.article_carriers(article).await?;
        let scanned = self.topology.resolve(code, Some(storage_name)).await?;

        let picked = match self.carrier_in(&scanned).await? {
            Some(carrier) if candidates.iter().any(|c| c.name == carrier.name) => carrier,
            _ => {
                self.reject_scan(&scanned).await;
                return Err(Error::SlotMismatch {
                    expected: format!("a slot holding article {}", article),
                    scanned: code.to_string(),
                });
            }
        };

        let mut others = Vec::new();
        for carrier in candidates.iter().filter(|c| c.name != picked.name) {
            let slot = self.stored_slot(carrier).await?;
            if slot.led_state == LedState::Confirming {
                others.push(slot);
            }
        }
        self.switch_off(&others).await?;

        self.release(picked, &scanned).await
    }

    async fn withdraw_article(&self, article: &str) -> Result<ArticleCleared> {
        let mut lit = Vec::new();
        let mut names = Vec::new();
        for carrier in self.article_carriers(article).await? {
            let slot = self.stored_slot(&carrier).await?;
            if slot.led_state == LedState::Confirming {
                names.push(carrier.name);
                lit.push(slot);
            }
        }
        self.switch_off(&lit).await?;

        info!("Withdrew {} candidates of article {}", names.len(), article);
        Ok(ArticleCleared {
            article: article.to_string(),
            carriers: names,
        })
    }

    /// Reset candidate slots and turn their LEDs off
    async fn switch_off(&self, slots: &[StorageSlot]) -> Result<()> {
        let mut members = Vec::new();
        for slot in slots {
            for mut member in self.topology.members(slot).await? {
                member.led_state = LedState::Off;
                members.push(member);
            }
        }
        self.store.update_slots(&members).await?;
        self.clear(slots).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // By job
    // -------------------------------------------------------------------------

    /// Queue every stored carrier of a prepared job
    pub async fn collect_job(&self, job: &str) -> Outcome<JobCollect> {
        Outcome::from_result("collect_job", self.enqueue_job(job).await)
    }

    /// Take one carrier of a job out once its slot was scanned
    pub async fn collect_job_confirm(&self, job: &str, storage: &str, code: &str) -> Outcome<CollectConfirmation> {
        Outcome::from_result("collect_job_confirm", self.confirm_job(job, storage, code).await)
    }

    /// Take every queued carrier of a job off the queue
    pub async fn collect_job_cancel(&self, job: &str) -> Outcome<JobCancellation> {
        Outcome::from_result("collect_job_cancel", self.dequeue_job(job).await)
    }

    async fn prepared_job(&self, name: &str) -> Result<Job> {
        let job = self
            .store
            .get_job(name)
            .await?
            .ok_or_else(|| Error::not_found("Job", name))?;
        if job.status != JobStatus::Prepared {
            return Err(Error::precondition(format!(
                "Job {} is {}, only prepared jobs can be collected",
                job.name, job.status
            )));
        }
        Ok(job)
    }

    async fn enqueue_job(&self, job_name: &str) -> Result<JobCollect> {
        let job = self.prepared_job(job_name).await?;
        let carriers = self
            .store
            .filter_carriers(
                &CarrierFilter::new()
                    .names(job.carriers.iter().cloned())
                    .stored(true)
                    .archived(false),
            )
            .await?;
        if carriers.is_empty() {
            return Err(Error::precondition(format!("No stored carrier linked to job {}", job.name)));
        }

        let since = Utc::now();
        let mut slots = Vec::new();
        let mut queued = Vec::new();
        let mut changed = Vec::new();
        for mut carrier in carriers {
            slots.push(self.stored_slot(&carrier).await?);
            queued.push(carrier.name.clone());
            if !carrier.collecting {
                carrier.collecting = true;
                carrier.collecting_since = Some(since);
                changed.push(carrier);
            }
        }
        // The whole job is queued or none of it
        self.store.update_carriers(&changed).await?;

        info!("Queued {} carriers of job {}", queued.len(), job.name);
        self.light(&slots, self.config.collect_color).await;

        Ok(JobCollect {
            job: job.name,
            carriers: queued,
            queue: self.queue(None).await?,
        })
    }

    async fn confirm_job(&self, job_name: &str, storage_name: &str, code: &str) -> Result<CollectConfirmation> {
        let job = self.prepared_job(job_name).await?;
        let scanned = self.topology.resolve(code, Some(storage_name)).await?;

        match self.carrier_in(&scanned).await? {
            Some(carrier) if carrier.collecting && job.carriers.contains(&carrier.name) => {
                self.release(carrier, &scanned).await
            }
            _ => {
                self.reject_scan(&scanned).await;
                Err(Error::SlotMismatch {
                    expected: format!("a queued slot of job {}", job.name),
                    scanned: code.to_string(),
                })
            }
        }
    }

    async fn dequeue_job(&self, job_name: &str) -> Result<JobCancellation> {
        let job = self
            .store
            .get_job(job_name)
            .await?
            .ok_or_else(|| Error::not_found("Job", job_name))?;
        let carriers = self
            .store
            .filter_carriers(
                &CarrierFilter::new()
                    .names(job.carriers.iter().cloned())
                    .collecting(true),
            )
            .await?;

        let mut cancelled = Vec::new();
        let mut slots = Vec::new();
        let mut changed = Vec::new();
        for mut carrier in carriers {
            carrier.collecting = false;
            carrier.collecting_since = None;
            if let Some(slot) = &carrier.storage_slot {
                if let Ok(slot) = self.topology.slot(slot).await {
                    slots.push(slot);
                }
            }
            cancelled.push(carrier.name.clone());
            changed.push(carrier);
        }
        self.store.update_carriers(&changed).await?;

        for slot in &slots {
            self.flash(slot, REJECT_COLOR, None).await;
        }
        info!("Job {}: {} carriers left the collect queue", job.name, cancelled.len());
        Ok(JobCancellation {
            job: job.name,
            carriers: cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rig, Rig};
    use crate::domain::led::Color;
    use crate::domain::model::{Article, Carrier, Job, JobStatus, LedState, SlotRef};
    use crate::domain::ports::InventoryStore;
    use crate::drivers::recording::LedCall;

    fn stored(rig: &Rig, name: &str, slot: &str) {
        rig.inventory
            .insert_carrier(Carrier::new(name, 7, 12).stored_at(SlotRef::new("S1", slot)));
    }

    async fn carrier(rig: &Rig, name: &str) -> Carrier {
        rig.inventory.get_carrier(name).await.unwrap().unwrap()
    }

    fn queue_names(queue: &[super::QueueEntry]) -> Vec<&str> {
        queue.iter().map(|e| e.carrier.as_str()).collect()
    }

    #[tokio::test]
    async fn test_confirm_returns_remaining_queue() {
        let rig = rig();
        stored(&rig, "C1", "010");
        stored(&rig, "C2", "011");

        let first = rig.workflows.collect_carrier("C1").await.data.unwrap();
        assert_eq!(first.slot, "010");
        assert_eq!(queue_names(&first.queue), vec!["C1"]);
        let second = rig.workflows.collect_carrier("C2").await.data.unwrap();
        assert_eq!(queue_names(&second.queue), vec!["C1", "C2"]);

        rig.settle().await;
        assert_eq!(rig.driver.lit().get("010"), Some(&Color::Blue));

        let confirmed = rig.workflows.collect_carrier_confirm("C1", "S1", "010").await;
        assert!(confirmed.success);
        let confirmed = confirmed.data.unwrap();
        assert_eq!(queue_names(&confirmed.queue), vec!["C2"]);

        let c1 = carrier(&rig, "C1").await;
        assert!(c1.storage_slot.is_none());
        assert!(!c1.collecting);

        let queue = rig.workflows.collect_queue().await.data.unwrap().queue;
        assert_eq!(queue_names(&queue), vec!["C2"]);

        rig.settle().await;
        let lit = rig.driver.lit();
        assert!(!lit.contains_key("010"));
        assert_eq!(lit.get("011"), Some(&Color::Blue));
    }

    #[tokio::test]
    async fn test_confirm_with_alias_code_of_combined_slot() {
        let rig = rig();
        assert!(rig.workflows.merge_slots("S1", "004", &["005".to_string()]).await.success);
        stored(&rig, "C1", "004");
        rig.workflows.collect_carrier("C1").await;

        let outcome = rig.workflows.collect_carrier_confirm("C1", "S1", "005").await;
        assert!(outcome.success);
        assert!(carrier(&rig, "C1").await.storage_slot.is_none());
    }

    #[tokio::test]
    async fn test_wrong_scan_keeps_carrier_queued() {
        let rig = rig();
        stored(&rig, "C1", "010");
        stored(&rig, "C2", "011");
        rig.workflows.collect_carrier("C1").await;
        rig.workflows.collect_carrier("C2").await;

        let outcome = rig.workflows.collect_carrier_confirm("C1", "S1", "011").await;
        assert_eq!(outcome.error, Some("slot_mismatch"));

        let c1 = carrier(&rig, "C1").await;
        assert!(c1.collecting);
        assert_eq!(c1.storage_slot, Some(SlotRef::new("S1", "010")));

        rig.settle().await;
        assert!(rig.driver.calls().contains(&LedCall::On("011".into(), Color::Red)));
        // the wrongly scanned slot is still waiting for C2
        assert_eq!(rig.driver.lit().get("011"), Some(&Color::Blue));
    }

    #[tokio::test]
    async fn test_enqueue_preconditions() {
        let rig = rig();
        rig.inventory.insert_carrier(Carrier::new("LOOSE", 7, 12));
        stored(&rig, "C1", "001");

        assert_eq!(
            rig.workflows.collect_carrier("LOOSE").await.error,
            Some("precondition_failed")
        );
        assert!(rig.workflows.collect_carrier("C1").await.success);
        assert_eq!(
            rig.workflows.collect_carrier("C1").await.error,
            Some("precondition_failed")
        );
        assert_eq!(rig.workflows.collect_carrier("GHOST").await.error, Some("not_found"));
    }

    #[tokio::test]
    async fn test_confirm_without_storage_slot_fails_gracefully() {
        let rig = rig();
        let mut racing = Carrier::new("C1", 7, 12);
        racing.collecting = true;
        rig.inventory.insert_carrier(racing);

        let outcome = rig.workflows.collect_carrier_confirm("C1", "S1", "001").await;
        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Carrier C1 is not stored"));

        let cancel = rig.workflows.collect_carrier_cancel("C1").await;
        assert!(!cancel.success);
    }

    #[tokio::test]
    async fn test_cancel_keeps_carrier_stored() {
        let rig = rig();
        stored(&rig, "C1", "003");
        rig.workflows.collect_carrier("C1").await;

        let outcome = rig.workflows.collect_carrier_cancel("C1").await.data.unwrap();
        assert!(outcome.cancelled);
        let c1 = carrier(&rig, "C1").await;
        assert!(!c1.collecting);
        assert_eq!(c1.storage_slot, Some(SlotRef::new("S1", "003")));

        let again = rig.workflows.collect_carrier_cancel("C1").await.data.unwrap();
        assert!(!again.cancelled);

        rig.settle().await;
        assert!(rig.driver.lit().is_empty());
    }

    #[tokio::test]
    async fn test_by_article_pick() {
        let rig = rig();
        rig.inventory.insert_article(Article {
            name: "R-10K".into(),
            description: None,
        });
        for (name, slot) in [("C1", "001"), ("C2", "002"), ("C3", "003")] {
            rig.inventory.insert_carrier(
                Carrier::new(name, 7, 12)
                    .with_article("R-10K")
                    .stored_at(SlotRef::new("S1", slot)),
            );
        }
        stored(&rig, "OTHER", "004");

        let offered = rig.workflows.collect_carrier_by_article("R-10K").await.data.unwrap();
        assert_eq!(offered.carriers.len(), 3);

        let wrong = rig
            .workflows
            .collect_carrier_by_article_confirm("R-10K", "S1", "004")
            .await;
        assert_eq!(wrong.error, Some("slot_mismatch"));

        let picked = rig
            .workflows
            .collect_carrier_by_article_confirm("R-10K", "S1", "002")
            .await;
        assert!(picked.success);
        assert!(carrier(&rig, "C2").await.storage_slot.is_none());
        assert!(carrier(&rig, "C1").await.is_stored());

        for name in ["001", "002", "003"] {
            let slot = rig.inventory.get_slot("S1", name).await.unwrap().unwrap();
            assert_eq!(slot.led_state, LedState::Off);
        }
        rig.settle().await;
        assert!(rig.driver.lit().is_empty());
    }

    #[tokio::test]
    async fn test_by_article_cancel() {
        let rig = rig();
        rig.inventory.insert_article(Article {
            name: "C-100N".into(),
            description: Some("100nF 0402".into()),
        });
        rig.inventory.insert_carrier(
            Carrier::new("C1", 7, 12)
                .with_article("C-100N")
                .stored_at(SlotRef::new("S1", "006")),
        );

        rig.workflows.collect_carrier_by_article("C-100N").await;
        let cleared = rig.workflows.collect_carrier_by_article_cancel("C-100N").await.data.unwrap();
        assert_eq!(cleared.carriers, vec!["C1"]);

        rig.settle().await;
        assert!(rig.driver.lit().is_empty());
        assert!(carrier(&rig, "C1").await.is_stored());

        let unknown = rig.workflows.collect_carrier_by_article("NOPE").await;
        assert_eq!(unknown.error, Some("not_found"));
    }

    #[tokio::test]
    async fn test_job_requires_prepared_status() {
        let rig = rig();
        stored(&rig, "C1", "001");
        rig.inventory.insert_job(Job {
            name: "J1".into(),
            status: JobStatus::Created,
            carriers: vec!["C1".into()],
        });

        let outcome = rig.workflows.collect_job("J1").await;
        assert_eq!(outcome.error, Some("precondition_failed"));
        assert!(!carrier(&rig, "C1").await.collecting);
    }

    #[tokio::test]
    async fn test_job_collect_confirm_and_cancel() {
        let rig = rig();
        stored(&rig, "C1", "001");
        stored(&rig, "C2", "002");
        stored(&rig, "C3", "003");
        rig.inventory.insert_carrier(Carrier::new("LOOSE", 7, 12));
        rig.inventory.insert_job(Job {
            name: "J1".into(),
            status: JobStatus::Prepared,
            carriers: vec!["C2".into(), "C1".into(), "LOOSE".into()],
        });

        let writes = rig.inventory.write_count();
        let queued = rig.workflows.collect_job("J1").await.data.unwrap();
        assert_eq!(queued.carriers, vec!["C1", "C2"]);
        // both carriers queued in a single batch write
        assert_eq!(rig.inventory.write_count(), writes + 1);
        assert_eq!(queue_names(&queued.queue), vec!["C1", "C2"]);

        // C3 is not part of the job
        let wrong = rig.workflows.collect_job_confirm("J1", "S1", "003").await;
        assert_eq!(wrong.error, Some("slot_mismatch"));

        let confirmed = rig.workflows.collect_job_confirm("J1", "S1", "002").await.data.unwrap();
        assert_eq!(confirmed.carrier, "C2");
        assert_eq!(queue_names(&confirmed.queue), vec!["C1"]);

        let cancelled = rig.workflows.collect_job_cancel("J1").await.data.unwrap();
        assert_eq!(cancelled.carriers, vec!["C1"]);
        assert!(!carrier(&rig, "C1").await.collecting);

        rig.settle().await;
        assert!(rig.driver.lit().is_empty());
    }
}
