//! Inventory snapshot files
//!
//! YAML document holding every record the command line tool works on.

use crate::domain::model::{Article, Carrier, Job, Storage, StorageSlot};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// All inventory records in one serializable document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySnapshot {
    pub storages: Vec<Storage>,
    pub slots: Vec<StorageSlot>,
    pub carriers: Vec<Carrier>,
    pub articles: Vec<Article>,
    pub jobs: Vec<Job>,
}

impl InventorySnapshot {
    /// Read a snapshot from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: Self = serde_yaml::from_str(&raw)?;
        info!(
            "Loaded inventory {}: {} storages, {} slots, {} carriers",
            path.display(),
            snapshot.storages.len(),
            snapshot.slots.len(),
            snapshot.carriers.len()
        );
        Ok(snapshot)
    }

    /// Write the snapshot back, replacing the file atomically
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
