//! Shelf Dispatcher
//!
//! One [`Shelf`] per storage wraps the driver selected by the storage's
//! device family. It takes physical slot names, translates them into the
//! driver's native addresses and exposes the driver contract unchanged.
//!
//! Workflows use the fire-and-forget helpers (`light`, `clear`, `flash`):
//! they return immediately, run on the [`LedTaskRunner`] and only log
//! device failures.

use super::tasks::LedTaskRunner;
use crate::config::{DeviceConfig, DriverOptions};
use crate::domain::led::{Color, NativeAddress, Side};
use crate::domain::model::Storage;
use crate::domain::ports::LedDriverRef;
use crate::drivers::DriverFactory;
use crate::error::Result;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Shelf
// =============================================================================

/// Uniform LED facade over one storage's driver
pub struct Shelf {
    storage: String,
    device: DeviceConfig,
    driver: LedDriverRef,
    runner: LedTaskRunner,
}

impl Shelf {
    pub fn new(storage: impl Into<String>, device: DeviceConfig, driver: LedDriverRef, runner: LedTaskRunner) -> Self {
        Self {
            storage: storage.into(),
            device,
            driver,
            runner,
        }
    }

    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn driver(&self) -> &LedDriverRef {
        &self.driver
    }

    /// Translate slot names, dropping the ones the driver cannot address
    fn addresses<S: AsRef<str>>(&self, names: &[S]) -> Vec<NativeAddress> {
        names
            .iter()
            .filter_map(|name| match self.driver.address_of(name.as_ref()) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!("[{}] skipping slot {}: {}", self.storage, name.as_ref(), e);
                    None
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Driver contract, by slot name
    // -------------------------------------------------------------------------

    pub async fn led_on(&self, slot_name: &str, color: Color) -> Result<()> {
        let address = self.driver.address_of(slot_name)?;
        self.driver.led_on(address, color).await
    }

    pub async fn led_off(&self, slot_name: &str) -> Result<()> {
        let address = self.driver.address_of(slot_name)?;
        self.driver.led_off(address).await
    }

    pub async fn batch_on<S: AsRef<str>>(&self, slot_names: &[S], color: Color) -> Result<()> {
        let lamps: Vec<_> = self.addresses(slot_names).into_iter().map(|a| (a, color)).collect();
        if lamps.is_empty() {
            return Ok(());
        }
        self.driver.batch_on(&lamps).await
    }

    pub async fn batch_off<S: AsRef<str>>(&self, slot_names: &[S], working_light: bool) -> Result<()> {
        let addresses = self.addresses(slot_names);
        if addresses.is_empty() && !working_light {
            return Ok(());
        }
        self.driver.batch_off(&addresses, working_light).await
    }

    pub async fn reset(&self, working_light: bool) -> Result<()> {
        self.driver.reset(working_light).await
    }

    pub async fn working_light_on(&self, side: Side, color: Color) -> Result<()> {
        self.driver.working_light_on(side, color).await
    }

    pub async fn working_light_off(&self, side: Side) -> Result<()> {
        self.driver.working_light_off(side).await
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.driver.health_check().await
    }

    // -------------------------------------------------------------------------
    // Fire-and-forget
    // -------------------------------------------------------------------------

    /// Light slots in the background
    pub fn light(self: &Arc<Self>, slot_names: Vec<String>, color: Color) {
        if slot_names.is_empty() {
            return;
        }
        let shelf = Arc::clone(self);
        self.runner.spawn(async move {
            if let Err(e) = shelf.batch_on(&slot_names, color).await {
                warn!(error = e.kind(), "[{}] failed to light {:?}: {}", shelf.storage, slot_names, e);
            }
        });
    }

    /// Turn slots off in the background
    pub fn clear(self: &Arc<Self>, slot_names: Vec<String>) {
        if slot_names.is_empty() {
            return;
        }
        let shelf = Arc::clone(self);
        self.runner.spawn(async move {
            if let Err(e) = shelf.batch_off(&slot_names, false).await {
                warn!(error = e.kind(), "[{}] failed to clear {:?}: {}", shelf.storage, slot_names, e);
            }
        });
    }

    /// Light slots for `duration`, then turn them off or back to `restore`
    pub fn flash(self: &Arc<Self>, slot_names: Vec<String>, color: Color, duration: Duration, restore: Option<Color>) {
        if slot_names.is_empty() {
            return;
        }
        let shelf = Arc::clone(self);
        self.runner.spawn(async move {
            if let Err(e) = shelf.batch_on(&slot_names, color).await {
                warn!(error = e.kind(), "[{}] failed to flash {:?}: {}", shelf.storage, slot_names, e);
            }
            // scheduled only once the flash is lit, so the end can't overtake it
            let ending = Arc::clone(&shelf);
            shelf.runner.spawn_after(duration, async move {
                let result = match restore {
                    Some(color) => ending.batch_on(&slot_names, color).await,
                    None => ending.batch_off(&slot_names, false).await,
                };
                if let Err(e) = result {
                    warn!(error = e.kind(), "[{}] failed to end flash on {:?}: {}", ending.storage, slot_names, e);
                }
            });
        });
    }
}

// =============================================================================
// Shelf Registry
// =============================================================================

/// Caches one shelf per storage, built on first use
pub struct ShelfRegistry {
    shelves: DashMap<String, Arc<Shelf>>,
    options: DriverOptions,
    runner: LedTaskRunner,
}

impl ShelfRegistry {
    pub fn new(options: DriverOptions, runner: LedTaskRunner) -> Self {
        Self {
            shelves: DashMap::new(),
            options,
            runner,
        }
    }

    pub fn runner(&self) -> &LedTaskRunner {
        &self.runner
    }

    /// Shelf for a storage, rebuilt when its device configuration changed
    pub fn shelf_for(&self, storage: &Storage) -> Result<Arc<Shelf>> {
        if let Some(shelf) = self.shelves.get(&storage.name) {
            if shelf.device == storage.device {
                return Ok(Arc::clone(shelf.value()));
            }
            debug!("Device configuration of {} changed, rebuilding shelf", storage.name);
        }

        let driver = DriverFactory::create(storage, &self.options)?;
        let shelf = Arc::new(Shelf::new(
            &storage.name,
            storage.device.clone(),
            driver,
            self.runner.clone(),
        ));
        self.shelves.insert(storage.name.clone(), Arc::clone(&shelf));
        Ok(shelf)
    }

    /// Install a shelf with an explicit driver
    pub fn insert(&self, storage: &Storage, driver: LedDriverRef) -> Arc<Shelf> {
        let shelf = Arc::new(Shelf::new(
            &storage.name,
            storage.device.clone(),
            driver,
            self.runner.clone(),
        ));
        self.shelves.insert(storage.name.clone(), Arc::clone(&shelf));
        shelf
    }

    /// Number of cached shelves
    pub fn len(&self) -> usize {
        self.shelves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shelves.is_empty()
    }

    /// Reset every storage concurrently; one slow rack does not hold up the others
    pub async fn reset_all(&self, storages: &[Storage], working_light: bool) -> BTreeMap<String, Result<()>> {
        let resets = storages.iter().map(|storage| async move {
            let result = match self.shelf_for(storage) {
                Ok(shelf) => shelf.reset(working_light).await,
                Err(e) => Err(e),
            };
            (storage.name.clone(), result)
        });

        let results: BTreeMap<_, _> = join_all(resets).await.into_iter().collect();
        let failed = results.values().filter(|r| r.is_err()).count();
        info!("Reset {} storages ({} failed)", results.len(), failed);
        results
    }

    /// Health of every storage's controller
    pub async fn health(&self, storages: &[Storage]) -> BTreeMap<String, bool> {
        let checks = storages.iter().map(|storage| async move {
            let healthy = match self.shelf_for(storage) {
                Ok(shelf) => shelf.health_check().await.unwrap_or(false),
                Err(e) => {
                    warn!("No shelf for {}: {}", storage.name, e);
                    false
                }
            };
            (storage.name.clone(), healthy)
        });
        join_all(checks).await.into_iter().collect()
    }
}
