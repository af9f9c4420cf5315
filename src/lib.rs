//! Shelf Dispatch - LED slot addressing and store/collect workflows
//!
//! Warehouse racks hold component carriers (reels, trays, bags) in LED
//! addressable slots. This crate guides operators with light: it reserves
//! and lights slots when storing, lights carriers waiting to be collected,
//! and checks every scanned slot code against the expected slot.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Workflows                                   │
//! │        store (first free / choose)     collect (single / article /   │
//! │                                                  job / queue)        │
//! ├──────────────────────────────┬──────────────────────────────────────┤
//! │        Slot Topology         │          Shelf Dispatcher             │
//! │  closures, free slots, merge │   one shelf per storage, background   │
//! │                              │   LED tasks, delayed auto-off         │
//! ├──────────────────────────────┼──────────────────────────────────────┤
//! │       Inventory Store        │             Drivers                   │
//! │   (port; in-memory + YAML)   │  network batch | serial proxy |       │
//! │                              │  socket row/lamp | no-op              │
//! └──────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: Inventory entities, LED vocabulary and port traits
//! - [`inventory`]: In-memory inventory store and YAML snapshots
//! - [`topology`]: Logical slots over physical LED addresses
//! - [`drivers`]: One LED driver per controller family
//! - [`dispatch`]: Per-storage shelves and background LED work
//! - [`workflow`]: Store and collect state machines
//! - [`config`]: Controller configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod inventory;
pub mod topology;
pub mod workflow;

// Re-export commonly used types
pub use config::{DeviceConfig, DeviceFamily, DriverOptions};

pub use dispatch::{LedTaskRunner, Shelf, ShelfRegistry};

pub use domain::led::{Color, NativeAddress, Side};
pub use domain::model::{Article, Carrier, Job, JobStatus, LedState, SlotRef, Storage, StorageSlot};
pub use domain::ports::{
    CarrierFilter, InventoryStore, InventoryStoreRef, LedDriver, LedDriverRef, SlotSelector,
};

pub use drivers::DriverFactory;

pub use error::{Error, MergeConflictReason, Result};

pub use inventory::{InventorySnapshot, MemoryInventory};

pub use topology::SlotTopology;

pub use workflow::{Outcome, QueueEntry, WorkflowConfig, Workflows};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
