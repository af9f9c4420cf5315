//! Inventory Module
//!
//! In-memory adapter for the inventory store port and the snapshot files
//! it is loaded from.

pub mod memory;
pub mod snapshot;

pub use memory::*;
pub use snapshot::*;
