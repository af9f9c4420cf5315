//! Domain layer - Inventory entities, LED vocabulary and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod led;
pub mod model;
pub mod ports;

pub use led::*;
pub use model::*;
pub use ports::*;
