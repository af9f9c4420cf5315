//! Slot Topology Module
//!
//! Logical slot identity, combined slots and free-slot search.

pub mod slots;

pub use slots::*;
