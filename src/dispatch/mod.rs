//! Shelf dispatch: per-storage driver selection and background LED work

pub mod shelf;
pub mod tasks;

pub use shelf::*;
pub use tasks::*;
