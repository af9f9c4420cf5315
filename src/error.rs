//! Error types for the shelf dispatcher
//!
//! Provides structured error types for slot topology, LED drivers,
//! the shelf dispatcher and the store/collect workflows.

use thiserror::Error;

/// Why a slot merge was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeConflictReason {
    /// Candidates live in different storages
    CrossStorage,
    /// A candidate (or one of its members) holds a carrier
    Occupied,
    /// A candidate is nominated for a carrier or lit for a choice
    Nominated,
    /// Candidate closures already overlap
    AlreadyCombined,
    /// Fewer than two distinct slots were given
    NothingToMerge,
}

impl std::fmt::Display for MergeConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeConflictReason::CrossStorage => write!(f, "slots belong to different storages"),
            MergeConflictReason::Occupied => write!(f, "slots are occupied"),
            MergeConflictReason::Nominated => write!(f, "slots are nominated"),
            MergeConflictReason::AlreadyCombined => write!(f, "slots are already combined"),
            MergeConflictReason::NothingToMerge => write!(f, "at least two slots are required"),
        }
    }
}

/// Unified error type for the dispatcher
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Inventory Errors
    // =========================================================================
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("Scanned slot {scanned} does not match expected slot {expected}")]
    SlotMismatch { expected: String, scanned: String },

    #[error("Cannot combine slots {}: {reason}", slots.join(", "))]
    MergeConflict {
        reason: MergeConflictReason,
        slots: Vec<String>,
    },

    // =========================================================================
    // Device Errors
    // =========================================================================
    #[error("Device unreachable: {device} - {reason}")]
    DeviceUnreachable { device: String, reason: String },

    #[error("Invalid LED address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Unknown color: {0}")]
    InvalidColor(String),

    #[error("Device HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing entity
    pub fn not_found(kind: &str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Shorthand for a rejected workflow step
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::PreconditionFailed(message.into())
    }

    /// Stable tag used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::NotFound { .. } => "not_found",
            Error::PreconditionFailed(_) => "precondition_failed",
            Error::SlotMismatch { .. } => "slot_mismatch",
            Error::MergeConflict { .. } => "merge_conflict",
            Error::DeviceUnreachable { .. } | Error::Http(_) | Error::Io(_) => "device_unreachable",
            Error::InvalidAddress { .. } => "invalid_address",
            Error::InvalidColor(_) => "invalid_color",
            Error::JsonParse(_) | Error::YamlParse(_) => "parse",
        }
    }

    /// Hardware failures are advisory: logged, never surfaced as workflow failures
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnreachable { .. }
                | Error::Http(_)
                | Error::Io(_)
                | Error::InvalidAddress { .. }
        )
    }
}

/// Result type alias for the dispatcher
pub type Result<T> = std::result::Result<T, Error>;
