use thiserror::Error;

/// Errors returned by the propagation engine.
///
/// Every variant carries the snapshot version in effect when it was raised so
/// callers can reproduce the failing query against the same data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// The entity is not part of the active snapshot. Callers should refresh
    /// their entity list.
    #[error("unknown entity '{entity_id}' (snapshot v{snapshot_version})")]
    UnknownEntity {
        entity_id: String,
        snapshot_version: u64,
    },

    /// An aggregate query resolved to zero entities.
    #[error("scope {scope} matches no entities (snapshot v{snapshot_version})")]
    InvalidScope {
        scope: String,
        snapshot_version: u64,
    },

    /// The entity exists but has no observations to derive a trend from.
    #[error("entity '{entity_id}' has no observations (snapshot v{snapshot_version})")]
    InsufficientData {
        entity_id: String,
        snapshot_version: u64,
    },

    /// A rebuild was requested while another was still running. Not queued.
    #[error("rebuild already in progress (active snapshot v{snapshot_version})")]
    RebuildInProgress { snapshot_version: u64 },

    #[error("invalid parameter {name}: {reason} (snapshot v{snapshot_version})")]
    InvalidParameter {
        name: &'static str,
        reason: String,
        snapshot_version: u64,
    },

    /// Rebuild input rejected; the active snapshot is untouched.
    #[error("invalid snapshot input at entity '{entity_id}': {reason} (active snapshot v{snapshot_version})")]
    InvalidSnapshot {
        entity_id: String,
        reason: String,
        snapshot_version: u64,
    },

    /// The built graph failed its consistency check; the rebuild was aborted.
    #[error("graph build failed: {reason} (active snapshot v{snapshot_version})")]
    GraphBuild {
        reason: String,
        snapshot_version: u64,
    },
}

impl EngineError {
    /// Snapshot version the error was raised against.
    #[must_use]
    pub fn snapshot_version(&self) -> u64 {
        match self {
            EngineError::UnknownEntity {
                snapshot_version, ..
            }
            | EngineError::InvalidScope {
                snapshot_version, ..
            }
            | EngineError::InsufficientData {
                snapshot_version, ..
            }
            | EngineError::RebuildInProgress { snapshot_version }
            | EngineError::InvalidParameter {
                snapshot_version, ..
            }
            | EngineError::InvalidSnapshot {
                snapshot_version, ..
            }
            | EngineError::GraphBuild {
                snapshot_version, ..
            } => *snapshot_version,
        }
    }

    /// Whether the caller can reasonably retry or adjust and try again.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::GraphBuild { .. })
    }
}
