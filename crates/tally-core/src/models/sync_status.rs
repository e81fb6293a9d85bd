//! Observable state of the sync engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EntityType;

/// Details about a replay the server rejected as conflicting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub entity_id: i64,
    pub entity_type: EntityType,
    pub message: String,
}

/// Reason a sync pass ended in the failed state
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SyncError {
    #[error("{0} operation(s) are still waiting to sync")]
    UnsyncedOperations(usize),
    #[error("local storage failed during sync: {0}")]
    Storage(String),
}

/// Sync lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Completed,
    Conflict(ConflictInfo),
    Failed(SyncError),
}

impl SyncStatus {
    #[must_use]
    pub const fn is_syncing(&self) -> bool {
        matches!(self, Self::Syncing)
    }

    /// Short human-readable description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Idle => "Idle".to_string(),
            Self::Syncing => "Syncing".to_string(),
            Self::Completed => "Sync completed".to_string(),
            Self::Conflict(info) => format!(
                "Conflict on {} {}: {}",
                info.entity_type, info.entity_id, info.message
            ),
            Self::Failed(error) => format!("Sync failed: {error}"),
        }
    }
}

/// Progress of the current sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub total_operations: usize,
    pub completed_operations: usize,
    pub current_operation: String,
}

impl SyncProgress {
    #[must_use]
    pub fn new(total: usize, completed: usize, current: impl Into<String>) -> Self {
        Self {
            total_operations: total,
            completed_operations: completed,
            current_operation: current.into(),
        }
    }

    /// Fraction completed in `0.0..=1.0`; zero when there is nothing to do.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.completed_operations as f64 / self.total_operations as f64
    }
}
