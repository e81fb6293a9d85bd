//! Backup-log replay and observable sync state.

mod orchestrator;
mod status;

pub use orchestrator::{SyncOrchestrator, SyncOutcome, DEFAULT_STUCK_AFTER_ATTEMPTS};
pub use status::{ObserverId, SyncObserver, SyncSnapshot, SyncStatusBroadcaster};
