//! Sync status broadcaster.
//!
//! One owned instance is shared as `Arc<SyncStatusBroadcaster>` by the
//! orchestrator and the domain services. Consumers either subscribe to the
//! `watch` channel or register a weakly held [`SyncObserver`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::watch;

use crate::models::{SyncProgress, SyncStatus};

/// Everything observers see about the engine at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub progress: SyncProgress,
    pub unsynced_count: usize,
    /// Pending operations that reached the retry threshold
    pub stuck_count: usize,
}

/// Callback-style observer; held weakly by the broadcaster
pub trait SyncObserver: Send + Sync {
    fn on_sync_update(&self, snapshot: &SyncSnapshot);
}

/// Handle returned by [`SyncStatusBroadcaster::add_observer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverEntry = (ObserverId, Weak<dyn SyncObserver>);

pub struct SyncStatusBroadcaster {
    sender: watch::Sender<SyncSnapshot>,
    observers: Mutex<Vec<ObserverEntry>>,
    next_observer_id: AtomicU64,
}

impl std::fmt::Debug for SyncStatusBroadcaster {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncStatusBroadcaster")
            .field("snapshot", &*self.sender.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for SyncStatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncSnapshot::default());
        Self {
            sender,
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.sender.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.sender.borrow().status.clone()
    }

    #[must_use]
    pub fn progress(&self) -> SyncProgress {
        self.sender.borrow().progress.clone()
    }

    #[must_use]
    pub fn unsynced_count(&self) -> usize {
        self.sender.borrow().unsynced_count
    }

    /// Receiver that sees every published snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.sender.subscribe()
    }

    /// Set the status; setting the current status again still notifies.
    pub fn update_status(&self, status: SyncStatus) {
        tracing::debug!("Sync status: {}", status.describe());
        self.publish(|snapshot| snapshot.status = status);
    }

    pub fn update_progress(&self, progress: SyncProgress) {
        self.publish(|snapshot| snapshot.progress = progress);
    }

    pub fn set_unsynced_count(&self, count: usize) {
        self.publish(|snapshot| snapshot.unsynced_count = count);
    }

    pub fn set_stuck_count(&self, count: usize) {
        self.publish(|snapshot| snapshot.stuck_count = count);
    }

    /// Back to idle with empty progress; counts are kept
    pub fn reset(&self) {
        self.publish(|snapshot| {
            snapshot.status = SyncStatus::Idle;
            snapshot.progress = SyncProgress::default();
        });
    }

    pub fn add_observer(&self, observer: &Arc<dyn SyncObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.lock_observers().push((id, Arc::downgrade(observer)));
        id
    }

    /// Returns whether the observer was registered
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.lock_observers();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Number of registered observers that are still alive
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock_observers()
            .iter()
            .filter(|(_, observer)| observer.strong_count() > 0)
            .count()
    }

    fn publish(&self, modify: impl FnOnce(&mut SyncSnapshot)) {
        self.sender.send_modify(modify);
        let snapshot = self.snapshot();

        let live: Vec<Arc<dyn SyncObserver>> = {
            let mut observers = self.lock_observers();
            observers.retain(|(_, observer)| observer.strong_count() > 0);
            observers
                .iter()
                .filter_map(|(_, observer)| observer.upgrade())
                .collect()
        };

        // Called without the lock so observers may unregister themselves
        for observer in live {
            observer.on_sync_update(&snapshot);
        }
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<ObserverEntry>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
