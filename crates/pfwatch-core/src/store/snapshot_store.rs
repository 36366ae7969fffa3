// ── Snapshot store ──
//
// Holds the one current snapshot. Readers get an `Arc` and never see a
// half-written state; publishing swaps the pointer and then notifies.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::snapshot::Snapshot;
use crate::model::Category;

/// How a poll cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A new snapshot was published. `success` mirrors `Snapshot::success`.
    Published { success: bool },
    /// The session was busy for longer than the cycle was willing to wait.
    LeaseTimeout,
    /// Every category failed; the previous snapshot was kept.
    AllFailed,
    /// Another cycle was already running and served this request.
    Coalesced,
}

/// Summary of one poll cycle attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Categories that failed (empty unless the cycle fetched anything).
    pub failed: Vec<Category>,
}

/// Owner of the current snapshot.
///
/// Reads are lock-free. Subscribers are notified after every publish.
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
    published: watch::Sender<Option<Arc<Snapshot>>>,
    last_cycle: watch::Sender<Option<CycleReport>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (published, _) = watch::channel(None);
        let (last_cycle, _) = watch::channel(None);
        Self {
            current: ArcSwapOption::empty(),
            published,
            last_cycle,
        }
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: Arc<Snapshot>) {
        self.current.store(Some(Arc::clone(&snapshot)));
        self.published.send_replace(Some(snapshot));
    }

    /// The most recent snapshot, or `None` before the first publish.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.published.subscribe()
    }

    pub(crate) fn record_cycle(&self, report: CycleReport) {
        self.last_cycle.send_replace(Some(report));
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.borrow().clone()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
