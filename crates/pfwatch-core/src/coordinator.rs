// ── Poll coordinator ──
//
// Drives one poll cycle at a time: take the session lease, run every
// enabled category fetcher in order, release the lease, aggregate, and
// publish. Failures are logged and captured, never retried within the
// cycle; the next tick is the retry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pfwatch_api::RpcTransport;

use crate::config::SyncConfig;
use crate::fetch::fetch_category;
use crate::lease::{LeaseHolder, Session};
use crate::model::Category;
use crate::store::{
    CategoryState, CycleBuilder, CycleOutcome, CycleReport, FetchOutcome, Snapshot, SnapshotStore,
};

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    AcquiringLease { cycle: u64 },
    Fetching {
        cycle: u64,
        category: Category,
        index: usize,
        total: usize,
    },
    Aggregating { cycle: u64 },
    Publishing { cycle: u64 },
}

/// Runs poll cycles against one appliance session. Cheap to clone.
pub struct Coordinator<T> {
    inner: Arc<CoordinatorInner<T>>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<T> {
    session: Session<T>,
    store: Arc<SnapshotStore>,
    categories: Vec<Category>,
    critical: Vec<Category>,
    intervals: BTreeMap<Category, Duration>,
    lease_wait: Duration,
    phase: watch::Sender<CyclePhase>,
    /// Held for the duration of a cycle; `try_lock` failing means a cycle
    /// is already running.
    cycle: Mutex<CycleHistory>,
    running_cycle: AtomicU64,
}

#[derive(Default)]
struct CycleHistory {
    last_cycle: u64,
    /// Last assembled snapshot, published or not. Failure counters
    /// continue from here.
    last_assembled: Option<Arc<Snapshot>>,
    /// When each category with its own interval was last fetched.
    last_fetched: HashMap<Category, Instant>,
}

impl CycleHistory {
    /// The previous state of `category` if it has its own interval and
    /// that interval has not elapsed since its last fetch.
    fn carried_state(
        &self,
        category: Category,
        intervals: &BTreeMap<Category, Duration>,
        now: Instant,
    ) -> Option<CategoryState> {
        let interval = intervals.get(&category)?;
        let fetched = self.last_fetched.get(&category)?;
        if now.saturating_duration_since(*fetched) >= *interval {
            return None;
        }
        self.last_assembled
            .as_ref()?
            .category(category)
            .cloned()
    }
}

/// Resets the phase to `Idle` when a cycle ends or is dropped midway.
struct PhaseGuard<'a>(&'a watch::Sender<CyclePhase>);

impl PhaseGuard<'_> {
    fn set(&self, phase: CyclePhase) {
        self.0.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(CyclePhase::Idle);
    }
}

impl<T: RpcTransport> Coordinator<T> {
    pub(crate) fn new(session: Session<T>, store: Arc<SnapshotStore>, config: &SyncConfig) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            inner: Arc::new(CoordinatorInner {
                session,
                store,
                categories: config.categories.clone(),
                critical: config.critical.clone(),
                intervals: config.category_intervals.clone(),
                lease_wait: config.cycle_lease_wait,
                phase,
                cycle: Mutex::new(CycleHistory::default()),
                running_cycle: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.inner.store
    }

    pub fn phase(&self) -> CyclePhase {
        *self.inner.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.inner.phase.subscribe()
    }

    /// Run one poll cycle now.
    ///
    /// If a cycle is already running this returns immediately with
    /// `CycleOutcome::Coalesced`; the running cycle serves the request.
    pub async fn run_cycle(&self) -> CycleReport {
        let Ok(mut history) = self.inner.cycle.try_lock() else {
            let running = self.inner.running_cycle.load(Ordering::Acquire);
            debug!(cycle = running, "refresh coalesced into running cycle");
            let now = Utc::now();
            return CycleReport {
                cycle: running,
                outcome: CycleOutcome::Coalesced,
                started_at: now,
                finished_at: now,
                failed: Vec::new(),
            };
        };

        history.last_cycle += 1;
        let cycle = history.last_cycle;
        self.inner.running_cycle.store(cycle, Ordering::Release);
        let phase = PhaseGuard(&self.inner.phase);
        let started_at = Utc::now();
        let started = Instant::now();
        debug!(cycle, "poll cycle starting");

        phase.set(CyclePhase::AcquiringLease { cycle });
        let lease = match self
            .inner
            .session
            .acquire(LeaseHolder::Poller { cycle }, self.inner.lease_wait)
            .await
        {
            Ok(lease) => lease,
            Err(e) => {
                warn!(cycle, error = %e, "poll cycle skipped; keeping previous snapshot");
                return self.report(cycle, CycleOutcome::LeaseTimeout, started_at, Vec::new());
            }
        };

        let total = self.inner.categories.len();
        let mut builder = CycleBuilder::new(cycle, &self.inner.categories);
        for (index, &category) in self.inner.categories.iter().enumerate() {
            if let Some(state) = history.carried_state(category, &self.inner.intervals, started) {
                debug!(cycle, %category, "category not due; carrying previous state");
                builder.carry(category, state);
                continue;
            }
            if self.inner.intervals.contains_key(&category) {
                history.last_fetched.insert(category, started);
            }
            phase.set(CyclePhase::Fetching {
                cycle,
                category,
                index,
                total,
            });
            let outcome = fetch_category(&lease, category).await;
            if let FetchOutcome::Failed(failure) = &outcome {
                warn!(
                    cycle,
                    %category,
                    kind = %failure.kind,
                    error = %failure.message,
                    "category fetch failed"
                );
            }
            builder.record(category, outcome);
        }
        drop(lease);

        phase.set(CyclePhase::Aggregating { cycle });
        let snapshot = Arc::new(builder.finish(history.last_assembled.as_deref(), &self.inner.critical));
        history.last_assembled = Some(Arc::clone(&snapshot));
        let failed = snapshot.failed_categories();

        if snapshot.all_failed() {
            warn!(cycle, "every category failed; keeping previous snapshot");
            return self.report(cycle, CycleOutcome::AllFailed, started_at, failed);
        }

        phase.set(CyclePhase::Publishing { cycle });
        let success = snapshot.success;
        self.inner.store.publish(snapshot);
        if success {
            debug!(cycle, failed = failed.len(), "snapshot published");
        } else {
            info!(cycle, ?failed, "snapshot published; device considered down");
        }
        self.report(cycle, CycleOutcome::Published { success }, started_at, failed)
    }

    fn report(
        &self,
        cycle: u64,
        outcome: CycleOutcome,
        started_at: chrono::DateTime<Utc>,
        failed: Vec<Category>,
    ) -> CycleReport {
        let report = CycleReport {
            cycle,
            outcome,
            started_at,
            finished_at: Utc::now(),
            failed,
        };
        self.inner.store.record_cycle(report.clone());
        report
    }
}

/// Early-cycle requests for the poll loop.
///
/// Requests only count while the loop is armed; one made while no loop
/// runs is dropped instead of firing an extra cycle on the next start.
#[derive(Debug, Default)]
pub(crate) struct RefreshTrigger {
    notify: Notify,
    armed: AtomicBool,
}

impl RefreshTrigger {
    pub(crate) fn request(&self) {
        if self.armed.load(Ordering::Acquire) {
            self.notify.notify_one();
        }
    }

    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Run cycles on every tick of `period` and whenever `refresh` is
/// requested, until `cancel` fires. The first tick fires immediately.
/// The caller arms `refresh` before spawning; the loop disarms it on exit.
pub(crate) async fn poll_task<T: RpcTransport>(
    coordinator: Coordinator<T>,
    period: Duration,
    refresh: Arc<RefreshTrigger>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
            () = refresh.requested() => {
                debug!("refresh requested");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = coordinator.run_cycle() => {}
        }
    }
    refresh.disarm();
    debug!("poll loop stopped");
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn refresh_requests_need_an_armed_trigger() {
        let trigger = RefreshTrigger::default();
        trigger.request();
        let mut waiter = task::spawn(trigger.requested());
        assert_pending!(waiter.poll());
        drop(waiter);

        trigger.arm();
        trigger.request();
        let mut waiter = task::spawn(trigger.requested());
        assert_ready!(waiter.poll());

        trigger.disarm();
        trigger.request();
        let mut waiter = task::spawn(trigger.requested());
        assert_pending!(waiter.poll());
    }
}
