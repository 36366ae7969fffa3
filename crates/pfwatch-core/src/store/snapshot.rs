// ── Snapshot and cycle assembly ──
//
// A `Snapshot` is everything one poll cycle learned, frozen. It is built
// in a `CycleBuilder` that starts with every enabled category pending and
// is only turned into a snapshot once the whole cycle has resolved.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use pfwatch_api::RpcErrorKind;

use crate::error::CoreError;
use crate::model::{Category, CategoryRecord};

// ── Fetch outcomes ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Transport,
    Auth,
    RemoteFault,
    Timeout,
    /// The appliance answered but the data was malformed or incomplete.
    Validation,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::RemoteFault => "remote_fault",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
        })
    }
}

impl From<RpcErrorKind> for FetchFailureKind {
    fn from(kind: RpcErrorKind) -> Self {
        match kind {
            RpcErrorKind::Transport => Self::Transport,
            RpcErrorKind::Auth => Self::Auth,
            RpcErrorKind::RemoteFault => Self::RemoteFault,
            RpcErrorKind::Timeout => Self::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<pfwatch_api::Error> for FetchFailure {
    fn from(err: pfwatch_api::Error) -> Self {
        let kind = match err {
            pfwatch_api::Error::Deserialization { .. } => FetchFailureKind::Validation,
            ref other => other.kind().into(),
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CoreError> for FetchFailure {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Rpc { kind, .. } => (*kind).into(),
            CoreError::LeaseTimeout { .. } => FetchFailureKind::Timeout,
            _ => FetchFailureKind::Validation,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of fetching one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FetchOutcome {
    Ok(CategoryRecord),
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn record(&self) -> Option<&CategoryRecord> {
        match self {
            Self::Ok(record) => Some(record),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            Self::Ok(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// One category's entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryState {
    pub outcome: FetchOutcome,
    pub fetched_at: DateTime<Utc>,
    /// Failures in a row, including this one. Zero when `outcome` is `Ok`.
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// One cycle's fully aggregated, immutable state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// `false` means the device is considered down for this cycle.
    pub success: bool,
    completed: Instant,
    categories: BTreeMap<Category, CategoryState>,
}

impl Snapshot {
    pub fn category(&self, category: Category) -> Option<&CategoryState> {
        self.categories.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (Category, &CategoryState)> {
        self.categories.iter().map(|(c, s)| (*c, s))
    }

    /// The record for `category`, if it was fetched successfully.
    pub fn record(&self, category: Category) -> Option<&CategoryRecord> {
        self.category(category)?.outcome.record()
    }

    pub fn failed_categories(&self) -> Vec<Category> {
        self.categories()
            .filter(|(_, s)| !s.outcome.is_ok())
            .map(|(c, _)| c)
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        self.categories.values().all(|s| !s.outcome.is_ok())
    }

    /// Monotonic completion time, used for staleness checks.
    pub fn completed_instant(&self) -> Instant {
        self.completed
    }
}

// ── Cycle builder ────────────────────────────────────────────────────

/// Accumulates one cycle's outcomes. Every enabled category starts
/// pending; nothing is inherited from earlier cycles except the failure
/// history applied in [`finish`](Self::finish) and states passed to
/// [`carry`](Self::carry) for categories not due this cycle.
#[derive(Debug)]
pub struct CycleBuilder {
    cycle: u64,
    started_at: DateTime<Utc>,
    slots: BTreeMap<Category, Slot>,
}

#[derive(Debug)]
enum Slot {
    Pending,
    Fetched(FetchOutcome, DateTime<Utc>),
    Carried(CategoryState),
}

impl CycleBuilder {
    pub fn new(cycle: u64, categories: &[Category]) -> Self {
        Self {
            cycle,
            started_at: Utc::now(),
            slots: categories.iter().map(|c| (*c, Slot::Pending)).collect(),
        }
    }

    /// Record the outcome for `category`. Outcomes for categories this
    /// cycle does not track are dropped.
    pub fn record(&mut self, category: Category, outcome: FetchOutcome) {
        if let Some(slot) = self.slots.get_mut(&category) {
            *slot = Slot::Fetched(outcome, Utc::now());
        }
    }

    /// Reuse an earlier state for `category` unchanged, counters included.
    pub fn carry(&mut self, category: Category, state: CategoryState) {
        if let Some(slot) = self.slots.get_mut(&category) {
            *slot = Slot::Carried(state);
        }
    }

    pub fn pending(&self) -> Vec<Category> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Pending))
            .map(|(c, _)| *c)
            .collect()
    }

    /// Freeze the cycle. Still-pending categories become failures;
    /// failure counters continue from `previous`.
    ///
    /// `success` requires every `critical` category to be `Ok`; with no
    /// critical categories, any single success is enough.
    pub fn finish(self, previous: Option<&Snapshot>, critical: &[Category]) -> Snapshot {
        let completed_at = Utc::now();
        let categories: BTreeMap<_, _> = self
            .slots
            .into_iter()
            .map(|(category, slot)| {
                let (outcome, fetched_at) = match slot {
                    Slot::Carried(state) => return (category, state),
                    Slot::Fetched(outcome, fetched_at) => (outcome, fetched_at),
                    Slot::Pending => (
                        FetchOutcome::Failed(FetchFailure::new(
                            FetchFailureKind::Timeout,
                            "not fetched before the cycle ended",
                        )),
                        completed_at,
                    ),
                };
                let before = previous.and_then(|p| p.category(category));
                let state = if outcome.is_ok() {
                    CategoryState {
                        outcome,
                        fetched_at,
                        consecutive_failures: 0,
                        last_success_at: Some(fetched_at),
                    }
                } else {
                    CategoryState {
                        outcome,
                        fetched_at,
                        consecutive_failures: before
                            .map_or(0, |b| b.consecutive_failures)
                            .saturating_add(1),
                        last_success_at: before.and_then(|b| b.last_success_at),
                    }
                };
                (category, state)
            })
            .collect();

        let success = if critical.is_empty() {
            categories.values().any(|s| s.outcome.is_ok())
        } else {
            critical
                .iter()
                .all(|c| categories.get(c).is_some_and(|s| s.outcome.is_ok()))
        };

        Snapshot {
            cycle: self.cycle,
            started_at: self.started_at,
            completed_at,
            success,
            completed: Instant::now(),
            categories,
        }
    }
}
