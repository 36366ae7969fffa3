// ── Runtime synchronization configuration ──
//
// Timing and scope knobs for the engine. Core never reads config files;
// `pfwatch-config` builds a `SyncConfig` from a profile and hands it in.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::error::CoreError;
use crate::model::Category;

/// Configuration for one synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between scheduled poll cycles.
    pub poll_interval: Duration,
    /// Upper bound for a single RPC round trip.
    pub call_timeout: Duration,
    /// How long a poll cycle waits for the session before skipping the tick.
    pub cycle_lease_wait: Duration,
    /// How long a background task waits for the session.
    pub task_lease_wait: Duration,
    /// Upper bound for a standard background task, lease wait included.
    pub task_timeout: Duration,
    /// Upper bound for a firmware update task.
    pub firmware_update_timeout: Duration,
    /// Categories fetched each cycle, in fetch order.
    pub categories: Vec<Category>,
    /// Categories whose failure marks the whole snapshot unsuccessful
    /// (device considered down). When empty, a cycle is successful as
    /// long as any category succeeded.
    pub critical: Vec<Category>,
    /// Snapshots older than this are treated as absent.
    pub max_snapshot_age: Duration,
    /// Consecutive failures after which a failed category is reported
    /// `Unavailable` instead of `UnknownButDeviceUp`.
    pub persistent_failure_threshold: u32,
    /// Categories fetched less often than every cycle. Between fetches the
    /// previous state of such a category is carried into each snapshot.
    pub category_intervals: BTreeMap<Category, Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let poll_interval = Duration::from_secs(30);
        Self {
            poll_interval,
            call_timeout: Duration::from_secs(20),
            cycle_lease_wait: Duration::from_secs(10),
            task_lease_wait: Duration::from_secs(120),
            task_timeout: Duration::from_secs(120),
            firmware_update_timeout: Duration::from_secs(30 * 60),
            categories: Category::DEFAULT_SET.to_vec(),
            critical: vec![Category::System],
            max_snapshot_age: poll_interval * 3,
            persistent_failure_threshold: 3,
            category_intervals: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    /// Set the poll interval and scale the staleness bound with it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.max_snapshot_age = interval * 3;
        self
    }

    /// Fetch `category` at most once per `interval` instead of every cycle.
    pub fn with_category_interval(mut self, category: Category, interval: Duration) -> Self {
        self.category_intervals.insert(category, interval);
        self
    }

    /// Add `category` to the polled set if it is not already there.
    pub fn with_category(mut self, category: Category) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let durations = [
            ("poll_interval", self.poll_interval),
            ("call_timeout", self.call_timeout),
            ("cycle_lease_wait", self.cycle_lease_wait),
            ("task_lease_wait", self.task_lease_wait),
            ("task_timeout", self.task_timeout),
            ("firmware_update_timeout", self.firmware_update_timeout),
            ("max_snapshot_age", self.max_snapshot_age),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(CoreError::config(format!("{name} must be greater than zero")));
        }

        if self.cycle_lease_wait >= self.poll_interval {
            return Err(CoreError::config(format!(
                "cycle_lease_wait ({:?}) must be shorter than poll_interval ({:?})",
                self.cycle_lease_wait, self.poll_interval
            )));
        }

        if self.categories.is_empty() {
            return Err(CoreError::config("at least one category must be enabled"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.categories.iter().find(|c| !seen.insert(**c)) {
            return Err(CoreError::config(format!("category {dup} listed twice")));
        }
        if let Some(missing) = self.critical.iter().find(|c| !seen.contains(*c)) {
            return Err(CoreError::config(format!(
                "critical category {missing} is not enabled"
            )));
        }

        for (category, interval) in &self.category_intervals {
            if !seen.contains(category) {
                return Err(CoreError::config(format!(
                    "interval set for {category}, which is not enabled"
                )));
            }
            if interval.is_zero() {
                return Err(CoreError::config(format!(
                    "interval for {category} must be greater than zero"
                )));
            }
        }

        if self.persistent_failure_threshold == 0 {
            return Err(CoreError::config(
                "persistent_failure_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}
