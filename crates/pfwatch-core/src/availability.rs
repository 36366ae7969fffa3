// ── Availability policy ──
//
// Turns the current snapshot into a per-value verdict for consumers. The
// point is to tell "the appliance is unreachable" apart from "the
// appliance is up but this particular value is missing".

use std::time::Duration;

use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::model::{
    CarpStatus, Category, CategoryRecord, FirmwareStatus, InterfaceStats, LoadPeriod,
};
use crate::store::Snapshot;

/// Verdict for one exposed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability<V> {
    Available(V),
    /// The device is down, the data is stale, or the category has failed
    /// persistently.
    Unavailable,
    /// The device answered this cycle but this value could not be read.
    UnknownButDeviceUp,
}

impl<V> Availability<V> {
    pub fn value(self) -> Option<V> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable | Self::UnknownButDeviceUp => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Availability<U> {
        match self {
            Self::Available(v) => Availability::Available(f(v)),
            Self::Unavailable => Availability::Unavailable,
            Self::UnknownButDeviceUp => Availability::UnknownButDeviceUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    pub max_snapshot_age: Duration,
    pub persistent_failure_threshold: u32,
}

impl AvailabilityPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_snapshot_age: config.max_snapshot_age,
            persistent_failure_threshold: config.persistent_failure_threshold,
        }
    }

    /// Evaluate one value of `category`, picked out of its record by
    /// `select`.
    ///
    /// Rules, first match wins:
    /// 1. no snapshot, or the category is not polled: `Unavailable`
    /// 2. snapshot older than `max_snapshot_age`: `Unavailable`
    /// 3. snapshot not successful (device down): `Unavailable`
    /// 4. category `Ok` and `select` finds the value: `Available`
    /// 5. category `Ok` but the value is absent: `UnknownButDeviceUp`
    /// 6. category failed `persistent_failure_threshold` times in a row:
    ///    `Unavailable`, otherwise `UnknownButDeviceUp`
    pub fn evaluate<'a, V>(
        &self,
        snapshot: Option<&'a Snapshot>,
        category: Category,
        select: impl FnOnce(&'a CategoryRecord) -> Option<V>,
    ) -> Availability<V> {
        self.evaluate_at(Instant::now(), snapshot, category, select)
    }

    pub fn evaluate_at<'a, V>(
        &self,
        now: Instant,
        snapshot: Option<&'a Snapshot>,
        category: Category,
        select: impl FnOnce(&'a CategoryRecord) -> Option<V>,
    ) -> Availability<V> {
        let Some(snapshot) = snapshot else {
            return Availability::Unavailable;
        };
        if now.saturating_duration_since(snapshot.completed_instant()) > self.max_snapshot_age {
            return Availability::Unavailable;
        }
        if !snapshot.success {
            return Availability::Unavailable;
        }
        let Some(state) = snapshot.category(category) else {
            return Availability::Unavailable;
        };
        match state.outcome.record() {
            Some(record) => match select(record) {
                Some(value) => Availability::Available(value),
                None => Availability::UnknownButDeviceUp,
            },
            None if state.consecutive_failures >= self.persistent_failure_threshold => {
                Availability::Unavailable
            }
            None => Availability::UnknownButDeviceUp,
        }
    }

    // ── Convenience evaluators ───────────────────────────────────────

    pub fn interface<'a>(
        &self,
        snapshot: Option<&'a Snapshot>,
        name: &str,
    ) -> Availability<&'a InterfaceStats> {
        self.evaluate(snapshot, Category::Interfaces, |r| {
            r.as_interfaces()?.iter().find(|i| i.name == name)
        })
    }

    pub fn load_average(&self, snapshot: Option<&Snapshot>, period: LoadPeriod) -> Availability<f64> {
        self.evaluate(snapshot, Category::Load, |r| {
            r.as_load()?
                .iter()
                .find(|l| l.period == period)
                .map(|l| l.value)
        })
    }

    pub fn firmware<'a>(&self, snapshot: Option<&'a Snapshot>) -> Availability<&'a FirmwareStatus> {
        self.evaluate(snapshot, Category::Firmware, CategoryRecord::as_firmware)
    }

    pub fn dhcp_lease_count(&self, snapshot: Option<&Snapshot>) -> Availability<usize> {
        self.evaluate(snapshot, Category::Dhcp, |r| r.as_dhcp().map(<[_]>::len))
    }

    pub fn vpn_session_count(&self, snapshot: Option<&Snapshot>) -> Availability<usize> {
        self.evaluate(snapshot, Category::Vpn, |r| r.as_vpn().map(<[_]>::len))
    }

    pub fn carp<'a>(&self, snapshot: Option<&'a Snapshot>) -> Availability<&'a CarpStatus> {
        self.evaluate(snapshot, Category::Carp, CategoryRecord::as_carp)
    }
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::LoadAverage;
    use crate::store::{CycleBuilder, FetchFailure, FetchFailureKind, FetchOutcome};

    const CATS: [Category; 2] = [Category::System, Category::Load];

    fn system_ok() -> FetchOutcome {
        FetchOutcome::Ok(CategoryRecord::System(crate::model::SystemRecord {
            hostname: "fw".into(),
            domain: "lan".into(),
            device_id: "abc".into(),
            platform: None,
        }))
    }

    fn load_ok(periods: &[LoadPeriod]) -> FetchOutcome {
        FetchOutcome::Ok(CategoryRecord::Load(
            periods
                .iter()
                .map(|&period| LoadAverage { period, value: 0.5 })
                .collect(),
        ))
    }

    fn failed() -> FetchOutcome {
        FetchOutcome::Failed(FetchFailure::new(FetchFailureKind::Timeout, "slow"))
    }

    fn cycle(previous: Option<&Snapshot>, system: FetchOutcome, load: FetchOutcome) -> Snapshot {
        let cycle = previous.map_or(1, |p| p.cycle + 1);
        let mut b = CycleBuilder::new(cycle, &CATS);
        b.record(Category::System, system);
        b.record(Category::Load, load);
        b.finish(previous, &[Category::System])
    }

    #[test]
    fn no_snapshot_is_unavailable() {
        let policy = AvailabilityPolicy::default();
        assert_eq!(
            policy.load_average(None, LoadPeriod::OneMinute),
            Availability::Unavailable
        );
    }

    #[test]
    fn stale_snapshot_is_unavailable() {
        let policy = AvailabilityPolicy::default();
        let snap = cycle(None, system_ok(), load_ok(&LoadPeriod::ALL));
        let later = snap.completed_instant() + policy.max_snapshot_age + Duration::from_secs(1);

        let verdict = policy.evaluate_at(later, Some(&snap), Category::Load, CategoryRecord::as_load);

        assert!(matches!(verdict, Availability::Unavailable));
    }

    #[test]
    fn device_down_hides_everything() {
        let policy = AvailabilityPolicy::default();
        let snap = cycle(None, failed(), load_ok(&LoadPeriod::ALL));
        assert!(!snap.success);
        assert_eq!(
            policy.load_average(Some(&snap), LoadPeriod::OneMinute),
            Availability::Unavailable
        );
    }

    #[test]
    fn present_and_absent_values() {
        let policy = AvailabilityPolicy::default();
        let snap = cycle(None, system_ok(), load_ok(&[LoadPeriod::OneMinute]));

        assert_eq!(
            policy.load_average(Some(&snap), LoadPeriod::OneMinute),
            Availability::Available(0.5)
        );
        assert_eq!(
            policy.load_average(Some(&snap), LoadPeriod::FifteenMinutes),
            Availability::UnknownButDeviceUp
        );
        assert!(matches!(policy.interface(Some(&snap), "wan"), Availability::Unavailable));
    }

    #[test]
    fn failures_turn_unavailable_after_threshold() {
        let policy = AvailabilityPolicy {
            persistent_failure_threshold: 2,
            ..AvailabilityPolicy::default()
        };
        let first = cycle(None, system_ok(), failed());
        assert_eq!(
            policy.load_average(Some(&first), LoadPeriod::OneMinute),
            Availability::UnknownButDeviceUp
        );

        let second = cycle(Some(&first), system_ok(), failed());
        assert_eq!(
            policy.load_average(Some(&second), LoadPeriod::OneMinute),
            Availability::Unavailable
        );

        let third = cycle(Some(&second), system_ok(), load_ok(&LoadPeriod::ALL));
        assert!(policy.load_average(Some(&third), LoadPeriod::OneMinute).is_available());
    }
}
