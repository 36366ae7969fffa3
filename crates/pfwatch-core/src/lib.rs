//! State synchronization engine for pfSense-class firewall appliances.
//!
//! Sits between `pfwatch-api` and whatever presents appliance state
//! (sensors, dashboards, automations):
//!
//! - **[`SyncEngine`]**: Facade for one appliance. [`start()`](SyncEngine::start)
//!   spawns the periodic poll loop; [`refresh_now()`](SyncEngine::refresh_now)
//!   runs a cycle on demand; operator actions start background tasks.
//!
//! - **[`Coordinator`]**: Runs one poll cycle at a time: takes the session
//!   lease, fetches every enabled [`Category`] in order, aggregates, and
//!   publishes. Overlapping refresh requests coalesce.
//!
//! - **[`SnapshotStore`]**: Holds the current [`Snapshot`] behind an atomic
//!   pointer. A snapshot is replaced wholesale, never mutated.
//!
//! - **[`TaskRunner`]**: Long operations (firmware, state table, commands,
//!   gateway changes) as [`BackgroundTaskHandle`]s with observable state,
//!   sharing the session lease with the poller.
//!
//! - **[`AvailabilityPolicy`]**: Distinguishes "device unreachable" from
//!   "device up, value missing" for each exposed value.

pub mod availability;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod lease;
pub mod model;
pub mod store;
pub mod tasks;

// ── Primary re-exports ──────────────────────────────────────────────
pub use availability::{Availability, AvailabilityPolicy};
pub use config::SyncConfig;
pub use coordinator::{Coordinator, CyclePhase};
pub use engine::SyncEngine;
pub use error::CoreError;
pub use lease::{LeaseHolder, SessionLease};
pub use store::{
    CategoryState, CycleBuilder, CycleOutcome, CycleReport, FetchFailure, FetchFailureKind,
    FetchOutcome, Snapshot, SnapshotStore,
};
pub use tasks::{
    BackgroundTaskHandle, StartPolicy, TaskFailure, TaskFailureKind, TaskKind, TaskOutput,
    TaskRequest, TaskRunner, TaskState,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ArpEntry, CarpState, CarpStatus, CarpVip, Category, CategoryRecord, DhcpLease, FirmwareStatus,
    InterfaceStats, LeaseState, LoadAverage, LoadPeriod, SystemRecord, VpnKind, VpnSession,
};
