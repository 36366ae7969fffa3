mod snapshot;
mod snapshot_store;

pub use snapshot::{
    CategoryState, CycleBuilder, FetchFailure, FetchFailureKind, FetchOutcome, Snapshot,
};
pub use snapshot_store::{CycleOutcome, CycleReport, SnapshotStore};
