// ── Background task runner ──
//
// Long operator-triggered operations (firmware check/update, state table
// maintenance, ad-hoc commands, gateway changes) run as detached tokio
// tasks. Each borrows the appliance through the same session lease as the
// poller, so it can never interleave RPC calls with a poll cycle. At most
// one task per kind is in flight; a second start either joins the running
// one or is rejected, depending on the kind.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pfwatch_api::{GatewayName, PhpSnippet, RpcErrorKind, RpcTransport, ShellCommand, StateFilter};

use crate::config::SyncConfig;
use crate::convert;
use crate::coordinator::RefreshTrigger;
use crate::error::CoreError;
use crate::lease::{LeaseHolder, Session};
use crate::model::FirmwareStatus;

// ── Task kinds ───────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    FirmwareCheck,
    FirmwareUpdate,
    ExecPhp,
    ExecCommand,
    ResetStateTable,
    KillStates,
    SetDefaultGateway,
}

/// What happens when a task is started while one of the same kind runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    /// Hand back the running task's handle.
    Coalesce,
    /// Fail with `CoreError::AlreadyRunning`.
    Reject,
}

impl TaskKind {
    pub fn start_policy(self) -> StartPolicy {
        match self {
            Self::FirmwareCheck => StartPolicy::Coalesce,
            Self::FirmwareUpdate
            | Self::ExecPhp
            | Self::ExecCommand
            | Self::ResetStateTable
            | Self::KillStates
            | Self::SetDefaultGateway => StartPolicy::Reject,
        }
    }

    /// Whether a successful run changes what the poller would see.
    pub fn changes_state(self) -> bool {
        matches!(
            self,
            Self::FirmwareCheck
                | Self::FirmwareUpdate
                | Self::ResetStateTable
                | Self::KillStates
                | Self::SetDefaultGateway
        )
    }
}

/// A request to run one background operation.
#[derive(Debug, Clone)]
pub enum TaskRequest {
    FirmwareCheck,
    FirmwareUpdate,
    ExecPhp(PhpSnippet),
    ExecCommand(ShellCommand),
    ResetStateTable,
    KillStates(StateFilter),
    SetDefaultGateway(GatewayName),
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::FirmwareCheck => TaskKind::FirmwareCheck,
            Self::FirmwareUpdate => TaskKind::FirmwareUpdate,
            Self::ExecPhp(_) => TaskKind::ExecPhp,
            Self::ExecCommand(_) => TaskKind::ExecCommand,
            Self::ResetStateTable => TaskKind::ResetStateTable,
            Self::KillStates(_) => TaskKind::KillStates,
            Self::SetDefaultGateway(_) => TaskKind::SetDefaultGateway,
        }
    }
}

// ── Task state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TaskOutput {
    Firmware(FirmwareStatus),
    Command { output: String, exit_code: Option<i64> },
    Php(Value),
    StatesKilled(u64),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailureKind {
    Rpc(RpcErrorKind),
    Validation,
    LeaseTimeout,
    Timeout,
    /// The task was dropped before it could finish (runtime shutdown, panic).
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub kind: TaskFailureKind,
    pub message: String,
}

impl From<CoreError> for TaskFailure {
    fn from(err: CoreError) -> Self {
        let kind = match &err {
            CoreError::Rpc { kind, .. } => TaskFailureKind::Rpc(*kind),
            CoreError::LeaseTimeout { .. } => TaskFailureKind::LeaseTimeout,
            _ => TaskFailureKind::Validation,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<pfwatch_api::Error> for TaskFailure {
    fn from(err: pfwatch_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TaskState {
    Pending,
    Succeeded(TaskOutput),
    Failed(TaskFailure),
}

impl TaskState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Shared view of one background task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackgroundTaskHandle {
    inner: Arc<TaskShared>,
}

#[derive(Debug)]
struct TaskShared {
    id: Uuid,
    kind: TaskKind,
    started_at: DateTime<Utc>,
    finished_at: OnceLock<DateTime<Utc>>,
    state: watch::Sender<TaskState>,
}

impl BackgroundTaskHandle {
    fn new(kind: TaskKind) -> Self {
        let (state, _) = watch::channel(TaskState::Pending);
        Self {
            inner: Arc::new(TaskShared {
                id: Uuid::new_v4(),
                kind,
                started_at: Utc::now(),
                finished_at: OnceLock::new(),
                state,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TaskKind {
        self.inner.kind
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.inner.finished_at.get().copied()
    }

    pub fn state(&self) -> TaskState {
        self.inner.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        !self.inner.state.borrow().is_pending()
    }

    /// Wait for the task to finish and return its final state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        match rx.wait_for(|s| !s.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.inner.state.subscribe()
    }

    /// Move out of `Pending`. Returns `false` (and changes nothing) if
    /// the task already finished.
    fn complete(&self, state: TaskState) -> bool {
        let changed = self.inner.state.send_if_modified(|current| {
            if current.is_pending() && !state.is_pending() {
                *current = state;
                true
            } else {
                false
            }
        });
        if changed {
            let _ = self.inner.finished_at.set(Utc::now());
        }
        changed
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// Starts and tracks background tasks. Cheap to clone.
pub struct TaskRunner<T> {
    inner: Arc<RunnerInner<T>>,
}

impl<T> Clone for TaskRunner<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RunnerInner<T> {
    session: Session<T>,
    lease_wait: Duration,
    task_timeout: Duration,
    firmware_update_timeout: Duration,
    in_flight: DashMap<TaskKind, BackgroundTaskHandle>,
    latest: DashMap<TaskKind, BackgroundTaskHandle>,
    /// Poked after a task that changes appliance state succeeds.
    refresh: Arc<RefreshTrigger>,
}

impl<T: RpcTransport> TaskRunner<T> {
    pub(crate) fn new(
        session: Session<T>,
        config: &SyncConfig,
        refresh: Arc<RefreshTrigger>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                session,
                lease_wait: config.task_lease_wait,
                task_timeout: config.task_timeout,
                firmware_update_timeout: config.firmware_update_timeout,
                in_flight: DashMap::new(),
                latest: DashMap::new(),
                refresh,
            }),
        }
    }

    /// Start `request` in the background.
    ///
    /// If a task of the same kind is running, coalescing kinds return its
    /// handle and rejecting kinds fail with `AlreadyRunning`.
    pub fn start(&self, request: TaskRequest) -> Result<BackgroundTaskHandle, CoreError> {
        let kind = request.kind();
        let handle = match self.inner.in_flight.entry(kind) {
            Entry::Occupied(running) => {
                return match kind.start_policy() {
                    StartPolicy::Coalesce => {
                        debug!(%kind, id = %running.get().id(), "joining running task");
                        Ok(running.get().clone())
                    }
                    StartPolicy::Reject => Err(CoreError::AlreadyRunning { kind }),
                };
            }
            Entry::Vacant(slot) => {
                let handle = BackgroundTaskHandle::new(kind);
                slot.insert(handle.clone());
                handle
            }
        };
        self.inner.latest.insert(kind, handle.clone());

        debug!(%kind, id = %handle.id(), "starting background task");
        tokio::spawn(run_task(self.clone(), request, handle.clone()));
        Ok(handle)
    }

    /// Latest task of `kind`, running or finished.
    pub fn status(&self, kind: TaskKind) -> Option<BackgroundTaskHandle> {
        self.inner.latest.get(&kind).map(|h| h.value().clone())
    }

    /// Latest task of every kind that has run, ordered by kind.
    pub fn statuses(&self) -> Vec<BackgroundTaskHandle> {
        let mut all: Vec<_> = self.inner.latest.iter().map(|h| h.value().clone()).collect();
        all.sort_by_key(BackgroundTaskHandle::kind);
        all
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.inner.in_flight.contains_key(&kind)
    }

    fn timeout_for(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::FirmwareUpdate => self.inner.firmware_update_timeout,
            _ => self.inner.task_timeout,
        }
    }
}

/// Clears the in-flight slot when the task ends, however it ends.
struct InFlight<T> {
    runner: TaskRunner<T>,
    handle: BackgroundTaskHandle,
    finished: bool,
}

impl<T> InFlight<T> {
    fn release(&self) {
        let id = self.handle.id();
        self.runner
            .inner
            .in_flight
            .remove_if(&self.handle.kind(), |_, h| h.id() == id);
    }

    /// Free the slot first so a caller woken by completion can start the
    /// next task of this kind straight away.
    fn finish(mut self, state: TaskState) {
        self.finished = true;
        self.release();
        self.handle.complete(state);
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
            self.handle.complete(TaskState::Failed(TaskFailure {
                kind: TaskFailureKind::Aborted,
                message: "task dropped before completion".into(),
            }));
        }
    }
}

async fn run_task<T: RpcTransport>(
    runner: TaskRunner<T>,
    request: TaskRequest,
    handle: BackgroundTaskHandle,
) {
    let kind = handle.kind();
    let id = handle.id();
    let limit = runner.timeout_for(kind);
    let guard = InFlight {
        runner: runner.clone(),
        handle,
        finished: false,
    };

    let holder = LeaseHolder::Task { kind, id };
    let result = match tokio::time::timeout(
        limit,
        execute(&runner.inner.session, runner.inner.lease_wait, holder, request),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(TaskFailure {
            kind: TaskFailureKind::Timeout,
            message: format!("{kind} did not finish within {}s", limit.as_secs()),
        }),
    };

    match result {
        Ok(output) => {
            info!(%kind, %id, "background task succeeded");
            guard.finish(TaskState::Succeeded(output));
            if kind.changes_state() {
                runner.inner.refresh.request();
            }
        }
        Err(failure) => {
            warn!(%kind, %id, error = %failure.message, "background task failed");
            guard.finish(TaskState::Failed(failure));
        }
    }
}

async fn execute<T: RpcTransport>(
    session: &Session<T>,
    lease_wait: Duration,
    holder: LeaseHolder,
    request: TaskRequest,
) -> Result<TaskOutput, TaskFailure> {
    let lease = session.acquire(holder, lease_wait).await?;
    let output = match request {
        TaskRequest::FirmwareCheck => {
            let raw = lease.check_firmware().await?;
            TaskOutput::Firmware(convert::firmware_status(raw, Utc::now())?)
        }
        TaskRequest::FirmwareUpdate => {
            lease.trigger_firmware_update().await?;
            TaskOutput::Done
        }
        TaskRequest::ExecPhp(snippet) => TaskOutput::Php(lease.exec_php(&snippet).await?),
        TaskRequest::ExecCommand(command) => {
            let resp = lease.exec_command(&command).await?;
            TaskOutput::Command {
                output: resp.output,
                exit_code: resp.exit_code,
            }
        }
        TaskRequest::ResetStateTable => {
            lease.reset_state_table().await?;
            TaskOutput::Done
        }
        TaskRequest::KillStates(filter) => {
            TaskOutput::StatesKilled(lease.kill_states(&filter).await?.killed)
        }
        TaskRequest::SetDefaultGateway(gateway) => {
            lease.set_default_gateway(&gateway).await?;
            TaskOutput::Done
        }
    };
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[test]
    fn only_firmware_check_coalesces() {
        use strum::IntoEnumIterator;

        for kind in TaskKind::iter() {
            let expected = if kind == TaskKind::FirmwareCheck {
                StartPolicy::Coalesce
            } else {
                StartPolicy::Reject
            };
            assert_eq!(kind.start_policy(), expected, "{kind}");
        }
    }

    #[test]
    fn completion_is_monotonic() {
        let handle = BackgroundTaskHandle::new(TaskKind::ResetStateTable);
        assert!(handle.finished_at().is_none());

        assert!(handle.complete(TaskState::Succeeded(TaskOutput::Done)));
        let finished = handle.finished_at();
        assert!(finished.is_some());

        assert!(!handle.complete(TaskState::Failed(TaskFailure {
            kind: TaskFailureKind::Timeout,
            message: "late".into(),
        })));
        assert_eq!(handle.state(), TaskState::Succeeded(TaskOutput::Done));
        assert_eq!(handle.finished_at(), finished);
        assert!(!handle.complete(TaskState::Pending));
    }

    #[test]
    fn wait_resolves_on_completion() {
        let handle = BackgroundTaskHandle::new(TaskKind::ExecPhp);
        let mut wait = tokio_test::task::spawn(handle.wait());
        assert_pending!(wait.poll());

        handle.complete(TaskState::Succeeded(TaskOutput::Php(Value::Bool(true))));

        assert!(wait.is_woken());
        let state = assert_ready!(wait.poll());
        assert_eq!(state, TaskState::Succeeded(TaskOutput::Php(Value::Bool(true))));
    }

    #[test]
    fn lease_timeout_maps_to_its_own_failure_kind() {
        let failure = TaskFailure::from(CoreError::LeaseTimeout { waited_ms: 10 });
        assert_eq!(failure.kind, TaskFailureKind::LeaseTimeout);

        let failure = TaskFailure::from(pfwatch_api::Error::Timeout { timeout_secs: 20 });
        assert_eq!(failure.kind, TaskFailureKind::Rpc(RpcErrorKind::Timeout));
    }
}
