// ── Sync engine ──
//
// Facade over the coordinator, task runner, snapshot store and
// availability policy for one appliance. Owns the background poll loop
// and exposes every inbound operation.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pfwatch_api::{
    ApplianceClient, GatewayName, PhpSnippet, RpcTransport, ShellCommand, StateFilter,
    TransportConfig,
};

use crate::availability::AvailabilityPolicy;
use crate::config::SyncConfig;
use crate::coordinator::{Coordinator, CyclePhase, RefreshTrigger, poll_task};
use crate::error::CoreError;
use crate::lease::{LeaseHolder, Session};
use crate::store::{CycleReport, Snapshot, SnapshotStore};
use crate::tasks::{BackgroundTaskHandle, TaskKind, TaskRequest, TaskRunner};

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Nothing runs until
/// [`start()`](Self::start); cycles can still be driven by hand with
/// [`refresh_now()`](Self::refresh_now).
pub struct SyncEngine<T> {
    inner: Arc<EngineInner<T>>,
}

impl<T> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<T> {
    config: SyncConfig,
    session: Session<T>,
    store: Arc<SnapshotStore>,
    coordinator: Coordinator<T>,
    tasks: TaskRunner<T>,
    policy: AvailabilityPolicy,
    refresh: Arc<RefreshTrigger>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: RpcTransport> SyncEngine<T> {
    /// Build an engine over `transport`, which was constructed from
    /// `settings`. Each RPC call is bounded by `config.call_timeout`, and
    /// the credentials in `settings` are scrubbed from every error the
    /// engine reports.
    pub fn new(
        transport: T,
        settings: &TransportConfig,
        config: SyncConfig,
    ) -> Result<Self, CoreError> {
        let client = ApplianceClient::new(transport)
            .with_call_timeout(config.call_timeout)
            .with_redacted_secrets(settings.secrets());
        Self::with_client(client, config)
    }

    /// Build an engine over an already configured client. Redaction is
    /// whatever the client was set up with.
    pub fn with_client(client: ApplianceClient<T>, config: SyncConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let session = Session::new(client);
        let store = Arc::new(SnapshotStore::new());
        let refresh = Arc::new(RefreshTrigger::default());
        let coordinator = Coordinator::new(session.clone(), Arc::clone(&store), &config);
        let tasks = TaskRunner::new(session.clone(), &config, Arc::clone(&refresh));
        let policy = AvailabilityPolicy::from_config(&config);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                session,
                store,
                coordinator,
                tasks,
                policy,
                refresh,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.inner.store
    }

    pub fn policy(&self) -> &AvailabilityPolicy {
        &self.inner.policy
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the poll loop. The first cycle runs immediately.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.ensure_running()?;
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("poll loop already running");
            return Ok(());
        }
        self.inner.refresh.arm();
        handles.push(tokio::spawn(poll_task(
            self.inner.coordinator.clone(),
            self.inner.config.poll_interval,
            Arc::clone(&self.inner.refresh),
            self.inner.cancel.child_token(),
        )));
        info!(
            interval_secs = self.inner.config.poll_interval.as_secs(),
            categories = self.inner.config.categories.len(),
            "sync engine started"
        );
        Ok(())
    }

    /// Stop the poll loop and wait for it to exit. Background tasks
    /// already running are left to finish on their own.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("sync engine stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.is_stopped() {
            Err(CoreError::Stopped)
        } else {
            Ok(())
        }
    }

    // ── Poll control ─────────────────────────────────────────────────

    /// Run a poll cycle now and return its report. Coalesces into a
    /// cycle that is already running.
    pub async fn refresh_now(&self) -> Result<CycleReport, CoreError> {
        self.ensure_running()?;
        Ok(self.inner.coordinator.run_cycle().await)
    }

    /// Ask the poll loop for an early cycle without waiting for it.
    /// Ignored while the loop is not running.
    pub fn request_refresh(&self) {
        self.inner.refresh.request();
    }

    // ── Operator actions ─────────────────────────────────────────────

    pub fn check_firmware(&self) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::FirmwareCheck)
    }

    pub fn install_firmware_update(&self) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::FirmwareUpdate)
    }

    pub fn exec_php(&self, snippet: PhpSnippet) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::ExecPhp(snippet))
    }

    pub fn exec_command(&self, command: ShellCommand) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::ExecCommand(command))
    }

    pub fn reset_state_table(&self) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::ResetStateTable)
    }

    pub fn kill_states(&self, filter: StateFilter) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::KillStates(filter))
    }

    pub fn set_default_gateway(
        &self,
        gateway: GatewayName,
    ) -> Result<BackgroundTaskHandle, CoreError> {
        self.start_task(TaskRequest::SetDefaultGateway(gateway))
    }

    pub fn start_task(&self, request: TaskRequest) -> Result<BackgroundTaskHandle, CoreError> {
        self.ensure_running()?;
        self.inner.tasks.start(request)
    }

    // ── Published surface ────────────────────────────────────────────

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.store.subscribe()
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.inner.store.last_cycle()
    }

    pub fn phase(&self) -> CyclePhase {
        self.inner.coordinator.phase()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.inner.coordinator.subscribe_phase()
    }

    pub fn lease_holder(&self) -> Option<LeaseHolder> {
        self.inner.session.holder()
    }

    pub fn subscribe_lease_holder(&self) -> watch::Receiver<Option<LeaseHolder>> {
        self.inner.session.subscribe_holder()
    }

    pub fn task_status(&self, kind: TaskKind) -> Option<BackgroundTaskHandle> {
        self.inner.tasks.status(kind)
    }

    pub fn task_statuses(&self) -> Vec<BackgroundTaskHandle> {
        self.inner.tasks.statuses()
    }
}
