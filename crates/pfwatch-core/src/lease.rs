// ── Session lease ──
//
// The appliance's RPC endpoint is not safe for concurrent use, so every
// call goes through a single `ApplianceClient` behind an async mutex.
// Holding a `SessionLease` is the only way to reach the client. The
// mutex is FIFO-fair: a task that starts waiting during a poll cycle
// proceeds as soon as that cycle lets go.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::debug;
use uuid::Uuid;

use pfwatch_api::{ApplianceClient, RpcTransport};

use crate::error::CoreError;
use crate::tasks::TaskKind;

/// Who currently holds the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseHolder {
    Poller { cycle: u64 },
    Task { kind: TaskKind, id: Uuid },
}

impl fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poller { cycle } => write!(f, "poll cycle {cycle}"),
            Self::Task { kind, id } => write!(f, "{kind} task {id}"),
        }
    }
}

/// Owner of the single appliance connection. Cheap to clone.
pub(crate) struct Session<T> {
    client: Arc<Mutex<ApplianceClient<T>>>,
    holder: Arc<watch::Sender<Option<LeaseHolder>>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            holder: Arc::clone(&self.holder),
        }
    }
}

impl<T: RpcTransport> Session<T> {
    pub(crate) fn new(client: ApplianceClient<T>) -> Self {
        let (holder, _) = watch::channel(None);
        Self {
            client: Arc::new(Mutex::new(client)),
            holder: Arc::new(holder),
        }
    }

    /// Wait up to `wait` for exclusive use of the client.
    pub(crate) async fn acquire(
        &self,
        holder: LeaseHolder,
        wait: Duration,
    ) -> Result<SessionLease<T>, CoreError> {
        if let Some(current) = *self.holder.borrow() {
            debug!(%holder, %current, "session busy, waiting");
        }
        let Ok(guard) = tokio::time::timeout(wait, Arc::clone(&self.client).lock_owned()).await
        else {
            debug!(%holder, current = ?*self.holder.borrow(), "gave up waiting for session");
            return Err(CoreError::LeaseTimeout {
                waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            });
        };
        self.holder.send_replace(Some(holder));
        Ok(SessionLease {
            guard,
            holder,
            slot: Arc::clone(&self.holder),
        })
    }

    pub(crate) fn holder(&self) -> Option<LeaseHolder> {
        *self.holder.borrow()
    }

    pub(crate) fn subscribe_holder(&self) -> watch::Receiver<Option<LeaseHolder>> {
        self.holder.subscribe()
    }
}

/// Exclusive access to the appliance client. Released on drop.
pub struct SessionLease<T> {
    guard: OwnedMutexGuard<ApplianceClient<T>>,
    holder: LeaseHolder,
    slot: Arc<watch::Sender<Option<LeaseHolder>>>,
}

impl<T> SessionLease<T> {
    pub fn holder(&self) -> LeaseHolder {
        self.holder
    }
}

impl<T> Deref for SessionLease<T> {
    type Target = ApplianceClient<T>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> Drop for SessionLease<T> {
    fn drop(&mut self) {
        // Cleared before the guard field drops, so the next holder never
        // gets overwritten with `None`.
        self.slot.send_replace(None);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;

    use serde_json::Value;

    use super::*;

    struct NullTransport;

    impl RpcTransport for NullTransport {
        fn call(
            &self,
            _method: &str,
            _params: Vec<Value>,
        ) -> impl Future<Output = Result<Value, pfwatch_api::Error>> + Send {
            async { Ok(Value::Null) }
        }
    }

    fn session() -> Session<NullTransport> {
        Session::new(ApplianceClient::new(NullTransport))
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_times_out_while_held() {
        let session = session();
        let lease = session
            .acquire(LeaseHolder::Poller { cycle: 1 }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(session.holder(), Some(LeaseHolder::Poller { cycle: 1 }));

        let err = session
            .acquire(LeaseHolder::Poller { cycle: 2 }, Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::LeaseTimeout { waited_ms: 1000 }));

        drop(lease);
        assert_eq!(session.holder(), None);
        let lease = session
            .acquire(LeaseHolder::Poller { cycle: 3 }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(lease.holder(), LeaseHolder::Poller { cycle: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_proceeds_when_lease_is_released() {
        let session = session();
        let lease = session
            .acquire(LeaseHolder::Poller { cycle: 1 }, Duration::from_secs(1))
            .await
            .unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move {
                let id = Uuid::new_v4();
                let lease = session
                    .acquire(
                        LeaseHolder::Task {
                            kind: TaskKind::FirmwareCheck,
                            id,
                        },
                        Duration::from_secs(60),
                    )
                    .await
                    .unwrap();
                lease.holder()
            })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());
        drop(lease);

        let holder = waiter.await.unwrap();
        assert!(matches!(holder, LeaseHolder::Task { kind: TaskKind::FirmwareCheck, .. }));
    }
}
