// ── Core error types ──
//
// Errors returned by engine operations. Per-category fetch failures never
// surface here; they are captured into the snapshot as `FetchOutcome::Failed`.
// The `From<pfwatch_api::Error>` impl keeps only the failure class and the
// (already redacted) message.

use pfwatch_api::RpcErrorKind;
use thiserror::Error;

use crate::tasks::TaskKind;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Remote errors ────────────────────────────────────────────────
    #[error("RPC {kind} error: {message}")]
    Rpc { kind: RpcErrorKind, message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Coordination errors ──────────────────────────────────────────
    #[error("Timed out after {waited_ms}ms waiting for the appliance session")]
    LeaseTimeout { waited_ms: u64 },

    #[error("A {kind} task is already running")]
    AlreadyRunning { kind: TaskKind },

    #[error("Sync engine is stopped")]
    Stopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ── Conversion from adapter errors ───────────────────────────────────

impl From<pfwatch_api::Error> for CoreError {
    fn from(err: pfwatch_api::Error) -> Self {
        match err {
            pfwatch_api::Error::InvalidArgument { .. } => Self::Validation {
                message: err.to_string(),
            },
            pfwatch_api::Error::InvalidUrl(_) => Self::Config {
                message: err.to_string(),
            },
            other => Self::Rpc {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_keep_their_class() {
        let err: CoreError = pfwatch_api::Error::Timeout { timeout_secs: 20 }.into();
        assert!(matches!(
            err,
            CoreError::Rpc {
                kind: RpcErrorKind::Timeout,
                ..
            }
        ));

        let err: CoreError = pfwatch_api::Error::InvalidArgument {
            field: "gateway",
            reason: "empty".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation { .. }));
    }
}
