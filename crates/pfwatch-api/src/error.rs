use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the `pfwatch-api` crate.
///
/// Covers every failure mode of a single remote call: authentication,
/// transport, remote faults, timeouts, and malformed responses.
/// `pfwatch-core` maps these into per-category fetch failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong username or password).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Credentials are valid but the account lacks the XML-RPC privilege.
    ///
    /// Non-admin users need the "System - HA node sync" privilege.
    #[error("Insufficient privileges: {message}")]
    PrivilegeMissing { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, reset, etc.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The appliance answered with a redirect instead of the RPC endpoint.
    #[error("Endpoint redirected (HTTP {status}); check the URL scheme and port")]
    Redirect { status: u16 },

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ── Remote ──────────────────────────────────────────────────────
    /// The remote procedure raised a fault.
    #[error("Remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The response could not be decoded into the expected shape.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An argument was rejected before anything was sent.
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
}

/// Coarse classification of an RPC failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    Transport,
    Auth,
    RemoteFault,
    Timeout,
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::RemoteFault => "remote_fault",
            Self::Timeout => "timeout",
        })
    }
}

impl Error {
    /// Classify a fault raised by the appliance from its fault string.
    ///
    /// The appliance reports authentication problems as ordinary faults,
    /// so the message text is the only signal.
    pub fn from_fault(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("Invalid username or password") {
            Self::Authentication { message }
        } else if message.contains("Authentication failed: not enough privileges")
            || message.contains("unsupported XML-RPC protocol")
        {
            Self::PrivilegeMissing { message }
        } else {
            Self::Fault { code, message }
        }
    }

    /// Classify an HTTP-level failure reported by a transport.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            301 | 302 | 307 | 308 => Self::Redirect { status },
            401 => Self::Authentication {
                message: "HTTP 401 Unauthorized".into(),
            },
            403 => Self::PrivilegeMissing {
                message: "HTTP 403 Forbidden".into(),
            },
            _ => Self::Transport(format!("HTTP {status}: {}", truncate(body, 200))),
        }
    }

    /// The coarse RPC failure class.
    ///
    /// `Deserialization` counts as a remote fault: the appliance answered,
    /// just not with anything usable. `InvalidArgument` never reaches the
    /// wire and is reported as a transport-side rejection.
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            Self::Authentication { .. } | Self::PrivilegeMissing { .. } => RpcErrorKind::Auth,
            Self::Timeout { .. } => RpcErrorKind::Timeout,
            Self::Fault { .. } | Self::Deserialization { .. } => RpcErrorKind::RemoteFault,
            Self::Transport(_)
            | Self::Redirect { .. }
            | Self::Tls(_)
            | Self::InvalidUrl(_)
            | Self::InvalidArgument { .. } => RpcErrorKind::Transport,
        }
    }

    /// Returns `true` if this error indicates the credentials were refused.
    pub fn is_auth(&self) -> bool {
        self.kind() == RpcErrorKind::Auth
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next scheduled attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Replace every occurrence of the given secrets in the error text.
    pub fn redact(self, secrets: &[SecretString]) -> Self {
        if secrets.is_empty() {
            return self;
        }
        let clean = |s: String| redact_secrets(&s, secrets);
        match self {
            Self::Authentication { message } => Self::Authentication {
                message: clean(message),
            },
            Self::PrivilegeMissing { message } => Self::PrivilegeMissing {
                message: clean(message),
            },
            Self::Transport(message) => Self::Transport(clean(message)),
            Self::Tls(message) => Self::Tls(clean(message)),
            Self::InvalidUrl(message) => Self::InvalidUrl(clean(message)),
            Self::Fault { code, message } => Self::Fault {
                code,
                message: clean(message),
            },
            Self::Deserialization { message, body } => Self::Deserialization {
                message: clean(message),
                body: clean(body),
            },
            other @ (Self::Redirect { .. } | Self::Timeout { .. } | Self::InvalidArgument { .. }) => {
                other
            }
        }
    }
}

/// Replace secrets (raw and URL-encoded) in `message` with `[redacted]`.
///
/// Transports tend to echo the request URL in their errors, and the URL
/// carries the credentials in its userinfo part.
pub fn redact_secrets(message: &str, secrets: &[SecretString]) -> String {
    let mut out = message.to_owned();
    for secret in secrets {
        let raw = secret.expose_secret();
        if raw.is_empty() {
            continue;
        }
        out = out.replace(raw, "[redacted]");
        let encoded: String = url::form_urlencoded::byte_serialize(raw.as_bytes()).collect();
        if encoded != raw {
            out = out.replace(&encoded, "[redacted]");
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fault_text_selects_auth_variants() {
        assert!(matches!(
            Error::from_fault(3, "Invalid username or password"),
            Error::Authentication { .. }
        ));
        assert!(matches!(
            Error::from_fault(3, "Authentication failed: not enough privileges"),
            Error::PrivilegeMissing { .. }
        ));
        assert!(matches!(
            Error::from_fault(1, "Call to undefined function"),
            Error::Fault { code: 1, .. }
        ));
    }

    #[test]
    fn redirects_are_transport_errors() {
        let err = Error::from_http_status(307, "");
        assert!(matches!(err, Error::Redirect { status: 307 }));
        assert_eq!(err.kind(), RpcErrorKind::Transport);
    }

    #[test]
    fn redaction_covers_url_encoded_form() {
        let secrets = vec![SecretString::from("p@ss word".to_string())];
        let msg = "POST https://admin:p%40ss+word@fw/xmlrpc.php failed; password p@ss word";
        let cleaned = redact_secrets(msg, &secrets);
        assert!(!cleaned.contains("p@ss word"));
        assert!(!cleaned.contains("p%40ss+word"));
        assert_eq!(cleaned.matches("[redacted]").count(), 2);
    }

    #[test]
    fn redact_rewrites_error_messages() {
        let secrets = vec![SecretString::from("hunter2".to_string())];
        let err = Error::Transport("connect to https://admin:hunter2@fw failed".into());
        let Error::Transport(msg) = err.redact(&secrets) else {
            panic!("variant changed");
        };
        assert_eq!(msg, "connect to https://admin:[redacted]@fw failed");
    }
}
