//! Typed RPC adapter for pfSense-class firewall appliances.
//!
//! The appliance exposes an XML-RPC endpoint whose most useful method,
//! `pfsense.exec_php`, evaluates a PHP snippet and returns whatever it
//! assigned to `$toreturn`. This crate wraps that surface:
//!
//! - **[`RpcTransport`]**: the one-round-trip-per-call contract a wire
//!   implementation provides. [`TransportConfig`] carries the normalized
//!   endpoint, credentials, and TLS mode it is built from.
//!
//! - **[`ApplianceClient`]**: one typed method per monitoring query or
//!   operator action, each bounded by a per-call timeout, with credentials
//!   redacted from every error it returns.
//!
//! - **[`Error`]**: failure classification ([`RpcErrorKind`]) from fault
//!   strings and HTTP statuses.
//!
//! - **Arguments** ([`args`]): validated gateway names, state filters,
//!   shell commands, and PHP snippets. Nothing unvalidated is ever spliced
//!   into a script.

pub mod args;
pub mod client;
pub mod error;
pub mod models;
pub mod scripts;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use args::{GatewayName, PhpSnippet, ShellCommand, StateFilter};
pub use client::{ApplianceClient, EXEC_PHP, HostnameLookup};
pub use error::{Error, RpcErrorKind, redact_secrets};
pub use transport::{RpcTransport, TlsMode, TransportConfig, XMLRPC_PATH, normalize_base_url};
