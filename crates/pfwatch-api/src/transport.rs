// Transport contract and connection settings.
//
// The wire codec lives outside this crate. Everything here describes what
// a transport must provide (one round trip per `call`) and the settings a
// transport is built from: endpoint, credentials, TLS mode, timeout.

use std::future::Future;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;

/// Path of the XML-RPC endpoint relative to the appliance root.
pub const XMLRPC_PATH: &str = "/xmlrpc.php";

/// A single remote procedure surface.
///
/// Each `call` performs exactly one network round trip and returns the
/// decoded response value. Implementations are not required to be safe
/// for concurrent use; `ApplianceClient` never issues overlapping calls
/// as long as callers hold the session lease.
pub trait RpcTransport: Send + Sync + 'static {
    fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;
}

/// TLS verification mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify the appliance certificate against the system store.
    #[default]
    Verify,
    /// Accept any certificate (self-signed appliances).
    DangerAcceptInvalid,
}

/// Settings a transport is constructed from.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Normalized appliance root: `scheme://host[:port]`.
    pub base_url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsMode,
    /// Upper bound for one round trip.
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(raw_url: &str, username: impl Into<String>, password: SecretString) -> Result<Self, Error> {
        Ok(Self {
            base_url: normalize_base_url(raw_url)?,
            username: username.into(),
            password,
            tls: TlsMode::default(),
            timeout: Duration::from_secs(20),
        })
    }

    /// Full URL of the XML-RPC endpoint.
    pub fn endpoint(&self) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        // base_url is already a valid absolute URL, appending a fixed path keeps it valid
        Url::parse(&format!("{base}{XMLRPC_PATH}")).unwrap_or_else(|_| self.base_url.clone())
    }

    /// Secrets that must never appear in logged error text.
    pub fn secrets(&self) -> Vec<SecretString> {
        vec![
            SecretString::from(self.username.clone()),
            self.password.clone(),
        ]
    }
}

/// Reduce a user-supplied URL to `scheme://host[:port]`.
///
/// A scheme and a host are both required; path, query and fragment are
/// dropped so that `https://fw.lan/index.php?x=1` and `https://fw.lan`
/// address the same appliance.
pub fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!(
            "{trimmed}: scheme must be http or https"
        )));
    }
    let Some(host) = parsed.host_str().filter(|h| !h.is_empty()) else {
        return Err(Error::InvalidUrl(format!("{trimmed}: missing host")));
    };

    let root = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    Url::parse(&root).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_path_and_query() {
        let url = normalize_base_url(" https://fw.example.lan:8443/index.php?x=1#top ").unwrap();
        assert_eq!(url.as_str(), "https://fw.example.lan:8443/");
    }

    #[test]
    fn normalize_rejects_missing_scheme() {
        assert!(matches!(
            normalize_base_url("fw.example.lan"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn normalize_rejects_non_http_scheme() {
        assert!(normalize_base_url("ftp://fw.example.lan").is_err());
    }

    #[test]
    fn endpoint_appends_xmlrpc_path() {
        let cfg = TransportConfig::new(
            "https://192.168.1.1/",
            "admin",
            SecretString::from("pw".to_string()),
        )
        .unwrap();
        assert_eq!(cfg.endpoint().as_str(), "https://192.168.1.1/xmlrpc.php");
    }
}
