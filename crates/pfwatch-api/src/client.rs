// Typed client for the appliance's remote procedure surface.
//
// Wraps an `RpcTransport` with one method per remote operation, a per-call
// timeout, response decoding, and secret redaction. It never retries and
// never issues two calls at once on its own; serializing callers is the
// job of whoever owns the client (the session lease in `pfwatch-core`).

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::args::{GatewayName, PhpSnippet, ShellCommand, StateFilter};
use crate::error::Error;
use crate::models::{
    ArpEntryResponse, CarpResponse, CommandResponse, DhcpLeaseResponse, FirmwareResponse,
    GatewayChangeResponse, InterfaceStatsResponse, KillStatesResponse, LoadAveragesResponse,
    SystemInfoResponse, VpnSessionsResponse,
};
use crate::scripts;
use crate::transport::RpcTransport;

/// Remote method that evaluates a PHP snippet and returns `$toreturn`.
pub const EXEC_PHP: &str = "pfsense.exec_php";

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Whether the appliance may reverse-resolve addresses while building a
/// lease or neighbor list.
///
/// Resolution costs one DNS round trip per entry on the appliance, so
/// periodic collection always uses [`HostnameLookup::Skip`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostnameLookup {
    #[default]
    Skip,
    Resolve,
}

impl HostnameLookup {
    fn enabled(self) -> bool {
        self == Self::Resolve
    }
}

/// Typed wrapper over a single appliance connection.
pub struct ApplianceClient<T> {
    transport: T,
    call_timeout: Duration,
    secrets: Vec<SecretString>,
}

impl<T: RpcTransport> ApplianceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            secrets: Vec::new(),
        }
    }

    /// Bound every round trip by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Strip these values from every error message the client returns.
    pub fn with_redacted_secrets(mut self, secrets: Vec<SecretString>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    // ── Monitoring ───────────────────────────────────────────────────

    pub async fn get_system_info(&self) -> Result<SystemInfoResponse, Error> {
        self.exec_script(scripts::system_info()).await
    }

    pub async fn get_interface_stats(&self) -> Result<InterfaceStatsResponse, Error> {
        let value = self.exec_script_value(scripts::interface_stats()).await?;
        // PHP serializes an empty associative array as an empty list.
        if matches!(&value, Value::Array(items) if items.is_empty()) {
            return Ok(InterfaceStatsResponse::new());
        }
        decode("interface_stats", &value)
    }

    pub async fn get_dhcp_leases(
        &self,
        lookup: HostnameLookup,
    ) -> Result<Vec<DhcpLeaseResponse>, Error> {
        self.exec_script(scripts::dhcp_leases(lookup.enabled())).await
    }

    pub async fn get_vpn_sessions(&self) -> Result<VpnSessionsResponse, Error> {
        self.exec_script(scripts::vpn_sessions()).await
    }

    pub async fn get_load_averages(&self) -> Result<LoadAveragesResponse, Error> {
        self.exec_script(scripts::load_averages()).await
    }

    /// Installed and available firmware as last cached by the appliance.
    pub async fn get_firmware_status(&self) -> Result<FirmwareResponse, Error> {
        self.exec_script(scripts::firmware_status(true)).await
    }

    pub async fn get_carp_status(&self) -> Result<CarpResponse, Error> {
        self.exec_script(scripts::carp_status()).await
    }

    pub async fn get_arp_table(
        &self,
        lookup: HostnameLookup,
    ) -> Result<Vec<ArpEntryResponse>, Error> {
        self.exec_script(scripts::arp_table(lookup.enabled())).await
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Ask the appliance to query its update server, bypassing its cache.
    pub async fn check_firmware(&self) -> Result<FirmwareResponse, Error> {
        self.exec_script(scripts::firmware_status(false)).await
    }

    /// Start the firmware upgrade on the appliance. Returns once the
    /// upgrade process has been launched, not when it finishes.
    pub async fn trigger_firmware_update(&self) -> Result<(), Error> {
        let _: Value = self.exec_script(scripts::firmware_update()).await?;
        Ok(())
    }

    pub async fn exec_command(&self, command: &ShellCommand) -> Result<CommandResponse, Error> {
        self.exec_script(scripts::exec_command(command)).await
    }

    /// Evaluate an arbitrary snippet and return whatever it assigned to
    /// `$toreturn`.
    pub async fn exec_php(&self, snippet: &PhpSnippet) -> Result<Value, Error> {
        self.call(EXEC_PHP, vec![Value::String(snippet.as_str().to_owned())])
            .await
    }

    pub async fn reset_state_table(&self) -> Result<(), Error> {
        let _: Value = self.exec_script(scripts::reset_state_table()).await?;
        Ok(())
    }

    pub async fn kill_states(&self, filter: &StateFilter) -> Result<KillStatesResponse, Error> {
        let resp: CommandResponse = self.exec_script(scripts::kill_states(filter)).await?;
        if let Some(code) = resp.exit_code.filter(|c| *c != 0) {
            return Err(Error::Fault {
                code,
                message: format!("pfctl failed: {}", resp.output.trim()),
            });
        }
        let killed = parse_killed_count(&resp.output).ok_or_else(|| Error::Deserialization {
            message: "kill_states: no `killed N states` line in pfctl output".into(),
            body: resp.output.clone(),
        })?;
        Ok(KillStatesResponse { killed })
    }

    pub async fn set_default_gateway(&self, gateway: &GatewayName) -> Result<(), Error> {
        let resp: GatewayChangeResponse =
            self.exec_script(scripts::set_default_gateway(gateway)).await?;
        if resp.found {
            Ok(())
        } else {
            Err(Error::Fault {
                code: 0,
                message: format!("no gateway named {gateway}"),
            })
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    async fn exec_script<R: DeserializeOwned>(&self, script: String) -> Result<R, Error> {
        let op = scripts::op_tag(&script).unwrap_or("exec_php").to_owned();
        let value = self.exec_script_value(script).await?;
        decode(&op, &value)
    }

    async fn exec_script_value(&self, script: String) -> Result<Value, Error> {
        trace!(op = scripts::op_tag(&script), "exec_php");
        self.call(EXEC_PHP, vec![Value::String(script)]).await
    }

    /// One bounded round trip.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        debug!(method, "rpc call");
        match tokio::time::timeout(self.call_timeout, self.transport.call(method, params)).await {
            Ok(result) => result.map_err(|e| e.redact(&self.secrets)),
            Err(_) => Err(Error::Timeout {
                timeout_secs: self.call_timeout.as_secs(),
            }),
        }
    }
}

fn decode<R: DeserializeOwned>(op: &str, value: &Value) -> Result<R, Error> {
    R::deserialize(value).map_err(|e| {
        let body = value.to_string();
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{op}: {e} (body preview: {preview:?})"),
            body,
        }
    })
}

/// Sum the counts of every `killed N states ...` line printed by pfctl.
fn parse_killed_count(output: &str) -> Option<u64> {
    let counts: Vec<u64> = output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("killed ")?;
            rest.split_whitespace().next()?.parse().ok()
        })
        .collect();
    if counts.is_empty() {
        None
    } else {
        Some(counts.iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::parse_killed_count;

    #[test]
    fn killed_count_is_parsed() {
        assert_eq!(
            parse_killed_count("killed 3 states from 1 sources and 0 destinations"),
            Some(3)
        );
        assert_eq!(
            parse_killed_count("killed 2 states from 1 sources\nkilled 1 states from 1 sources"),
            Some(3)
        );
        assert_eq!(parse_killed_count("pfctl: Permission denied"), None);
    }
}
