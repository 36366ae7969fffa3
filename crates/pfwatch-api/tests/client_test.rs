#![allow(clippy::unwrap_used)]
// Integration tests for `ApplianceClient` against a scripted transport.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};

use pfwatch_api::scripts::op_tag;
use pfwatch_api::{
    ApplianceClient, EXEC_PHP, Error, GatewayName, HostnameLookup, PhpSnippet, RpcErrorKind,
    RpcTransport, ShellCommand, StateFilter,
};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Value(Value),
    Fault(i64, &'static str),
    Transport(String),
    Hang,
}

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    fn reply(self, op: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(op.to_owned(), reply);
        self
    }

    fn scripts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, script)| script.clone())
            .collect()
    }
}

impl RpcTransport for ScriptedTransport {
    fn call(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value, Error>> + Send {
        let script = params
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let op = op_tag(&script).unwrap_or("raw").to_owned();
        self.calls
            .lock()
            .unwrap()
            .push((method.to_owned(), script));
        let reply = self.replies.lock().unwrap().get(&op).cloned();
        async move {
            match reply {
                Some(Reply::Value(v)) => Ok(v),
                Some(Reply::Fault(code, msg)) => Err(Error::from_fault(code, msg)),
                Some(Reply::Transport(msg)) => Err(Error::Transport(msg)),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
                None => Err(Error::Fault {
                    code: 1,
                    message: format!("unscripted op {op}"),
                }),
            }
        }
    }
}

fn client(transport: ScriptedTransport) -> ApplianceClient<ScriptedTransport> {
    ApplianceClient::new(transport)
}

// ── Monitoring ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_system_info_is_decoded() {
    let client = client(ScriptedTransport::default().reply(
        "system_info",
        Reply::Value(json!({
            "hostname": "fw",
            "domain": "example.lan",
            "netgate_device_id": "abc123",
            "platform": "Netgate 2100"
        })),
    ));

    let info = client.get_system_info().await.unwrap();

    assert_eq!(info.hostname.as_deref(), Some("fw"));
    assert_eq!(info.netgate_device_id.as_deref(), Some("abc123"));
    let calls = client.transport().calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, EXEC_PHP);
}

#[tokio::test]
async fn test_empty_interface_list_decodes_as_empty_map() {
    let client = client(ScriptedTransport::default().reply("interface_stats", Reply::Value(json!([]))));

    let stats = client.get_interface_stats().await.unwrap();

    assert!(stats.is_empty());
}

#[tokio::test]
async fn test_interface_counters_keep_raw_values() {
    let client = client(ScriptedTransport::default().reply(
        "interface_stats",
        Reply::Value(json!({
            "wan": { "descr": "WAN", "status": "up", "inbytes": "1024", "outbytes": 2048 }
        })),
    ));

    let stats = client.get_interface_stats().await.unwrap();

    let wan = &stats["wan"];
    assert_eq!(wan.descr.as_deref(), Some("WAN"));
    assert_eq!(wan.inbytes, Some(json!("1024")));
    assert_eq!(wan.outbytes, Some(json!(2048)));
}

#[tokio::test]
async fn test_dhcp_leases_skip_reverse_lookup_by_default() {
    let client = client(
        ScriptedTransport::default().reply(
            "dhcp_leases",
            Reply::Value(json!([{ "ip": "10.0.0.5", "mac": "aa:bb:cc:dd:ee:ff", "if": "lan" }])),
        ),
    );

    let leases = client.get_dhcp_leases(HostnameLookup::default()).await.unwrap();

    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].interface.as_deref(), Some("lan"));
    assert!(client.transport().scripts()[0].contains("$resolve_hostnames = false;"));
}

#[tokio::test]
async fn test_malformed_response_is_deserialization_error() {
    let client = client(ScriptedTransport::default().reply("system_info", Reply::Value(json!("oops"))));

    let err = client.get_system_info().await.unwrap_err();

    assert!(
        matches!(err, Error::Deserialization { .. }),
        "expected Deserialization error, got: {err:?}"
    );
    assert_eq!(err.kind(), RpcErrorKind::RemoteFault);
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_slow_call_times_out() {
    let client = client(ScriptedTransport::default().reply("load_averages", Reply::Hang))
        .with_call_timeout(Duration::from_secs(5));

    let err = client.get_load_averages().await.unwrap_err();

    assert!(matches!(err, Error::Timeout { timeout_secs: 5 }));
    assert_eq!(err.kind(), RpcErrorKind::Timeout);
}

#[tokio::test]
async fn test_bad_credentials_are_auth_errors() {
    let client = client(
        ScriptedTransport::default().reply("system_info", Reply::Fault(3, "Invalid username or password")),
    );

    let err = client.get_system_info().await.unwrap_err();

    assert!(err.is_auth(), "expected auth error, got: {err:?}");
}

#[tokio::test]
async fn test_transport_errors_are_redacted() {
    let client = client(ScriptedTransport::default().reply(
        "carp_status",
        Reply::Transport("POST https://admin:s3cret@fw/xmlrpc.php refused".into()),
    ))
    .with_redacted_secrets(vec![SecretString::from("s3cret".to_string())]);

    let err = client.get_carp_status().await.unwrap_err();

    let msg = err.to_string();
    assert!(!msg.contains("s3cret"), "secret leaked: {msg}");
    assert!(msg.contains("[redacted]"));
}

// ── Operations ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_kill_states_reports_count() {
    let client = client(ScriptedTransport::default().reply(
        "kill_states",
        Reply::Value(json!({
            "output": "killed 4 states from 1 sources and 0 destinations",
            "exit_code": 0
        })),
    ));
    let filter = StateFilter::parse("10.0.0.5->1.1.1.1").unwrap();

    let resp = client.kill_states(&filter).await.unwrap();

    assert_eq!(resp.killed, 4);
    assert!(client.transport().scripts()[0].contains("/sbin/pfctl -k 10.0.0.5 -k 1.1.1.1"));
}

#[tokio::test]
async fn test_kill_states_nonzero_exit_is_fault() {
    let client = client(ScriptedTransport::default().reply(
        "kill_states",
        Reply::Value(json!({ "output": "pfctl: Operation not permitted", "exit_code": 1 })),
    ));
    let filter = StateFilter::parse("10.0.0.5").unwrap();

    let err = client.kill_states(&filter).await.unwrap_err();

    assert!(matches!(err, Error::Fault { code: 1, .. }));
}

#[tokio::test]
async fn test_unknown_gateway_is_rejected() {
    let client = client(
        ScriptedTransport::default().reply("set_default_gateway", Reply::Value(json!({ "found": false }))),
    );
    let gw = GatewayName::new("WAN2_DHCP").unwrap();

    let err = client.set_default_gateway(&gw).await.unwrap_err();

    assert!(err.to_string().contains("WAN2_DHCP"));
}

#[tokio::test]
async fn test_exec_command_returns_output() {
    let client = client(ScriptedTransport::default().reply(
        "exec_command",
        Reply::Value(json!({ "output": "up 3 days", "exit_code": 0 })),
    ));
    let cmd = ShellCommand::new("uptime").unwrap();

    let resp = client.exec_command(&cmd).await.unwrap();

    assert_eq!(resp.output, "up 3 days");
    assert_eq!(resp.exit_code, Some(0));
}

#[tokio::test]
async fn test_exec_php_sends_snippet_verbatim() {
    let client = client(ScriptedTransport::default().reply("raw", Reply::Value(json!(42))));
    let snippet = PhpSnippet::new("$toreturn = 40 + 2;").unwrap();

    let value = client.exec_php(&snippet).await.unwrap();

    assert_eq!(value, json!(42));
    assert_eq!(client.transport().scripts(), vec!["$toreturn = 40 + 2;".to_string()]);
}

#[tokio::test]
async fn test_firmware_check_bypasses_cache() {
    let client = client(ScriptedTransport::default().reply(
        "firmware_check",
        Reply::Value(json!({
            "installed_version": "2.7.0",
            "version": "2.7.2",
            "pkg_version_compare": "<"
        })),
    ));

    let fw = client.check_firmware().await.unwrap();

    assert_eq!(fw.version.as_deref(), Some("2.7.2"));
    assert!(client.transport().scripts()[0].contains("get_system_pkg_version(false, false)"));
}
