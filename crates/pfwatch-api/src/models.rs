// Raw response shapes returned by the appliance snippets.
//
// These mirror what PHP hands back, not what consumers want: numbers may
// arrive as strings, and any field may be missing on older firmware.
// Every field is therefore optional or loosely typed; `pfwatch-core`
// validates and normalizes them into domain records.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemInfoResponse {
    pub hostname: Option<String>,
    pub domain: Option<String>,
    pub netgate_device_id: Option<String>,
    pub platform: Option<String>,
}

/// Keyed by internal interface name (`wan`, `lan`, `opt1`, ...).
pub type InterfaceStatsResponse = BTreeMap<String, InterfaceInfoResponse>;

/// One entry of `get_interface_info()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterfaceInfoResponse {
    pub descr: Option<String>,
    pub hwif: Option<String>,
    pub status: Option<String>,
    pub ipaddr: Option<String>,
    pub macaddr: Option<String>,
    pub media: Option<String>,
    pub inbytes: Option<Value>,
    pub outbytes: Option<Value>,
    pub inpkts: Option<Value>,
    pub outpkts: Option<Value>,
    pub inerrs: Option<Value>,
    pub outerrs: Option<Value>,
    pub collisions: Option<Value>,
}

/// One entry of `system_get_dhcpleases()['lease']`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DhcpLeaseResponse {
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub descr: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// `"online"` / `"offline"`.
    pub online: Option<String>,
    /// `"active"`, `"expired"`, `"reserved"`, `"static"`, ...
    pub act: Option<String>,
    #[serde(rename = "if")]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VpnSessionsResponse {
    #[serde(default)]
    pub servers: Vec<OpenVpnServerResponse>,
    #[serde(default)]
    pub clients: Vec<OpenVpnClientResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenVpnServerResponse {
    pub name: Option<String>,
    pub vpnid: Option<Value>,
    #[serde(default)]
    pub conns: Vec<OpenVpnConnectionResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenVpnConnectionResponse {
    pub common_name: Option<String>,
    pub remote_host: Option<String>,
    pub virtual_addr: Option<String>,
    pub bytes_recv: Option<Value>,
    pub bytes_sent: Option<Value>,
    pub connect_time_unix: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenVpnClientResponse {
    pub name: Option<String>,
    pub vpnid: Option<Value>,
    /// `"up"`, `"down"`, `"reconnecting"`, ...
    pub status: Option<String>,
    pub remote_host: Option<String>,
    pub virtual_addr: Option<String>,
    pub bytes_recv: Option<Value>,
    pub bytes_sent: Option<Value>,
    pub connect_time_unix: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadAveragesResponse {
    pub loadavg: Option<Vec<Value>>,
}

/// `get_system_pkg_version()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirmwareResponse {
    pub installed_version: Option<String>,
    /// Newest version offered by the update server.
    pub version: Option<String>,
    /// `"<"` when an update is available, `"="` when current, `">"` when
    /// running something newer than the server offers.
    pub pkg_version_compare: Option<String>,
    pub product_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarpResponse {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub vips: Vec<CarpVipResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarpVipResponse {
    pub interface: Option<String>,
    pub vhid: Option<Value>,
    pub subnet: Option<String>,
    /// `"MASTER"`, `"BACKUP"`, `"INIT"`, `"DISABLED"`.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArpEntryResponse {
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub interface: Option<String>,
}

/// Output of a command run through `exec()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub output: String,
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayChangeResponse {
    #[serde(default)]
    pub found: bool,
}

/// Parsed result of a `pfctl -k` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillStatesResponse {
    pub killed: u64,
}
