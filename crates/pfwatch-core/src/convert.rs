// ── Response-to-record conversions ──
//
// Bridges raw `pfwatch_api::models` shapes into `crate::model` records.
// Unlike a lenient `From`, every conversion here is fallible: PHP hands
// back strings, numbers or nothing at all for the same field, and a
// counter that cannot be read fails the whole record instead of turning
// into zero.

use std::net::IpAddr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use pfwatch_api::models::{
    ArpEntryResponse, CarpResponse, CarpVipResponse, DhcpLeaseResponse, FirmwareResponse,
    InterfaceInfoResponse, InterfaceStatsResponse, LoadAveragesResponse, OpenVpnClientResponse,
    OpenVpnConnectionResponse, SystemInfoResponse, VpnSessionsResponse,
};

use crate::error::CoreError;
use crate::model::{
    ArpEntry, CarpState, CarpStatus, CarpVip, DhcpLease, FirmwareStatus, InterfaceStats,
    LeaseState, LoadAverage, LoadPeriod, SystemRecord, VpnKind, VpnSession,
};

/// Timestamp format used by the DHCP lease database.
const LEASE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// ── Helpers ────────────────────────────────────────────────────────

fn missing(field: &str) -> CoreError {
    CoreError::validation(format!("missing field `{field}`"))
}

fn invalid(field: &str, value: impl std::fmt::Display) -> CoreError {
    CoreError::validation(format!("invalid `{field}`: {value}"))
}

/// A required, non-blank string.
fn require_str(raw: Option<String>, field: &str) -> Result<String, CoreError> {
    match raw {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(missing(field)),
    }
}

/// An optional string; blank counts as absent.
fn non_blank(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

/// A non-negative integer counter, given as a JSON number or a numeric string.
fn parse_counter(raw: Option<&Value>, field: &str) -> Result<u64, CoreError> {
    match raw {
        None | Some(Value::Null) => Err(missing(field)),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| invalid(field, n)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(field, s)),
        Some(other) => Err(invalid(field, other)),
    }
}

fn parse_float(raw: Option<&Value>, field: &str) -> Result<f64, CoreError> {
    let value = match raw {
        None | Some(Value::Null) => return Err(missing(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(field, n))?,
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(field, s))?,
        Some(other) => return Err(invalid(field, other)),
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(field, value))
    }
}

fn parse_ip(raw: Option<String>, field: &str) -> Result<IpAddr, CoreError> {
    let raw = require_str(raw, field)?;
    raw.trim().parse().map_err(|_| invalid(field, raw))
}

/// An optional address; blank counts as absent, garbage is an error.
fn parse_optional_ip(raw: Option<String>, field: &str) -> Result<Option<IpAddr>, CoreError> {
    non_blank(raw)
        .map(|s| s.trim().parse().map_err(|_| invalid(field, &s)))
        .transpose()
}

/// Epoch seconds given as a number or a numeric string.
fn parse_epoch(raw: Option<&Value>, field: &str) -> Result<Option<DateTime<Utc>>, CoreError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => {
            let secs = i64::try_from(parse_counter(Some(v), field)?).map_err(|_| invalid(field, v))?;
            DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| invalid(field, v))
        }
    }
}

/// Lease database time; `n/a` (static mappings) and blank mean absent.
fn parse_lease_time(raw: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, CoreError> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };
    if raw.trim().eq_ignore_ascii_case("n/a") {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw.trim(), LEASE_TIME_FORMAT)
        .map(|dt| Some(dt.and_utc()))
        .map_err(|_| invalid(field, raw))
}

// ── System ─────────────────────────────────────────────────────────

impl TryFrom<SystemInfoResponse> for SystemRecord {
    type Error = CoreError;

    fn try_from(raw: SystemInfoResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            hostname: require_str(raw.hostname, "hostname")?,
            domain: require_str(raw.domain, "domain")?,
            device_id: require_str(raw.netgate_device_id, "netgate_device_id")?,
            platform: non_blank(raw.platform),
        })
    }
}

// ── Interfaces ─────────────────────────────────────────────────────

fn interface(name: String, raw: InterfaceInfoResponse) -> Result<InterfaceStats, CoreError> {
    let field = |f: &str| format!("{name}.{f}");
    Ok(InterfaceStats {
        description: non_blank(raw.descr).unwrap_or_else(|| name.to_uppercase()),
        status: require_str(raw.status, &field("status"))?,
        address: parse_optional_ip(raw.ipaddr, &field("ipaddr"))?,
        mac: non_blank(raw.macaddr),
        bytes_in: parse_counter(raw.inbytes.as_ref(), &field("inbytes"))?,
        bytes_out: parse_counter(raw.outbytes.as_ref(), &field("outbytes"))?,
        packets_in: parse_counter(raw.inpkts.as_ref(), &field("inpkts"))?,
        packets_out: parse_counter(raw.outpkts.as_ref(), &field("outpkts"))?,
        errors_in: parse_counter(raw.inerrs.as_ref(), &field("inerrs"))?,
        errors_out: parse_counter(raw.outerrs.as_ref(), &field("outerrs"))?,
        collisions: parse_counter(raw.collisions.as_ref(), &field("collisions"))?,
        name,
    })
}

pub(crate) fn interfaces(raw: InterfaceStatsResponse) -> Result<Vec<InterfaceStats>, CoreError> {
    raw.into_iter()
        .map(|(name, info)| interface(name, info))
        .collect()
}

// ── DHCP ───────────────────────────────────────────────────────────

fn lease_state(act: Option<&str>) -> LeaseState {
    match act.map(str::trim) {
        Some("active") => LeaseState::Active,
        Some("expired") => LeaseState::Expired,
        Some("reserved") => LeaseState::Reserved,
        Some("static") => LeaseState::Static,
        _ => LeaseState::Other,
    }
}

impl TryFrom<DhcpLeaseResponse> for DhcpLease {
    type Error = CoreError;

    fn try_from(raw: DhcpLeaseResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            address: parse_ip(raw.ip, "ip")?,
            mac: require_str(raw.mac, "mac")?.to_lowercase(),
            hostname: non_blank(raw.hostname),
            description: non_blank(raw.descr),
            interface: non_blank(raw.interface),
            starts: parse_lease_time(raw.start, "start")?,
            ends: parse_lease_time(raw.end, "end")?,
            online: raw.online.as_deref().map(str::trim) == Some("online"),
            state: lease_state(raw.act.as_deref()),
        })
    }
}

pub(crate) fn dhcp_leases(raw: Vec<DhcpLeaseResponse>) -> Result<Vec<DhcpLease>, CoreError> {
    raw.into_iter().map(DhcpLease::try_from).collect()
}

// ── VPN ────────────────────────────────────────────────────────────

fn server_session(server: &str, conn: OpenVpnConnectionResponse) -> Result<VpnSession, CoreError> {
    Ok(VpnSession {
        kind: VpnKind::Server,
        name: server.to_owned(),
        common_name: non_blank(conn.common_name),
        remote_host: non_blank(conn.remote_host),
        virtual_address: non_blank(conn.virtual_addr),
        bytes_received: parse_counter(conn.bytes_recv.as_ref(), "bytes_recv")?,
        bytes_sent: parse_counter(conn.bytes_sent.as_ref(), "bytes_sent")?,
        connected_since: parse_epoch(conn.connect_time_unix.as_ref(), "connect_time_unix")?,
    })
}

fn client_session(client: OpenVpnClientResponse) -> Result<VpnSession, CoreError> {
    Ok(VpnSession {
        kind: VpnKind::Client,
        name: require_str(client.name, "name")?,
        common_name: None,
        remote_host: non_blank(client.remote_host),
        virtual_address: non_blank(client.virtual_addr),
        bytes_received: parse_counter(client.bytes_recv.as_ref(), "bytes_recv")?,
        bytes_sent: parse_counter(client.bytes_sent.as_ref(), "bytes_sent")?,
        connected_since: parse_epoch(client.connect_time_unix.as_ref(), "connect_time_unix")?,
    })
}

/// Flatten servers and clients into one session list. Only connected
/// clients count as sessions.
pub(crate) fn vpn_sessions(raw: VpnSessionsResponse) -> Result<Vec<VpnSession>, CoreError> {
    let mut sessions = Vec::new();
    for server in raw.servers {
        let name = require_str(server.name, "server.name")?;
        for conn in server.conns {
            sessions.push(server_session(&name, conn)?);
        }
    }
    for client in raw.clients {
        if client.status.as_deref().map(str::trim) == Some("up") {
            sessions.push(client_session(client)?);
        }
    }
    Ok(sessions)
}

// ── Firmware ───────────────────────────────────────────────────────

pub(crate) fn firmware_status(
    raw: FirmwareResponse,
    checked_at: DateTime<Utc>,
) -> Result<FirmwareStatus, CoreError> {
    let current_version = non_blank(raw.installed_version)
        .or_else(|| non_blank(raw.product_version))
        .ok_or_else(|| missing("installed_version"))?;
    Ok(FirmwareStatus {
        current_version,
        available_version: non_blank(raw.version),
        update_available: raw.pkg_version_compare.as_deref().map(str::trim) == Some("<"),
        checked_at,
    })
}

// ── Load ───────────────────────────────────────────────────────────

pub(crate) fn load_averages(raw: LoadAveragesResponse) -> Result<Vec<LoadAverage>, CoreError> {
    let values = raw.loadavg.ok_or_else(|| missing("loadavg"))?;
    if values.len() < LoadPeriod::ALL.len() {
        return Err(invalid(
            "loadavg",
            format!("expected 3 values, got {}", values.len()),
        ));
    }
    LoadPeriod::ALL
        .iter()
        .zip(&values)
        .map(|(&period, value)| {
            Ok(LoadAverage {
                period,
                value: parse_float(Some(value), "loadavg")?,
            })
        })
        .collect()
}

// ── CARP ───────────────────────────────────────────────────────────

fn carp_state(raw: Option<&str>) -> CarpState {
    match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
        Some("MASTER") => CarpState::Master,
        Some("BACKUP") => CarpState::Backup,
        Some("INIT") => CarpState::Init,
        Some("DISABLED") => CarpState::Disabled,
        _ => CarpState::Unknown,
    }
}

impl TryFrom<CarpVipResponse> for CarpVip {
    type Error = CoreError;

    fn try_from(raw: CarpVipResponse) -> Result<Self, Self::Error> {
        let vhid = parse_counter(raw.vhid.as_ref(), "vhid")?;
        Ok(Self {
            interface: require_str(raw.interface, "interface")?,
            vhid: u32::try_from(vhid).map_err(|_| invalid("vhid", vhid))?,
            subnet: require_str(raw.subnet, "subnet")?,
            state: carp_state(raw.status.as_deref()),
        })
    }
}

impl TryFrom<CarpResponse> for CarpStatus {
    type Error = CoreError;

    fn try_from(raw: CarpResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            enabled: raw.enabled.ok_or_else(|| missing("enabled"))?,
            vips: raw
                .vips
                .into_iter()
                .map(CarpVip::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

// ── ARP ────────────────────────────────────────────────────────────

impl TryFrom<ArpEntryResponse> for ArpEntry {
    type Error = CoreError;

    fn try_from(raw: ArpEntryResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            address: parse_ip(raw.ip, "ip")?,
            mac: require_str(raw.mac, "mac")?.to_lowercase(),
            // The appliance reports unresolved names as `?`.
            hostname: non_blank(raw.hostname).filter(|h| h != "?"),
            interface: non_blank(raw.interface),
        })
    }
}

pub(crate) fn arp_table(raw: Vec<ArpEntryResponse>) -> Result<Vec<ArpEntry>, CoreError> {
    raw.into_iter().map(ArpEntry::try_from).collect()
}
