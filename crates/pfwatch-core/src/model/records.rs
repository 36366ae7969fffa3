// ── Normalized category records ──
//
// What a successful fetch produces. Counters are real numbers parsed from
// the appliance; a record with a missing counter is never built.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub hostname: String,
    pub domain: String,
    /// Netgate device ID, stable across reinstalls.
    pub device_id: String,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStats {
    /// Internal name (`wan`, `lan`, `opt1`).
    pub name: String,
    /// Operator-assigned description (`WAN`, `LAN`, `GUEST`).
    pub description: String,
    pub status: String,
    pub address: Option<IpAddr>,
    pub mac: Option<String>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub collisions: u64,
}

impl InterfaceStats {
    pub fn is_up(&self) -> bool {
        matches!(self.status.as_str(), "up" | "associated")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LeaseState {
    Active,
    Expired,
    Reserved,
    Static,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub address: IpAddr,
    pub mac: String,
    pub hostname: Option<String>,
    pub description: Option<String>,
    pub interface: Option<String>,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
    pub online: bool,
    pub state: LeaseState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpnKind {
    /// A client connected to one of the appliance's OpenVPN servers.
    Server,
    /// One of the appliance's own OpenVPN client tunnels.
    Client,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnSession {
    pub kind: VpnKind,
    /// Server or client instance name.
    pub name: String,
    pub common_name: Option<String>,
    pub remote_host: Option<String>,
    pub virtual_address: Option<String>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connected_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareStatus {
    pub current_version: String,
    pub available_version: Option<String>,
    pub update_available: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadPeriod {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl LoadPeriod {
    pub const ALL: [Self; 3] = [Self::OneMinute, Self::FiveMinutes, Self::FifteenMinutes];
}

/// System load average. Unit-less; named by its averaging period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub period: LoadPeriod,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CarpState {
    Master,
    Backup,
    Init,
    Disabled,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarpVip {
    pub interface: String,
    pub vhid: u32,
    pub subnet: String,
    pub state: CarpState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarpStatus {
    pub enabled: bool,
    pub vips: Vec<CarpVip>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub address: IpAddr,
    pub mac: String,
    pub hostname: Option<String>,
    pub interface: Option<String>,
}

/// The normalized result of one successful category fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CategoryRecord {
    System(SystemRecord),
    Interfaces(Vec<InterfaceStats>),
    Dhcp(Vec<DhcpLease>),
    Vpn(Vec<VpnSession>),
    Firmware(FirmwareStatus),
    Load(Vec<LoadAverage>),
    Carp(CarpStatus),
    Arp(Vec<ArpEntry>),
}

impl CategoryRecord {
    pub fn category(&self) -> Category {
        match self {
            Self::System(_) => Category::System,
            Self::Interfaces(_) => Category::Interfaces,
            Self::Dhcp(_) => Category::Dhcp,
            Self::Vpn(_) => Category::Vpn,
            Self::Firmware(_) => Category::Firmware,
            Self::Load(_) => Category::Load,
            Self::Carp(_) => Category::Carp,
            Self::Arp(_) => Category::Arp,
        }
    }

    pub fn as_system(&self) -> Option<&SystemRecord> {
        match self {
            Self::System(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_interfaces(&self) -> Option<&[InterfaceStats]> {
        match self {
            Self::Interfaces(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_dhcp(&self) -> Option<&[DhcpLease]> {
        match self {
            Self::Dhcp(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_vpn(&self) -> Option<&[VpnSession]> {
        match self {
            Self::Vpn(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_firmware(&self) -> Option<&FirmwareStatus> {
        match self {
            Self::Firmware(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_load(&self) -> Option<&[LoadAverage]> {
        match self {
            Self::Load(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_carp(&self) -> Option<&CarpStatus> {
        match self {
            Self::Carp(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_arp(&self) -> Option<&[ArpEntry]> {
        match self {
            Self::Arp(r) => Some(r),
            _ => None,
        }
    }
}
