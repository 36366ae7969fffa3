// ── Category fetchers ──
//
// One fetcher per category. Each issues its RPC call(s) through a held
// session lease, normalizes the response, and folds every failure into a
// `FetchOutcome` so the poller can keep going.

use chrono::Utc;

use pfwatch_api::{HostnameLookup, RpcTransport};

use crate::convert;
use crate::lease::SessionLease;
use crate::model::{Category, CategoryRecord, SystemRecord};
use crate::store::{FetchFailure, FetchOutcome};

/// Fetch one category. Never fails: errors become `FetchOutcome::Failed`.
pub async fn fetch_category<T: RpcTransport>(
    lease: &SessionLease<T>,
    category: Category,
) -> FetchOutcome {
    let result = match category {
        Category::System => fetch_system(lease).await,
        Category::Interfaces => fetch_interfaces(lease).await,
        Category::Dhcp => fetch_dhcp(lease).await,
        Category::Vpn => fetch_vpn(lease).await,
        Category::Firmware => fetch_firmware(lease).await,
        Category::Load => fetch_load(lease).await,
        Category::Carp => fetch_carp(lease).await,
        Category::Arp => fetch_arp(lease).await,
    };
    match result {
        Ok(record) => FetchOutcome::Ok(record),
        Err(failure) => FetchOutcome::Failed(failure),
    }
}

async fn fetch_system<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_system_info().await?;
    Ok(CategoryRecord::System(SystemRecord::try_from(raw)?))
}

async fn fetch_interfaces<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_interface_stats().await?;
    Ok(CategoryRecord::Interfaces(convert::interfaces(raw)?))
}

/// Reverse lookups are never requested during a poll: one DNS query per
/// lease would blow the cycle budget on a busy network.
async fn fetch_dhcp<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_dhcp_leases(HostnameLookup::Skip).await?;
    Ok(CategoryRecord::Dhcp(convert::dhcp_leases(raw)?))
}

async fn fetch_vpn<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_vpn_sessions().await?;
    Ok(CategoryRecord::Vpn(convert::vpn_sessions(raw)?))
}

async fn fetch_firmware<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_firmware_status().await?;
    Ok(CategoryRecord::Firmware(convert::firmware_status(
        raw,
        Utc::now(),
    )?))
}

async fn fetch_load<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_load_averages().await?;
    Ok(CategoryRecord::Load(convert::load_averages(raw)?))
}

async fn fetch_carp<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_carp_status().await?;
    Ok(CategoryRecord::Carp(raw.try_into()?))
}

async fn fetch_arp<T: RpcTransport>(
    lease: &SessionLease<T>,
) -> Result<CategoryRecord, FetchFailure> {
    let raw = lease.get_arp_table(HostnameLookup::Skip).await?;
    Ok(CategoryRecord::Arp(convert::arp_table(raw)?))
}
