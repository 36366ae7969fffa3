// ── Domain model ──
//
// Canonical records produced by the category fetchers. Every type here is
// plain data: cloneable, serializable, and independent of the wire shapes
// in `pfwatch_api::models`.

pub mod category;
pub mod records;

pub use category::Category;
pub use records::{
    ArpEntry, CarpState, CarpStatus, CarpVip, CategoryRecord, DhcpLease, FirmwareStatus,
    InterfaceStats, LeaseState, LoadAverage, LoadPeriod, SystemRecord, VpnKind, VpnSession,
};
