// ── Data categories ──

use serde::{Deserialize, Serialize};

/// One logical domain of monitored appliance data.
///
/// Each category is fetched independently and succeeds or fails on its
/// own. Declaration order is the default fetch order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    System,
    Interfaces,
    Dhcp,
    Vpn,
    Firmware,
    Load,
    Carp,
    /// Neighbor table, only collected when device tracking is enabled.
    Arp,
}

impl Category {
    /// Categories polled when nothing else is configured.
    pub const DEFAULT_SET: [Self; 7] = [
        Self::System,
        Self::Interfaces,
        Self::Dhcp,
        Self::Vpn,
        Self::Firmware,
        Self::Load,
        Self::Carp,
    ];

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
