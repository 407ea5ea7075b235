use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters and derived rates for one interface at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceRate {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    /// Bits per second since the previous sample (0 on the first one).
    pub rx_bps: u64,
    pub tx_bps: u64,
}

/// One traffic topic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficSnapshot {
    pub timestamp: DateTime<Utc>,
    pub wan: Vec<InterfaceRate>,
    pub wireguard: Vec<InterfaceRate>,
    /// Sum over every WireGuard interface.
    pub wireguard_total: InterfaceRate,
}
