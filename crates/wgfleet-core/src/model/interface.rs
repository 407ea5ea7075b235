// ── WireGuard interface domain types ──

use serde::{Deserialize, Serialize};

use super::handle::ResourceHandle;

/// A WireGuard interface as configured on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WgInterface {
    pub handle: Option<ResourceHandle>,
    pub name: String,
    pub listen_port: Option<u16>,
    pub mtu: Option<u32>,
    pub public_key: Option<String>,
    pub running: bool,
    pub disabled: bool,
    pub comment: Option<String>,
}

/// Byte and packet counters for any interface (WAN or WireGuard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub name: String,
    /// Device-side interface type (`ether`, `wg`, `pppoe-out`...).
    pub kind: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub running: bool,
}

impl InterfaceCounters {
    pub fn is_wireguard(&self) -> bool {
        self.kind.as_deref() == Some("wg")
    }
}

/// Parameters for creating a WireGuard interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewInterface {
    pub name: String,
    pub listen_port: Option<u16>,
    pub mtu: Option<u32>,
    pub private_key: Option<String>,
    pub comment: Option<String>,
}
