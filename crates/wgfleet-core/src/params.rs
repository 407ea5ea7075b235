// ── Parameter filtering ──
//
// The device mishandles parameters it does not expect at a given path
// (some are silently ignored, some fail the whole call), so each write is
// reduced to the keys that resource accepts for that verb before it is
// sent. The handle (`.id`) is added by the caller after filtering.

use strum::Display;
use tracing::warn;

use wgfleet_api::{DeviceCommand, Params};

use crate::convert::canonical_key;

/// Resource families the supervisor writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Interface,
    Peer,
    Route,
}

const INTERFACE_ADD: &[&str] = &[
    "name",
    "listen-port",
    "mtu",
    "private-key",
    "comment",
    "disabled",
];
const INTERFACE_SET: &[&str] = &["listen-port", "mtu", "private-key", "comment", "disabled"];

const PEER_ADD: &[&str] = &[
    "interface",
    "public-key",
    "allowed-address",
    "endpoint-address",
    "endpoint-port",
    "preshared-key",
    "persistent-keepalive",
    "comment",
    "disabled",
];
const PEER_SET: &[&str] = &[
    "public-key",
    "allowed-address",
    "endpoint-address",
    "endpoint-port",
    "preshared-key",
    "persistent-keepalive",
    "comment",
    "disabled",
];
const PEER_PRINT: &[&str] = &["interface"];

const ROUTE_ADD: &[&str] = &[
    "dst-address",
    "gateway",
    "distance",
    "routing-table",
    "comment",
    "disabled",
];
const ROUTE_SET: &[&str] = &["gateway", "distance", "comment", "disabled"];

impl ResourceKind {
    /// Device path for this resource.
    pub fn path(self) -> &'static str {
        match self {
            Self::Interface => "/interface/wireguard",
            Self::Peer => "/interface/wireguard/peers",
            Self::Route => "/ip/route",
        }
    }

    /// Keys `command` accepts at this path, besides `.id`.
    pub fn accepted(self, command: DeviceCommand) -> &'static [&'static str] {
        match (self, command) {
            (Self::Interface, DeviceCommand::Add) => INTERFACE_ADD,
            (Self::Interface, DeviceCommand::Set) => INTERFACE_SET,
            (Self::Peer, DeviceCommand::Add) => PEER_ADD,
            (Self::Peer, DeviceCommand::Set) => PEER_SET,
            (Self::Peer, DeviceCommand::Print) => PEER_PRINT,
            (Self::Route, DeviceCommand::Add) => ROUTE_ADD,
            (Self::Route, DeviceCommand::Set) => ROUTE_SET,
            _ => &[],
        }
    }

    /// Keep only what the device accepts for `command` on this resource.
    ///
    /// Keys are compared in canonical form and sent in canonical form.
    pub fn filter(self, command: DeviceCommand, params: &Params) -> Params {
        let accepted = self.accepted(command);
        let mut kept = Params::with_capacity(params.len());
        for (key, value) in params {
            let key = canonical_key(key);
            if accepted.contains(&key.as_str()) {
                kept.insert(key, value.clone());
            } else {
                warn!(resource = %self, %command, param = %key, "dropping unsupported parameter");
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn peer_add_drops_name() {
        let filtered = ResourceKind::Peer.filter(
            DeviceCommand::Add,
            &params(&[
                ("interface", "wg0"),
                ("public-key", "AAAA"),
                ("name", "laptop"),
                ("comment", "laptop"),
            ]),
        );
        assert_eq!(filtered.len(), 3);
        assert!(!filtered.contains_key("name"));
    }

    #[test]
    fn peer_set_cannot_move_interface() {
        let filtered = ResourceKind::Peer.filter(
            DeviceCommand::Set,
            &params(&[("interface", "wg1"), ("allowedAddress", "10.0.0.9/32")]),
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["allowed-address"], "10.0.0.9/32");
    }

    #[test]
    fn remove_accepts_nothing_but_the_handle() {
        let filtered =
            ResourceKind::Route.filter(DeviceCommand::Remove, &params(&[("comment", "x")]));
        assert!(filtered.is_empty());
    }

    #[test]
    fn paths_are_distinct() {
        assert_eq!(ResourceKind::Peer.path(), "/interface/wireguard/peers");
        assert_ne!(ResourceKind::Interface.path(), ResourceKind::Route.path());
        assert_eq!(ResourceKind::Peer.to_string(), "peer");
    }
}
