// ── WireGuard peer domain types ──

use serde::{Deserialize, Serialize};

use wgfleet_api::Params;

use super::handle::ResourceHandle;

/// A WireGuard peer as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub handle: Option<ResourceHandle>,
    pub interface: String,
    /// Operator-facing name. Older firmware has no name field, so this
    /// falls back to the comment.
    pub name: Option<String>,
    pub public_key: String,
    pub allowed_address: Vec<String>,
    pub endpoint_address: Option<String>,
    pub endpoint_port: Option<u16>,
    /// Where the last handshake actually came from.
    pub current_endpoint_address: Option<String>,
    pub current_endpoint_port: Option<u16>,
    /// Raw heartbeat age as the device printed it (`1m25s`, a timestamp...).
    pub last_handshake: Option<String>,
    pub persistent_keepalive: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub disabled: bool,
    pub comment: Option<String>,
}

impl Peer {
    /// Stable identity for presence tracking. Handles change when a peer
    /// is re-created; public keys do not.
    pub fn presence_id(&self) -> &str {
        &self.public_key
    }

    /// Name if set, else the public key.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.public_key)
    }
}

/// Parameters for creating a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPeer {
    pub interface: String,
    pub public_key: String,
    pub allowed_address: Vec<String>,
    pub name: Option<String>,
    pub endpoint_address: Option<String>,
    pub endpoint_port: Option<u16>,
    pub preshared_key: Option<String>,
    pub persistent_keepalive: Option<String>,
    pub comment: Option<String>,
    pub disabled: bool,
}

impl NewPeer {
    /// Device parameters for this peer, before per-command filtering.
    ///
    /// `name` is kept as its own key; the filter drops it where the
    /// device does not accept it, and the supervisor folds it into the
    /// comment first.
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("interface".into(), self.interface.clone());
        params.insert("public-key".into(), self.public_key.clone());
        if !self.allowed_address.is_empty() {
            params.insert("allowed-address".into(), self.allowed_address.join(","));
        }
        insert_opt(&mut params, "name", self.name.as_deref());
        insert_opt(&mut params, "endpoint-address", self.endpoint_address.as_deref());
        if let Some(port) = self.endpoint_port {
            params.insert("endpoint-port".into(), port.to_string());
        }
        insert_opt(&mut params, "preshared-key", self.preshared_key.as_deref());
        insert_opt(
            &mut params,
            "persistent-keepalive",
            self.persistent_keepalive.as_deref(),
        );
        insert_opt(&mut params, "comment", self.comment.as_deref());
        if self.disabled {
            params.insert("disabled".into(), "yes".into());
        }
        params
    }
}

/// Field changes for an existing peer. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerUpdate {
    pub public_key: Option<String>,
    pub allowed_address: Option<Vec<String>>,
    pub endpoint_address: Option<String>,
    pub endpoint_port: Option<u16>,
    pub preshared_key: Option<String>,
    pub persistent_keepalive: Option<String>,
    pub comment: Option<String>,
    pub disabled: Option<bool>,
}

impl PeerUpdate {
    pub fn is_empty(&self) -> bool {
        self.to_params().is_empty()
    }

    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        insert_opt(&mut params, "public-key", self.public_key.as_deref());
        if let Some(addresses) = &self.allowed_address {
            params.insert("allowed-address".into(), addresses.join(","));
        }
        insert_opt(&mut params, "endpoint-address", self.endpoint_address.as_deref());
        if let Some(port) = self.endpoint_port {
            params.insert("endpoint-port".into(), port.to_string());
        }
        insert_opt(&mut params, "preshared-key", self.preshared_key.as_deref());
        insert_opt(
            &mut params,
            "persistent-keepalive",
            self.persistent_keepalive.as_deref(),
        );
        insert_opt(&mut params, "comment", self.comment.as_deref());
        if let Some(disabled) = self.disabled {
            params.insert("disabled".into(), yes_no(disabled).into());
        }
        params
    }
}

pub(crate) fn insert_opt(params: &mut Params, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        params.insert(key.to_owned(), value.to_owned());
    }
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_peer_params_skip_unset_fields() {
        let peer = NewPeer {
            interface: "wg0".into(),
            public_key: "AAAA".into(),
            allowed_address: vec!["10.0.0.2/32".into(), "fd00::2/128".into()],
            endpoint_port: Some(51820),
            ..NewPeer::default()
        };
        let params = peer.to_params();
        assert_eq!(params["allowed-address"], "10.0.0.2/32,fd00::2/128");
        assert_eq!(params["endpoint-port"], "51820");
        assert!(!params.contains_key("comment"));
        assert!(!params.contains_key("disabled"));
    }

    #[test]
    fn empty_update_has_no_params() {
        assert!(PeerUpdate::default().is_empty());
        let update = PeerUpdate {
            disabled: Some(false),
            ..PeerUpdate::default()
        };
        assert_eq!(update.to_params()["disabled"], "no");
    }
}
