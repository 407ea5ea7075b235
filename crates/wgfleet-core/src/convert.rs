// ── Device record normalization ──
//
// The device reports the same logical field under several spellings
// (`public-key`, `publicKey`, `public_key`, `.id` vs `id`). Keys are
// canonicalized first; the remaining true synonyms are listed per field
// below. Nothing above the supervisor sees a raw record.

use std::str::FromStr;

use wgfleet_api::Record;

use crate::model::{InterfaceCounters, Peer, ResourceHandle, Route, WgInterface};

// ── Field aliases ────────────────────────────────────────────────────

const ID: &[&str] = &["id", "numbers", "ret"];
const NAME: &[&str] = &["name"];
const COMMENT: &[&str] = &["comment"];
const INTERFACE: &[&str] = &["interface", "iface"];
const PUBLIC_KEY: &[&str] = &["public-key", "pubkey"];
const ALLOWED_ADDRESS: &[&str] = &["allowed-address", "allowed-addresses", "allowed-ips"];
const ENDPOINT_ADDRESS: &[&str] = &["endpoint-address", "endpoint"];
const ENDPOINT_PORT: &[&str] = &["endpoint-port"];
const CURRENT_ENDPOINT_ADDRESS: &[&str] = &["current-endpoint-address"];
const CURRENT_ENDPOINT_PORT: &[&str] = &["current-endpoint-port"];
const LAST_HANDSHAKE: &[&str] = &["last-handshake", "latest-handshake", "last-handshake-time"];
const KEEPALIVE: &[&str] = &["persistent-keepalive", "keepalive"];
const LISTEN_PORT: &[&str] = &["listen-port", "port"];
const MTU: &[&str] = &["mtu", "actual-mtu"];
const RUNNING: &[&str] = &["running"];
const DISABLED: &[&str] = &["disabled"];
const KIND: &[&str] = &["type"];
const RX_BYTES: &[&str] = &["rx-byte", "rx-bytes", "rx"];
const TX_BYTES: &[&str] = &["tx-byte", "tx-bytes", "tx"];
const RX_PACKETS: &[&str] = &["rx-packet", "rx-packets"];
const TX_PACKETS: &[&str] = &["tx-packet", "tx-packets"];
const DST_ADDRESS: &[&str] = &["dst-address", "destination"];
const GATEWAY: &[&str] = &["gateway"];
const DISTANCE: &[&str] = &["distance"];
const ROUTING_TABLE: &[&str] = &["routing-table", "routing-mark"];
const ACTIVE: &[&str] = &["active"];
const DYNAMIC: &[&str] = &["dynamic"];

/// Fold a raw field name into its canonical kebab-case spelling.
///
/// Lowercases, splits camelCase, turns `_` and spaces into `-`, and drops
/// the leading `.` of system fields (`.id` -> `id`).
pub fn canonical_key(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.');
    let mut out = String::with_capacity(trimmed.len() + 4);
    let mut after_lower = false;

    for ch in trimmed.chars() {
        match ch {
            '-' | '_' | ' ' => {
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
                after_lower = false;
            }
            c if c.is_ascii_uppercase() => {
                if after_lower {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
                after_lower = false;
            }
            c => {
                out.push(c);
                after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
    }
    out
}

/// Canonicalize every key of `record`. On collision the first field wins.
pub fn normalize_record(record: &Record) -> Record {
    let mut out = Record::with_capacity(record.len());
    for (key, value) in record {
        out.entry(canonical_key(key))
            .or_insert_with(|| value.clone());
    }
    out
}

// ── Field access ─────────────────────────────────────────────────────

/// Alias-aware read access over a normalized record.
pub(crate) struct Fields(Record);

impl Fields {
    pub(crate) fn new(record: &Record) -> Self {
        Self(normalize_record(record))
    }

    /// First non-empty value among `aliases`.
    pub(crate) fn text(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .filter_map(|alias| self.0.get(*alias))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub(crate) fn owned(&self, aliases: &[&str]) -> Option<String> {
        self.text(aliases).map(str::to_owned)
    }

    pub(crate) fn flag(&self, aliases: &[&str]) -> bool {
        self.text(aliases)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes"))
    }

    pub(crate) fn number<T: FromStr>(&self, aliases: &[&str]) -> Option<T> {
        self.text(aliases).and_then(|v| v.parse().ok())
    }

    pub(crate) fn list(&self, aliases: &[&str]) -> Vec<String> {
        self.text(aliases)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn handle(&self) -> Option<ResourceHandle> {
        self.text(ID).map(ResourceHandle::new)
    }
}

/// Handle returned by an `add` (`ret` on the binary protocol, `.id` on REST).
pub(crate) fn created_handle(records: &[Record]) -> Option<ResourceHandle> {
    records.first().and_then(|r| Fields::new(r).handle())
}

// ── Record -> domain conversions ─────────────────────────────────────

impl From<&Record> for WgInterface {
    fn from(record: &Record) -> Self {
        let f = Fields::new(record);
        Self {
            handle: f.handle(),
            name: f.owned(NAME).unwrap_or_default(),
            listen_port: f.number(LISTEN_PORT),
            mtu: f.number(MTU),
            public_key: f.owned(PUBLIC_KEY),
            running: f.flag(RUNNING),
            disabled: f.flag(DISABLED),
            comment: f.owned(COMMENT),
        }
    }
}

impl From<&Record> for Peer {
    fn from(record: &Record) -> Self {
        let f = Fields::new(record);
        let comment = f.owned(COMMENT);
        Self {
            handle: f.handle(),
            interface: f.owned(INTERFACE).unwrap_or_default(),
            name: f.owned(NAME).or_else(|| comment.clone()),
            public_key: f.owned(PUBLIC_KEY).unwrap_or_default(),
            allowed_address: f.list(ALLOWED_ADDRESS),
            endpoint_address: f.owned(ENDPOINT_ADDRESS),
            endpoint_port: f.number(ENDPOINT_PORT),
            current_endpoint_address: f.owned(CURRENT_ENDPOINT_ADDRESS),
            current_endpoint_port: f.number(CURRENT_ENDPOINT_PORT),
            last_handshake: f.owned(LAST_HANDSHAKE),
            persistent_keepalive: f.owned(KEEPALIVE),
            rx_bytes: f.number(RX_BYTES).unwrap_or(0),
            tx_bytes: f.number(TX_BYTES).unwrap_or(0),
            disabled: f.flag(DISABLED),
            comment,
        }
    }
}

impl From<&Record> for Route {
    fn from(record: &Record) -> Self {
        let f = Fields::new(record);
        Self {
            handle: f.handle(),
            dst_address: f.owned(DST_ADDRESS).unwrap_or_default(),
            gateway: f.owned(GATEWAY),
            distance: f.number(DISTANCE),
            routing_table: f.owned(ROUTING_TABLE),
            active: f.flag(ACTIVE),
            dynamic: f.flag(DYNAMIC),
            disabled: f.flag(DISABLED),
            comment: f.owned(COMMENT),
        }
    }
}

impl From<&Record> for InterfaceCounters {
    fn from(record: &Record) -> Self {
        let f = Fields::new(record);
        Self {
            name: f.owned(NAME).unwrap_or_default(),
            kind: f.owned(KIND),
            rx_bytes: f.number(RX_BYTES).unwrap_or(0),
            tx_bytes: f.number(TX_BYTES).unwrap_or(0),
            rx_packets: f.number(RX_PACKETS).unwrap_or(0),
            tx_packets: f.number(TX_PACKETS).unwrap_or(0),
            running: f.flag(RUNNING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn canonical_key_folds_spellings() {
        for raw in ["public-key", "publicKey", "PublicKey", "public_key", "PUBLIC-KEY"] {
            assert_eq!(canonical_key(raw), "public-key", "{raw}");
        }
        assert_eq!(canonical_key(".id"), "id");
        assert_eq!(canonical_key("rxByte"), "rx-byte");
        assert_eq!(canonical_key("listen port"), "listen-port");
        assert_eq!(canonical_key("mtu"), "mtu");
    }

    #[test]
    fn normalize_keeps_first_of_colliding_spellings() {
        let raw = record(&[("publicKey", "first"), ("public-key", "second")]);
        let normalized = normalize_record(&raw);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized["public-key"], "first");
    }

    #[test]
    fn peer_from_mixed_spellings() {
        let raw = record(&[
            (".id", "*7"),
            ("interface", "wg0"),
            ("publicKey", "AAAA"),
            ("allowed_address", "10.0.0.2/32, fd00::2/128"),
            ("endpointPort", "51820"),
            ("last-handshake", "1m5s"),
            ("rx", "1024"),
            ("comment", "laptop"),
            ("disabled", "false"),
        ]);
        let peer = Peer::from(&raw);
        assert_eq!(peer.handle, Some(ResourceHandle::new("*7")));
        assert_eq!(peer.public_key, "AAAA");
        assert_eq!(peer.allowed_address, vec!["10.0.0.2/32", "fd00::2/128"]);
        assert_eq!(peer.endpoint_port, Some(51820));
        assert_eq!(peer.last_handshake.as_deref(), Some("1m5s"));
        assert_eq!(peer.rx_bytes, 1024);
        assert_eq!(peer.name.as_deref(), Some("laptop"));
        assert!(!peer.disabled);
    }

    #[test]
    fn interface_and_counters() {
        let iface = WgInterface::from(&record(&[
            (".id", "*1"),
            ("name", "wg0"),
            ("listen-port", "13231"),
            ("mtu", "1420"),
            ("running", "true"),
        ]));
        assert_eq!(iface.name, "wg0");
        assert_eq!(iface.listen_port, Some(13231));
        assert!(iface.running);

        let counters = InterfaceCounters::from(&record(&[
            ("name", "ether1"),
            ("type", "ether"),
            ("rx-byte", "5000"),
            ("tx-byte", "7000"),
        ]));
        assert_eq!(counters.rx_bytes, 5000);
        assert_eq!(counters.tx_bytes, 7000);
        assert!(!counters.is_wireguard());
    }

    #[test]
    fn route_from_record() {
        let route = Route::from(&record(&[
            (".id", "*2"),
            ("dst-address", "10.10.0.0/24"),
            ("gateway", "wg0"),
            ("distance", "1"),
            ("active", "true"),
        ]));
        assert_eq!(route.dst_address, "10.10.0.0/24");
        assert_eq!(route.gateway.as_deref(), Some("wg0"));
        assert_eq!(route.distance, Some(1));
        assert!(route.active);
    }

    #[test]
    fn created_handle_reads_ret_or_id() {
        assert_eq!(
            created_handle(&[record(&[("ret", "*A")])]),
            Some(ResourceHandle::new("*A"))
        );
        assert_eq!(
            created_handle(&[record(&[(".id", "*B")])]),
            Some(ResourceHandle::new("*B"))
        );
        assert_eq!(created_handle(&[]), None);
    }
}
