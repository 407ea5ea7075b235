// ── Presence history types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Identity of a presence history: one peer on one interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerKey {
    pub peer_id: String,
    pub interface: String,
}

impl PeerKey {
    pub fn new(peer_id: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            interface: interface.into(),
        }
    }
}

/// Kind of presence row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PresenceEvent {
    Online,
    Offline,
}

impl PresenceEvent {
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// One row of presence history.
///
/// A row is appended only on first sighting and on accepted transitions.
/// Polls that do not change state rewrite the latest row's heartbeat
/// fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub id: Uuid,
    pub peer_id: String,
    pub interface: String,
    pub peer_name: Option<String>,
    pub public_key: Option<String>,
    pub is_online: bool,
    pub event: PresenceEvent,
    pub event_time: DateTime<Utc>,
    pub last_heartbeat_raw: String,
    /// Wall-clock time of the last heartbeat, derived from the raw age.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// When the tracker last looked at this peer.
    pub observed_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn key(&self) -> PeerKey {
        PeerKey::new(self.peer_id.clone(), self.interface.clone())
    }
}
