// ── Domain model ──
//
// Canonical types the supervisor hands out. Field names here are the
// only spelling callers ever see; `convert` maps raw device records in.

pub mod handle;
pub mod interface;
pub mod peer;
pub mod presence;
pub mod route;
pub mod traffic;

pub use handle::ResourceHandle;
pub use interface::{InterfaceCounters, NewInterface, WgInterface};
pub use peer::{NewPeer, Peer, PeerUpdate};
pub use presence::{PeerKey, PresenceEvent, PresenceRecord};
pub use route::{NewRoute, Route};
pub use traffic::{InterfaceRate, TrafficSnapshot};
