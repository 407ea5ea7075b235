//! Device-access and presence layer for fleets of WireGuard routers.
//!
//! This crate sits between `wgfleet-api` (one blocking, stateful device
//! session) and whatever serves operators (the `wgfleet` CLI, an HTTP layer):
//!
//! - **[`ConnectionSupervisor`]**: Owns the single device session. Every
//!   call is serialized, runs on the blocking pool under a deadline, and is
//!   retried with a fresh session when the failure is transient. Typed
//!   helpers ([`list_peers`](ConnectionSupervisor::list_peers),
//!   [`add_peer`](ConnectionSupervisor::add_peer), ...) read through a
//!   [`TtlCache`] and invalidate it on mutation.
//!
//! - **[`PresenceTracker`]**: Turns the jittery "time since last handshake"
//!   reading into a debounced online/offline history, stored through the
//!   [`PresenceStore`] boundary, with log and summary queries.
//!
//! - **[`Topic`]**: Realtime fan-out. One poll task per topic, alive exactly
//!   while the topic has subscribers.
//!
//! - **Domain model** ([`model`]): Canonical `WgInterface`, `Peer` and
//!   `Route` types. Raw device field spellings never leave the supervisor.

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod params;
pub mod presence;
pub mod realtime;
pub mod resolve;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::TtlCache;
pub use config::{DeviceConfig, PresencePolicy, RealtimeConfig, TlsVerification};
pub use error::CoreError;
pub use params::ResourceKind;
pub use presence::{
    MemoryPresenceStore, Observation, PeerSighting, PresenceMonitor, PresenceQuery,
    PresenceStore, PresenceTracker, RecordUpdate, StatusSummary, StoreError, parse_heartbeat_age,
};
pub use realtime::{
    ChannelSubscriber, MessageBody, PeerSetSource, Subscriber, SubscriberGone, SubscriberId,
    TelemetrySource, Topic, TopicMessage, TrafficSource, TrafficTargets,
};
pub use resolve::{HandleCandidate, MatchStrategy, resolve_handle};
pub use supervisor::{CachePolicy, ConnectionState, ConnectionSupervisor, SupervisorStats};

pub use model::{
    InterfaceCounters, InterfaceRate, NewInterface, NewPeer, NewRoute, PeerKey, Peer,
    PeerUpdate, PresenceEvent, PresenceRecord, ResourceHandle, Route, TrafficSnapshot,
    WgInterface,
};
