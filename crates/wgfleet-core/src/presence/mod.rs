// ── Presence ──
//
// Debounced online/offline history for WireGuard peers, fed either by
// callers of `PresenceTracker::track` or by the background monitor.

pub mod heartbeat;
pub mod monitor;
pub mod store;
pub mod summary;
pub mod tracker;

pub use heartbeat::parse_heartbeat_age;
pub use monitor::PresenceMonitor;
pub use store::{MemoryPresenceStore, PresenceQuery, PresenceStore, RecordUpdate, StoreError};
pub use summary::StatusSummary;
pub use tracker::{Observation, PeerSighting, PresenceTracker};
