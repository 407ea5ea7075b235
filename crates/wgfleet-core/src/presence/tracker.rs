// ── Presence tracker ──
//
// Turns per-poll heartbeat readings into a debounced online/offline
// history. Rows are appended on first sighting and on corroborated
// transitions only; every other poll rewrites the latest row in place.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{PresenceQuery, PresenceStore, RecordUpdate};
use super::summary::StatusSummary;
use crate::config::PresencePolicy;
use crate::error::CoreError;
use crate::model::{Peer, PeerKey, PresenceEvent, PresenceRecord};

const EVENT_CAPACITY: usize = 256;

/// One heartbeat reading for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSighting {
    pub peer_id: String,
    pub interface: String,
    pub peer_name: Option<String>,
    pub public_key: Option<String>,
    /// Heartbeat age exactly as the device printed it.
    pub raw_heartbeat: String,
}

impl PeerSighting {
    pub fn new(
        peer_id: impl Into<String>,
        interface: impl Into<String>,
        raw_heartbeat: impl Into<String>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            interface: interface.into(),
            peer_name: None,
            public_key: None,
            raw_heartbeat: raw_heartbeat.into(),
        }
    }

    /// A peer that has never shaken hands reads as `never`.
    pub fn from_peer(interface: &str, peer: &Peer) -> Self {
        Self {
            peer_id: peer.presence_id().to_owned(),
            interface: interface.to_owned(),
            peer_name: peer.name.clone(),
            public_key: Some(peer.public_key.clone()),
            raw_heartbeat: peer
                .last_handshake
                .clone()
                .unwrap_or_else(|| "never".into()),
        }
    }
}

/// What one `track` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// No history existed; the first row was appended.
    FirstSeen(PresenceRecord),
    /// Same state as the latest row, which was refreshed in place.
    Unchanged,
    /// The reading disagreed with the latest row but was not strong
    /// enough to count. The row was refreshed and `online` is still the
    /// recorded state.
    Suppressed { online: bool },
    /// A corroborated flip; the new row was appended.
    Transition(PresenceRecord),
}

impl Observation {
    /// The row this call appended, if any.
    pub fn appended(&self) -> Option<&PresenceRecord> {
        match self {
            Self::FirstSeen(record) | Self::Transition(record) => Some(record),
            Self::Unchanged | Self::Suppressed { .. } => None,
        }
    }
}

/// Debounced presence history over a [`PresenceStore`].
///
/// Cheaply cloneable. Calls for the same (peer, interface) are processed
/// one at a time in call order; different peers never wait on each other.
pub struct PresenceTracker<S> {
    inner: Arc<TrackerInner<S>>,
}

impl<S> Clone for PresenceTracker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct TrackerInner<S> {
    store: Arc<S>,
    policy: PresencePolicy,
    locks: DashMap<PeerKey, Arc<Mutex<()>>>,
    events: broadcast::Sender<Arc<PresenceRecord>>,
}

impl<S: PresenceStore> PresenceTracker<S> {
    pub fn new(store: Arc<S>, policy: PresencePolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                store,
                policy,
                locks: DashMap::new(),
                events,
            }),
        }
    }

    pub fn policy(&self) -> &PresencePolicy {
        &self.inner.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Every appended row (first sightings and transitions), as it happens.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PresenceRecord>> {
        self.inner.events.subscribe()
    }

    pub async fn track(&self, sighting: PeerSighting) -> Result<Observation, CoreError> {
        self.track_at(sighting, Utc::now()).await
    }

    /// [`track`](Self::track) with an explicit clock.
    pub async fn track_at(
        &self,
        sighting: PeerSighting,
        now: DateTime<Utc>,
    ) -> Result<Observation, CoreError> {
        let key = PeerKey::new(sighting.peer_id.clone(), sighting.interface.clone());
        let lock = Arc::clone(self.inner.locks.entry(key.clone()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            self.track_locked(&key, &sighting, now).await
        };
        drop(lock);
        // Nobody else holds or waits on it: forget the key.
        self.inner
            .locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn track_locked(
        &self,
        key: &PeerKey,
        sighting: &PeerSighting,
        now: DateTime<Utc>,
    ) -> Result<Observation, CoreError> {
        let policy = &self.inner.policy;
        let age = policy.heartbeat_age(&sighting.raw_heartbeat, now);
        let online = age.is_some_and(|a| policy.age_is_online(a));
        let heartbeat_at = age.and_then(|a| heartbeat_time(now, a));

        let Some(prior) = self.inner.store.query_latest(key).await? else {
            let record = self.append(sighting, online, now, heartbeat_at).await?;
            info!(
                peer = %key.peer_id,
                interface = %key.interface,
                event = %record.event,
                "peer first seen"
            );
            return Ok(Observation::FirstSeen(record));
        };

        let carried = heartbeat_at.or(prior.last_heartbeat_at);

        if prior.is_online == online {
            self.refresh(&prior, sighting, now, carried).await?;
            return Ok(Observation::Unchanged);
        }

        if self.corroborated(&prior, online, age, now) {
            let record = self.append(sighting, online, now, carried).await?;
            info!(
                peer = %key.peer_id,
                interface = %key.interface,
                event = %record.event,
                raw = %sighting.raw_heartbeat,
                "presence transition"
            );
            Ok(Observation::Transition(record))
        } else {
            debug!(
                peer = %key.peer_id,
                interface = %key.interface,
                raw = %sighting.raw_heartbeat,
                "uncorroborated presence flip ignored"
            );
            self.refresh(&prior, sighting, now, carried).await?;
            Ok(Observation::Suppressed {
                online: prior.is_online,
            })
        }
    }

    /// Track every peer from one listing of `interface`.
    pub async fn track_peers(
        &self,
        interface: &str,
        peers: &[Peer],
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, CoreError> {
        let mut observations = Vec::with_capacity(peers.len());
        for peer in peers.iter().filter(|p| !p.presence_id().is_empty()) {
            let observation = self
                .track_at(PeerSighting::from_peer(interface, peer), now)
                .await?;
            observations.push(observation);
        }
        Ok(observations)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// History rows in the window, newest first.
    pub async fn get_logs(&self, query: &PresenceQuery) -> Result<Vec<PresenceRecord>, CoreError> {
        Ok(self.inner.store.query_range(query).await?)
    }

    /// Summary of the window, `None` when it holds no history. The limit
    /// of `query` is ignored.
    pub async fn get_status_summary(
        &self,
        query: &PresenceQuery,
    ) -> Result<Option<StatusSummary>, CoreError> {
        self.summary_at(query, Utc::now()).await
    }

    pub async fn summary_at(
        &self,
        query: &PresenceQuery,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusSummary>, CoreError> {
        let unbounded = PresenceQuery {
            limit: None,
            ..query.clone()
        };
        let mut history = self.inner.store.query_range(&unbounded).await?;
        history.reverse();
        let window_end = query.to.map_or(now, |to| to.min(now));
        Ok(StatusSummary::from_history(&query.key, &history, window_end))
    }

    // ── Internals ────────────────────────────────────────────────

    /// Whether a flip away from `prior` is backed by the reading itself.
    ///
    /// Going offline needs the peer silent for the confirmation window;
    /// with no readable age, silence is measured from the last known
    /// heartbeat. Coming back needs a clearly fresh heartbeat.
    fn corroborated(
        &self,
        prior: &PresenceRecord,
        online: bool,
        age: Option<u64>,
        now: DateTime<Utc>,
    ) -> bool {
        let policy = &self.inner.policy;
        if online {
            return age.is_some_and(|a| policy.confirms_online(a));
        }
        let silent = age.unwrap_or_else(|| {
            let since = prior.last_heartbeat_at.unwrap_or(prior.event_time);
            u64::try_from((now - since).num_seconds()).unwrap_or(0)
        });
        policy.confirms_offline(silent)
    }

    async fn append(
        &self,
        sighting: &PeerSighting,
        online: bool,
        now: DateTime<Utc>,
        heartbeat_at: Option<DateTime<Utc>>,
    ) -> Result<PresenceRecord, CoreError> {
        let record = PresenceRecord {
            id: Uuid::new_v4(),
            peer_id: sighting.peer_id.clone(),
            interface: sighting.interface.clone(),
            peer_name: sighting.peer_name.clone(),
            public_key: sighting.public_key.clone(),
            is_online: online,
            event: PresenceEvent::from_online(online),
            event_time: now,
            last_heartbeat_raw: sighting.raw_heartbeat.clone(),
            last_heartbeat_at: heartbeat_at,
            observed_at: now,
        };
        self.inner.store.insert(record.clone()).await?;
        // No observers is fine.
        let _ = self.inner.events.send(Arc::new(record.clone()));
        Ok(record)
    }

    async fn refresh(
        &self,
        prior: &PresenceRecord,
        sighting: &PeerSighting,
        now: DateTime<Utc>,
        heartbeat_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        self.inner
            .store
            .update_in_place(
                prior.id,
                RecordUpdate {
                    peer_name: sighting.peer_name.clone(),
                    public_key: sighting.public_key.clone(),
                    last_heartbeat_raw: sighting.raw_heartbeat.clone(),
                    last_heartbeat_at: heartbeat_at,
                    observed_at: now,
                },
            )
            .await?;
        Ok(())
    }
}

fn heartbeat_time(now: DateTime<Utc>, age_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(age_secs).ok()?;
    now.checked_sub_signed(TimeDelta::try_seconds(secs)?)
}
