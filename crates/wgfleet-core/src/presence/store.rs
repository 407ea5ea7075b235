// ── Presence persistence boundary ──
//
// The tracker only appends rows, rewrites the heartbeat fields of the
// latest row, and reads back by peer and time window. Any engine that
// can do those four things works; `MemoryPresenceStore` is the one used
// by the CLI and tests.

use std::future::Future;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{PeerKey, PresenceRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("presence record {0} not found")]
    NotFound(Uuid),

    #[error("presence backend failure: {0}")]
    Backend(String),
}

/// History window for one peer on one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceQuery {
    pub key: PeerKey,
    /// Inclusive lower bound on `event_time`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `event_time`.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl PresenceQuery {
    pub fn new(key: PeerKey) -> Self {
        Self {
            key,
            from: None,
            to: None,
            limit: None,
        }
    }

    fn admits(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Fields rewritten on a poll that does not produce a new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub peer_name: Option<String>,
    pub public_key: Option<String>,
    pub last_heartbeat_raw: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl RecordUpdate {
    fn apply(self, record: &mut PresenceRecord) {
        if self.peer_name.is_some() {
            record.peer_name = self.peer_name;
        }
        if self.public_key.is_some() {
            record.public_key = self.public_key;
        }
        record.last_heartbeat_raw = self.last_heartbeat_raw;
        record.last_heartbeat_at = self.last_heartbeat_at;
        record.observed_at = self.observed_at;
    }
}

/// Storage for presence history.
pub trait PresenceStore: Send + Sync + 'static {
    fn insert(&self, record: PresenceRecord)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Most recently inserted row for `key`.
    fn query_latest(
        &self,
        key: &PeerKey,
    ) -> impl Future<Output = Result<Option<PresenceRecord>, StoreError>> + Send;

    /// Rows in the window, newest first.
    fn query_range(
        &self,
        query: &PresenceQuery,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>, StoreError>> + Send;

    /// Rewrite the heartbeat fields of row `id` and return the new row.
    fn update_in_place(
        &self,
        id: Uuid,
        update: RecordUpdate,
    ) -> impl Future<Output = Result<PresenceRecord, StoreError>> + Send;
}

// ── In-memory store ──────────────────────────────────────────────

/// `DashMap`-backed store. Rows of one peer live in insertion order;
/// different peers never contend on the same shard lock.
#[derive(Debug, Default)]
pub struct MemoryPresenceStore {
    rows: DashMap<PeerKey, Vec<PresenceRecord>>,
    index: DashMap<Uuid, PeerKey>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all peers.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every peer with history.
    pub fn keys(&self) -> Vec<PeerKey> {
        self.rows.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl PresenceStore for MemoryPresenceStore {
    async fn insert(&self, record: PresenceRecord) -> Result<(), StoreError> {
        self.index.insert(record.id, record.key());
        self.rows.entry(record.key()).or_default().push(record);
        Ok(())
    }

    async fn query_latest(&self, key: &PeerKey) -> Result<Option<PresenceRecord>, StoreError> {
        Ok(self.rows.get(key).and_then(|rows| rows.last().cloned()))
    }

    async fn query_range(&self, query: &PresenceQuery) -> Result<Vec<PresenceRecord>, StoreError> {
        let Some(rows) = self.rows.get(&query.key) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .rev()
            .filter(|row| query.admits(row.event_time))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_in_place(
        &self,
        id: Uuid,
        update: RecordUpdate,
    ) -> Result<PresenceRecord, StoreError> {
        let key = self
            .index
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        let mut rows = self.rows.get_mut(&key).ok_or(StoreError::NotFound(id))?;
        let row = rows
            .iter_mut()
            .rev()
            .find(|row| row.id == id)
            .ok_or(StoreError::NotFound(id))?;
        update.apply(row);
        Ok(row.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::PresenceEvent;
    use chrono::TimeDelta;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn row(key: &PeerKey, online: bool, minutes: i64) -> PresenceRecord {
        let at = base() + TimeDelta::minutes(minutes);
        PresenceRecord {
            id: Uuid::new_v4(),
            peer_id: key.peer_id.clone(),
            interface: key.interface.clone(),
            peer_name: None,
            public_key: None,
            is_online: online,
            event: PresenceEvent::from_online(online),
            event_time: at,
            last_heartbeat_raw: "5s".into(),
            last_heartbeat_at: Some(at),
            observed_at: at,
        }
    }

    #[tokio::test]
    async fn range_is_newest_first_and_bounded() {
        let store = MemoryPresenceStore::new();
        let key = PeerKey::new("AAAA", "wg0");
        for (i, online) in [true, false, true, false].into_iter().enumerate() {
            store
                .insert(row(&key, online, i64::try_from(i).unwrap() * 10))
                .await
                .unwrap();
        }
        store.insert(row(&PeerKey::new("AAAA", "wg1"), true, 0)).await.unwrap();

        let all = store.query_range(&PresenceQuery::new(key.clone())).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].event_time >= w[1].event_time));

        let window = store
            .query_range(&PresenceQuery {
                from: Some(base() + TimeDelta::minutes(10)),
                to: Some(base() + TimeDelta::minutes(20)),
                ..PresenceQuery::new(key.clone())
            })
            .await
            .unwrap();
        assert_eq!(window.len(), 2);

        let limited = store
            .query_range(&PresenceQuery {
                limit: Some(1),
                ..PresenceQuery::new(key.clone())
            })
            .await
            .unwrap();
        assert_eq!(limited[0].event_time, base() + TimeDelta::minutes(30));
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn update_in_place_rewrites_heartbeat_only() {
        let store = MemoryPresenceStore::new();
        let key = PeerKey::new("AAAA", "wg0");
        let original = row(&key, true, 0);
        store.insert(original.clone()).await.unwrap();

        let updated = store
            .update_in_place(
                original.id,
                RecordUpdate {
                    peer_name: Some("laptop".into()),
                    public_key: None,
                    last_heartbeat_raw: "15s".into(),
                    last_heartbeat_at: None,
                    observed_at: base() + TimeDelta::minutes(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.last_heartbeat_raw, "15s");
        assert_eq!(updated.peer_name.as_deref(), Some("laptop"));
        assert_eq!(updated.event_time, original.event_time);
        assert!(updated.is_online);
        assert_eq!(store.query_latest(&key).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemoryPresenceStore::new();
        let id = Uuid::new_v4();
        let err = store
            .update_in_place(
                id,
                RecordUpdate {
                    peer_name: None,
                    public_key: None,
                    last_heartbeat_raw: String::new(),
                    last_heartbeat_at: None,
                    observed_at: base(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(found) if found == id));
    }
}
