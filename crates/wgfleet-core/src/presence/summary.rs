use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{PeerKey, PresenceEvent, PresenceRecord};

/// Aggregate view over one peer's history window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub peer_id: String,
    pub interface: String,
    /// Time of the oldest row in the window.
    pub first_seen: DateTime<Utc>,
    /// Latest known heartbeat in the window, if the peer ever had one.
    pub last_seen: Option<DateTime<Utc>>,
    pub current_status: PresenceEvent,
    /// Online -> offline transitions.
    pub disconnections: u32,
    /// Offline -> online transitions.
    pub reconnections: u32,
    pub total_events: u32,
    /// Seconds spent online between `first_seen` and the window end.
    pub online_secs: u64,
    pub uptime_percent: f64,
}

impl StatusSummary {
    /// Build from rows ordered oldest first. `None` for an empty window.
    ///
    /// Only state flips between adjacent rows count as events; every row
    /// after the first is an accepted transition by construction, so a
    /// repeated state (possible only across store imports) is ignored.
    pub fn from_history(
        key: &PeerKey,
        history: &[PresenceRecord],
        window_end: DateTime<Utc>,
    ) -> Option<Self> {
        let first = history.first()?;
        let last = history.last()?;

        let mut disconnections = 0u32;
        let mut reconnections = 0u32;
        for pair in history.windows(2) {
            match (pair[0].is_online, pair[1].is_online) {
                (true, false) => disconnections += 1,
                (false, true) => reconnections += 1,
                _ => {}
            }
        }

        let mut online = std::time::Duration::ZERO;
        for (i, row) in history.iter().enumerate() {
            if !row.is_online {
                continue;
            }
            let until = history.get(i + 1).map_or(window_end, |next| next.event_time);
            online += (until - row.event_time).to_std().unwrap_or_default();
        }
        let span = (window_end - first.event_time).to_std().unwrap_or_default();
        let uptime_percent = if span.is_zero() {
            if last.is_online { 100.0 } else { 0.0 }
        } else {
            (online.as_secs_f64() / span.as_secs_f64() * 100.0).min(100.0)
        };

        Some(Self {
            peer_id: key.peer_id.clone(),
            interface: key.interface.clone(),
            first_seen: first.event_time,
            last_seen: history.iter().filter_map(|r| r.last_heartbeat_at).max(),
            current_status: last.event,
            disconnections,
            reconnections,
            total_events: disconnections + reconnections,
            online_secs: online.as_secs(),
            uptime_percent,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use uuid::Uuid;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn row(online: bool, minutes: i64) -> PresenceRecord {
        let at = base() + TimeDelta::minutes(minutes);
        PresenceRecord {
            id: Uuid::new_v4(),
            peer_id: "AAAA".into(),
            interface: "wg0".into(),
            peer_name: None,
            public_key: None,
            is_online: online,
            event: PresenceEvent::from_online(online),
            event_time: at,
            last_heartbeat_raw: "10s".into(),
            last_heartbeat_at: online.then_some(at),
            observed_at: at,
        }
    }

    #[test]
    fn counts_flips_and_uptime() {
        let key = PeerKey::new("AAAA", "wg0");
        // online 0-30, offline 30-40, online 40-100
        let history = [row(true, 0), row(false, 30), row(true, 40)];
        let summary =
            StatusSummary::from_history(&key, &history, base() + TimeDelta::minutes(100)).unwrap();

        assert_eq!(summary.disconnections, 1);
        assert_eq!(summary.reconnections, 1);
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.current_status, PresenceEvent::Online);
        assert_eq!(summary.online_secs, 90 * 60);
        assert!((summary.uptime_percent - 90.0).abs() < 1e-9);
        assert_eq!(summary.first_seen, base());
        assert_eq!(summary.last_seen, Some(base() + TimeDelta::minutes(40)));
    }

    #[test]
    fn single_row_has_no_events() {
        let key = PeerKey::new("AAAA", "wg0");
        let summary = StatusSummary::from_history(&key, &[row(false, 0)], base()).unwrap();
        assert_eq!(summary.total_events, 0);
        assert!(summary.uptime_percent.abs() < f64::EPSILON);
        assert_eq!(summary.last_seen, None);
    }

    #[test]
    fn empty_history_is_none() {
        assert!(StatusSummary::from_history(&PeerKey::new("A", "wg0"), &[], base()).is_none());
    }
}
