// ── Realtime topics ──
//
// A topic polls one telemetry source on a fixed tick and pushes each
// result to every current subscriber. Delivery is best effort: a
// subscriber that falls behind misses ticks, one that fails is dropped.

pub mod peers;
pub mod subscriber;
pub mod topic;
pub mod traffic;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;

pub use peers::PeerSetSource;
pub use subscriber::{ChannelSubscriber, Subscriber, SubscriberGone, SubscriberId};
pub use topic::Topic;
pub use traffic::{TrafficSource, TrafficTargets};

/// One message pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicMessage {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageBody {
    Update(serde_json::Value),
    Error { message: String },
}

impl TopicMessage {
    pub fn is_error(&self) -> bool {
        matches!(self.body, MessageBody::Error { .. })
    }
}

/// What a topic polls.
///
/// Targets (interface names and the like) are resolved once per run of
/// the poll task and reused on every tick until a sample fails or comes
/// back empty.
pub trait TelemetrySource: Send + Sync + 'static {
    type Targets: Send + Sync + 'static;

    fn name(&self) -> &str;

    fn resolve_targets(&self) -> impl Future<Output = Result<Self::Targets, CoreError>> + Send;

    /// One reading. `Ok(None)` means the device returned no rows.
    fn sample(
        &self,
        targets: &Self::Targets,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, CoreError>> + Send;

    /// Forget per-run state (previous samples, rate baselines).
    fn reset(&self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_wire_shape() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let update = TopicMessage {
            topic: "traffic".into(),
            timestamp: at,
            body: MessageBody::Update(json!({ "rx": 1 })),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "topic": "traffic",
                "timestamp": "2024-05-01T12:00:00Z",
                "type": "update",
                "data": { "rx": 1 },
            })
        );

        let error = TopicMessage {
            body: MessageBody::Error {
                message: "device unreachable".into(),
            },
            ..update
        };
        assert!(error.is_error());
        assert_eq!(
            serde_json::to_value(&error).unwrap()["data"]["message"],
            "device unreachable"
        );
    }
}
