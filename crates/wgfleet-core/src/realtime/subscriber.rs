use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use super::TopicMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The subscriber can no longer receive and should be dropped.
#[derive(Debug, Error)]
#[error("subscriber is gone")]
pub struct SubscriberGone;

/// A live connection interested in a topic (websocket, channel...).
pub trait Subscriber: Send + Sync + 'static {
    fn id(&self) -> SubscriberId;

    fn send(&self, message: Arc<TopicMessage>) -> BoxFuture<'_, Result<(), SubscriberGone>>;
}

/// Subscriber backed by a bounded channel.
///
/// A full queue drops the new message rather than stalling the topic;
/// a dropped receiver unsubscribes on the next send.
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<TopicMessage>>,
}

impl ChannelSubscriber {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<TopicMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, message: Arc<TopicMessage>) -> BoxFuture<'_, Result<(), SubscriberGone>> {
        Box::pin(async move {
            match self.tx.try_send(message) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(subscriber = %self.id, "subscriber queue full, message dropped");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(SubscriberGone),
            }
        })
    }
}
