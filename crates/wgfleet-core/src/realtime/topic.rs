// ── Topic ──
//
// Subscriber set plus the poll task that feeds it. The task exists
// exactly while the set is non-empty: the first subscriber starts it,
// the last unsubscribe (or the last failed send) stops it, and a later
// subscriber starts a fresh one with freshly resolved targets.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::subscriber::{Subscriber, SubscriberId};
use super::{MessageBody, TelemetrySource, TopicMessage};
use crate::config::RealtimeConfig;
use crate::error::CoreError;

/// A fan-out topic over one [`TelemetrySource`].
pub struct Topic<S> {
    inner: Arc<TopicInner<S>>,
}

impl<S> Clone for Topic<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct TopicInner<S> {
    name: String,
    source: S,
    config: RealtimeConfig,
    state: Mutex<TopicState>,
    starts: AtomicU64,
}

#[derive(Default)]
struct TopicState {
    subscribers: HashMap<SubscriberId, Arc<dyn Subscriber>>,
    task: Option<PollTask>,
    generation: u64,
}

struct PollTask {
    /// Distinguishes this run from a later restart.
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl<S: TelemetrySource> Topic<S> {
    pub fn new(source: S, config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                name: source.name().to_owned(),
                source,
                config,
                state: Mutex::new(TopicState::default()),
                starts: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Add a subscriber, starting the poll task if it is the first.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = subscriber.id();
        let mut state = self.inner.state.lock().await;
        state.subscribers.insert(id, subscriber);
        if state
            .task
            .as_ref()
            .is_none_or(|task| task.handle.is_finished())
        {
            self.start(&mut state);
        }
        info!(
            topic = %self.inner.name,
            subscriber = %id,
            subscribers = state.subscribers.len(),
            "subscribed"
        );
        id
    }

    /// Remove a subscriber. Removing the last one cancels the poll task
    /// and waits for it to exit. Returns `false` for an unknown id.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let stopped = {
            let mut state = self.inner.state.lock().await;
            if state.subscribers.remove(&id).is_none() {
                return false;
            }
            debug!(topic = %self.inner.name, subscriber = %id, "unsubscribed");
            if state.subscribers.is_empty() {
                state.task.take()
            } else {
                None
            }
        };

        if let Some(task) = stopped {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
        true
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.state.lock().await.subscribers.len()
    }

    /// Whether a poll task is currently live.
    pub async fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// How many poll tasks have been started so far.
    pub fn starts(&self) -> u64 {
        self.inner.starts.load(Ordering::Relaxed)
    }

    fn start(&self, state: &mut TopicState) {
        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        self.inner.starts.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            generation,
            cancel.clone(),
        ));
        state.task = Some(PollTask {
            generation,
            cancel,
            handle,
        });
    }
}

impl<S: TelemetrySource> TopicInner<S> {
    /// Push `body` to every subscriber and drop the ones that failed.
    ///
    /// Returns `false` once nobody is left, after giving up the task slot.
    /// The poll loop races this against cancellation, so a send still in
    /// flight when the last subscriber leaves is abandoned.
    async fn publish(&self, generation: u64, body: MessageBody) -> bool {
        let message = Arc::new(TopicMessage {
            topic: self.name.clone(),
            timestamp: Utc::now(),
            body,
        });
        let subscribers: Vec<Arc<dyn Subscriber>> = {
            let state = self.state.lock().await;
            state.subscribers.values().cloned().collect()
        };

        let deadline = self.config.send_timeout;
        let results = join_all(subscribers.iter().map(|subscriber| {
            let message = Arc::clone(&message);
            async move {
                let delivered = matches!(
                    tokio::time::timeout(deadline, subscriber.send(message)).await,
                    Ok(Ok(()))
                );
                (subscriber.id(), delivered)
            }
        }))
        .await;

        let mut state = self.state.lock().await;
        for (id, delivered) in results {
            if !delivered && state.subscribers.remove(&id).is_some() {
                warn!(topic = %self.name, subscriber = %id, "dropping subscriber after failed send");
            }
        }
        if state.subscribers.is_empty() {
            release_slot(&mut state, generation);
            return false;
        }
        true
    }

    async fn release(&self, generation: u64) {
        let mut state = self.state.lock().await;
        release_slot(&mut state, generation);
    }
}

fn release_slot(state: &mut TopicState, generation: u64) {
    if state
        .task
        .as_ref()
        .is_some_and(|task| task.generation == generation)
    {
        state.task = None;
    }
}

async fn poll_loop<S: TelemetrySource>(
    inner: Arc<TopicInner<S>>,
    generation: u64,
    cancel: CancellationToken,
) {
    let config = &inner.config;
    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut targets: Option<S::Targets> = None;
    inner.source.reset();
    info!(topic = %inner.name, generation, "poll task started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = tick_once(&inner.source, &mut targets) => outcome,
        };

        let backoff = match outcome {
            Ok(Some(data)) => {
                let alive = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    alive = inner.publish(generation, MessageBody::Update(data)) => alive,
                };
                if !alive {
                    break;
                }
                None
            }
            Ok(None) => {
                debug!(topic = %inner.name, "no telemetry rows, re-resolving targets");
                Some(config.empty_backoff)
            }
            Err(e) => {
                warn!(topic = %inner.name, error = %e, "telemetry read failed");
                let body = MessageBody::Error {
                    message: e.to_string(),
                };
                let alive = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    alive = inner.publish(generation, body) => alive,
                };
                if !alive {
                    break;
                }
                Some(config.unreachable_backoff)
            }
        };

        if let Some(backoff) = backoff {
            targets = None;
            inner.source.reset();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(backoff) => {}
            }
            ticker.reset();
        }
    }

    inner.release(generation).await;
    info!(topic = %inner.name, generation, "poll task stopped");
}

async fn tick_once<S: TelemetrySource>(
    source: &S,
    targets: &mut Option<S::Targets>,
) -> Result<Option<serde_json::Value>, CoreError> {
    if targets.is_none() {
        *targets = Some(source.resolve_targets().await?);
    }
    match targets.as_ref() {
        Some(resolved) => source.sample(resolved).await,
        None => Ok(None),
    }
}
