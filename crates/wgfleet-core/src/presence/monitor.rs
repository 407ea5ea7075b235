use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::PresenceStore;
use super::tracker::PresenceTracker;
use crate::error::CoreError;
use crate::supervisor::{CachePolicy, ConnectionSupervisor};

/// Background task feeding the tracker from live peer listings.
///
/// Every `interval` it lists the WireGuard interfaces (cached is fine),
/// then the peers of each enabled one (always fresh), and tracks each
/// peer's handshake age. A failed poll is logged and retried next tick.
pub struct PresenceMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PresenceMonitor {
    pub fn spawn<S: PresenceStore>(
        supervisor: ConnectionSupervisor,
        tracker: PresenceTracker<S>,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor_task(supervisor, tracker, interval, cancel.clone()));
        Self { cancel, handle }
    }

    /// One poll over every enabled interface. Returns the number of
    /// peers tracked.
    pub async fn poll_once<S: PresenceStore>(
        supervisor: &ConnectionSupervisor,
        tracker: &PresenceTracker<S>,
    ) -> Result<usize, CoreError> {
        let interfaces = supervisor.list_interfaces(CachePolicy::Prefer).await?;
        let mut tracked = 0;
        for iface in interfaces.iter().filter(|i| !i.disabled) {
            let peers = supervisor
                .list_peers(&iface.name, CachePolicy::Bypass)
                .await?;
            tracked += tracker
                .track_peers(&iface.name, &peers, Utc::now())
                .await?
                .len();
        }
        Ok(tracked)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn monitor_task<S: PresenceStore>(
    supervisor: ConnectionSupervisor,
    tracker: PresenceTracker<S>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis(), "presence monitor started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let poll = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = PresenceMonitor::poll_once(&supervisor, &tracker) => result,
        };
        match poll {
            Ok(peers) => debug!(peers, "presence poll complete"),
            Err(e) => warn!(error = %e, "presence poll failed"),
        }
    }

    info!("presence monitor stopped");
}
