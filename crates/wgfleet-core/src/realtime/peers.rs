use chrono::Utc;
use serde::Serialize;

use super::TelemetrySource;
use crate::config::PresencePolicy;
use crate::error::CoreError;
use crate::model::Peer;
use crate::supervisor::{CachePolicy, ConnectionSupervisor};

/// Live peer list of every enabled WireGuard interface, with the
/// heartbeat classification applied.
pub struct PeerSetSource {
    supervisor: ConnectionSupervisor,
    policy: PresencePolicy,
}

#[derive(Debug, Serialize)]
struct InterfacePeers<'a> {
    interface: &'a str,
    peers: Vec<PeerStatus<'a>>,
}

#[derive(Debug, Serialize)]
struct PeerStatus<'a> {
    #[serde(flatten)]
    peer: &'a Peer,
    online: bool,
}

impl PeerSetSource {
    pub fn new(supervisor: ConnectionSupervisor, policy: PresencePolicy) -> Self {
        Self { supervisor, policy }
    }
}

impl TelemetrySource for PeerSetSource {
    type Targets = Vec<String>;

    fn name(&self) -> &str {
        "peers"
    }

    async fn resolve_targets(&self) -> Result<Vec<String>, CoreError> {
        let interfaces = self.supervisor.list_interfaces(CachePolicy::Bypass).await?;
        Ok(interfaces
            .iter()
            .filter(|i| !i.disabled)
            .map(|i| i.name.clone())
            .collect())
    }

    async fn sample(&self, targets: &Vec<String>) -> Result<Option<serde_json::Value>, CoreError> {
        if targets.is_empty() {
            return Ok(None);
        }

        let mut listings = Vec::with_capacity(targets.len());
        for interface in targets {
            listings.push((
                interface.as_str(),
                self.supervisor
                    .list_peers(interface, CachePolicy::Bypass)
                    .await?,
            ));
        }

        let now = Utc::now();
        let payload: Vec<InterfacePeers<'_>> = listings
            .iter()
            .map(|(interface, peers)| InterfacePeers {
                interface,
                peers: peers
                    .iter()
                    .map(|peer| PeerStatus {
                        peer,
                        online: peer
                            .last_handshake
                            .as_deref()
                            .is_some_and(|raw| self.policy.is_online(raw, now)),
                    })
                    .collect(),
            })
            .collect();

        serde_json::to_value(&payload)
            .map(Some)
            .map_err(|e| CoreError::Internal(format!("peer set encoding: {e}")))
    }
}
