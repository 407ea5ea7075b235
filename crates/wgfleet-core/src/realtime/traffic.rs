use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::TelemetrySource;
use crate::error::CoreError;
use crate::model::{InterfaceCounters, InterfaceRate, TrafficSnapshot};
use crate::supervisor::{CachePolicy, ConnectionSupervisor};

/// Interfaces the traffic topic reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficTargets {
    pub wan: Vec<String>,
    pub wireguard: Vec<String>,
}

/// rx/tx byte totals per interface at one instant.
type Totals = HashMap<String, (u64, u64)>;

/// WAN plus WireGuard counters with derived bit rates.
pub struct TrafficSource {
    supervisor: ConnectionSupervisor,
    wan: Vec<String>,
    previous: Mutex<Option<(Instant, Totals)>>,
}

impl TrafficSource {
    pub fn new(supervisor: ConnectionSupervisor, wan: Vec<String>) -> Self {
        Self {
            supervisor,
            wan,
            previous: Mutex::new(None),
        }
    }

    fn previous(&self) -> std::sync::MutexGuard<'_, Option<(Instant, Totals)>> {
        self.previous.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TelemetrySource for TrafficSource {
    type Targets = TrafficTargets;

    fn name(&self) -> &str {
        "traffic"
    }

    async fn resolve_targets(&self) -> Result<TrafficTargets, CoreError> {
        let interfaces = self.supervisor.list_interfaces(CachePolicy::Bypass).await?;
        Ok(TrafficTargets {
            wan: self.wan.clone(),
            wireguard: interfaces
                .iter()
                .filter(|i| !i.disabled)
                .map(|i| i.name.clone())
                .collect(),
        })
    }

    async fn sample(
        &self,
        targets: &TrafficTargets,
    ) -> Result<Option<serde_json::Value>, CoreError> {
        let names: Vec<String> = targets
            .wan
            .iter()
            .chain(&targets.wireguard)
            .cloned()
            .collect();
        let counters = self.supervisor.interface_counters(&names).await?;
        if counters.is_empty() {
            return Ok(None);
        }

        let now = Instant::now();
        let current: Totals = counters
            .iter()
            .map(|c| (c.name.clone(), (c.rx_bytes, c.tx_bytes)))
            .collect();
        let baseline = self.previous().replace((now, current));
        let baseline = baseline
            .as_ref()
            .map(|(at, totals)| (now.saturating_duration_since(*at), totals));

        let snapshot = build_snapshot(targets, &counters, baseline, Utc::now());
        serde_json::to_value(&snapshot)
            .map(Some)
            .map_err(|e| CoreError::Internal(format!("traffic snapshot encoding: {e}")))
    }

    fn reset(&self) {
        *self.previous() = None;
    }
}

/// Assemble one snapshot. Rates are zero without a baseline, for a zero
/// interval, and when a counter went backwards (interface reset).
pub fn build_snapshot(
    targets: &TrafficTargets,
    counters: &[InterfaceCounters],
    baseline: Option<(Duration, &Totals)>,
    timestamp: DateTime<Utc>,
) -> TrafficSnapshot {
    let rate_for = |name: &str| -> Option<InterfaceRate> {
        let c = counters.iter().find(|c| c.name == name)?;
        let (rx_bps, tx_bps) = baseline
            .and_then(|(elapsed, totals)| {
                let (prev_rx, prev_tx) = totals.get(name)?;
                Some((
                    bits_per_second(*prev_rx, c.rx_bytes, elapsed),
                    bits_per_second(*prev_tx, c.tx_bytes, elapsed),
                ))
            })
            .unwrap_or_default();
        Some(InterfaceRate {
            name: c.name.clone(),
            rx_bytes: c.rx_bytes,
            tx_bytes: c.tx_bytes,
            rx_bps,
            tx_bps,
        })
    };

    let wan: Vec<InterfaceRate> = targets.wan.iter().filter_map(|n| rate_for(n)).collect();
    let wireguard: Vec<InterfaceRate> = targets
        .wireguard
        .iter()
        .filter_map(|n| rate_for(n))
        .collect();

    let wireguard_total = wireguard.iter().fold(
        InterfaceRate {
            name: "wireguard".into(),
            ..InterfaceRate::default()
        },
        |mut total, rate| {
            total.rx_bytes = total.rx_bytes.saturating_add(rate.rx_bytes);
            total.tx_bytes = total.tx_bytes.saturating_add(rate.tx_bytes);
            total.rx_bps = total.rx_bps.saturating_add(rate.rx_bps);
            total.tx_bps = total.tx_bps.saturating_add(rate.tx_bps);
            total
        },
    );

    TrafficSnapshot {
        timestamp,
        wan,
        wireguard,
        wireguard_total,
    }
}

fn bits_per_second(previous: u64, current: u64, elapsed: Duration) -> u64 {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return 0;
    }
    current
        .checked_sub(previous)
        .map_or(0, |delta| delta.saturating_mul(8_000) / millis)
}
