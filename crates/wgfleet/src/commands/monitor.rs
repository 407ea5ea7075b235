//! `monitor`: feed the presence tracker from the router and print
//! accepted online/offline transitions.

use std::sync::Arc;
use std::time::Duration;

use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;
use wgfleet_core::{
    ConnectionSupervisor, MemoryPresenceStore, PresenceMonitor, PresenceQuery, PresenceRecord,
    PresenceTracker, StatusSummary,
};

use crate::cli::{GlobalOpts, MonitorArgs, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Interface")]
    interface: String,
    #[tabled(rename = "Peer")]
    peer: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "Drops")]
    disconnections: u32,
    #[tabled(rename = "Uptime")]
    uptime: String,
}

fn summary_row(s: &StatusSummary, color: bool) -> SummaryRow {
    SummaryRow {
        interface: s.interface.clone(),
        peer: s.peer_id.clone(),
        status: output::presence_label(s.current_status.is_online(), color),
        last_seen: s
            .last_seen
            .map_or_else(|| "never".into(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        disconnections: s.disconnections,
        uptime: format!("{:.1}%", s.uptime_percent),
    }
}

fn event_line(record: &PresenceRecord, global: &GlobalOpts) -> Result<String, CliError> {
    if !matches!(global.output, OutputFormat::Table | OutputFormat::Plain) {
        return output::render_json_compact(record);
    }
    let color = output::should_color(&global.color);
    Ok(format!(
        "{}  {:<8} {:<10} {}  (handshake {})",
        output::dim(&record.event_time.format("%Y-%m-%d %H:%M:%S").to_string(), color),
        record.interface,
        output::presence_label(record.is_online, color),
        record.peer_name.as_deref().unwrap_or(&record.peer_id),
        record.last_heartbeat_raw,
    ))
}

pub async fn handle(
    supervisor: &ConnectionSupervisor,
    args: MonitorArgs,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let policy = config::presence_policy(config)?;
    let store = Arc::new(MemoryPresenceStore::new());
    let tracker = PresenceTracker::new(Arc::clone(&store), policy);

    if args.once {
        PresenceMonitor::poll_once(supervisor, &tracker).await?;
        return print_summaries(&tracker, global).await;
    }

    let interval = Duration::from_secs(args.interval.unwrap_or(config.presence.monitor_interval));
    let mut events = tracker.subscribe();
    let monitor = PresenceMonitor::spawn(supervisor.clone(), tracker.clone(), interval);
    tracing::info!(interval_secs = interval.as_secs(), "presence monitor running");

    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(record) => match event_line(&record, global) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "presence events dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    monitor.shutdown().await;
    result?;
    print_summaries(&tracker, global).await
}

async fn print_summaries(
    tracker: &PresenceTracker<MemoryPresenceStore>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut keys = tracker.store().keys();
    keys.sort_by(|a, b| (&a.interface, &a.peer_id).cmp(&(&b.interface, &b.peer_id)));

    let mut summaries = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(summary) = tracker
            .get_status_summary(&PresenceQuery::new(key))
            .await?
        {
            summaries.push(summary);
        }
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &summaries,
        |s| summary_row(s, color),
        |s| format!("{} {} {}", s.interface, s.peer_id, s.current_status),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
