//! `watch`: subscribe to a realtime topic and print each message.

use std::sync::Arc;

use wgfleet_core::{
    ChannelSubscriber, ConnectionSupervisor, PeerSetSource, RealtimeConfig, TelemetrySource,
    Topic, TrafficSource,
};

use crate::cli::{GlobalOpts, WatchArgs, WatchTopic};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    supervisor: &ConnectionSupervisor,
    args: WatchArgs,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let realtime = config::realtime_config(config)?;
    match args.topic {
        WatchTopic::Traffic => {
            let source =
                TrafficSource::new(supervisor.clone(), realtime.wan_interfaces.clone());
            stream(source, realtime, args.count, global).await
        }
        WatchTopic::Peers => {
            let policy = config::presence_policy(config)?;
            let source = PeerSetSource::new(supervisor.clone(), policy);
            stream(source, realtime, args.count, global).await
        }
    }
}

/// Print topic messages as JSON lines until Ctrl-C or `count` messages.
async fn stream<S: TelemetrySource>(
    source: S,
    realtime: RealtimeConfig,
    count: Option<usize>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (subscriber, mut rx) = ChannelSubscriber::new(realtime.subscriber_buffer);
    let topic = Topic::new(source, realtime);
    let id = topic.subscribe(Arc::new(subscriber)).await;

    let mut printed = 0usize;
    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break Ok(()),
            message = rx.recv() => {
                let Some(message) = message else { break Ok(()) };
                if message.is_error() {
                    tracing::warn!(topic = %message.topic, "topic reported an error");
                }
                match output::render_json_compact(&*message) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
                printed += 1;
                if count.is_some_and(|limit| printed >= limit) {
                    break Ok(());
                }
            }
        }
    };

    topic.unsubscribe(id).await;
    result
}
