//! Peer command handlers.

use chrono::Utc;
use tabled::Tabled;
use wgfleet_core::{ConnectionSupervisor, NewPeer, Peer, PeerUpdate, PresencePolicy};

use crate::cli::{GlobalOpts, PeersArgs, PeersCommand};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct PeerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Interface")]
    interface: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Allowed")]
    allowed: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Handshake")]
    handshake: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "RX")]
    rx: String,
    #[tabled(rename = "TX")]
    tx: String,
}

fn peer_row(peer: &Peer, online: bool, color: bool) -> PeerRow {
    let endpoint = match (
        peer.current_endpoint_address
            .as_deref()
            .or(peer.endpoint_address.as_deref()),
        peer.current_endpoint_port.or(peer.endpoint_port),
    ) {
        (Some(addr), Some(port)) => format!("{addr}:{port}"),
        (Some(addr), None) => addr.to_owned(),
        _ => "-".into(),
    };
    let status = if peer.disabled {
        output::dim("disabled", color)
    } else {
        output::presence_label(online, color)
    };
    PeerRow {
        id: peer
            .handle
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        interface: peer.interface.clone(),
        name: peer.display_name().to_owned(),
        allowed: peer.allowed_address.join(","),
        endpoint,
        handshake: util::or_dash(peer.last_handshake.as_deref()),
        status,
        rx: output::bytes(peer.rx_bytes),
        tx: output::bytes(peer.tx_bytes),
    }
}

fn is_online(policy: &PresencePolicy, peer: &Peer) -> bool {
    let now = Utc::now();
    peer.last_handshake
        .as_deref()
        .is_some_and(|raw| policy.is_online(raw, now))
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    supervisor: &ConnectionSupervisor,
    args: PeersArgs,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        PeersCommand::List {
            interface,
            online,
            offline,
            fresh,
        } => {
            let policy = config::presence_policy(config)?;
            let cache = util::cache_policy(fresh);

            let interfaces = match interface {
                Some(name) => vec![name],
                None => supervisor
                    .list_interfaces(cache)
                    .await?
                    .iter()
                    .filter(|i| !i.disabled)
                    .map(|i| i.name.clone())
                    .collect(),
            };

            let mut peers = Vec::new();
            for name in &interfaces {
                peers.extend(supervisor.list_peers(name, cache).await?.iter().cloned());
            }
            if online || offline {
                peers.retain(|p| is_online(&policy, p) == online);
            }

            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &peers,
                |p| peer_row(p, is_online(&policy, p), color),
                |p| p.public_key.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PeersCommand::Add {
            public_key,
            interface,
            allowed_address,
            name,
            endpoint,
            endpoint_port,
            preshared_key,
            keepalive,
            comment,
            disabled,
        } => {
            let peer = NewPeer {
                interface,
                public_key,
                allowed_address,
                name,
                endpoint_address: endpoint,
                endpoint_port,
                preshared_key,
                persistent_keepalive: keepalive,
                comment,
                disabled,
            };
            let handle = supervisor.add_peer(&peer).await?;
            util::report(
                &format!("Added peer to {}", peer.interface),
                handle.as_ref(),
                global.quiet,
            );
            Ok(())
        }

        PeersCommand::Set {
            peer,
            interface,
            public_key,
            allowed_address,
            endpoint,
            endpoint_port,
            preshared_key,
            keepalive,
            comment,
        } => {
            let update = PeerUpdate {
                public_key,
                allowed_address,
                endpoint_address: endpoint,
                endpoint_port,
                preshared_key,
                persistent_keepalive: keepalive,
                comment,
                disabled: None,
            };
            if update.is_empty() {
                return Err(CliError::Validation {
                    field: "peer set".into(),
                    reason: "nothing to change; pass at least one field flag".into(),
                });
            }
            let handle = supervisor
                .update_peer(&peer, &interface, &update.to_params())
                .await?;
            util::report(&format!("Updated peer {peer}"), Some(&handle), global.quiet);
            Ok(())
        }

        PeersCommand::Remove { peer, interface } => {
            if !util::confirm(&format!("Remove peer {peer} from {interface}?"), global.yes)? {
                return Ok(());
            }
            let handle = supervisor.delete_peer(&peer, &interface).await?;
            util::report(&format!("Removed peer {peer}"), Some(&handle), global.quiet);
            Ok(())
        }

        PeersCommand::Enable { peer, interface } => {
            let handle = supervisor.enable_peer(&peer, &interface).await?;
            util::report(&format!("Enabled peer {peer}"), Some(&handle), global.quiet);
            Ok(())
        }

        PeersCommand::Disable { peer, interface } => {
            let handle = supervisor.disable_peer(&peer, &interface).await?;
            util::report(&format!("Disabled peer {peer}"), Some(&handle), global.quiet);
            Ok(())
        }
    }
}
