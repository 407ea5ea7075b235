//! Interface command handlers.

use tabled::Tabled;
use wgfleet_core::{ConnectionSupervisor, InterfaceCounters, NewInterface, WgInterface};

use crate::cli::{GlobalOpts, InterfacesArgs, InterfacesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "MTU")]
    mtu: String,
    #[tabled(rename = "Running")]
    running: String,
    #[tabled(rename = "Disabled")]
    disabled: String,
    #[tabled(rename = "Public Key")]
    public_key: String,
}

impl From<&WgInterface> for InterfaceRow {
    fn from(i: &WgInterface) -> Self {
        Self {
            id: i.handle.as_ref().map(ToString::to_string).unwrap_or_default(),
            name: i.name.clone(),
            port: i.listen_port.map(|p| p.to_string()).unwrap_or_default(),
            mtu: i.mtu.map(|m| m.to_string()).unwrap_or_default(),
            running: output::yes_no(i.running),
            disabled: output::yes_no(i.disabled),
            public_key: util::or_dash(i.public_key.as_deref()),
        }
    }
}

#[derive(Tabled)]
struct CountersRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "RX")]
    rx: String,
    #[tabled(rename = "TX")]
    tx: String,
    #[tabled(rename = "RX Packets")]
    rx_packets: u64,
    #[tabled(rename = "TX Packets")]
    tx_packets: u64,
}

impl From<&InterfaceCounters> for CountersRow {
    fn from(c: &InterfaceCounters) -> Self {
        Self {
            name: c.name.clone(),
            kind: util::or_dash(c.kind.as_deref()),
            rx: output::bytes(c.rx_bytes),
            tx: output::bytes(c.tx_bytes),
            rx_packets: c.rx_packets,
            tx_packets: c.tx_packets,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    supervisor: &ConnectionSupervisor,
    args: InterfacesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        InterfacesCommand::List { fresh } => {
            let interfaces = supervisor
                .list_interfaces(util::cache_policy(fresh))
                .await?;
            let out = output::render_list(
                &global.output,
                interfaces.as_slice(),
                |i| InterfaceRow::from(i),
                |i| i.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        InterfacesCommand::Counters { name } => {
            let counters = supervisor.interface_counters(&name).await?;
            let out = output::render_list(
                &global.output,
                &counters,
                |c| CountersRow::from(c),
                |c| c.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        InterfacesCommand::Add {
            name,
            listen_port,
            mtu,
            private_key,
            comment,
        } => {
            let handle = supervisor
                .add_interface(&NewInterface {
                    name: name.clone(),
                    listen_port,
                    mtu,
                    private_key,
                    comment,
                })
                .await?;
            util::report(&format!("Created interface {name}"), handle.as_ref(), global.quiet);
            Ok(())
        }

        InterfacesCommand::Remove { interface } => {
            if !util::confirm(
                &format!("Remove interface {interface} and all of its peers?"),
                global.yes,
            )? {
                return Ok(());
            }
            let handle = supervisor.delete_interface(&interface).await?;
            util::report(&format!("Removed interface {interface}"), Some(&handle), global.quiet);
            Ok(())
        }
    }
}
