//! Command dispatch: bridges CLI args -> supervisor calls -> output formatting.

pub mod config_cmd;
pub mod interfaces;
pub mod monitor;
pub mod peers;
pub mod routes;
pub mod util;
pub mod watch;

use wgfleet_core::ConnectionSupervisor;

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch a router-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    supervisor: &ConnectionSupervisor,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Interfaces(args) => interfaces::handle(supervisor, args, global).await,
        Command::Peers(args) => peers::handle(supervisor, args, config, global).await,
        Command::Routes(args) => routes::handle(supervisor, args, global).await,
        Command::Watch(args) => watch::handle(supervisor, args, config, global).await,
        Command::Monitor(args) => monitor::handle(supervisor, args, config, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
