//! Route command handlers.

use tabled::Tabled;
use wgfleet_core::{ConnectionSupervisor, NewRoute, Route};

use crate::cli::{GlobalOpts, RoutesArgs, RoutesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Gateway")]
    gateway: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Flags")]
    flags: String,
    #[tabled(rename = "Comment")]
    comment: String,
}

impl From<&Route> for RouteRow {
    fn from(r: &Route) -> Self {
        let flags: String = [
            (r.active, 'A'),
            (r.dynamic, 'D'),
            (r.disabled, 'X'),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, flag)| *flag)
        .collect();
        Self {
            id: r.handle.as_ref().map(ToString::to_string).unwrap_or_default(),
            dst: r.dst_address.clone(),
            gateway: util::or_dash(r.gateway.as_deref()),
            distance: r.distance.map(|d| d.to_string()).unwrap_or_default(),
            table: util::or_dash(r.routing_table.as_deref()),
            flags,
            comment: r.comment.clone().unwrap_or_default(),
        }
    }
}

pub async fn handle(
    supervisor: &ConnectionSupervisor,
    args: RoutesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        RoutesCommand::List { fresh } => {
            let routes = supervisor.list_routes(util::cache_policy(fresh)).await?;
            let out = output::render_list(
                &global.output,
                routes.as_slice(),
                |r| RouteRow::from(r),
                |r| r.dst_address.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RoutesCommand::Add {
            dst,
            gateway,
            distance,
            table,
            comment,
        } => {
            let handle = supervisor
                .add_route(&NewRoute {
                    dst_address: dst.clone(),
                    gateway,
                    distance,
                    routing_table: table,
                    comment,
                })
                .await?;
            util::report(&format!("Added route {dst}"), handle.as_ref(), global.quiet);
            Ok(())
        }

        RoutesCommand::Remove { route } => {
            if !util::confirm(&format!("Remove route {route}?"), global.yes)? {
                return Ok(());
            }
            let handle = supervisor.delete_route(&route).await?;
            util::report(&format!("Removed route {route}"), Some(&handle), global.quiet);
            Ok(())
        }
    }
}
