use serde::{Deserialize, Serialize};

use wgfleet_api::Params;

use super::handle::ResourceHandle;
use super::peer::insert_opt;

/// A static or dynamic IP route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub handle: Option<ResourceHandle>,
    pub dst_address: String,
    pub gateway: Option<String>,
    pub distance: Option<u8>,
    pub routing_table: Option<String>,
    pub active: bool,
    pub dynamic: bool,
    pub disabled: bool,
    pub comment: Option<String>,
}

/// Parameters for creating a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRoute {
    pub dst_address: String,
    pub gateway: String,
    pub distance: Option<u8>,
    pub routing_table: Option<String>,
    pub comment: Option<String>,
}

impl NewRoute {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("dst-address".into(), self.dst_address.clone());
        params.insert("gateway".into(), self.gateway.clone());
        if let Some(distance) = self.distance {
            params.insert("distance".into(), distance.to_string());
        }
        insert_opt(&mut params, "routing-table", self.routing_table.as_deref());
        insert_opt(&mut params, "comment", self.comment.as_deref());
        params
    }
}
