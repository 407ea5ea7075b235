// wgfleet-api: Device RPC boundary for WireGuard routers.
//
// The vendor session is a single blocking, stateful channel. This crate
// only describes it (`DeviceSession` / `Connector`) and ships one concrete
// connector over the router's HTTPS REST surface. Retry, caching and
// concurrency policy live in `wgfleet-core`.

pub mod error;
pub mod rest;
pub mod session;
pub mod transport;

pub use error::{Error, ErrorClass};
pub use rest::{RestConnector, RestSession};
pub use session::{Connector, DeviceCommand, DeviceSession, DeviceTarget, Params, Record};
pub use transport::{TlsMode, TransportConfig};
