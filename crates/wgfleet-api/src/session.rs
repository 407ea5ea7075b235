// ── Device session abstraction ──
//
// The router exposes every configuration object under a resource path
// (`/interface/wireguard/peers`) and a small verb set. Results come back
// as flat string-keyed records whose field spellings vary between calls,
// so nothing here interprets them.

use std::fmt;

use indexmap::IndexMap;
use secrecy::SecretString;
use strum::{AsRefStr, Display, EnumString};

use crate::error::Error;

/// One result row from the device, in the order the device sent its fields.
pub type Record = IndexMap<String, String>;

/// Command-specific parameters. No schema: the accepted set depends on the path.
pub type Params = IndexMap<String, String>;

/// The verb applied to a resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceCommand {
    Print,
    Add,
    Set,
    Remove,
    Enable,
    Disable,
}

impl DeviceCommand {
    /// Returns `true` for every verb that changes device state.
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Print)
    }
}

/// Where and as whom to open a session.
#[derive(Clone)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Upper bound for a single request on this session.
    pub timeout: std::time::Duration,
}

impl fmt::Debug for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A single, stateful, blocking session with the device.
///
/// Implementations are not required to tolerate concurrent use: callers
/// hold exclusive access for the duration of each call.
pub trait DeviceSession: Send + 'static {
    /// Run `command` against `path` and return the raw result rows.
    fn execute(
        &mut self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
    ) -> Result<Vec<Record>, Error>;

    /// Release the session. Called once before the session is dropped.
    fn close(&mut self) {}
}

/// Opens sessions. Blocking: callers run it off the async executor.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, Error>;
}
