use std::fmt;

use serde::{Deserialize, Serialize};

/// The device's own identifier for a configuration object (`*1A`).
///
/// Distinct from whatever the caller uses to name the object (a public
/// key, an interface name); see [`resolve_handle`](crate::resolve_handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceHandle {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ResourceHandle {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
