// ── Core error types ──
//
// What callers of the supervisor, tracker and topics see. Transport
// failures arrive as `wgfleet_api::Error` and are translated here; the
// retry loop builds the exhausted-retry variants itself so they carry
// the attempt count and the last underlying message.

use thiserror::Error;

use crate::presence::StoreError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device errors ────────────────────────────────────────────────
    /// The device already holds an identical entry. Never retried.
    #[error("Entry already exists: {message}")]
    DuplicateEntry { message: String },

    /// Session loss, timeout or network failure that outlived all retries.
    #[error("Device connection failed after {attempts} attempt(s): {message}")]
    TransientConnection { attempts: u32, message: String },

    /// The device kept answering with undecodable responses.
    #[error("Unreadable device response after {attempts} attempt(s): {message}")]
    ProtocolParse { attempts: u32, message: String },

    /// No session could be opened at all.
    #[error("Device {host} unreachable after {attempts} attempt(s): {message}")]
    DeviceUnreachable {
        host: String,
        attempts: u32,
        message: String,
    },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The device refused the operation.
    #[error("Operation rejected by device: {message}")]
    Rejected { message: String },

    // ── Caller errors ────────────────────────────────────────────────
    /// A caller-supplied identifier matched no resource on the device.
    #[error("No {kind} matches identifier {identifier:?}")]
    UnresolvedIdentifier { kind: String, identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Presence storage error: {0}")]
    Storage(#[from] StoreError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The caller sent something the device will never accept (HTTP 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateEntry { .. }
                | Self::UnresolvedIdentifier { .. }
                | Self::ValidationFailed { .. }
                | Self::Rejected { .. }
        )
    }

    /// The device could not be reached or read; try again later (HTTP 503).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::TransientConnection { .. }
                | Self::ProtocolParse { .. }
                | Self::DeviceUnreachable { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<wgfleet_api::Error> for CoreError {
    fn from(err: wgfleet_api::Error) -> Self {
        use wgfleet_api::Error as Api;

        let duplicate = err.is_duplicate();
        match err {
            Api::DuplicateEntry { message } | Api::Device { message } if duplicate => {
                Self::DuplicateEntry { message }
            }
            Api::Authentication { message } => Self::AuthenticationFailed { message },
            Api::Connection(message) => Self::TransientConnection {
                attempts: 1,
                message,
            },
            Api::Timeout { .. } => Self::TransientConnection {
                attempts: 1,
                message: err.to_string(),
            },
            Api::MalformedResponse { message } => Self::ProtocolParse {
                attempts: 1,
                message,
            },
            Api::DuplicateEntry { message } => Self::DuplicateEntry { message },
            Api::Device { message } => Self::Rejected { message },
            Api::InvalidRequest(message) => Self::ValidationFailed { message },
            Api::Transport(ref e) => {
                if err.is_transient() {
                    Self::TransientConnection {
                        attempts: 1,
                        message: e.to_string(),
                    }
                } else {
                    Self::Internal(e.to_string())
                }
            }
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(message) => Self::Config {
                message: format!("TLS error: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_trap_mentioning_duplicate_maps_to_duplicate() {
        let err: CoreError = wgfleet_api::Error::Device {
            message: "failure: entry already exists".into(),
        }
        .into();
        assert!(matches!(err, CoreError::DuplicateEntry { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn api_errors_land_in_matching_buckets() {
        let auth: CoreError = wgfleet_api::Error::Authentication {
            message: "bad password".into(),
        }
        .into();
        assert!(matches!(auth, CoreError::AuthenticationFailed { .. }));

        let timeout: CoreError = wgfleet_api::Error::Timeout { timeout_secs: 5 }.into();
        assert!(timeout.is_unavailable());

        let rejected: CoreError = wgfleet_api::Error::Device {
            message: "no such item".into(),
        }
        .into();
        assert!(matches!(rejected, CoreError::Rejected { .. }));
    }

    #[test]
    fn unresolved_identifier_is_a_client_error() {
        let err = CoreError::UnresolvedIdentifier {
            kind: "peer".into(),
            identifier: "laptop".into(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_unavailable());
        assert_eq!(err.to_string(), "No peer matches identifier \"laptop\"");
    }
}
