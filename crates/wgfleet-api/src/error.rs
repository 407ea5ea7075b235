use thiserror::Error;

/// Top-level error type for the `wgfleet-api` crate.
///
/// Covers every failure mode a device session can report. `wgfleet-core`
/// never inspects variants directly for retry decisions; it asks
/// [`Error::class`] instead.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected by the device (wrong credentials, disabled user).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Session ─────────────────────────────────────────────────────
    /// The session dropped, was refused, or the network is down.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single device call exceeded its deadline.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The device answered with something we could not decode.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    // ── Device-side failures ────────────────────────────────────────
    /// The device refused an add because an identical entry exists.
    #[error("Entry already exists: {message}")]
    DuplicateEntry { message: String },

    /// Any other error trap raised by the device.
    #[error("Device error: {message}")]
    Device { message: String },

    /// The request could not be built (missing `.id`, bad path).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error not covered by a more specific variant.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Retry classification for a device failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Entry already exists. Never retried.
    Duplicate,
    /// Undecodable response. The session may be corrupt: reconnect and retry.
    ProtocolParse,
    /// Session loss, timeout or network failure: reconnect and retry.
    Connection,
    /// Everything else. Surfaced immediately.
    Fatal,
}

const DUPLICATE_MARKER: &str = "already exists";

impl Error {
    /// Classify this error for the supervisor's retry policy.
    ///
    /// Devices report duplicates as a generic trap whose text contains
    /// "already exists", so message text wins over the variant.
    pub fn class(&self) -> ErrorClass {
        if self.mentions_duplicate() {
            return ErrorClass::Duplicate;
        }
        match self {
            Self::DuplicateEntry { .. } => ErrorClass::Duplicate,
            Self::MalformedResponse { .. } => ErrorClass::ProtocolParse,
            Self::Connection(_) | Self::Timeout { .. } => ErrorClass::Connection,
            Self::Transport(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorClass::Connection
                } else if e.is_decode() || e.is_body() {
                    ErrorClass::ProtocolParse
                } else {
                    ErrorClass::Fatal
                }
            }
            Self::Authentication { .. }
            | Self::Device { .. }
            | Self::InvalidRequest(_)
            | Self::InvalidUrl(_)
            | Self::Tls(_) => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if this error means the entry already exists.
    pub fn is_duplicate(&self) -> bool {
        self.class() == ErrorClass::Duplicate
    }

    /// Returns `true` if reconnecting and retrying might resolve it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Connection | ErrorClass::ProtocolParse
        )
    }

    /// Returns `true` if the device rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    fn mentions_duplicate(&self) -> bool {
        match self {
            Self::Device { message } | Self::DuplicateEntry { message } => {
                message.to_ascii_lowercase().contains(DUPLICATE_MARKER)
            }
            _ => false,
        }
    }
}
