//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use wgfleet_config::ConfigError;
use wgfleet_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach router {host}")]
    #[diagnostic(
        code(wgfleet::connection_failed),
        help(
            "Check that the router is up and its REST service is enabled.\n\
             Try a longer --timeout, or --insecure for self-signed certificates."
        )
    )]
    ConnectionFailed { host: String, reason: String },

    #[error("Router returned unreadable responses: {message}")]
    #[diagnostic(
        code(wgfleet::protocol),
        help("The router firmware may not expose the expected REST fields.")
    )]
    Protocol { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(wgfleet::auth_failed),
        help(
            "Verify the username and password.\n\
             Run: wgfleet config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(wgfleet::no_credentials),
        help(
            "Store one with: wgfleet config set-password\n\
             Or set the WGFLEET_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wgfleet::not_found),
        help("Run: wgfleet {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Entry already exists: {message}")]
    #[diagnostic(code(wgfleet::conflict))]
    Conflict { message: String },

    #[error("Router rejected the operation: {message}")]
    #[diagnostic(code(wgfleet::rejected))]
    Rejected { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wgfleet::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(wgfleet::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Add one under [profiles.<name>] in: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No router configured")]
    #[diagnostic(
        code(wgfleet::no_config),
        help(
            "Pass --host, set WGFLEET_HOST, or add a profile to: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(wgfleet::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wgfleet::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(wgfleet::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode output: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to encode config: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Protocol { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceUnreachable { host, message, .. } => Self::ConnectionFailed {
                host,
                reason: message,
            },

            CoreError::TransientConnection { attempts, message } => Self::ConnectionFailed {
                host: "(session lost)".into(),
                reason: format!("{message} after {attempts} attempt(s)"),
            },

            CoreError::ProtocolParse { message, .. } => Self::Protocol { message },

            CoreError::AuthenticationFailed { .. } => Self::AuthFailed {
                profile: "current".into(),
            },

            CoreError::UnresolvedIdentifier { kind, identifier } => {
                let list_command = match kind.as_str() {
                    "peer" => "peers list",
                    "route" => "routes list",
                    _ => "interfaces list",
                };
                Self::NotFound {
                    list_command: list_command.into(),
                    resource_type: kind,
                    identifier,
                }
            }

            CoreError::DuplicateEntry { message } => Self::Conflict { message },

            CoreError::Rejected { message } => Self::Rejected { message },

            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => Self::Validation {
                field: "connection".into(),
                reason: message,
            },

            CoreError::Storage(e) => Self::Internal(e.to_string()),

            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}
