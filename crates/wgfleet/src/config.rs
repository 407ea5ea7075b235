//! CLI configuration: thin wrapper around `wgfleet_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--host, --username, --insecure, ...).

use wgfleet_core::{DeviceConfig, PresencePolicy, RealtimeConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use wgfleet_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for help texts.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Build the `DeviceConfig` for this invocation.
///
/// A configured profile is used with CLI flag overrides; without one,
/// `--host` alone is enough and the password comes from the environment.
pub fn resolve_device(global: &GlobalOpts, config: &Config) -> Result<DeviceConfig, CliError> {
    let profile_name = active_profile_name(global, config);

    let flag_profile;
    let profile = if let Some(profile) = config.profiles.get(&profile_name) {
        profile
    } else if let Some(host) = &global.host {
        flag_profile = Profile {
            host: host.clone(),
            port: 443,
            username: "admin".into(),
            password: None,
            password_env: None,
            ca_cert: None,
            insecure: None,
            plain_http: false,
            timeout: None,
        };
        &flag_profile
    } else if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(config),
            path: config_path().display().to_string(),
        });
    } else {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };

    let mut device =
        wgfleet_config::profile_to_device_config(profile, &profile_name, &config.defaults)?;

    // Flag > env > profile
    if let Some(host) = &global.host {
        device.host.clone_from(host);
    }
    if let Some(port) = global.port {
        device.port = port;
    }
    if let Some(username) = &global.username {
        device.username.clone_from(username);
    }
    if let Some(timeout) = global.timeout {
        device.timeout = std::time::Duration::from_secs(timeout);
    }
    if global.insecure {
        device.tls = wgfleet_core::TlsVerification::DangerAcceptInvalid;
    }
    if global.plain_http {
        device.plain_http = true;
    }

    Ok(device)
}

pub fn presence_policy(config: &Config) -> Result<PresencePolicy, CliError> {
    Ok(wgfleet_config::presence_policy(&config.presence)?)
}

pub fn realtime_config(config: &Config) -> Result<RealtimeConfig, CliError> {
    Ok(wgfleet_config::realtime_config(&config.realtime)?)
}
