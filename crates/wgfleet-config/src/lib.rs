//! Shared configuration for the wgfleet CLI and other hosts.
//!
//! TOML device profiles, credential resolution (env + keyring + plaintext),
//! and translation to the `wgfleet_core` runtime structs. Core never reads
//! files; everything it needs is built here and handed in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wgfleet_core::{DeviceConfig, PresencePolicy, RealtimeConfig, TlsVerification};

const KEYRING_SERVICE: &str = "wgfleet";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{name}'")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    #[serde(default)]
    pub presence: PresenceSection,

    #[serde(default)]
    pub realtime: RealtimeSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            presence: PresenceSection::default(),
            realtime: RealtimeSection::default(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Accept self-signed router certificates unless a profile says otherwise.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Per-call deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Lifetime of cached list reads in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: default_insecure(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_cache_ttl() -> u64 {
    30
}

/// A named device profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// Router address (hostname or IP).
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Talk plain HTTP to the REST surface.
    #[serde(default)]
    pub plain_http: bool,

    /// Override timeout.
    pub timeout: Option<u64>,
}

fn default_port() -> u16 {
    443
}
fn default_username() -> String {
    "admin".into()
}

/// Heartbeat classification thresholds, in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct PresenceSection {
    #[serde(default = "default_threshold")]
    pub online_threshold: u64,

    #[serde(default = "default_threshold")]
    pub offline_confirm: u64,

    #[serde(default = "default_online_confirm")]
    pub online_confirm: u64,

    /// UTC offset of the router clock, e.g. "+03:00".
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// Poll interval of `wgfleet monitor`.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            online_threshold: default_threshold(),
            offline_confirm: default_threshold(),
            online_confirm: default_online_confirm(),
            utc_offset: default_utc_offset(),
            monitor_interval: default_monitor_interval(),
        }
    }
}

fn default_threshold() -> u64 {
    90
}
fn default_online_confirm() -> u64 {
    75
}
fn default_utc_offset() -> String {
    "+00:00".into()
}
fn default_monitor_interval() -> u64 {
    30
}

/// Realtime topic timing.
#[derive(Debug, Deserialize, Serialize)]
pub struct RealtimeSection {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_unreachable_backoff")]
    pub unreachable_backoff: u64,

    #[serde(default = "default_empty_backoff")]
    pub empty_backoff: u64,

    #[serde(default = "default_wan_interfaces")]
    pub wan_interfaces: Vec<String>,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            unreachable_backoff: default_unreachable_backoff(),
            empty_backoff: default_empty_backoff(),
            wan_interfaces: default_wan_interfaces(),
        }
    }
}

fn default_tick_ms() -> u64 {
    500
}
fn default_unreachable_backoff() -> u64 {
    5
}
fn default_empty_backoff() -> u64 {
    2
}
fn default_wan_interfaces() -> Vec<String> {
    vec!["ether1".into()]
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "wgfleet", "wgfleet").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("wgfleet");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields defaults.
///
/// `WGFLEET_` variables override the file; nested keys use a double
/// underscore (`WGFLEET_PROFILES__LAB__HOST`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WGFLEET_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the device password: env var, then system keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, then the global variable
    let from_env = profile
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| std::env::var("WGFLEET_PASSWORD").ok());
    if let Some(pw) = from_env {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

// ── Translation to core config ──────────────────────────────────────

/// Build a `DeviceConfig` from a profile and the global defaults.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: format!("profile '{profile_name}' has an empty host"),
        });
    }
    if defaults.max_retries == 0 {
        return Err(ConfigError::Validation {
            field: "max_retries".into(),
            reason: "must be at least 1".into(),
        });
    }

    let password = resolve_password(profile, profile_name)?;

    let insecure = profile.insecure.unwrap_or(defaults.insecure);
    let tls = if profile.insecure == Some(true) || (insecure && profile.ca_cert.is_none()) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(DeviceConfig {
        host: profile.host.clone(),
        port: profile.port,
        username: profile.username.clone(),
        password,
        tls,
        plain_http: profile.plain_http,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        max_retries: defaults.max_retries,
        cache_ttl: Duration::from_secs(defaults.cache_ttl),
        ..DeviceConfig::default()
    })
}

/// Build the presence debounce policy.
pub fn presence_policy(section: &PresenceSection) -> Result<PresencePolicy, ConfigError> {
    Ok(PresencePolicy {
        online_threshold: Duration::from_secs(section.online_threshold),
        offline_confirm: Duration::from_secs(section.offline_confirm),
        online_confirm: Duration::from_secs(section.online_confirm),
        timezone: parse_utc_offset(&section.utc_offset)?,
    })
}

/// Build realtime topic timing.
pub fn realtime_config(section: &RealtimeSection) -> Result<RealtimeConfig, ConfigError> {
    if section.tick_ms == 0 {
        return Err(ConfigError::Validation {
            field: "realtime.tick_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(RealtimeConfig {
        tick: Duration::from_millis(section.tick_ms),
        unreachable_backoff: Duration::from_secs(section.unreachable_backoff),
        empty_backoff: Duration::from_secs(section.empty_backoff),
        wan_interfaces: section.wan_interfaces.clone(),
        ..RealtimeConfig::default()
    })
}

/// Parse `Z`, `UTC`, `+HH`, `+HH:MM` or `-HHMM`.
fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::Validation {
        field: "presence.utc_offset".into(),
        reason: format!("expected an offset like +03:00, got '{raw}'"),
    };

    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.as_str(), "0"),
        4 => digits.split_at(2),
        _ => return Err(invalid()),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
