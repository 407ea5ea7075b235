// ── Runtime configuration ──
//
// Plain structs describing how to reach one device and how the presence
// and realtime layers behave. Core never reads config files: the CLI (or
// any other host) builds these and hands them in.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use secrecy::SecretString;

use wgfleet_api::{DeviceTarget, TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certs). Default for routers.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for supervising a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Use plain HTTP for the REST surface.
    pub plain_http: bool,
    /// Deadline for one device call (and for opening a session).
    pub timeout: Duration,
    /// Deadline for the liveness probe run before each call.
    pub probe_timeout: Duration,
    /// Attempts per logical call, including the first.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Lifetime of cached list reads.
    pub cache_ttl: Duration,
    pub cache_max_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.88.1".into(),
            port: 443,
            username: "admin".into(),
            password: SecretString::from(String::new()),
            tls: TlsVerification::default(),
            plain_http: false,
            timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(30),
            cache_max_size: 256,
        }
    }
}

impl DeviceConfig {
    /// Session target handed to the connector.
    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }

    /// Transport settings for the REST connector.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            plain_http: self.plain_http,
            ..TransportConfig::default()
        }
    }
}

/// Debounce policy for presence classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresencePolicy {
    /// A heartbeat age below this classifies the peer as online.
    pub online_threshold: Duration,
    /// Online -> offline is accepted once the peer has been silent this long.
    pub offline_confirm: Duration,
    /// Offline -> online is accepted only for an age below this.
    pub online_confirm: Duration,
    /// Zone for absolute heartbeat timestamps, which carry no offset.
    pub timezone: FixedOffset,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            online_threshold: Duration::from_secs(90),
            offline_confirm: Duration::from_secs(90),
            online_confirm: Duration::from_secs(75),
            timezone: Utc.fix(),
        }
    }
}

/// Timing for realtime topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub tick: Duration,
    /// Back-off after the device could not be reached.
    pub unreachable_backoff: Duration,
    /// Back-off after a read returned no rows.
    pub empty_backoff: Duration,
    /// Upper bound for delivering one message to one subscriber.
    pub send_timeout: Duration,
    /// Non-WireGuard interfaces reported by the traffic topic.
    pub wan_interfaces: Vec<String>,
    /// Per-subscriber queue depth for channel subscribers.
    pub subscriber_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            unreachable_backoff: Duration::from_secs(5),
            empty_backoff: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
            wan_interfaces: vec!["ether1".into()],
            subscriber_buffer: 16,
        }
    }
}
