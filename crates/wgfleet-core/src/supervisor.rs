// ── Connection supervisor ──
//
// Owns the one blocking device session and turns it into an async,
// retrying, cache-backed service shared by every caller. Callers queue on
// the session slot; the blocking call runs on tokio's blocking pool under
// a deadline so a hung session cannot wedge the executor.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wgfleet_api::{Connector, DeviceCommand, DeviceSession, ErrorClass, Params, Record};

use crate::cache::TtlCache;
use crate::config::DeviceConfig;
use crate::convert::{created_handle, normalize_record};
use crate::error::CoreError;
use crate::model::{
    InterfaceCounters, NewInterface, NewPeer, NewRoute, Peer, ResourceHandle, Route, WgInterface,
};
use crate::params::ResourceKind;
use crate::resolve::{HandleCandidate, resolve_handle};

type ApiError = wgfleet_api::Error;
type SharedSession = Arc<StdMutex<Box<dyn DeviceSession>>>;

/// Cheap read used to check a session is still alive.
const PROBE_PATH: &str = "/system/identity";
/// Every interface with its byte counters.
const COUNTERS_PATH: &str = "/interface";

const INTERFACES_KEY: &str = "interfaces:wireguard";
const ROUTES_KEY: &str = "routes:all";
const INTERFACES_PREFIX: &str = "interfaces:";
const PEERS_PREFIX: &str = "peers:";
const ROUTES_PREFIX: &str = "routes:";

fn peers_key(interface: &str) -> String {
    format!("{PEERS_PREFIX}{interface}")
}

// ── ConnectionState ──────────────────────────────────────────────

/// Session state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

/// Whether a read may be answered from cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    Prefer,
    /// Always ask the device (duplicate checks, handle resolution).
    Bypass,
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Session opens attempted, successful or not.
    pub connects: u64,
    /// Opens attempted after a session had existed before.
    pub reconnects: u64,
    /// Device call attempts across all logical calls.
    pub attempts: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Default)]
struct Counters {
    connects: AtomicU64,
    reconnects: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone)]
enum CachedValue {
    Interfaces(Arc<Vec<WgInterface>>),
    Peers(Arc<Vec<Peer>>),
    Routes(Arc<Vec<Route>>),
}

impl CachedValue {
    fn into_interfaces(self) -> Option<Arc<Vec<WgInterface>>> {
        match self {
            Self::Interfaces(v) => Some(v),
            _ => None,
        }
    }

    fn into_peers(self) -> Option<Arc<Vec<Peer>>> {
        match self {
            Self::Peers(v) => Some(v),
            _ => None,
        }
    }

    fn into_routes(self) -> Option<Arc<Vec<Route>>> {
        match self {
            Self::Routes(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    session: Option<SharedSession>,
    /// A session has been open at least once; later opens are reconnects.
    established_once: bool,
}

/// A failed attempt and whether it got as far as a live session.
struct Failure {
    error: ApiError,
    connected: bool,
}

// ── ConnectionSupervisor ─────────────────────────────────────────

/// The single point of device access.
///
/// Cheaply cloneable via `Arc<SupervisorInner>`; hand clones to handlers,
/// topics and monitors. Only one device call is in flight at a time.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    slot: Mutex<SessionSlot>,
    state: watch::Sender<ConnectionState>,
    cache: TtlCache<CachedValue>,
    /// Bumped before every post-write invalidation.
    write_epoch: AtomicU64,
    counters: Counters,
}

impl ConnectionSupervisor {
    /// Create a supervisor. Does NOT connect: the first call (or
    /// [`connect()`](Self::connect)) opens the session.
    pub fn new(config: DeviceConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let cache = TtlCache::new(config.cache_max_size);
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                connector,
                slot: Mutex::new(SessionSlot::default()),
                state,
                cache,
                write_epoch: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Subscribe to session state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> SupervisorStats {
        let c = &self.inner.counters;
        SupervisorStats {
            connects: c.connects.load(Ordering::Relaxed),
            reconnects: c.reconnects.load(Ordering::Relaxed),
            attempts: c.attempts.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the session now instead of on first use.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.slot.lock().await;
        if slot.session.is_some() {
            return Ok(());
        }
        self.open(&mut slot, 1)
            .await
            .map(drop)
            .map_err(|e| self.connect_error(e, 1))
    }

    /// Make sure a live session exists, probing the current one.
    pub async fn ensure_connected(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.slot.lock().await;
        self.ensure(&mut slot, 1)
            .await
            .map(drop)
            .map_err(|e| self.connect_error(e, 1))
    }

    /// Close the session and drop every cached read.
    pub async fn close(&self) {
        let closing = {
            let mut slot = self.inner.slot.lock().await;
            self.teardown(&mut slot)
        };
        if let Some(handle) = closing {
            let _ = handle.await;
        }
        self.inner.cache.clear();
        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!(host = %self.inner.config.host, "device session closed");
    }

    // ── Raw execution ────────────────────────────────────────────

    /// Run one device command with reconnect-and-retry.
    ///
    /// Records come back with canonical field names. A successful write
    /// to peers, interfaces or routes invalidates the matching cached
    /// lists; the peer scope is taken from an `interface` parameter.
    pub async fn execute(
        &self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
    ) -> Result<Vec<Record>, CoreError> {
        let scope = params.get("interface").map(String::as_str);
        self.execute_scoped(path, command, params, scope).await
    }

    async fn execute_scoped(
        &self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
        scope: Option<&str>,
    ) -> Result<Vec<Record>, CoreError> {
        let max_attempts = self.inner.config.max_retries.max(1);
        let mut last: Option<Failure> = None;
        let mut reached_device = false;

        for attempt in 1..=max_attempts {
            bump(&self.inner.counters.attempts);
            let failure = match self.attempt(path, command, params, attempt).await {
                Ok(records) => {
                    if command.is_mutation() {
                        self.invalidate_after_write(path, scope);
                    }
                    return Ok(records.iter().map(normalize_record).collect());
                }
                Err(failure) => failure,
            };

            reached_device |= failure.connected;
            match failure.error.class() {
                ErrorClass::Duplicate | ErrorClass::Fatal => return Err(failure.error.into()),
                ErrorClass::Connection | ErrorClass::ProtocolParse => {
                    warn!(
                        path,
                        %command,
                        attempt,
                        max_attempts,
                        error = %failure.error,
                        "device call failed"
                    );
                    last = Some(failure);
                    if attempt < max_attempts {
                        bump(&self.inner.counters.retries);
                        tokio::time::sleep(self.inner.config.retry_delay).await;
                    }
                }
            }
        }

        Err(self.exhausted(max_attempts, last, reached_device))
    }

    /// One attempt: hold the slot, make sure a session exists, call it.
    async fn attempt(
        &self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
        attempt: u32,
    ) -> Result<Vec<Record>, Failure> {
        let mut slot = self.inner.slot.lock().await;
        let session = self
            .ensure(&mut slot, attempt)
            .await
            .map_err(|error| Failure {
                error,
                connected: false,
            })?;

        debug!(path, %command, attempt, "device call");
        let result = run_blocking(
            session,
            path,
            command,
            params.clone(),
            self.inner.config.timeout,
        )
        .await;

        result.map_err(|error| {
            if error.is_transient() {
                self.teardown(&mut slot);
            }
            Failure {
                error,
                connected: true,
            }
        })
    }

    async fn ensure(&self, slot: &mut SessionSlot, attempt: u32) -> Result<SharedSession, ApiError> {
        if let Some(session) = slot.session.clone() {
            let probe = run_blocking(
                Arc::clone(&session),
                PROBE_PATH,
                DeviceCommand::Print,
                Params::new(),
                self.inner.config.probe_timeout,
            )
            .await;
            match probe {
                Ok(_) => return Ok(session),
                Err(e) => {
                    warn!(error = %e, "liveness probe failed, reopening session");
                    self.teardown(slot);
                }
            }
        }
        self.open(slot, attempt).await
    }

    async fn open(&self, slot: &mut SessionSlot, attempt: u32) -> Result<SharedSession, ApiError> {
        let reconnect = slot.established_once;
        self.inner.state.send_replace(if reconnect {
            ConnectionState::Reconnecting { attempt }
        } else {
            ConnectionState::Connecting
        });
        bump(&self.inner.counters.connects);
        if reconnect {
            bump(&self.inner.counters.reconnects);
        }

        let connector = Arc::clone(&self.inner.connector);
        let target = self.inner.config.target();
        let deadline = self.inner.config.timeout;
        let task = tokio::task::spawn_blocking(move || connector.connect(&target));
        let opened = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ApiError::Connection(format!("connect task aborted: {join}"))),
            Err(_) => Err(ApiError::Timeout {
                timeout_secs: deadline.as_secs(),
            }),
        };

        match opened {
            Ok(session) => {
                let shared: SharedSession = Arc::new(StdMutex::new(session));
                slot.session = Some(Arc::clone(&shared));
                slot.established_once = true;
                self.inner.state.send_replace(ConnectionState::Connected);
                info!(host = %self.inner.config.host, reconnect, "device session established");
                Ok(shared)
            }
            Err(e) => {
                self.inner.state.send_replace(if e.is_auth() {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                });
                warn!(host = %self.inner.config.host, error = %e, "failed to open device session");
                Err(e)
            }
        }
    }

    /// Drop the current session; closing it happens off the executor.
    fn teardown(&self, slot: &mut SessionSlot) -> Option<JoinHandle<()>> {
        let session = slot.session.take()?;
        self.inner.state.send_replace(ConnectionState::Disconnected);
        debug!("tearing down device session");
        Some(tokio::task::spawn_blocking(move || {
            // A call that outlived its deadline may still hold the lock.
            if let Ok(mut guard) = session.try_lock() {
                guard.close();
            }
        }))
    }

    fn connect_error(&self, error: ApiError, attempts: u32) -> CoreError {
        match error.class() {
            ErrorClass::Connection | ErrorClass::ProtocolParse => CoreError::DeviceUnreachable {
                host: self.inner.config.host.clone(),
                attempts,
                message: error.to_string(),
            },
            ErrorClass::Duplicate | ErrorClass::Fatal => error.into(),
        }
    }

    fn exhausted(&self, attempts: u32, last: Option<Failure>, reached_device: bool) -> CoreError {
        let Some(failure) = last else {
            return CoreError::Internal("retry loop ended without an attempt".into());
        };
        let message = failure.error.to_string();
        if !reached_device {
            CoreError::DeviceUnreachable {
                host: self.inner.config.host.clone(),
                attempts,
                message,
            }
        } else if failure.error.class() == ErrorClass::ProtocolParse {
            CoreError::ProtocolParse { attempts, message }
        } else {
            CoreError::TransientConnection { attempts, message }
        }
    }

    // ── Cache ────────────────────────────────────────────────────

    fn invalidate_after_write(&self, path: &str, scope: Option<&str>) {
        self.inner.write_epoch.fetch_add(1, Ordering::SeqCst);
        let cache = &self.inner.cache;
        let path = path.trim_end_matches('/');
        if path == ResourceKind::Peer.path() {
            match scope {
                Some(interface) => cache.invalidate_pattern(&peers_key(interface)),
                None => cache.invalidate_pattern(PEERS_PREFIX),
            };
            cache.invalidate_pattern(INTERFACES_PREFIX);
        } else if path == ResourceKind::Interface.path() {
            cache.invalidate_pattern(INTERFACES_PREFIX);
            cache.invalidate_pattern(PEERS_PREFIX);
        } else if path == ResourceKind::Route.path() {
            cache.invalidate_pattern(ROUTES_PREFIX);
        }
    }

    async fn read_through<T, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        wrap: fn(Arc<Vec<T>>) -> CachedValue,
        project: fn(CachedValue) -> Option<Arc<Vec<T>>>,
        fetch: Fut,
    ) -> Result<Arc<Vec<T>>, CoreError>
    where
        Fut: Future<Output = Result<Vec<T>, CoreError>>,
    {
        if policy == CachePolicy::Prefer {
            if let Some(hit) = self.inner.cache.get(key).and_then(project) {
                bump(&self.inner.counters.cache_hits);
                debug!(key, "cache hit");
                return Ok(hit);
            }
            bump(&self.inner.counters.cache_misses);
        }

        let epoch = self.inner.write_epoch.load(Ordering::SeqCst);
        let fresh = Arc::new(fetch.await?);
        self.inner
            .cache
            .set(key, wrap(Arc::clone(&fresh)), self.inner.config.cache_ttl);
        // A write landed while fetching: the list may predate it.
        if self.inner.write_epoch.load(Ordering::SeqCst) != epoch {
            debug!(key, "write during fetch, not caching");
            self.inner.cache.invalidate(key);
        }
        Ok(fresh)
    }

    // ── Reads ────────────────────────────────────────────────────

    pub async fn list_interfaces(
        &self,
        policy: CachePolicy,
    ) -> Result<Arc<Vec<WgInterface>>, CoreError> {
        self.read_through(
            INTERFACES_KEY,
            policy,
            CachedValue::Interfaces,
            CachedValue::into_interfaces,
            async {
                let records = self
                    .execute(
                        ResourceKind::Interface.path(),
                        DeviceCommand::Print,
                        &Params::new(),
                    )
                    .await?;
                Ok(records.iter().map(WgInterface::from).collect())
            },
        )
        .await
    }

    /// Peers of one interface.
    pub async fn list_peers(
        &self,
        interface: &str,
        policy: CachePolicy,
    ) -> Result<Arc<Vec<Peer>>, CoreError> {
        self.read_through(
            &peers_key(interface),
            policy,
            CachedValue::Peers,
            CachedValue::into_peers,
            async {
                let mut query = Params::new();
                query.insert("interface".into(), interface.to_owned());
                let records = self
                    .execute(ResourceKind::Peer.path(), DeviceCommand::Print, &query)
                    .await?;
                Ok(records
                    .iter()
                    .map(Peer::from)
                    .filter_map(|mut peer| {
                        if peer.interface.is_empty() {
                            peer.interface = interface.to_owned();
                        }
                        (peer.interface == interface).then_some(peer)
                    })
                    .collect())
            },
        )
        .await
    }

    pub async fn list_routes(&self, policy: CachePolicy) -> Result<Arc<Vec<Route>>, CoreError> {
        self.read_through(
            ROUTES_KEY,
            policy,
            CachedValue::Routes,
            CachedValue::into_routes,
            async {
                let records = self
                    .execute(ResourceKind::Route.path(), DeviceCommand::Print, &Params::new())
                    .await?;
                Ok(records.iter().map(Route::from).collect())
            },
        )
        .await
    }

    /// Live byte counters, never cached. An empty `names` means all.
    pub async fn interface_counters(
        &self,
        names: &[String],
    ) -> Result<Vec<InterfaceCounters>, CoreError> {
        let records = self
            .execute(COUNTERS_PATH, DeviceCommand::Print, &Params::new())
            .await?;
        Ok(records
            .iter()
            .map(InterfaceCounters::from)
            .filter(|c| names.is_empty() || names.contains(&c.name))
            .collect())
    }

    // ── Handle resolution ────────────────────────────────────────

    /// Map a loose peer identifier (key, name, handle) to its handle.
    pub async fn resolve_peer(
        &self,
        identifier: &str,
        interface: &str,
    ) -> Result<ResourceHandle, CoreError> {
        let peers = self.list_peers(interface, CachePolicy::Bypass).await?;
        let known: Vec<_> = peers.iter().filter_map(HandleCandidate::for_peer).collect();
        resolve_handle(&[identifier.to_owned()], &known)
            .ok_or_else(|| unresolved(ResourceKind::Peer, identifier))
    }

    pub async fn resolve_interface(&self, identifier: &str) -> Result<ResourceHandle, CoreError> {
        let interfaces = self.list_interfaces(CachePolicy::Bypass).await?;
        let known: Vec<_> = interfaces
            .iter()
            .filter_map(HandleCandidate::for_interface)
            .collect();
        resolve_handle(&[identifier.to_owned()], &known)
            .ok_or_else(|| unresolved(ResourceKind::Interface, identifier))
    }

    pub async fn resolve_route(&self, identifier: &str) -> Result<ResourceHandle, CoreError> {
        let routes = self.list_routes(CachePolicy::Bypass).await?;
        let known: Vec<_> = routes.iter().filter_map(HandleCandidate::for_route).collect();
        resolve_handle(&[identifier.to_owned()], &known)
            .ok_or_else(|| unresolved(ResourceKind::Route, identifier))
    }

    // ── Peer writes ──────────────────────────────────────────────

    /// Create a peer. Returns the new handle when the device reports one.
    ///
    /// Checks the live peer list for the same public key first. The
    /// optional name is stored as the comment, which every firmware
    /// accepts.
    pub async fn add_peer(&self, peer: &NewPeer) -> Result<Option<ResourceHandle>, CoreError> {
        require("peer interface", &peer.interface)?;
        require("peer public key", &peer.public_key)?;

        let existing = self.list_peers(&peer.interface, CachePolicy::Bypass).await?;
        if existing.iter().any(|p| p.public_key == peer.public_key) {
            return Err(CoreError::DuplicateEntry {
                message: format!(
                    "peer with public key {} already exists on {}",
                    peer.public_key, peer.interface
                ),
            });
        }

        let mut params = peer.to_params();
        if let Some(name) = params.shift_remove("name") {
            params.entry("comment".into()).or_insert(name);
        }
        let params = ResourceKind::Peer.filter(DeviceCommand::Add, &params);

        let records = self
            .execute_scoped(
                ResourceKind::Peer.path(),
                DeviceCommand::Add,
                &params,
                Some(&peer.interface),
            )
            .await?;
        let handle = created_handle(&records);
        info!(interface = %peer.interface, handle = ?handle, "peer added");
        Ok(handle)
    }

    /// Change fields of an existing peer. Unsupported fields are dropped.
    pub async fn update_peer(
        &self,
        identifier: &str,
        interface: &str,
        fields: &Params,
    ) -> Result<ResourceHandle, CoreError> {
        let mut params = ResourceKind::Peer.filter(DeviceCommand::Set, fields);
        if params.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "no updatable peer fields given".into(),
            });
        }

        let handle = self.resolve_peer(identifier, interface).await?;
        params.insert(".id".into(), handle.to_string());
        self.execute_scoped(
            ResourceKind::Peer.path(),
            DeviceCommand::Set,
            &params,
            Some(interface),
        )
        .await?;
        info!(interface, %handle, "peer updated");
        Ok(handle)
    }

    pub async fn delete_peer(
        &self,
        identifier: &str,
        interface: &str,
    ) -> Result<ResourceHandle, CoreError> {
        self.peer_command(identifier, interface, DeviceCommand::Remove)
            .await
    }

    pub async fn enable_peer(
        &self,
        identifier: &str,
        interface: &str,
    ) -> Result<ResourceHandle, CoreError> {
        self.peer_command(identifier, interface, DeviceCommand::Enable)
            .await
    }

    pub async fn disable_peer(
        &self,
        identifier: &str,
        interface: &str,
    ) -> Result<ResourceHandle, CoreError> {
        self.peer_command(identifier, interface, DeviceCommand::Disable)
            .await
    }

    async fn peer_command(
        &self,
        identifier: &str,
        interface: &str,
        command: DeviceCommand,
    ) -> Result<ResourceHandle, CoreError> {
        let handle = self.resolve_peer(identifier, interface).await?;
        self.execute_scoped(
            ResourceKind::Peer.path(),
            command,
            &handle_params(&handle),
            Some(interface),
        )
        .await?;
        info!(interface, %handle, %command, "peer command applied");
        Ok(handle)
    }

    // ── Route writes ─────────────────────────────────────────────

    pub async fn add_route(&self, route: &NewRoute) -> Result<Option<ResourceHandle>, CoreError> {
        require("route destination", &route.dst_address)?;
        require("route gateway", &route.gateway)?;

        let params = ResourceKind::Route.filter(DeviceCommand::Add, &route.to_params());
        let records = self
            .execute(ResourceKind::Route.path(), DeviceCommand::Add, &params)
            .await?;
        let handle = created_handle(&records);
        info!(dst = %route.dst_address, handle = ?handle, "route added");
        Ok(handle)
    }

    pub async fn delete_route(&self, identifier: &str) -> Result<ResourceHandle, CoreError> {
        let handle = self.resolve_route(identifier).await?;
        self.execute(
            ResourceKind::Route.path(),
            DeviceCommand::Remove,
            &handle_params(&handle),
        )
        .await?;
        info!(%handle, "route removed");
        Ok(handle)
    }

    // ── Interface writes ─────────────────────────────────────────

    pub async fn add_interface(
        &self,
        interface: &NewInterface,
    ) -> Result<Option<ResourceHandle>, CoreError> {
        require("interface name", &interface.name)?;

        let mut params = Params::new();
        params.insert("name".into(), interface.name.clone());
        if let Some(port) = interface.listen_port {
            params.insert("listen-port".into(), port.to_string());
        }
        if let Some(mtu) = interface.mtu {
            params.insert("mtu".into(), mtu.to_string());
        }
        if let Some(key) = &interface.private_key {
            params.insert("private-key".into(), key.clone());
        }
        if let Some(comment) = &interface.comment {
            params.insert("comment".into(), comment.clone());
        }
        let params = ResourceKind::Interface.filter(DeviceCommand::Add, &params);

        let records = self
            .execute(ResourceKind::Interface.path(), DeviceCommand::Add, &params)
            .await?;
        let handle = created_handle(&records);
        info!(name = %interface.name, handle = ?handle, "interface added");
        Ok(handle)
    }

    pub async fn delete_interface(&self, identifier: &str) -> Result<ResourceHandle, CoreError> {
        let handle = self.resolve_interface(identifier).await?;
        self.execute(
            ResourceKind::Interface.path(),
            DeviceCommand::Remove,
            &handle_params(&handle),
        )
        .await?;
        info!(%handle, "interface removed");
        Ok(handle)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Run one blocking session call on the blocking pool under `deadline`.
async fn run_blocking(
    session: SharedSession,
    path: &str,
    command: DeviceCommand,
    params: Params,
    deadline: Duration,
) -> Result<Vec<Record>, ApiError> {
    let path = path.to_owned();
    let task = tokio::task::spawn_blocking(move || {
        let mut guard = session
            .lock()
            .map_err(|_| ApiError::Connection("device session lock poisoned".into()))?;
        guard.execute(&path, command, &params)
    });

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ApiError::Connection(format!("device call aborted: {join}"))),
        Err(_) => Err(ApiError::Timeout {
            timeout_secs: deadline.as_secs(),
        }),
    }
}

fn handle_params(handle: &ResourceHandle) -> Params {
    let mut params = Params::new();
    params.insert(".id".into(), handle.to_string());
    params
}

fn require(what: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationFailed {
            message: format!("{what} is required"),
        });
    }
    Ok(())
}

fn unresolved(kind: ResourceKind, identifier: &str) -> CoreError {
    CoreError::UnresolvedIdentifier {
        kind: kind.to_string(),
        identifier: identifier.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedConnector, record};
    use pretty_assertions::assert_eq;

    const PEERS: &str = "/interface/wireguard/peers";

    fn test_config() -> DeviceConfig {
        DeviceConfig {
            timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(5),
            ..DeviceConfig::default()
        }
    }

    fn supervisor(connector: &ScriptedConnector) -> ConnectionSupervisor {
        ConnectionSupervisor::new(test_config(), connector.shared())
    }

    fn peer_row(id: &str, key: &str, comment: &str) -> Record {
        record(&[
            (".id", id),
            ("interface", "wg0"),
            ("public-key", key),
            ("comment", comment),
            ("last-handshake", "10s"),
        ])
    }

    fn connection_lost(msg: &str) -> ApiError {
        ApiError::Connection(msg.into())
    }

    // ── Retry policy ─────────────────────────────────────────────

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let connector = ScriptedConnector::new();
        connector.queue(PEERS, DeviceCommand::Print, Err(connection_lost("reset")));
        connector.queue(PEERS, DeviceCommand::Print, Err(connection_lost("reset")));
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1", "AAAA", "a")]);
        let sup = supervisor(&connector);

        let rows = sup
            .execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "*1");
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Print), 3);
        assert_eq!(connector.connects(), 3);
        let stats = sup.stats();
        assert_eq!(stats.reconnects, 2);
        assert_eq!(stats.attempts, 3);
    }

    #[tokio::test]
    async fn duplicate_entry_makes_exactly_one_attempt() {
        let connector = ScriptedConnector::new();
        connector.queue(
            PEERS,
            DeviceCommand::Add,
            Err(ApiError::Device {
                message: "failure: entry already exists".into(),
            }),
        );
        let sup = supervisor(&connector);

        let err = sup
            .execute(PEERS, DeviceCommand::Add, &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::DuplicateEntry { .. }), "{err:?}");
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Add), 1);
        assert_eq!(sup.stats().attempts, 1);
    }

    #[tokio::test]
    async fn other_device_errors_are_not_retried() {
        let connector = ScriptedConnector::new();
        connector.queue(
            PEERS,
            DeviceCommand::Set,
            Err(ApiError::Device {
                message: "no such item".into(),
            }),
        );
        let sup = supervisor(&connector);

        let err = sup
            .execute(PEERS, DeviceCommand::Set, &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Rejected { .. }), "{err:?}");
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Set), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_carry_last_message() {
        let connector = ScriptedConnector::new();
        connector.queue(PEERS, DeviceCommand::Print, Err(connection_lost("first")));
        connector.queue(PEERS, DeviceCommand::Print, Err(connection_lost("second")));
        connector.queue(PEERS, DeviceCommand::Print, Err(connection_lost("third")));
        let sup = supervisor(&connector);

        let err = sup
            .execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap_err();

        match err {
            CoreError::TransientConnection { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("third"), "{message}");
            }
            other => panic!("expected TransientConnection, got {other:?}"),
        }
        assert!(sup.stats().retries == 2);
    }

    #[tokio::test]
    async fn repeated_parse_errors_surface_as_protocol_parse() {
        let connector = ScriptedConnector::new();
        for _ in 0..3 {
            connector.queue(
                PEERS,
                DeviceCommand::Print,
                Err(ApiError::MalformedResponse {
                    message: "unexpected !trap".into(),
                }),
            );
        }
        let sup = supervisor(&connector);

        let err = sup
            .execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ProtocolParse { attempts: 3, .. }), "{err:?}");
        assert!(err.is_unavailable());
        // Each parse failure costs the session.
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test]
    async fn never_connecting_is_device_unreachable() {
        let connector = ScriptedConnector::new();
        connector.fail_connects(3, || connection_lost("connection refused"));
        let sup = supervisor(&connector);

        let err = sup
            .execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::DeviceUnreachable { attempts: 3, .. }), "{err:?}");
        assert_eq!(connector.calls().len(), 0);
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn bad_credentials_fail_fast() {
        let connector = ScriptedConnector::new();
        connector.fail_connects(1, || ApiError::Authentication {
            message: "invalid user name or password".into(),
        });
        let sup = supervisor(&connector);

        let err = sup.connect().await.unwrap_err();

        assert!(matches!(err, CoreError::AuthenticationFailed { .. }), "{err:?}");
        assert_eq!(connector.connects(), 1);
        assert_eq!(*sup.connection_state().borrow(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_session_before_the_call() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);
        sup.connect().await.unwrap();
        connector.queue(PROBE_PATH, DeviceCommand::Print, Err(connection_lost("stale")));

        sup.execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap();

        assert_eq!(connector.connects(), 2);
        assert_eq!(sup.stats().reconnects, 1);
        assert_eq!(sup.stats().attempts, 1);
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let connector = ScriptedConnector::new();
        connector.delay(PEERS, Duration::from_millis(300));
        let sup = ConnectionSupervisor::new(
            DeviceConfig {
                timeout: Duration::from_millis(50),
                max_retries: 1,
                ..test_config()
            },
            connector.shared(),
        );

        let err = sup
            .execute(PEERS, DeviceCommand::Print, &Params::new())
            .await
            .unwrap_err();

        match err {
            CoreError::TransientConnection { attempts, message } => {
                assert_eq!(attempts, 1);
                assert!(message.contains("timed out"), "{message}");
            }
            other => panic!("expected TransientConnection, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_overlap_on_the_session() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1", "AAAA", "a")]);
        connector.delay(PEERS, Duration::from_millis(5));
        let sup = supervisor(&connector);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let sup = sup.clone();
                tokio::spawn(async move { sup.list_peers("wg0", CachePolicy::Bypass).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().len(), 1);
        }

        assert_eq!(connector.overlaps(), 0);
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Print), 8);
        assert_eq!(connector.connects(), 1);
    }

    // ── Cache ────────────────────────────────────────────────────

    #[tokio::test]
    async fn add_peer_invalidates_cached_list() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1", "AAAA", "a")]);
        connector.respond(PEERS, DeviceCommand::Add, vec![record(&[("ret", "*3")])]);
        let sup = supervisor(&connector);

        assert_eq!(sup.list_peers("wg0", CachePolicy::Prefer).await.unwrap().len(), 1);

        // The device changes behind our back; the cached list is served.
        connector.respond(
            PEERS,
            DeviceCommand::Print,
            vec![peer_row("*1", "AAAA", "a"), peer_row("*2", "BBBB", "b")],
        );
        assert_eq!(sup.list_peers("wg0", CachePolicy::Prefer).await.unwrap().len(), 1);
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Print), 1);

        let handle = sup
            .add_peer(&NewPeer {
                interface: "wg0".into(),
                public_key: "CCCC".into(),
                allowed_address: vec!["10.0.0.4/32".into()],
                ..NewPeer::default()
            })
            .await
            .unwrap();
        assert_eq!(handle, Some(ResourceHandle::new("*3")));

        connector.respond(
            PEERS,
            DeviceCommand::Print,
            vec![
                peer_row("*1", "AAAA", "a"),
                peer_row("*2", "BBBB", "b"),
                peer_row("*3", "CCCC", "c"),
            ],
        );
        let prints_before = connector.call_count(PEERS, DeviceCommand::Print);
        let peers = sup.list_peers("wg0", CachePolicy::Prefer).await.unwrap();
        assert_eq!(peers.len(), 3);
        assert_eq!(
            connector.call_count(PEERS, DeviceCommand::Print),
            prints_before + 1
        );
    }

    #[tokio::test]
    async fn list_fetched_across_a_write_is_not_cached() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);
        let key = peers_key("wg0");

        let fetched = sup
            .read_through(
                &key,
                CachePolicy::Prefer,
                CachedValue::Peers,
                CachedValue::into_peers,
                async {
                    // A peer write completes while this list is in flight.
                    sup.invalidate_after_write(ResourceKind::Peer.path(), Some("wg0"));
                    Ok(vec![])
                },
            )
            .await
            .unwrap();
        assert!(fetched.is_empty());
        assert!(sup.inner.cache.get(&key).is_none());

        sup.list_peers("wg0", CachePolicy::Prefer).await.unwrap();
        sup.list_peers("wg0", CachePolicy::Prefer).await.unwrap();
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Print), 1);
    }

    #[tokio::test]
    async fn bypass_always_reaches_the_device() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);
        sup.list_interfaces(CachePolicy::Bypass).await.unwrap();
        sup.list_interfaces(CachePolicy::Bypass).await.unwrap();
        sup.list_interfaces(CachePolicy::Prefer).await.unwrap();
        assert_eq!(
            connector.call_count(ResourceKind::Interface.path(), DeviceCommand::Print),
            2
        );
        assert_eq!(sup.stats().cache_hits, 1);
    }

    // ── Typed writes ─────────────────────────────────────────────

    #[tokio::test]
    async fn add_peer_with_known_key_is_rejected_locally() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1", "AAAA", "a")]);
        let sup = supervisor(&connector);

        let err = sup
            .add_peer(&NewPeer {
                interface: "wg0".into(),
                public_key: "AAAA".into(),
                ..NewPeer::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::DuplicateEntry { .. }), "{err:?}");
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Add), 0);
    }

    #[tokio::test]
    async fn add_peer_stores_name_as_comment() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);

        sup.add_peer(&NewPeer {
            interface: "wg0".into(),
            public_key: "DDDD".into(),
            name: Some("laptop".into()),
            ..NewPeer::default()
        })
        .await
        .unwrap();

        let add = connector
            .calls()
            .into_iter()
            .find(|c| c.command == DeviceCommand::Add)
            .unwrap();
        assert_eq!(add.params["comment"], "laptop");
        assert!(!add.params.contains_key("name"));
    }

    #[tokio::test]
    async fn add_peer_requires_a_key() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);
        let err = sup
            .add_peer(&NewPeer {
                interface: "wg0".into(),
                ..NewPeer::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn update_peer_resolves_loose_identifier_and_filters_fields() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1A", "KeyOne=", "laptop")]);
        let sup = supervisor(&connector);

        let mut fields = Params::new();
        fields.insert("comment".into(), "work laptop".into());
        fields.insert("interface".into(), "wg9".into());
        let handle = sup.update_peer("LAPTOP", "wg0", &fields).await.unwrap();

        assert_eq!(handle, ResourceHandle::new("*1A"));
        let set = connector
            .calls()
            .into_iter()
            .find(|c| c.command == DeviceCommand::Set)
            .unwrap();
        assert_eq!(set.params.len(), 2);
        assert_eq!(set.params["comment"], "work laptop");
        assert_eq!(set.params[".id"], "*1A");
    }

    #[tokio::test]
    async fn unknown_peer_is_unresolved_and_nothing_is_sent() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*1", "AAAA", "a")]);
        let sup = supervisor(&connector);

        let err = sup.delete_peer("ZZZZ", "wg0").await.unwrap_err();

        assert!(matches!(err, CoreError::UnresolvedIdentifier { .. }), "{err:?}");
        assert!(err.is_client_error());
        assert_eq!(connector.call_count(PEERS, DeviceCommand::Remove), 0);
    }

    #[tokio::test]
    async fn disable_peer_sends_handle_only() {
        let connector = ScriptedConnector::new();
        connector.respond(PEERS, DeviceCommand::Print, vec![peer_row("*4", "EEEE", "tablet")]);
        let sup = supervisor(&connector);

        sup.disable_peer("4", "wg0").await.unwrap();

        let disable = connector
            .calls()
            .into_iter()
            .find(|c| c.command == DeviceCommand::Disable)
            .unwrap();
        assert_eq!(disable.params.len(), 1);
        assert_eq!(disable.params[".id"], "*4");
    }

    #[tokio::test]
    async fn route_round_trip_through_resolution() {
        let connector = ScriptedConnector::new();
        let routes = ResourceKind::Route.path();
        connector.respond(routes, DeviceCommand::Add, vec![record(&[("ret", "*9")])]);
        connector.respond(
            routes,
            DeviceCommand::Print,
            vec![record(&[
                (".id", "*9"),
                ("dst-address", "10.20.0.0/24"),
                ("gateway", "wg0"),
            ])],
        );
        let sup = supervisor(&connector);

        let added = sup
            .add_route(&NewRoute {
                dst_address: "10.20.0.0/24".into(),
                gateway: "wg0".into(),
                ..NewRoute::default()
            })
            .await
            .unwrap();
        assert_eq!(added, Some(ResourceHandle::new("*9")));

        let removed = sup.delete_route("10.20.0.0/24").await.unwrap();
        assert_eq!(removed, ResourceHandle::new("*9"));
        assert_eq!(connector.call_count(routes, DeviceCommand::Remove), 1);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    #[tokio::test]
    async fn state_follows_connect_and_close() {
        let connector = ScriptedConnector::new();
        let sup = supervisor(&connector);
        let state = sup.connection_state();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);

        sup.connect().await.unwrap();
        assert_eq!(*state.borrow(), ConnectionState::Connected);

        // Connecting twice reuses the session.
        sup.connect().await.unwrap();
        assert_eq!(connector.connects(), 1);

        sup.close().await;
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        assert_eq!(connector.closes(), 1);
    }
}
