// ── Client abstraction ──
//
// Full lifecycle management for one Home Assistant connection.
// A single supervisor task owns the transport: connect, authenticate,
// seed the mirror, subscribe, then wait for the socket to drop and start
// over after a fixed delay. Everything else reads snapshots.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use hasslink_api::models::{AreaEntry, DeviceEntry, EntityRegistryEntry as RegistryRow, State};
use hasslink_api::websocket::{self, Connection, EventSink};
use hasslink_api::{Command, EventFrame, HassEvent, ResultFrame};

use crate::catalog::{self, Catalog, CatalogWriter};
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::listeners::{Listeners, Subscription};
use crate::model::{Area, Device, EntityId, EntityMap, EntityState};
use crate::store::{DataStore, SeedSnapshot, Snapshot};
use crate::stream::EntityStream;

// ── ConnectionStatus ─────────────────────────────────────────────

/// Connection status observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

// ── HassClient ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Owns the state mirror, the
/// catalog, and the reconnection supervisor. Several clients can run
/// side by side; nothing is global.
///
/// Dropping the last clone cancels the supervisor and closes the session,
/// like [`shutdown`](Self::shutdown) without waiting for it.
#[derive(Clone)]
pub struct HassClient {
    inner: Arc<ClientInner>,
    /// Held by user-facing handles only. The supervisor's copy has none.
    _owner: Option<Arc<DropGuard>>,
}

struct ClientInner {
    config: ClientConfig,
    store: Arc<DataStore>,
    status: watch::Sender<ConnectionStatus>,
    /// Most recent failed attempt, cleared on `Ready`.
    last_error: watch::Sender<Option<Arc<CoreError>>>,
    /// Live session, present only while `Ready`.
    session: ArcSwapOption<Connection>,
    catalog: ArcSwapOption<Catalog>,
    catalog_writer: Option<CatalogWriter>,
    entity_listeners: Listeners<Arc<EntityMap>>,
    status_listeners: Listeners<ConnectionStatus>,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl HassClient {
    /// Create a new client from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to start the supervisor.
    pub fn new(config: ClientConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (last_error, _) = watch::channel(None);
        let catalog_writer = config.catalog_path.clone().map(CatalogWriter::new);
        let cancel = CancellationToken::new();
        let owner = Some(Arc::new(cancel.clone().drop_guard()));

        Self {
            _owner: owner,
            inner: Arc::new(ClientInner {
                config,
                store: Arc::new(DataStore::new()),
                status,
                last_error,
                session: ArcSwapOption::empty(),
                catalog: ArcSwapOption::empty(),
                catalog_writer,
                entity_listeners: Listeners::new("entities"),
                status_listeners: Listeners::new("status"),
                cancel,
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Access the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Access the underlying DataStore.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start the reconnection supervisor.
    ///
    /// Returns once the supervisor is running; the first attempt happens
    /// in the background. Use [`wait_until_ready`](Self::wait_until_ready)
    /// to await the first `Ready`. Calling `connect` again is a no-op.
    pub async fn connect(&self) -> Result<(), CoreError> {
        websocket::websocket_url(&self.inner.config.url)?;
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Internal("client has been shut down".into()));
        }

        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.is_none() {
            *supervisor = Some(tokio::spawn(supervise(self.detached())));
            debug!("supervisor started");
        }
        Ok(())
    }

    /// Stop for good: abandon any pending backoff, close the socket with
    /// a close frame, reject pending commands. No reconnect follows.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(conn) = self.inner.session.swap(None) {
            conn.close();
        }

        let handle = self.inner.supervisor.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.set_status(ConnectionStatus::Disconnected);
        debug!("client shut down");
    }

    /// Wait until the client reaches `Ready`.
    ///
    /// Fails early with [`CoreError::AuthenticationFailed`] when the token
    /// is rejected. On timeout, reports the last attempt's failure if
    /// there was one.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut status = self.inner.status.subscribe();
        let mut errors = self.inner.last_error.subscribe();

        let wait = async {
            loop {
                if *status.borrow_and_update() == ConnectionStatus::Ready {
                    return Ok(());
                }
                if let Some(CoreError::AuthenticationFailed { message }) =
                    errors.borrow_and_update().as_deref()
                {
                    return Err(CoreError::AuthenticationFailed {
                        message: message.clone(),
                    });
                }
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            return Err(CoreError::NotConnected);
                        }
                    }
                    changed = errors.changed() => {
                        if changed.is_err() {
                            return Err(CoreError::NotConnected);
                        }
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(match self.inner.last_error.borrow().as_deref() {
                Some(last) => CoreError::ConnectionFailed {
                    url: self.inner.config.url.to_string(),
                    reason: last.to_string(),
                },
                None => CoreError::Timeout {
                    operation: "connect".into(),
                    timeout_secs: timeout.as_secs(),
                },
            }),
        }
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, wait for `Ready`, run closure, shut down.
    ///
    /// Optimized for CLI: the catalog file is only written when the
    /// caller asks for it, and the first failed attempt within the
    /// handshake + command budget is reported instead of retried forever.
    pub async fn oneshot<F, Fut, T>(config: ClientConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(HassClient) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let budget = config.handshake_timeout + config.command_timeout;
        let client = HassClient::new(config);
        client.connect().await?;

        let result = match client.wait_until_ready(budget).await {
            Ok(()) => f(client.clone()).await,
            Err(e) => Err(e),
        };
        client.shutdown().await;
        result
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Call a Home Assistant service, e.g. `light.turn_on`.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        self.send_command(Command::CallService {
            domain: domain.to_owned(),
            service: service.to_owned(),
            service_data: data,
        })
        .await
    }

    /// Send any command and return its result payload.
    pub async fn send_command(&self, command: Command) -> Result<serde_json::Value, CoreError> {
        let conn = self.session()?;
        Ok(conn.request(&command).await?)
    }

    /// Round-trip latency of a `ping`.
    pub async fn ping(&self) -> Result<Duration, CoreError> {
        let conn = self.session()?;
        let started = Instant::now();
        conn.request(&Command::Ping).await?;
        Ok(started.elapsed())
    }

    /// The live connection, or `NotConnected` unless `Ready`.
    fn session(&self) -> Result<Arc<Connection>, CoreError> {
        if *self.inner.status.borrow() != ConnectionStatus::Ready {
            return Err(CoreError::NotConnected);
        }
        self.inner.session.load_full().ok_or(CoreError::NotConnected)
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection status changes.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current_status() == ConnectionStatus::Ready
    }

    /// Server version reported during the handshake of the live session.
    pub fn ha_version(&self) -> Option<String> {
        self.inner
            .session
            .load_full()
            .and_then(|conn| conn.ha_version().map(str::to_owned))
    }

    /// Register a callback run with the full mirror after every seed and
    /// every applied state change.
    pub fn on_entities_changed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Arc<EntityMap>) + Send + Sync + 'static,
    {
        self.inner.entity_listeners.add(f)
    }

    /// Register a callback run on every status transition.
    pub fn on_status_changed<F>(&self, f: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.status_listeners.add(f)
    }

    // ── Snapshot accessors (delegate to DataStore) ───────────────

    pub fn entities_snapshot(&self) -> Arc<EntityMap> {
        self.inner.store.entities_snapshot()
    }

    pub fn entity(&self, id: &str) -> Option<Arc<EntityState>> {
        self.inner.store.entity(id)
    }

    pub fn devices_snapshot(&self) -> Snapshot<String, Device> {
        self.inner.store.devices_snapshot()
    }

    pub fn areas_snapshot(&self) -> Snapshot<String, Area> {
        self.inner.store.areas_snapshot()
    }

    pub fn entities(&self) -> EntityStream<EntityId, EntityState> {
        self.inner.store.subscribe_entities()
    }

    /// Catalog built after the most recent seed.
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.inner.catalog.load_full()
    }

    /// Rebuild the catalog from the current mirror, store it, and write
    /// it out if a catalog path is configured.
    ///
    /// The file write blocks the calling thread.
    pub fn rebuild_catalog(&self) -> Arc<Catalog> {
        let catalog = self.store_catalog();
        if let Some(writer) = &self.inner.catalog_writer {
            log_write_result(writer, writer.write(&catalog));
        }
        catalog
    }

    // ── Internals ────────────────────────────────────────────────

    /// Handle for background tasks; it does not keep the client alive.
    fn detached(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _owner: None,
        }
    }

    fn store_catalog(&self) -> Arc<Catalog> {
        let catalog = Arc::new(catalog::from_store(
            &self.inner.store,
            &self.inner.config.domains,
        ));
        self.inner.catalog.store(Some(Arc::clone(&catalog)));
        catalog
    }

    /// Like [`rebuild_catalog`](Self::rebuild_catalog), with the file
    /// write moved off the runtime threads.
    async fn publish_catalog(&self) -> Arc<Catalog> {
        let catalog = self.store_catalog();
        if let Some(writer) = self.inner.catalog_writer.clone() {
            let snapshot = Arc::clone(&catalog);
            let task = tokio::task::spawn_blocking(move || {
                log_write_result(&writer, writer.write(&snapshot));
            });
            if let Err(e) = task.await {
                warn!(error = %e, "catalog write task failed");
            }
        }
        catalog
    }

    fn set_status(&self, next: ConnectionStatus) {
        let changed = self.inner.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(status = %next, "status changed");
            self.inner.status_listeners.notify(&next);
        }
    }

    /// One full attempt: open, authenticate, seed, subscribe, then hold
    /// the session until the socket closes.
    async fn run_session(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;

        self.set_status(ConnectionStatus::Connecting);
        let mut ws = websocket::open(&config.url).await?;

        self.set_status(ConnectionStatus::Authenticating);
        let ha_version =
            websocket::authenticate(&mut ws, &config.token, config.handshake_timeout).await?;

        let sink = Arc::new(MirrorSink {
            inner: Arc::downgrade(&self.inner),
        });
        let conn = Arc::new(Connection::spawn(ws, ha_version, config.command_timeout, sink));

        self.seed(&conn).await?;
        let catalog = self.publish_catalog().await;
        conn.request(&Command::subscribe_state_changes()).await?;
        if conn.is_closed() {
            return Err(CoreError::ConnectionLost);
        }

        self.inner.session.store(Some(Arc::clone(&conn)));
        self.inner.last_error.send_replace(None);
        self.set_status(ConnectionStatus::Ready);
        info!(
            ha_version = conn.ha_version().unwrap_or("unknown"),
            entities = self.inner.store.entity_count(),
            catalogued = catalog.entity_count(),
            "connected to Home Assistant"
        );

        conn.closed().await;
        self.inner.session.store(None);
        info!("connection to Home Assistant closed");
        Ok(())
    }

    /// Fetch states and all three registries concurrently, then replace
    /// the mirror in one step.
    async fn seed(&self, conn: &Connection) -> Result<(), CoreError> {
        let (states, devices, areas, registry) = tokio::join!(
            conn.send(&Command::GetStates),
            conn.send(&Command::DeviceRegistryList),
            conn.send(&Command::AreaRegistryList),
            conn.send(&Command::EntityRegistryList),
        );

        let states: Vec<State> = states?.parse()?;
        let devices: Vec<DeviceEntry> = devices?.parse()?;
        let areas: Vec<AreaEntry> = areas?.parse()?;
        let registry: Vec<RegistryRow> =
            match registry.and_then(ResultFrame::parse::<Vec<RegistryRow>>) {
                Ok(rows) => rows,
                Err(e) if self.registry_is_optional(&e) => {
                    warn!(error = %e, "entity registry unavailable; continuing without it");
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };

        self.inner.store.apply_seed(SeedSnapshot {
            entities: states.into_iter().map(EntityState::from).collect(),
            devices: devices.into_iter().map(Device::from).collect(),
            areas: areas.into_iter().map(Area::from).collect(),
            registry: registry.into_iter().map(Into::into).collect(),
        });

        debug!(
            entities = self.inner.store.entity_count(),
            devices = self.inner.store.device_count(),
            areas = self.inner.store.area_count(),
            "seed complete"
        );
        self.inner
            .entity_listeners
            .notify(&self.inner.store.entities_snapshot());
        Ok(())
    }

    fn registry_is_optional(&self, err: &hasslink_api::Error) -> bool {
        !self.inner.config.require_entity_registry
            && (err.is_server_error() || matches!(err, hasslink_api::Error::Timeout { .. }))
    }
}

fn log_write_result(writer: &CatalogWriter, result: std::io::Result<bool>) {
    if let Err(e) = result {
        warn!(error = %e, path = %writer.path().display(), "failed to write catalog");
    }
}

// ── Supervisor ───────────────────────────────────────────────────

/// Reconnection loop: attempt → wait → attempt, forever, until cancelled.
///
/// There is exactly one `sleep` in the loop and it is awaited inline,
/// so at most one backoff timer exists at any time.
async fn supervise(client: HassClient) {
    let cancel = client.inner.cancel.clone();
    let delay = client.inner.config.reconnect_delay;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = client.run_session() => result,
        };

        match result {
            Ok(()) => attempt = 0,
            Err(e) => {
                warn!(error = %e, attempt, "connection attempt failed");
                client.inner.last_error.send_replace(Some(Arc::new(e)));
            }
        }
        client.inner.session.store(None);
        client.set_status(ConnectionStatus::Disconnected);

        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    client.inner.session.store(None);
    client.set_status(ConnectionStatus::Disconnected);
    debug!("supervisor exiting");
}

// ── Event sink ───────────────────────────────────────────────────

/// Applies `state_changed` events to the mirror on the reader task.
struct MirrorSink {
    inner: Weak<ClientInner>,
}

impl EventSink for MirrorSink {
    fn on_event(&self, frame: EventFrame) {
        let HassEvent::StateChanged { data } = frame.event else {
            trace!(subscription = frame.id, "ignoring non-state event");
            return;
        };
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let Some(new_state) = data.new_state else {
            debug!(entity_id = %data.entity_id, "entity removed upstream; keeping last state");
            return;
        };

        let state = EntityState::from(new_state);
        trace!(entity_id = %state.entity_id, state = %state.state, "state changed");
        inner.store.apply_state(state);
        inner.entity_listeners.notify(&inner.store.entities_snapshot());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    fn client() -> HassClient {
        HassClient::new(ClientConfig::new(
            url::Url::parse("http://127.0.0.1:1").unwrap(),
            SecretString::from("t"),
        ))
    }

    #[tokio::test]
    async fn commands_fail_fast_when_not_ready() {
        let client = client();
        let err = client
            .call_service("light", "turn_on", Some(json!({ "entity_id": "light.kitchen" })))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotConnected));
        assert!(matches!(client.ping().await, Err(CoreError::NotConnected)));
    }

    #[test]
    fn status_listeners_fire_on_transitions_only() {
        let client = client();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = client.on_status_changed(move |status| s.lock().unwrap().push(*status));

        client.set_status(ConnectionStatus::Connecting);
        client.set_status(ConnectionStatus::Connecting);
        client.set_status(ConnectionStatus::Disconnected);

        assert_eq!(
            *seen.lock().unwrap(),
            [ConnectionStatus::Connecting, ConnectionStatus::Disconnected]
        );
    }

    #[test]
    fn removed_entity_event_keeps_snapshot() {
        let client = client();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let _sub = client.on_entities_changed(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let sink = MirrorSink {
            inner: Arc::downgrade(&client.inner),
        };
        let frame = |new_state: serde_json::Value| -> EventFrame {
            serde_json::from_value(json!({
                "id": 1,
                "event": {
                    "event_type": "state_changed",
                    "data": { "entity_id": "light.kitchen", "new_state": new_state }
                }
            }))
            .unwrap()
        };

        sink.on_event(frame(json!({ "entity_id": "light.kitchen", "state": "on" })));
        sink.on_event(frame(serde_json::Value::Null));

        assert_eq!(client.entity("light.kitchen").unwrap().state, "on");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_rejects_unsupported_scheme() {
        let client = HassClient::new(ClientConfig::new(
            url::Url::parse("ftp://ha.local").unwrap(),
            SecretString::from("t"),
        ));
        assert!(matches!(client.connect().await, Err(CoreError::Config { .. })));
    }

    #[tokio::test]
    async fn dropping_last_handle_stops_supervisor() {
        let mut config = ClientConfig::new(
            url::Url::parse("http://127.0.0.1:1").unwrap(),
            SecretString::from("t"),
        );
        config.reconnect_delay = Duration::from_millis(10);
        let client = HassClient::new(config);
        client.connect().await.unwrap();

        let inner = Arc::downgrade(&client.inner);
        let other = client.clone();
        drop(client);
        assert!(!other.inner.cancel.is_cancelled());
        drop(other);

        let deadline = Instant::now() + Duration::from_secs(5);
        while inner.upgrade().is_some() {
            assert!(Instant::now() < deadline, "supervisor kept the client alive");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn shutdown_before_connect_is_clean() {
        let client = client();
        client.shutdown().await;
        assert_eq!(client.current_status(), ConnectionStatus::Disconnected);
        assert!(client.connect().await.is_err());
    }
}
