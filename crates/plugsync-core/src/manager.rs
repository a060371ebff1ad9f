// ── Lifecycle manager ──
//
// Owns the account connection, the device registry and every background
// task that keeps it current: periodic discovery, periodic refresh, the
// push event bridge and the command processor.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use plugsync_api::{AccountClient, PushEvent};
use tokio::sync::{Mutex, Notify, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandEnvelope, CommandResult, command_processor_task};
use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::health::{HealthSnapshot, HealthTracker};
use crate::model::{DeviceRecord, EntityChange};
use crate::store::DeviceRegistry;
use crate::stream::DeviceStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const CHANGE_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Credentials were rejected. Background work has stopped.
    Failed,
}

// ── Manager ──────────────────────────────────────────────────────

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. The cycle operations
/// ([`discover`](Self::discover), [`refresh`](Self::refresh),
/// [`set_channel`](Self::set_channel),
/// [`apply_push_event`](Self::apply_push_event)) can be driven directly or
/// left to the background tasks spawned by [`start`](Self::start).
#[derive(Clone)]
pub struct Manager {
    pub(crate) inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) config: ManagerConfig,
    pub(crate) account: Arc<dyn AccountClient>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) changes_tx: broadcast::Sender<EntityChange>,
    pub(crate) connection_state: watch::Sender<ConnectionState>,
    pub(crate) health: HealthTracker,
    /// Serialises discovery passes among themselves.
    pub(crate) discovery_gate: Mutex<()>,
    /// Serialises refresh passes among themselves.
    pub(crate) refresh_gate: Mutex<()>,
    rebuild_gate: Mutex<()>,
    reconnect_attempts: AtomicU32,
    pub(crate) discovery_trigger: Notify,
    pub(crate) refresh_trigger: Notify,
    command_tx: Mutex<mpsc::Sender<CommandEnvelope>>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    /// Child token for the current run; cancelled on stop or auth failure,
    /// replaced on the next start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    /// Create a manager. Does NOT connect; call [`start()`](Self::start).
    pub fn new(config: ManagerConfig, account: Arc<dyn AccountClient>) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ManagerInner {
                config,
                account,
                registry: Arc::new(DeviceRegistry::new()),
                changes_tx,
                connection_state,
                health: HealthTracker::new(),
                discovery_gate: Mutex::new(()),
                refresh_gate: Mutex::new(()),
                rebuild_gate: Mutex::new(()),
                reconnect_attempts: AtomicU32::new(0),
                discovery_trigger: Notify::new(),
                refresh_trigger: Notify::new(),
                command_tx: Mutex::new(command_tx),
                command_rx: Mutex::new(Some(command_rx)),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Connect, run the initial discovery and refresh, then spawn the
    /// background tasks.
    ///
    /// Only configuration and authentication errors are returned. A failed
    /// initial discovery is logged and retried by the discovery task.
    /// Calling this on a running manager does nothing.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.start_with(true).await
    }

    async fn start_with(&self, periodic: bool) -> Result<(), CoreError> {
        self.inner.config.validate()?;

        // Claim the start atomically; a running manager keeps its tasks.
        let mut running = false;
        self.inner.connection_state.send_if_modified(|state| {
            if matches!(
                state,
                ConnectionState::Connecting
                    | ConnectionState::Connected
                    | ConnectionState::Reconnecting { .. }
            ) {
                running = true;
                return false;
            }
            *state = ConnectionState::Connecting;
            true
        });
        if running {
            warn!("manager already running; start ignored");
            return Ok(());
        }

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        if let Err(e) = self.connect_account().await {
            if e.is_auth_failure() {
                self.halt(&e).await;
            } else {
                self.set_state(ConnectionState::Disconnected);
            }
            return Err(e);
        }
        info!(username = %self.inner.config.credentials.username, "connected to cloud account");

        match self.discover().await {
            Ok(report) => debug!(total = report.total, "initial discovery complete"),
            Err(e) if e.is_auth_failure() => return Err(e),
            Err(e) => warn!(error = %e, "initial discovery failed; will retry"),
        }
        self.refresh().await;

        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.command_rx.lock().await.take() {
            handles.push(tokio::spawn(command_processor_task(
                self.clone(),
                rx,
                child.clone(),
            )));
        }

        if periodic {
            let period = self.inner.config.discovery_interval;
            handles.push(tokio::spawn(discovery_task(self.clone(), period, child.clone())));

            let period = self.inner.config.status_refresh_interval;
            handles.push(tokio::spawn(refresh_task(self.clone(), period, child.clone())));
        }

        if periodic && self.inner.config.push_events {
            match self.inner.account.push_events() {
                Some(rx) => {
                    handles.push(tokio::spawn(push_bridge_task(self.clone(), rx, child.clone())));
                    debug!("push event bridge spawned");
                }
                None => debug!("account offers no push events; polling only"),
            }
        }
        drop(handles);

        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Cancel background tasks, wait for them, and drop the account session.
    pub async fn stop(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        self.inner.account.disconnect().await;

        // The processor task consumed the receiver; a later start needs a fresh one.
        {
            let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
            *self.inner.command_tx.lock().await = tx;
            *self.inner.command_rx.lock().await = Some(rx);
        }

        if *self.inner.connection_state.borrow() != ConnectionState::Failed {
            self.set_state(ConnectionState::Disconnected);
        }
        debug!("manager stopped");
    }

    /// One-shot: start without periodic tasks, run the closure, stop.
    pub async fn oneshot<F, Fut, T>(
        config: ManagerConfig,
        account: Arc<dyn AccountClient>,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Manager) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let manager = Manager::new(config, account);
        manager.start_with(false).await?;
        let result = f(manager.clone()).await;
        manager.stop().await;
        result
    }

    // ── Command execution ────────────────────────────────────────

    /// Send a command to the processor task and await its result.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if !matches!(
            *self.inner.connection_state.borrow(),
            ConnectionState::Connected | ConnectionState::Reconnecting { .. }
        ) {
            return Err(CoreError::ManagerStopped);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let command_tx = self.inner.command_tx.lock().await.clone();

        command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::ManagerStopped)?;

        rx.await.map_err(|_| CoreError::ManagerStopped)?
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to device discovered/removed notifications.
    pub fn entity_changes(&self) -> broadcast::Receiver<EntityChange> {
        self.inner.changes_tx.subscribe()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.inner.health.snapshot()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<HealthSnapshot> {
        self.inner.health.subscribe()
    }

    pub fn devices(&self) -> DeviceStream {
        self.inner.registry.subscribe()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceRecord>>> {
        self.inner.registry.snapshot()
    }

    pub fn device(&self, id: &str) -> Option<Arc<DeviceRecord>> {
        self.inner.registry.get(id)
    }

    /// Record that the host created `entity_id` for a device, so it is
    /// reported again when the device is removed.
    pub fn register_entity(&self, device_id: &str, entity_id: &str) -> bool {
        self.inner.registry.register_entity(device_id, entity_id)
    }

    // ── Crate-internal helpers ───────────────────────────────────

    /// Run one remote call under the configured call timeout.
    pub(crate) async fn remote_call<T, F>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, plugsync_api::Error>>,
    {
        let budget = self.inner.config.call_timeout;
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(plugsync_api::Error::timeout(budget).into()),
        }
    }

    pub(crate) fn notify(&self, change: EntityChange) {
        debug!(device = %change.device_id(), ?change, "entity change");
        // No subscribers is fine.
        let _ = self.inner.changes_tx.send(change);
    }

    pub(crate) fn trigger_discovery(&self) {
        self.inner.discovery_trigger.notify_one();
    }

    pub(crate) fn trigger_refresh(&self) {
        self.inner.refresh_trigger.notify_one();
    }

    /// React to a stalled cycle. At the threshold, rebuild the account
    /// session.
    pub(crate) async fn on_stalled_cycle(&self, stalled: u32) {
        if stalled >= self.inner.config.max_stalled_cycles {
            self.rebuild_session().await;
        }
    }

    /// Halt after rejected credentials: no automatic retry.
    pub(crate) async fn halt(&self, err: &CoreError) {
        error!(error = %err, "credentials rejected; background work stopped");
        self.set_state(ConnectionState::Failed);
        self.inner.cancel_child.lock().await.cancel();
    }

    // ── Private helpers ──────────────────────────────────────────

    fn set_state(&self, state: ConnectionState) {
        // `send_replace` updates even with zero receivers.
        self.inner.connection_state.send_replace(state);
    }

    async fn connect_account(&self) -> Result<(), CoreError> {
        let creds = &self.inner.config.credentials;
        self.remote_call(self.inner.account.connect(&creds.username, &creds.password))
            .await
    }

    /// Tear down and recreate the account session, then let discovery
    /// replace every invalidated device proxy.
    async fn rebuild_session(&self) {
        let _gate = self.inner.rebuild_gate.lock().await;
        let stalled = self.inner.health.stalled();
        if stalled < self.inner.config.max_stalled_cycles {
            // Another caller already rebuilt.
            return;
        }

        let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Reconnecting { attempt });
        warn!(stalled, attempt, "too many stalled cycles; rebuilding account session");

        self.inner.account.disconnect().await;
        match self.connect_account().await {
            Ok(()) => {
                self.inner.health.session_rebuilt();
                self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                self.set_state(ConnectionState::Connected);
                self.trigger_discovery();
                info!("account session rebuilt");
            }
            Err(e) if e.is_auth_failure() => self.halt(&e).await,
            Err(e) => {
                // Counter stays at the threshold, so the next stalled cycle retries.
                warn!(error = %e, attempt, "session rebuild failed");
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

fn cycle_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Periodic discovery, plus out-of-band passes on demand.
async fn discovery_task(manager: Manager, period: Duration, cancel: CancellationToken) {
    let mut interval = cycle_interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => debug!("discovery tick"),
            () = manager.inner.discovery_trigger.notified() => debug!("out-of-band discovery"),
        }
        // Failures are logged and counted inside the pass.
        let _ = manager.discover().await;
    }
}

/// Periodic refresh, plus immediate passes on demand.
async fn refresh_task(manager: Manager, period: Duration, cancel: CancellationToken) {
    let mut interval = cycle_interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
            () = manager.inner.refresh_trigger.notified() => debug!("out-of-band refresh"),
        }
        manager.refresh().await;
    }
}

/// Apply push events to the registry as they arrive.
async fn push_bridge_task(
    manager: Manager,
    mut rx: broadcast::Receiver<Arc<PushEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        manager.apply_push_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "push bridge: receiver lagged; scheduling refresh");
                        manager.trigger_refresh();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("push event source closed");
                        break;
                    }
                }
            }
        }
    }
}
