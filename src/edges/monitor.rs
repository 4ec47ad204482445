//! Edge Monitor
//!
//! Owns the outbound and inbound edge registries and runs the heartbeat loop.
//!
//! ## Per-edge state machine (evaluated once per tick)
//! - **Connected**: send a heartbeat. Send failures are not acted on; a handle
//!   that reports closure is moved back to Disconnected on the next tick.
//! - **Disconnected**: dial `host:port` with a 10s connect timeout. Success
//!   stores the handle; failure is logged and retried on the next tick.
//!
//! A tick only performs non-blocking heartbeat sends. Dials run in their own
//! tasks, so a peer that takes the full connect timeout never delays heartbeats
//! to other peers. An edge whose dial is still in flight is skipped; the
//! edge's dial guard makes a duplicate connection impossible.
//!
//! Background work is spawned on the runtime captured at construction, so
//! `update_state` and `add_edge` may be called from threads outside Tokio.

use super::error::EdgeError;
use super::list::EdgeList;
use super::listener::EdgeListener;
use super::types::{EdgeInfo, LinkSend};
use crate::config::{MIN_HEARTBEAT_DT_MS, ServerState};
use crate::protocol::{NodeId, WorkMessage};
use crate::transport::{ChannelSender, DialOptions, Transport};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyActive,
    /// The edge was removed before or while dialing.
    Retired,
}

pub struct EdgeMonitor {
    outbound: EdgeList,
    inbound: EdgeList,
    state: RwLock<ServerState>,
    /// Only ever raised, never lowered.
    heartbeat_dt_ms: AtomicU64,
    running: AtomicBool,
    wake: Notify,
    transport: Arc<dyn Transport>,
    dial_options: DialOptions,
    runtime: Handle,
    listeners: RwLock<Vec<Arc<dyn EdgeListener>>>,
}

impl EdgeMonitor {
    /// Creates a monitor seeded with the configured peers, bound to the
    /// current Tokio runtime.
    pub fn new(state: ServerState, transport: Arc<dyn Transport>) -> Result<Arc<Self>, EdgeError> {
        Self::with_dial_options(state, transport, DialOptions::default())
    }

    pub fn with_dial_options(
        state: ServerState,
        transport: Arc<dyn Transport>,
        dial_options: DialOptions,
    ) -> Result<Arc<Self>, EdgeError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(state, transport, dial_options, runtime))
    }

    /// Creates a monitor whose background work runs on `runtime`.
    pub fn with_runtime(
        state: ServerState,
        transport: Arc<dyn Transport>,
        dial_options: DialOptions,
        runtime: Handle,
    ) -> Arc<Self> {
        let outbound = EdgeList::new();
        for entry in &state.conf.routing {
            outbound.add_node(entry.id, &entry.host, entry.port);
        }

        let heartbeat_dt_ms = state.conf.heartbeat_dt.max(MIN_HEARTBEAT_DT_MS);

        tracing::info!(
            "Edge monitor for node {} seeded with {} outbound edge(s), heartbeat every {}ms",
            state.node_id(),
            outbound.len(),
            heartbeat_dt_ms
        );

        Arc::new(Self {
            outbound,
            inbound: EdgeList::new(),
            state: RwLock::new(state),
            heartbeat_dt_ms: AtomicU64::new(heartbeat_dt_ms),
            running: AtomicBool::new(true),
            wake: Notify::new(),
            transport,
            dial_options,
            runtime,
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.state.read().node_id()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_dt_ms.load(Ordering::SeqCst))
    }

    pub fn outbound(&self) -> &EdgeList {
        &self.outbound
    }

    pub fn inbound(&self) -> &EdgeList {
        &self.inbound
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers an additional observer for edge add/remove events.
    pub fn add_listener(&self, listener: Arc<dyn EdgeListener>) {
        self.listeners.write().push(listener);
    }

    /// Spawns the heartbeat loop on the current runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        self.runtime.spawn(async move {
            monitor.run().await;
        })
    }

    /// Runs ticks until [`shutdown`](Self::shutdown) is requested.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Starting edge monitor for node {}", self.node_id());

        while self.is_running() {
            self.tick();

            if !self.is_running() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.heartbeat_interval()) => {}
                _ = self.wake.notified() => {
                    tracing::debug!("Edge monitor woken before the end of its interval");
                }
            }
        }

        tracing::info!("Edge monitor for node {} stopped", self.node_id());
    }

    /// Stops the loop. In-flight dials are allowed to finish.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// One pass over all outbound edges.
    ///
    /// Returns the dials started by this pass; the loop does not wait for them.
    pub fn tick(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let node_id = self.node_id();

        self.outbound
            .values()
            .iter()
            .filter_map(|edge| self.tick_edge(edge, node_id))
            .collect()
    }

    fn tick_edge(self: &Arc<Self>, edge: &Arc<EdgeInfo>, node_id: NodeId) -> Option<JoinHandle<()>> {
        match edge.send(WorkMessage::heartbeat(node_id)) {
            LinkSend::Sent => {
                tracing::debug!("Heartbeat to node {}", edge.id());
                None
            }
            LinkSend::Failed(e) => {
                tracing::warn!("Heartbeat to node {} not sent: {}", edge.id(), e);
                None
            }
            LinkSend::Retired => None,
            LinkSend::Lost => {
                tracing::info!("Connection to node {} lost, reconnecting", edge.id());
                self.spawn_dial(edge)
            }
            LinkSend::NotConnected => self.spawn_dial(edge),
        }
    }

    fn spawn_dial(self: &Arc<Self>, edge: &Arc<EdgeInfo>) -> Option<JoinHandle<()>> {
        let Some(guard) = edge.try_lock_dial() else {
            tracing::debug!("Dial to node {} still in flight, skipping", edge.id());
            return None;
        };

        let monitor = self.clone();
        let edge = edge.clone();
        Some(self.runtime.spawn(async move {
            if let Err(e) = monitor.connect_locked(&edge, guard).await {
                tracing::warn!("{}; retrying on next tick", e);
            }
        }))
    }

    async fn try_connect(&self, edge: &Arc<EdgeInfo>) {
        if let Err(e) = self.connect(edge).await {
            tracing::warn!("{}; retrying on next tick", e);
        }
    }

    /// Dials an edge unless it is already connected.
    ///
    /// Concurrent callers for the same edge are serialized; only the first
    /// one dials, the rest observe `AlreadyActive`.
    pub async fn connect(&self, edge: &Arc<EdgeInfo>) -> Result<ConnectOutcome, EdgeError> {
        let guard = edge.lock_dial().await;
        self.connect_locked(edge, guard).await
    }

    async fn connect_locked(
        &self,
        edge: &Arc<EdgeInfo>,
        _dial: OwnedMutexGuard<()>,
    ) -> Result<ConnectOutcome, EdgeError> {
        if edge.reap_closed() {
            tracing::debug!("Dropped closed connection to node {}", edge.id());
        }
        if edge.is_retired() {
            return Ok(ConnectOutcome::Retired);
        }
        if edge.is_active() {
            return Ok(ConnectOutcome::AlreadyActive);
        }

        tracing::info!("Trying to connect to node {} at {}", edge.id(), edge.addr());

        let channel = self
            .transport
            .dial(edge.host(), edge.port(), &self.dial_options)
            .await
            .map_err(|source| EdgeError::Connect {
                id: edge.id(),
                addr: edge.addr(),
                source,
            })?;

        let connection = channel.id();
        match edge.attach(channel) {
            Ok(()) => {
                tracing::info!("Connected to node {} (connection {})", edge.id(), connection);
                Ok(ConnectOutcome::Connected)
            }
            Err(channel) => {
                channel.close();
                tracing::info!(
                    "Edge {} was removed while dialing, discarded connection {}",
                    edge.id(),
                    connection
                );
                Ok(ConnectOutcome::Retired)
            }
        }
    }

    /// Registers a peer that connected to this node. Inbound edges are only
    /// observed: they are neither dialed nor sent heartbeats from this side.
    pub fn create_inbound_if_new(&self, id: NodeId, host: &str, port: u16) -> bool {
        match self.inbound.create_if_new(id, host, port) {
            Some(_) => {
                tracing::info!("Registered inbound edge from node {} at {}:{}", id, host, port);
                true
            }
            None => false,
        }
    }

    /// Send-only handle of an established outbound edge.
    pub fn get_connection(&self, id: NodeId) -> Result<ChannelSender, EdgeError> {
        self.outbound
            .get_node(id)?
            .sender()
            .ok_or(EdgeError::NotConnected(id))
    }

    /// Adds an outbound edge and dials it in the background. Callable from
    /// any thread.
    ///
    /// Returns `None` when the id is already registered.
    pub fn add_edge(self: &Arc<Self>, id: NodeId, host: &str, port: u16) -> Option<JoinHandle<()>> {
        self.outbound
            .create_if_new(id, host, port)
            .map(|edge| self.notify_add(edge))
    }

    /// Removes an outbound edge, closing its connection. Returns false when
    /// the id was not registered.
    pub async fn remove_edge(&self, id: NodeId) -> bool {
        let Ok(edge) = self.outbound.get_node(id) else {
            return false;
        };

        self.on_remove(edge.clone()).await;

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_remove(edge.clone()).await;
        }
        true
    }

    /// Re-seeds outbound edges from a possibly changed configuration.
    ///
    /// Newly configured peers are added and dialed in the background. Edges no
    /// longer mentioned are left untouched. The heartbeat interval can only grow
    /// and takes effect from the next sleep. Callable from any thread.
    pub fn update_state(self: &Arc<Self>, new_state: ServerState) -> Vec<NodeId> {
        let mut added = Vec::new();

        for entry in &new_state.conf.routing {
            if let Some(edge) = self.outbound.create_if_new(entry.id, &entry.host, entry.port) {
                added.push(edge.id());
                self.notify_add(edge);
            }
        }

        let requested = new_state.conf.heartbeat_dt.max(MIN_HEARTBEAT_DT_MS);
        let previous = self.heartbeat_dt_ms.fetch_max(requested, Ordering::SeqCst);

        *self.state.write() = new_state;

        tracing::info!(
            "State updated: {} new outbound edge(s) {:?}, heartbeat every {}ms",
            added.len(),
            added,
            previous.max(requested)
        );

        added
    }

    fn notify_add(self: &Arc<Self>, edge: Arc<EdgeInfo>) -> JoinHandle<()> {
        let monitor = self.clone();

        self.runtime.spawn(async move {
            monitor.on_add(edge.clone()).await;

            let listeners = monitor.listeners.read().clone();
            for listener in listeners {
                listener.on_add(edge.clone()).await;
            }
        })
    }
}

#[async_trait]
impl EdgeListener for EdgeMonitor {
    async fn on_add(&self, edge: Arc<EdgeInfo>) {
        if edge.is_active() {
            return;
        }

        tracing::info!("New edge added, trying to connect to node {}", edge.id());
        self.try_connect(&edge).await;
    }

    async fn on_remove(&self, edge: Arc<EdgeInfo>) {
        let channel = edge.retire();
        let removed = self.outbound.remove_edge(&edge);

        match channel {
            Some(channel) => {
                channel.close();
                tracing::info!("Edge removed and disconnected from node {}", edge.id());
            }
            None if removed => {
                tracing::info!("Edge to node {} removed (was not connected)", edge.id());
            }
            None => {
                tracing::debug!("Edge to node {} already removed", edge.id());
            }
        }
    }
}
