//! Edge Records
//!
//! An [`EdgeInfo`] is the record of one peer edge. Identity and address never
//! change after creation; the connection state lives in an [`EdgeLink`] behind
//! a per-edge lock, so "active" and "holds a handle" are the same fact.

use crate::protocol::{Frame, NodeId};
use crate::transport::{Channel, ChannelSender, ConnectionId, TransportError};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Connection state of one edge.
#[derive(Debug)]
pub enum EdgeLink {
    Disconnected,
    Connected(Channel),
    /// Removed from its registry. Never reconnected; late dials are discarded.
    Retired,
}

/// Result of trying to push a frame over an edge.
#[derive(Debug)]
pub enum LinkSend {
    Sent,
    /// The handle accepted nothing. Fire-and-forget: the edge stays connected
    /// until the handle itself reports closure.
    Failed(TransportError),
    /// The handle had reported closure; the edge was moved to `Disconnected`.
    Lost,
    NotConnected,
    Retired,
}

/// Serializable snapshot of an edge, used by the status surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeStatus {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub active: bool,
    pub connection: Option<ConnectionId>,
}

#[derive(Debug)]
pub struct EdgeInfo {
    id: NodeId,
    host: String,
    port: u16,
    link: Mutex<EdgeLink>,
    /// Serializes connection attempts so that at most one dial per edge is in flight.
    dial_guard: Arc<tokio::sync::Mutex<()>>,
}

impl EdgeInfo {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            link: Mutex::new(EdgeLink::Disconnected),
            dial_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn same_address(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.link.lock(), EdgeLink::Connected(_))
    }

    pub fn is_retired(&self) -> bool {
        matches!(*self.link.lock(), EdgeLink::Retired)
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        match &*self.link.lock() {
            EdgeLink::Connected(channel) => Some(channel.id()),
            _ => None,
        }
    }

    /// Send-only view of the current connection, if any.
    pub fn sender(&self) -> Option<ChannelSender> {
        match &*self.link.lock() {
            EdgeLink::Connected(channel) => Some(channel.sender()),
            _ => None,
        }
    }

    pub fn status(&self) -> EdgeStatus {
        let connection = self.connection_id();
        EdgeStatus {
            id: self.id,
            host: self.host.clone(),
            port: self.port,
            active: connection.is_some(),
            connection,
        }
    }

    /// Sends a frame over the current connection without waiting.
    ///
    /// A handle that already reports closure is dropped here, under the same
    /// lock that guards removal, so a frame is never written to a handle the
    /// owner has closed.
    pub fn send(&self, frame: impl Into<Frame>) -> LinkSend {
        let mut link = self.link.lock();

        if matches!(&*link, EdgeLink::Connected(channel) if channel.is_closed()) {
            *link = EdgeLink::Disconnected;
            return LinkSend::Lost;
        }

        match &*link {
            EdgeLink::Retired => LinkSend::Retired,
            EdgeLink::Disconnected => LinkSend::NotConnected,
            EdgeLink::Connected(channel) => match channel.send(frame) {
                Ok(()) => LinkSend::Sent,
                Err(e) => LinkSend::Failed(e),
            },
        }
    }

    /// Moves a connection whose handle reports closure back to `Disconnected`.
    pub(crate) fn reap_closed(&self) -> bool {
        let mut link = self.link.lock();

        if matches!(&*link, EdgeLink::Connected(channel) if channel.is_closed()) {
            *link = EdgeLink::Disconnected;
            return true;
        }
        false
    }

    /// Stores a freshly dialed connection.
    ///
    /// The channel is handed back when the edge is retired or already holds a
    /// connection; the caller must close it.
    pub(crate) fn attach(&self, channel: Channel) -> Result<(), Channel> {
        let mut link = self.link.lock();

        match &*link {
            EdgeLink::Disconnected => {
                *link = EdgeLink::Connected(channel);
                Ok(())
            }
            EdgeLink::Connected(_) | EdgeLink::Retired => Err(channel),
        }
    }

    /// Moves the edge to `Retired`, returning the connection it held.
    pub(crate) fn retire(&self) -> Option<Channel> {
        match std::mem::replace(&mut *self.link.lock(), EdgeLink::Retired) {
            EdgeLink::Connected(channel) => Some(channel),
            EdgeLink::Disconnected | EdgeLink::Retired => None,
        }
    }

    pub(crate) async fn lock_dial(&self) -> OwnedMutexGuard<()> {
        self.dial_guard.clone().lock_owned().await
    }

    /// `None` while another dial to this edge is in flight.
    pub(crate) fn try_lock_dial(&self) -> Option<OwnedMutexGuard<()>> {
        self.dial_guard.clone().try_lock_owned().ok()
    }
}
