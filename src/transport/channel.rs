//! Connection Handles
//!
//! A connection is represented by cooperating ends sharing one close flag:
//!
//! - [`Channel`]: the owning handle. Stored by exactly one edge; only the owner
//!   can close it, and dropping it closes the connection.
//! - [`ChannelSender`]: a cloneable send-only view for components that push
//!   traffic over an established edge without owning it.
//! - [`ChannelReceiver`]: the transport end that drains outgoing frames onto the
//!   wire and reports remote closure.
//! - [`Inbox`]: the transport end that hands frames read from the wire to
//!   whoever took [`Channel::take_incoming`].
//!
//! Both directions are bounded by [`CHANNEL_CAPACITY`]. A full outgoing buffer
//! makes [`Channel::send`] fail with [`TransportError::Full`] instead of growing.

use super::error::TransportError;
use super::types::ConnectionId;
use crate::protocol::Frame;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};

/// Frames buffered per direction of a connection.
pub const CHANNEL_CAPACITY: usize = 256;

struct Shared {
    closed: AtomicBool,
    close_signal: Notify,
}

impl Shared {
    /// Returns true if this call performed the transition.
    fn close(&self) -> bool {
        let already_closed = self.closed.swap(true, Ordering::SeqCst);
        if !already_closed {
            self.close_signal.notify_waiters();
        }
        !already_closed
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn wait_closed(&self) {
        loop {
            let notified = self.close_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

pub struct Channel {
    id: ConnectionId,
    remote: String,
    tx: mpsc::Sender<Frame>,
    incoming: Mutex<Option<mpsc::Receiver<Frame>>>,
    shared: Arc<Shared>,
}

impl Channel {
    /// Creates a connected handle/receiver pair for a connection to `remote`.
    pub fn pair(remote: impl Into<String>) -> (Channel, ChannelReceiver) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });

        let channel = Channel {
            id: ConnectionId::new(),
            remote: remote.into(),
            tx,
            incoming: Mutex::new(Some(inbox_rx)),
            shared: shared.clone(),
        };

        let receiver = ChannelReceiver {
            rx,
            inbox: Inbox { tx: inbox_tx },
            shared,
        };

        (channel, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Queues a frame for transmission without waiting. Best effort: success
    /// only means the frame was handed to the transport.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), TransportError> {
        try_send_frame(&self.tx, &self.shared, frame.into())
    }

    /// Frames received from the peer. Only the first caller gets the stream;
    /// frames nobody takes are dropped once the buffer is full.
    pub fn take_incoming(&self) -> Option<mpsc::Receiver<Frame>> {
        self.incoming.lock().take()
    }

    /// True once either side closed the connection or the transport went away.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed() || self.tx.is_closed()
    }

    /// Closes the connection. Frames already queued are still flushed by the
    /// transport; nothing new is accepted.
    pub fn close(&self) {
        if self.shared.close() {
            tracing::debug!("Closed connection {} to {}", self.id, self.remote);
        }
    }

    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            id: self.id,
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Send-only view of a [`Channel`]. Cannot close the connection.
#[derive(Clone)]
pub struct ChannelSender {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    shared: Arc<Shared>,
}

impl ChannelSender {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), TransportError> {
        try_send_frame(&self.tx, &self.shared, frame.into())
    }

    /// Waits for buffer space instead of failing when the connection is
    /// saturated. Gives up as soon as the connection closes.
    pub async fn send_wait(&self, frame: impl Into<Frame>) -> Result<(), TransportError> {
        if self.shared.is_closed() {
            return Err(TransportError::Closed);
        }

        tokio::select! {
            result = self.tx.send(frame.into()) => result.map_err(|_| TransportError::Closed),
            _ = self.shared.wait_closed() => Err(TransportError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed() || self.tx.is_closed()
    }
}

impl std::fmt::Debug for ChannelSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSender")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn try_send_frame(
    tx: &mpsc::Sender<Frame>,
    shared: &Shared,
    frame: Frame,
) -> Result<(), TransportError> {
    if shared.is_closed() {
        return Err(TransportError::Closed);
    }
    tx.try_send(frame).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => TransportError::Full,
        mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
    })
}

/// Delivery end for frames read from the wire.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: mpsc::Sender<Frame>,
}

impl Inbox {
    /// Returns false when the frame was dropped, either because nobody is
    /// consuming incoming frames or because the consumer is behind.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// Transport end of a connection.
pub struct ChannelReceiver {
    rx: mpsc::Receiver<Frame>,
    inbox: Inbox,
    shared: Arc<Shared>,
}

impl ChannelReceiver {
    /// Waits for the next outgoing frame. Once the connection is closed the
    /// remaining buffered frames are still returned, then `None`.
    pub async fn recv(&mut self) -> Option<Frame> {
        if self.shared.is_closed() {
            return self.rx.try_recv().ok();
        }

        tokio::select! {
            biased;
            frame = self.rx.recv() => frame,
            _ = self.shared.wait_closed() => self.rx.try_recv().ok(),
        }
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Hands a frame read from the wire to the owner of the channel.
    pub fn deliver(&self, frame: Frame) -> bool {
        self.inbox.deliver(frame)
    }

    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Reports that the remote side went away.
    pub fn mark_closed(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}
