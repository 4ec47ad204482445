use crate::protocol::CommandMessage;
use crate::transport::ChannelSender;

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Messages buffered per destination before `enqueue` starts failing.
pub const QUEUE_CAPACITY: usize = 256;

struct DestinationQueue {
    tx: mpsc::Sender<CommandMessage>,
    /// Taken by whoever drains this destination.
    rx: Mutex<Option<mpsc::Receiver<CommandMessage>>>,
}

impl DestinationQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

/// Per-destination bounded queues of outgoing command messages.
#[derive(Default)]
pub struct OutboundQueue {
    queues: DashMap<i32, DestinationQueue>,
}

impl OutboundQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a message under its header's destination. Fails without waiting
    /// when the destination is full or nobody drains it anymore.
    pub fn enqueue(&self, msg: CommandMessage) -> Result<()> {
        let destination = msg.header.destination;
        let queue = self
            .queues
            .entry(destination)
            .or_insert_with(DestinationQueue::new);

        queue.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("queue for destination {} is full", destination),
            TrySendError::Closed(_) => anyhow!("queue for destination {} is closed", destination),
        })?;

        tracing::trace!("Enqueued message for destination {}", destination);
        Ok(())
    }

    /// Hands out the receiving end for a destination. Only the first caller
    /// gets it.
    pub fn take_receiver(&self, destination: i32) -> Option<mpsc::Receiver<CommandMessage>> {
        let queue = self
            .queues
            .entry(destination)
            .or_insert_with(DestinationQueue::new);
        let rx = queue.rx.lock().take();
        rx
    }

    /// Spawns a task forwarding everything queued for `destination` onto a
    /// connection, waiting for space when the connection is saturated. Stops
    /// when the connection closes or the destination is closed and drained.
    pub fn attach(&self, destination: i32, sender: ChannelSender) -> Option<JoinHandle<()>> {
        let mut rx = self.take_receiver(destination)?;

        Some(tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sender.send_wait(msg).await {
                    tracing::warn!(
                        "Stopped draining queue for destination {}: {}",
                        destination,
                        e
                    );
                    break;
                }
            }
        }))
    }

    /// Stops accepting messages for `destination`. Messages already queued are
    /// still handed to its drain. A later `enqueue` starts a fresh queue.
    pub fn close(&self, destination: i32) -> bool {
        self.queues.remove(&destination).is_some()
    }

    pub fn destinations(&self) -> Vec<i32> {
        let mut destinations: Vec<i32> = self.queues.iter().map(|entry| *entry.key()).collect();
        destinations.sort_unstable();
        destinations
    }
}
