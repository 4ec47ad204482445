use super::listener::CommListener;
use super::queue::OutboundQueue;
use crate::protocol::{Action, CHUNK_SIZE, CommandMessage, CommandPayload, Frame, Header, NodeId, Query};
use crate::transport::{Channel, DialOptions, Transport};

use anyhow::{Context, Result, anyhow};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Longest `release` waits for queued requests to reach the connection.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

type Listeners = Arc<RwLock<Vec<Arc<dyn CommListener>>>>;

/// Header values stamped on every request this client builds.
#[derive(Debug, Clone)]
pub struct ClientConf {
    pub node_id: NodeId,
    pub destination: i32,
    pub source_host: String,
    pub destination_host: String,
}

pub struct MessageClient {
    conf: ClientConf,
    queue: Arc<OutboundQueue>,
    /// Last sequence id handed out. Replies are asynchronous, so each request
    /// carries its own id for correlation.
    cur_id: AtomicU64,
    released: AtomicBool,
    listeners: Listeners,
    channel: Option<Channel>,
    drain: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

impl MessageClient {
    /// Client that only enqueues; draining is left to whoever owns `queue`.
    pub fn new(conf: ClientConf, queue: Arc<OutboundQueue>) -> Self {
        Self {
            conf,
            queue,
            cur_id: AtomicU64::new(0),
            released: AtomicBool::new(false),
            listeners: Arc::new(RwLock::new(Vec::new())),
            channel: None,
            drain: None,
            dispatch: None,
        }
    }

    /// Dials `host:port` and drains the configured destination's queue onto it.
    pub async fn connect(
        transport: &dyn Transport,
        host: &str,
        port: u16,
        conf: ClientConf,
    ) -> Result<Self> {
        let channel = transport
            .dial(host, port, &DialOptions::default())
            .await
            .with_context(|| format!("failed to connect to {}:{}", host, port))?;

        tracing::info!("Message client connected to {}:{}", host, port);

        Ok(Self::from_channel(channel, conf))
    }

    /// Wraps an established connection. Must be called within a Tokio runtime.
    pub fn from_channel(channel: Channel, conf: ClientConf) -> Self {
        let queue = OutboundQueue::new();
        let drain = queue.attach(conf.destination, channel.sender());

        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));
        let dispatch = channel
            .take_incoming()
            .map(|incoming| spawn_dispatch(incoming, listeners.clone()));

        Self {
            conf,
            queue,
            cur_id: AtomicU64::new(0),
            released: AtomicBool::new(false),
            listeners,
            channel: Some(channel),
            drain,
            dispatch,
        }
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Registers a receiver for messages arriving on this client's connection.
    pub fn add_listener(&self, listener: Arc<dyn CommListener>) {
        self.listeners.write().push(listener);
    }

    pub fn ping(&self) -> Result<u64> {
        self.submit(CommandPayload::Ping(true))
    }

    pub fn message(&self, text: &str) -> Result<u64> {
        self.submit(CommandPayload::Message(text.to_string()))
    }

    pub fn query(&self, key: &str) -> Result<u64> {
        self.submit(CommandPayload::Query(Query {
            action: Action::Get,
            key: key.to_string(),
            data: None,
            sequence_no: None,
        }))
    }

    /// Stores `data` under `key`, split into chunks of at most [`CHUNK_SIZE`]
    /// bytes numbered from zero. The receiver reassembles by `sequence_no`;
    /// delivery order is not guaranteed.
    pub fn store(&self, key: &str, data: &[u8]) -> Result<Vec<u64>> {
        let chunks = split_chunks(data, CHUNK_SIZE);
        let mut ids = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.into_iter().enumerate() {
            let id = self.submit(CommandPayload::Query(Query {
                action: Action::Store,
                key: key.to_string(),
                data: Some(chunk.to_vec()),
                sequence_no: Some(index as u32),
            }))?;
            ids.push(id);
        }

        tracing::debug!("Queued {} chunk(s) for key {}", ids.len(), key);
        Ok(ids)
    }

    /// Reads a file and stores it under its file name.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<Vec<u64>> {
        let path = path.as_ref();
        let key = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("path {} has no file name", path.display()))?;

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.store(key, &data)
    }

    /// Stops accepting requests, lets already queued ones reach the connection
    /// (up to [`RELEASE_TIMEOUT`]) and closes it. Frames handed to the
    /// connection are still flushed by the transport after the close.
    pub async fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);

        if let Some(mut drain) = self.drain.take() {
            self.queue.close(self.conf.destination);

            if tokio::time::timeout(RELEASE_TIMEOUT, &mut drain).await.is_err() {
                tracing::warn!(
                    "Queue for destination {} not drained within {:?}, dropping the rest",
                    self.conf.destination,
                    RELEASE_TIMEOUT
                );
                drain.abort();
            }
        }

        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    pub fn create_header(&self, sequence_id: u64) -> Header {
        let mut header = Header::new(self.conf.node_id, self.conf.destination);
        header.source_host = Some(self.conf.source_host.clone());
        header.destination_host = Some(self.conf.destination_host.clone());
        header.sequence_id = Some(sequence_id);
        header
    }

    fn submit(&self, payload: CommandPayload) -> Result<u64> {
        if self.released.load(Ordering::SeqCst) {
            return Err(anyhow!("client for destination {} was released", self.conf.destination));
        }

        let id = self.next_id();
        self.queue.enqueue(CommandMessage {
            header: self.create_header(id),
            payload,
        })?;
        Ok(id)
    }

    fn next_id(&self) -> u64 {
        self.cur_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn spawn_dispatch(mut incoming: mpsc::Receiver<Frame>, listeners: Listeners) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = incoming.recv().await {
            match frame {
                Frame::Command(msg) => {
                    let listeners = listeners.read().clone();
                    if listeners.is_empty() {
                        tracing::debug!(
                            "No listener for reply {:?} from node {}",
                            msg.header.sequence_id,
                            msg.header.node_id
                        );
                    }
                    for listener in listeners {
                        listener.on_message(&msg);
                    }
                }
                Frame::Work(msg) => {
                    tracing::debug!("Ignoring work message from node {}", msg.header.node_id);
                }
            }
        }
    })
}

/// Splits a payload into chunks of at most `chunk_size` bytes. An empty payload
/// still yields one (empty) chunk so the key is created on the receiver.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(chunk_size).collect()
}
