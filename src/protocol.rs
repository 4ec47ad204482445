//! Wire Protocol Definitions
//!
//! Messages exchanged between nodes over edge connections. Two families share
//! one framed stream:
//!
//! - **`WorkMessage`**: node-to-node traffic. Edges use it for heartbeats.
//! - **`CommandMessage`**: application requests built by the message client
//!   (ping, free text, key lookup, chunked key/value store).
//!
//! Both are wrapped in a [`Frame`] so a single codec can carry either.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination sentinel meaning "no specific target".
pub const NO_DESTINATION: i32 = -1;

/// Sentinel for heartbeat counters that this node does not track.
pub const UNUSED_COUNT: i32 = -1;

/// Static token checked by receivers of work messages.
///
/// This is a lightweight authenticity check shared by every node in the
/// cluster, not a cryptographic secret.
pub const HEARTBEAT_SECRET: i64 = 12_345_678;

/// Maximum payload carried by a single STORE chunk (1 MiB).
pub const CHUNK_SIZE: usize = 1_048_576;

/// Identity of a node in the routing cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub i32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope header shared by work and command messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub node_id: NodeId,
    /// Epoch milliseconds at send time.
    pub time: u64,
    pub destination: i32,
    pub source_host: Option<String>,
    pub destination_host: Option<String>,
    /// Correlates asynchronous replies with requests. Not an ordering guarantee.
    pub sequence_id: Option<u64>,
}

impl Header {
    pub fn new(node_id: NodeId, destination: i32) -> Self {
        Self {
            node_id,
            time: now_ms(),
            destination,
            source_host: None,
            destination_host: None,
            sequence_id: None,
        }
    }
}

/// Queue statistics advertised in a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkState {
    pub enqueued: i32,
    pub processed: i32,
}

impl WorkState {
    /// State that signals "not tracking queued/processed counts".
    pub fn untracked() -> Self {
        Self {
            enqueued: UNUSED_COUNT,
            processed: UNUSED_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Heartbeat {
    pub state: WorkState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkPayload {
    Beat(Heartbeat),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkMessage {
    pub header: Header,
    pub payload: WorkPayload,
    pub secret: i64,
}

impl WorkMessage {
    /// Builds the heartbeat a node sends over each established outbound edge.
    pub fn heartbeat(node_id: NodeId) -> Self {
        Self {
            header: Header::new(node_id, NO_DESTINATION),
            payload: WorkPayload::Beat(Heartbeat {
                state: WorkState::untracked(),
            }),
            secret: HEARTBEAT_SECRET,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self.payload, WorkPayload::Beat(_))
    }

    pub fn has_valid_secret(&self) -> bool {
        self.secret == HEARTBEAT_SECRET
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    Get,
    Store,
}

/// Key/value request carried by a command message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub action: Action,
    pub key: String,
    pub data: Option<Vec<u8>>,
    /// Zero-based chunk index for STORE requests.
    pub sequence_no: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CommandPayload {
    Ping(bool),
    Message(String),
    Query(Query),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandMessage {
    pub header: Header,
    pub payload: CommandPayload,
}

/// Unit of transmission on an edge connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Frame {
    Work(WorkMessage),
    Command(CommandMessage),
}

impl From<WorkMessage> for Frame {
    fn from(msg: WorkMessage) -> Self {
        Frame::Work(msg)
    }
}

impl From<CommandMessage> for Frame {
    fn from(msg: CommandMessage) -> Self {
        Frame::Command(msg)
    }
}

/// Current system time in epoch milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
