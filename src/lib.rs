//! Routing Cluster Edge Layer
//!
//! Membership and liveness layer of a peer-to-peer routing cluster. Each node
//! keeps outbound connections to the peers it must reach, records the peers
//! that reach it, proves liveness with periodic heartbeats and re-establishes
//! lost links on its own.
//!
//! ## Modules
//! - **`edges`**: edge registries, the heartbeat/reconnect monitor and the
//!   add/remove notification contract.
//! - **`transport`**: the dial/send/close boundary and its TCP implementation.
//! - **`protocol`**: wire messages (heartbeats, application commands).
//! - **`client`**: request builder and per-destination outbound queue.
//! - **`config`**: routing configuration consumed by the monitor.
//! - **`server`**: inbound accept loop registering peers that dial us.

pub mod client;
pub mod config;
pub mod edges;
pub mod protocol;
pub mod server;
pub mod transport;
