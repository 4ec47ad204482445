//! Message Client
//!
//! Front-end used by application code to submit requests to the cluster:
//! liveness ping, free-text message, key lookup and chunked key/value store.
//!
//! Requests are never written synchronously. They are pushed onto an
//! `OutboundQueue` keyed by destination, and a drain task forwards each queue
//! onto a connection handle, decoupling caller latency from network latency.
//! Replies arrive asynchronously and are handed to registered `CommListener`s;
//! the request's sequence id is the correlation key.

pub mod listener;
pub mod message_client;
pub mod queue;

#[cfg(test)]
mod tests;

pub use listener::CommListener;
pub use message_client::{ClientConf, MessageClient, split_chunks};
pub use queue::{OutboundQueue, QUEUE_CAPACITY};
