//! Transport Boundary
//!
//! The edge layer only needs three primitives from the network: dial a peer,
//! send a frame over the resulting handle, and close it. This module defines
//! that boundary and ships a TCP implementation.
//!
//! ## Components
//! - **`Transport`**: the dial primitive. The monitor holds it as a trait object
//!   so tests can substitute a scripted network.
//! - **`channel`**: the connection handle. [`Channel`] is owned by exactly one
//!   edge; [`ChannelSender`] is the cloneable send-only view handed to other
//!   components; [`ChannelReceiver`] and [`Inbox`] are the transport-side ends.
//!   Buffers are bounded in both directions.
//! - **`codec`**: length-prefixed bincode framing.
//! - **`tcp`**: `TcpTransport`, dialing with connect timeout, keep-alive and no-delay.

pub mod channel;
pub mod codec;
pub mod error;
pub mod tcp;
pub mod types;

#[cfg(test)]
mod tests;

pub use channel::{CHANNEL_CAPACITY, Channel, ChannelReceiver, ChannelSender, Inbox};
pub use error::TransportError;
pub use tcp::TcpTransport;
pub use types::{ConnectionId, DialOptions};

use async_trait::async_trait;

/// Dial primitive consumed by the edge monitor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `host:port`.
    ///
    /// Implementations must give up after `opts.connect_timeout`.
    async fn dial(&self, host: &str, port: u16, opts: &DialOptions)
    -> Result<Channel, TransportError>;
}
