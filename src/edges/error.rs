use crate::protocol::NodeId;
use crate::transport::TransportError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgeError {
    /// Lookup of a peer id that was never registered.
    #[error("unknown edge {0}")]
    UnknownEdge(NodeId),

    /// The edge is registered but holds no live connection.
    #[error("edge {0} is not connected")]
    NotConnected(NodeId),

    /// Dial did not complete within the timeout or was refused.
    #[error("failed to connect to node {id} at {addr}: {source}")]
    Connect {
        id: NodeId,
        addr: String,
        #[source]
        source: TransportError,
    },

    /// Constructed outside a Tokio runtime without an explicit handle.
    #[error("edge monitor needs a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
