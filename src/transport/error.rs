use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u64 },

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,

    #[error("outgoing buffer full")]
    Full,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),
}
