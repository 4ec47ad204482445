use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connect timeout requested for every edge dial.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity of one established connection.
///
/// Two dials to the same peer always produce different ids, which makes handle
/// replacement observable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Socket options requested from the transport when dialing an edge.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub connect_timeout: Duration,
    pub no_delay: bool,
    pub keep_alive: bool,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            no_delay: true,
            keep_alive: true,
        }
    }
}
