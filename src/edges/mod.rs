//! Edge Membership Module
//!
//! Maintains this node's links to its peers and proves their liveness.
//!
//! ## Core Mechanisms
//! - **Registries**: `EdgeList` holds outbound edges (we dial them) and inbound
//!   edges (they dial us), keyed by peer id.
//! - **Heartbeat Loop**: `EdgeMonitor` walks the outbound edges every tick,
//!   sending heartbeats over live connections and redialing the rest.
//! - **Notifications**: `EdgeListener` receives add/remove events. The monitor
//!   is its own default listener and performs the connect/disconnect side effects.
//! - **Status Surface**: `handlers` exposes edge state over HTTP.

pub mod error;
pub mod handlers;
pub mod list;
pub mod listener;
pub mod monitor;
pub mod types;


pub use error::EdgeError;
pub use list::EdgeList;
pub use listener::EdgeListener;
pub use monitor::{ConnectOutcome, EdgeMonitor};
pub use types::{EdgeInfo, EdgeLink, EdgeStatus, LinkSend};
