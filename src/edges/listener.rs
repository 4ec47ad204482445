use super::types::EdgeInfo;

use async_trait::async_trait;
use std::sync::Arc;

/// Consumer notified when an outbound edge is added or removed.
///
/// Notifications are delivered after the registry has been updated and
/// outside any registry lock, so implementations may perform network I/O.
/// The same edge can be reported more than once; implementations must be
/// idempotent.
#[async_trait]
pub trait EdgeListener: Send + Sync {
    async fn on_add(&self, edge: Arc<EdgeInfo>);

    async fn on_remove(&self, edge: Arc<EdgeInfo>);
}
