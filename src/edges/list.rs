//! Edge Registry
//!
//! Thread-safe map of [`EdgeInfo`] keyed by peer identity. One instance holds
//! outbound edges, another inbound ones. Entries are shared as `Arc`s so the
//! heartbeat pass can iterate a snapshot while listeners add and remove edges.

use super::error::EdgeError;
use super::types::{EdgeInfo, EdgeStatus};
use crate::protocol::NodeId;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct EdgeList {
    map: DashMap<NodeId, Arc<EdgeInfo>>,
}

impl EdgeList {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Inserts a disconnected edge if `id` is absent.
    ///
    /// Returns the new record, or `None` when the id was already known and
    /// there is nothing new to notify.
    pub fn create_if_new(&self, id: NodeId, host: &str, port: u16) -> Option<Arc<EdgeInfo>> {
        match self.map.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let edge = Arc::new(EdgeInfo::new(id, host, port));
                slot.insert(edge.clone());
                Some(edge)
            }
        }
    }

    /// Unconditional insert used when seeding from configuration.
    ///
    /// Re-adding the same address keeps the existing record and its connection.
    /// A different address replaces the record and closes the old connection.
    pub fn add_node(&self, id: NodeId, host: &str, port: u16) -> Arc<EdgeInfo> {
        match self.map.entry(id) {
            Entry::Occupied(mut slot) => {
                if slot.get().same_address(host, port) {
                    return slot.get().clone();
                }

                let edge = Arc::new(EdgeInfo::new(id, host, port));
                let previous = slot.insert(edge.clone());
                if let Some(channel) = previous.retire() {
                    channel.close();
                }

                tracing::info!(
                    "Edge {} moved from {} to {}:{}",
                    id,
                    previous.addr(),
                    host,
                    port
                );
                edge
            }
            Entry::Vacant(slot) => {
                let edge = Arc::new(EdgeInfo::new(id, host, port));
                slot.insert(edge.clone());
                edge
            }
        }
    }

    pub fn remove_node(&self, id: NodeId) -> Option<Arc<EdgeInfo>> {
        self.map.remove(&id).map(|(_, edge)| edge)
    }

    /// Removes `edge` only if it is still the registered record for its id.
    pub(crate) fn remove_edge(&self, edge: &Arc<EdgeInfo>) -> bool {
        self.map
            .remove_if(&edge.id(), |_, current| Arc::ptr_eq(current, edge))
            .is_some()
    }

    pub fn get_node(&self, id: NodeId) -> Result<Arc<EdgeInfo>, EdgeError> {
        self.map
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(EdgeError::UnknownEdge(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.map.contains_key(&id)
    }

    /// Snapshot of all records. Safe to hold while the registry changes.
    pub fn values(&self) -> Vec<Arc<EdgeInfo>> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Status of every edge, ordered by id.
    pub fn statuses(&self) -> Vec<EdgeStatus> {
        let mut statuses: Vec<EdgeStatus> = self.values().iter().map(|edge| edge.status()).collect();
        statuses.sort_by_key(|status| status.id);
        statuses
    }

    pub fn active_count(&self) -> usize {
        self.map.iter().filter(|entry| entry.value().is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
