//! Node Configuration
//!
//! Static routing configuration read from a JSON file at startup. The edge
//! monitor treats it as read-only; a reload produces a new [`ServerState`]
//! that is handed to `EdgeMonitor::update_state`.

use crate::protocol::NodeId;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lower bound for the heartbeat interval, in milliseconds.
pub const MIN_HEARTBEAT_DT_MS: u64 = 2000;

fn default_heartbeat_dt() -> u64 {
    MIN_HEARTBEAT_DT_MS
}

/// One configured outbound peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingEntry {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConf {
    pub node_id: NodeId,
    /// Port accepting inbound edge connections.
    pub work_port: u16,
    /// Requested heartbeat interval in milliseconds. Values below
    /// [`MIN_HEARTBEAT_DT_MS`] are raised to it.
    #[serde(default = "default_heartbeat_dt")]
    pub heartbeat_dt: u64,
    #[serde(default)]
    pub routing: Vec<RoutingEntry>,
}

impl RoutingConf {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        Self::from_json(&raw).with_context(|| format!("invalid configuration {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Port of the HTTP status surface, following the `+1000` convention.
    pub fn http_port(&self) -> u16 {
        self.work_port.saturating_add(1000)
    }
}

/// The owning node's state as seen by the edge layer.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub conf: RoutingConf,
}

impl ServerState {
    pub fn new(conf: RoutingConf) -> Self {
        Self { conf }
    }

    pub fn node_id(&self) -> NodeId {
        self.conf.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_conf() {
        let raw = r#"{
            "node_id": 1,
            "work_port": 4000,
            "heartbeat_dt": 3000,
            "routing": [
                { "id": 2, "host": "10.0.0.2", "port": 5000 },
                { "id": 3, "host": "10.0.0.3", "port": 5000 }
            ]
        }"#;

        let conf = RoutingConf::from_json(raw).unwrap();

        assert_eq!(conf.node_id, NodeId(1));
        assert_eq!(conf.heartbeat_dt, 3000);
        assert_eq!(conf.routing.len(), 2);
        assert_eq!(conf.routing[0].host, "10.0.0.2");
        assert_eq!(conf.http_port(), 5000);
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let conf = RoutingConf::from_json(r#"{ "node_id": 9, "work_port": 4100 }"#).unwrap();

        assert_eq!(conf.heartbeat_dt, MIN_HEARTBEAT_DT_MS);
        assert!(conf.routing.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "node_id": 4, "work_port": 4004, "routing": [{{ "id": 5, "host": "localhost", "port": 4005 }}] }}"#
        )
        .unwrap();

        let conf = RoutingConf::load(file.path()).unwrap();
        assert_eq!(conf.node_id, NodeId(4));
        assert_eq!(conf.routing[0].id, NodeId(5));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = RoutingConf::load("/definitely/not/here.json");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("failed to read"));
    }
}
