use super::error::EdgeError;
use super::monitor::EdgeMonitor;
use super::types::EdgeStatus;
use crate::config::{RoutingConf, ServerState};
use crate::protocol::NodeId;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const ENDPOINT_EDGES: &str = "/edges";
pub const ENDPOINT_EDGE: &str = "/edges/:id";
pub const ENDPOINT_RELOAD: &str = "/edges/reload";

/// Location of the configuration file re-read by the reload endpoint.
#[derive(Debug, Clone)]
pub struct ConfSource(pub PathBuf);

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeListResponse {
    pub node_id: NodeId,
    pub heartbeat_ms: u64,
    pub outbound: Vec<EdgeStatus>,
    pub inbound: Vec<EdgeStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeResponse {
    pub edge: Option<EdgeStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub added: Vec<NodeId>,
    pub outbound: usize,
}

pub async fn handle_list_edges(
    Extension(monitor): Extension<Arc<EdgeMonitor>>,
) -> (StatusCode, Json<EdgeListResponse>) {
    (
        StatusCode::OK,
        Json(EdgeListResponse {
            node_id: monitor.node_id(),
            heartbeat_ms: monitor.heartbeat_interval().as_millis() as u64,
            outbound: monitor.outbound().statuses(),
            inbound: monitor.inbound().statuses(),
        }),
    )
}

pub async fn handle_get_edge(
    Extension(monitor): Extension<Arc<EdgeMonitor>>,
    Path(id): Path<i32>,
) -> (StatusCode, Json<EdgeResponse>) {
    match monitor.outbound().get_node(NodeId(id)) {
        Ok(edge) => (
            StatusCode::OK,
            Json(EdgeResponse {
                edge: Some(edge.status()),
            }),
        ),
        Err(EdgeError::UnknownEdge(_)) => (StatusCode::NOT_FOUND, Json(EdgeResponse { edge: None })),
        Err(e) => {
            tracing::error!("Failed to look up edge {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(EdgeResponse { edge: None }),
            )
        }
    }
}

pub async fn handle_reload(
    Extension(monitor): Extension<Arc<EdgeMonitor>>,
    Extension(source): Extension<Arc<ConfSource>>,
) -> (StatusCode, Json<ReloadResponse>) {
    let conf = match RoutingConf::load(&source.0) {
        Ok(conf) => conf,
        Err(e) => {
            tracing::error!("Failed to reload configuration: {:#}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse {
                    success: false,
                    added: Vec::new(),
                    outbound: monitor.outbound().len(),
                }),
            );
        }
    };

    let added = monitor.update_state(ServerState::new(conf));

    (
        StatusCode::OK,
        Json(ReloadResponse {
            success: true,
            added,
            outbound: monitor.outbound().len(),
        }),
    )
}
