//! Inbound Edge Server
//!
//! Accepts connections from peers dialing this node. Every heartbeat that
//! carries the shared secret registers (once) an inbound edge for the sender.

use crate::edges::EdgeMonitor;
use crate::protocol::{Frame, WorkMessage};
use crate::transport::codec;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

pub struct EdgeServer {
    listener: TcpListener,
    monitor: Arc<EdgeMonitor>,
}

impl EdgeServer {
    pub async fn bind(addr: SocketAddr, monitor: Arc<EdgeMonitor>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Edge server listening on {}", listener.local_addr()?);

        Ok(Self { listener, monitor })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted edge connection from {}", peer);
                    let monitor = self.monitor.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, monitor).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept edge connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, monitor: Arc<EdgeMonitor>) {
    loop {
        match codec::read_frame(&mut stream).await {
            Ok(Some(Frame::Work(msg))) => {
                handle_work(&monitor, &msg, peer);
            }
            Ok(Some(Frame::Command(msg))) => {
                tracing::debug!(
                    "Received command from node {} (sequence {:?})",
                    msg.header.node_id,
                    msg.header.sequence_id
                );
            }
            Ok(None) => {
                tracing::debug!("Edge connection from {} closed", peer);
                break;
            }
            Err(e) => {
                tracing::warn!("Dropping edge connection from {}: {}", peer, e);
                break;
            }
        }
    }
}

/// Applies a work message received from `peer`. Returns false when the
/// message was rejected.
pub fn handle_work(monitor: &EdgeMonitor, msg: &WorkMessage, peer: SocketAddr) -> bool {
    if !msg.has_valid_secret() {
        tracing::warn!(
            "Rejected work message from {} (node {}): invalid secret",
            peer,
            msg.header.node_id
        );
        return false;
    }

    if msg.is_heartbeat() {
        tracing::trace!("Heartbeat from node {} at {}", msg.header.node_id, peer);
        monitor.create_inbound_if_new(msg.header.node_id, &peer.ip().to_string(), peer.port());
    }

    true
}
