//! TCP Transport
//!
//! Dials peers with `tokio::net::TcpSocket` so keep-alive and no-delay can be
//! applied before connecting. Every established connection gets two tasks:
//! a writer draining the channel onto the socket and a reader handing frames
//! from the peer to the channel's inbox. When either side ends, the channel
//! reports closed.

use super::Transport;
use super::channel::{Channel, ChannelReceiver, Inbox};
use super::codec;
use super::error::TransportError;
use super::types::DialOptions;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(
        &self,
        host: &str,
        port: u16,
        opts: &DialOptions,
    ) -> Result<Channel, TransportError> {
        let addr = format!("{}:{}", host, port);

        let stream = tokio::time::timeout(opts.connect_timeout, connect(host, port, opts))
            .await
            .map_err(|_| TransportError::Timeout {
                addr: addr.clone(),
                timeout_ms: opts.connect_timeout.as_millis() as u64,
            })??;

        let (channel, receiver) = Channel::pair(addr);
        spawn_connection(stream, receiver);

        Ok(channel)
    }
}

async fn connect(host: &str, port: u16, opts: &DialOptions) -> Result<TcpStream, TransportError> {
    let socket_addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| TransportError::Resolve(format!("{}:{}", host, port)))?;

    let socket = if socket_addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(opts.keep_alive)?;
    socket.set_nodelay(opts.no_delay)?;

    Ok(socket.connect(socket_addr).await?)
}

/// Binds an established stream to the transport end of a channel.
pub fn spawn_connection(stream: TcpStream, mut receiver: ChannelReceiver) {
    let remote = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read_half, mut write_half) = stream.into_split();

    // Dropped by the reader when the peer goes away.
    let (peer_gone_tx, mut peer_gone_rx) = oneshot::channel::<()>();
    let reader = tokio::spawn(read_loop(
        read_half,
        remote.clone(),
        receiver.inbox(),
        peer_gone_tx,
    ));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut peer_gone_rx => {
                    tracing::debug!("Connection to {} closed by peer", remote);
                    break;
                }
                frame = receiver.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = codec::write_frame(&mut write_half, &frame).await {
                            tracing::warn!("Failed to write frame to {}: {}", remote, e);
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Connection to {} closed locally", remote);
                        break;
                    }
                },
            }
        }

        receiver.mark_closed();
        reader.abort();
        let _ = write_half.shutdown().await;
    });
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    remote: String,
    inbox: Inbox,
    _peer_gone: oneshot::Sender<()>,
) {
    loop {
        match codec::read_frame(&mut read_half).await {
            Ok(Some(frame)) => {
                if !inbox.deliver(frame) {
                    tracing::trace!("Dropped unconsumed frame from {}", remote);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read frame from {}: {}", remote, e);
                break;
            }
        }
    }
}
