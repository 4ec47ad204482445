#[cfg(test)]
mod tests {
    use crate::protocol::{Frame, NodeId, WorkMessage};
    use crate::transport::codec::{self, MAX_FRAME_LEN};
    use crate::transport::{
        CHANNEL_CAPACITY, Channel, DialOptions, TcpTransport, Transport, TransportError,
    };

    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[tokio::test]
    async fn test_frame_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let frame = Frame::from(WorkMessage::heartbeat(NodeId(3)));

        codec::write_frame(&mut client, &frame).await.unwrap();
        drop(client);

        let decoded = codec::read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, Some(frame));

        // Clean EOF between frames
        assert!(codec::read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let len = (MAX_FRAME_LEN as u32) + 1;
        client.write_all(&len.to_be_bytes()).await.unwrap();

        let result = codec::read_frame(&mut server).await;
        assert!(matches!(result, Err(TransportError::FrameTooLarge(n)) if n == MAX_FRAME_LEN + 1));
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0u8; 10]).await.unwrap();
        drop(client);

        assert!(matches!(
            codec::read_frame(&mut server).await,
            Err(TransportError::Io(_))
        ));
    }

    // ============================================================
    // CHANNEL TESTS
    // ============================================================

    #[tokio::test]
    async fn test_channel_delivers_until_closed() {
        let (channel, mut receiver) = Channel::pair("peer:1");

        channel.send(WorkMessage::heartbeat(NodeId(1))).unwrap();
        assert!(receiver.recv().await.is_some());

        channel.close();

        assert!(channel.is_closed());
        assert!(receiver.is_closed());
        assert!(receiver.recv().await.is_none());
        assert!(matches!(
            channel.send(WorkMessage::heartbeat(NodeId(1))),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_sender_cannot_outlive_owner() {
        let (channel, _receiver) = Channel::pair("peer:1");
        let sender = channel.sender();
        assert_eq!(sender.id(), channel.id());

        sender.send(WorkMessage::heartbeat(NodeId(1))).unwrap();

        drop(channel);

        assert!(sender.is_closed());
        assert!(sender.send(WorkMessage::heartbeat(NodeId(1))).is_err());
    }

    #[tokio::test]
    async fn test_remote_closure_visible_to_owner() {
        let (channel, receiver) = Channel::pair("peer:1");
        assert!(!channel.is_closed());

        drop(receiver);

        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_full_buffer_fails_fast() {
        let (channel, mut receiver) = Channel::pair("peer:1");

        for _ in 0..CHANNEL_CAPACITY {
            channel.send(WorkMessage::heartbeat(NodeId(1))).unwrap();
        }

        assert!(matches!(
            channel.send(WorkMessage::heartbeat(NodeId(1))),
            Err(TransportError::Full)
        ));
        assert!(!channel.is_closed());

        assert!(receiver.recv().await.is_some());
        assert!(channel.send(WorkMessage::heartbeat(NodeId(1))).is_ok());
    }

    #[tokio::test]
    async fn test_send_wait_gives_up_on_close() {
        let (channel, _receiver) = Channel::pair("peer:1");
        let sender = channel.sender();
        for _ in 0..CHANNEL_CAPACITY {
            sender.send(WorkMessage::heartbeat(NodeId(1))).unwrap();
        }

        let blocked = tokio::spawn(async move { sender.send_wait(WorkMessage::heartbeat(NodeId(1))).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        channel.close();

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_close_flushes_buffered_frames() {
        let (channel, mut receiver) = Channel::pair("peer:1");

        channel.send(WorkMessage::heartbeat(NodeId(1))).unwrap();
        channel.send(WorkMessage::heartbeat(NodeId(2))).unwrap();
        channel.close();

        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_some());
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_incoming_frames_reach_owner_once() {
        let (channel, receiver) = Channel::pair("peer:1");

        let mut incoming = channel.take_incoming().unwrap();
        assert!(channel.take_incoming().is_none());

        assert!(receiver.deliver(Frame::from(WorkMessage::heartbeat(NodeId(4)))));

        match incoming.recv().await {
            Some(Frame::Work(msg)) => assert_eq!(msg.header.node_id, NodeId(4)),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_unconsumed_incoming_frames_are_dropped() {
        let (_channel, receiver) = Channel::pair("peer:1");

        for _ in 0..CHANNEL_CAPACITY {
            assert!(receiver.deliver(Frame::from(WorkMessage::heartbeat(NodeId(4)))));
        }
        assert!(!receiver.deliver(Frame::from(WorkMessage::heartbeat(NodeId(4)))));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _ra) = Channel::pair("peer:1");
        let (b, _rb) = Channel::pair("peer:1");
        assert_ne!(a.id(), b.id());
    }

    // ============================================================
    // TCP TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_tcp_dial_and_send() {
        // ARRANGE
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = TcpTransport::new();

        // ACT
        let channel = transport
            .dial("127.0.0.1", port, &DialOptions::default())
            .await
            .unwrap();
        let (mut accepted, _) = listener.accept().await.unwrap();

        channel.send(WorkMessage::heartbeat(NodeId(5))).unwrap();

        // ASSERT
        let frame = tokio::time::timeout(Duration::from_secs(2), codec::read_frame(&mut accepted))
            .await
            .unwrap()
            .unwrap();

        match frame {
            Some(Frame::Work(msg)) => assert_eq!(msg.header.node_id, NodeId(5)),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tcp_peer_close_marks_channel_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let channel = TcpTransport::new()
            .dial("127.0.0.1", port, &DialOptions::default())
            .await
            .unwrap();
        let (accepted, _) = listener.accept().await.unwrap();

        drop(accepted);

        for _ in 0..200 {
            if channel.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_tcp_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::new()
            .dial("127.0.0.1", port, &DialOptions::default())
            .await;

        assert!(result.is_err());
    }
}
