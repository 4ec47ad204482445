#[cfg(test)]
mod tests {
    use crate::client::{
        ClientConf, CommListener, MessageClient, OutboundQueue, QUEUE_CAPACITY, split_chunks,
    };
    use crate::protocol::{
        Action, CHUNK_SIZE, CommandMessage, CommandPayload, Frame, Header, NodeId,
    };
    use crate::transport::{Channel, TcpTransport, codec};

    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn client_conf(destination: i32) -> ClientConf {
        ClientConf {
            node_id: NodeId(1),
            destination,
            source_host: "10.0.0.1".to_string(),
            destination_host: "10.0.0.2".to_string(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<CommandMessage>) -> Vec<CommandMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Forwards every message it sees to a channel the test can await.
    struct ForwardingListener {
        tx: mpsc::UnboundedSender<CommandMessage>,
    }

    impl CommListener for ForwardingListener {
        fn on_message(&self, msg: &CommandMessage) {
            let _ = self.tx.send(msg.clone());
        }
    }

    fn reply_to(request: &CommandMessage, text: &str) -> CommandMessage {
        let mut header = Header::new(NodeId(2), request.header.node_id.0);
        header.sequence_id = request.header.sequence_id;
        CommandMessage {
            header,
            payload: CommandPayload::Message(text.to_string()),
        }
    }

    // ============================================================
    // CHUNKING TESTS
    // ============================================================

    #[test]
    fn test_split_chunks_sizes() {
        let data = vec![7u8; 10];

        let chunks = split_chunks(&data, 4);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let exact = split_chunks(&data, 5);
        assert_eq!(exact.len(), 2);

        let empty = split_chunks(&[], 4);
        assert_eq!(empty.len(), 1);
        assert!(empty[0].is_empty());
    }

    #[test]
    fn test_store_splits_into_numbered_chunks() {
        // ARRANGE: 2.5 MiB payload
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());
        let mut rx = queue.take_receiver(2).unwrap();
        let data: Vec<u8> = (0..(CHUNK_SIZE * 5 / 2)).map(|i| (i % 251) as u8).collect();

        // ACT
        let ids = client.store("file.bin", &data).unwrap();

        // ASSERT
        assert_eq!(ids.len(), 3);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);

        let mut reassembled = Vec::new();
        for (index, msg) in messages.iter().enumerate() {
            let CommandPayload::Query(query) = &msg.payload else {
                panic!("expected a query, got {:?}", msg.payload);
            };
            assert_eq!(query.action, Action::Store);
            assert_eq!(query.key, "file.bin");
            assert_eq!(query.sequence_no, Some(index as u32));

            let chunk = query.data.as_ref().unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            reassembled.extend_from_slice(chunk);
        }
        assert_eq!(reassembled, data);
    }

    #[test]
    fn test_store_empty_payload_sends_one_chunk() {
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());
        let mut rx = queue.take_receiver(2).unwrap();

        let ids = client.store("empty", &[]).unwrap();
        assert_eq!(ids.len(), 1);

        let messages = drain(&mut rx);
        let CommandPayload::Query(query) = &messages[0].payload else {
            panic!("expected a query");
        };
        assert_eq!(query.sequence_no, Some(0));
        assert_eq!(query.data.as_deref(), Some(&[][..]));
    }

    // ============================================================
    // REQUEST TESTS
    // ============================================================

    #[test]
    fn test_requests_carry_header_and_increasing_ids() {
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());
        let mut rx = queue.take_receiver(2).unwrap();

        let ping = client.ping().unwrap();
        let message = client.message("hello").unwrap();
        let query = client.query("some-key").unwrap();
        assert!(ping < message && message < query);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);

        for msg in &messages {
            assert_eq!(msg.header.node_id, NodeId(1));
            assert_eq!(msg.header.destination, 2);
            assert_eq!(msg.header.source_host.as_deref(), Some("10.0.0.1"));
            assert_eq!(msg.header.destination_host.as_deref(), Some("10.0.0.2"));
        }

        assert_eq!(messages[0].payload, CommandPayload::Ping(true));
        assert_eq!(messages[1].payload, CommandPayload::Message("hello".to_string()));
        match &messages[2].payload {
            CommandPayload::Query(q) => {
                assert_eq!(q.action, Action::Get);
                assert_eq!(q.key, "some-key");
                assert!(q.data.is_none());
            }
            other => panic!("expected a query, got {:?}", other),
        }

        let ids: Vec<u64> = messages.iter().map(|m| m.header.sequence_id.unwrap()).collect();
        assert_eq!(ids, vec![ping, message, query]);
    }

    #[tokio::test]
    async fn test_save_uses_file_name_as_key() {
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());
        let mut rx = queue.take_receiver(2).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"cluster notes").unwrap();

        let ids = client.save(&path).await.unwrap();
        assert_eq!(ids.len(), 1);

        let messages = drain(&mut rx);
        let CommandPayload::Query(query) = &messages[0].payload else {
            panic!("expected a query");
        };
        assert_eq!(query.key, "notes.txt");
        assert_eq!(query.data.as_deref(), Some(&b"cluster notes"[..]));
    }

    #[tokio::test]
    async fn test_save_missing_file_fails() {
        let client = MessageClient::new(client_conf(2), OutboundQueue::new());

        let result = client.save("/definitely/not/here.bin").await;
        assert!(result.is_err());
    }

    // ============================================================
    // QUEUE TESTS
    // ============================================================

    #[test]
    fn test_queues_are_keyed_by_destination() {
        let queue = OutboundQueue::new();
        let to_two = MessageClient::new(client_conf(2), queue.clone());
        let to_three = MessageClient::new(client_conf(3), queue.clone());

        to_two.ping().unwrap();
        to_three.ping().unwrap();
        to_three.ping().unwrap();

        assert_eq!(queue.destinations(), vec![2, 3]);
        assert_eq!(drain(&mut queue.take_receiver(2).unwrap()).len(), 1);
        assert_eq!(drain(&mut queue.take_receiver(3).unwrap()).len(), 2);
    }

    #[test]
    fn test_receiver_handed_out_once() {
        let queue = OutboundQueue::new();

        assert!(queue.take_receiver(4).is_some());
        assert!(queue.take_receiver(4).is_none());
    }

    #[test]
    fn test_enqueue_after_drain_dropped_fails() {
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());

        drop(queue.take_receiver(2));

        assert!(client.ping().is_err());
    }

    #[tokio::test]
    async fn test_attach_forwards_to_connection() {
        // ARRANGE
        let queue: Arc<OutboundQueue> = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());
        let (channel, mut receiver) = Channel::pair("10.0.0.2:5000");

        // ACT
        let drain_task = queue.attach(2, channel.sender()).unwrap();
        let id = client.message("over the wire").unwrap();

        // ASSERT
        let frame = receiver.recv().await.unwrap();
        match frame {
            Frame::Command(msg) => {
                assert_eq!(msg.header.sequence_id, Some(id));
                assert_eq!(msg.payload, CommandPayload::Message("over the wire".to_string()));
            }
            other => panic!("expected a command, got {:?}", other),
        }

        assert!(queue.attach(2, channel.sender()).is_none());
        drain_task.abort();
    }

    #[test]
    fn test_full_destination_rejects_without_blocking() {
        let queue = OutboundQueue::new();
        let client = MessageClient::new(client_conf(2), queue.clone());

        for _ in 0..QUEUE_CAPACITY {
            client.ping().unwrap();
        }

        let overflow = client.ping();
        assert!(overflow.is_err());
        assert!(overflow.unwrap_err().to_string().contains("full"));
    }

    // ============================================================
    // RELEASE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_release_flushes_queued_chunks() {
        // ARRANGE
        let (channel, mut receiver) = Channel::pair("10.0.0.2:5000");
        let mut client = MessageClient::from_channel(channel, client_conf(2));
        let data = vec![1u8; CHUNK_SIZE * 2 + 10];

        // ACT: queue three chunks and release right away
        let ids = client.store("big.bin", &data).unwrap();
        client.release().await;

        // ASSERT: every chunk reached the connection before it closed
        assert!(receiver.is_closed());
        let mut delivered = Vec::new();
        while let Some(Frame::Command(msg)) = receiver.try_recv() {
            delivered.push(msg.header.sequence_id.unwrap());
        }
        assert_eq!(delivered, ids);

        assert!(client.ping().is_err(), "released client accepts no requests");
    }

    // ============================================================
    // REPLY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_reply_reaches_listener_with_request_id() {
        let (channel, mut receiver) = Channel::pair("10.0.0.2:5000");
        let client = MessageClient::from_channel(channel, client_conf(2));
        let (tx, mut replies) = mpsc::unbounded_channel();
        client.add_listener(Arc::new(ForwardingListener { tx }));

        let id = client.query("some-key").unwrap();

        let Some(Frame::Command(request)) = receiver.recv().await else {
            panic!("expected the query on the connection");
        };
        assert!(receiver.deliver(Frame::Command(reply_to(&request, "value"))));

        let reply = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.header.sequence_id, Some(id));
        assert_eq!(reply.payload, CommandPayload::Message("value".to_string()));
    }

    #[tokio::test]
    async fn test_reply_over_loopback() {
        // ARRANGE: a peer that answers every command it receives
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = MessageClient::connect(&TcpTransport::new(), "127.0.0.1", port, client_conf(2))
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        let (tx, mut replies) = mpsc::unbounded_channel();
        client.add_listener(Arc::new(ForwardingListener { tx }));

        // ACT
        let id = client.ping().unwrap();

        let request = match codec::read_frame(&mut peer).await.unwrap() {
            Some(Frame::Command(msg)) => msg,
            other => panic!("expected a command, got {:?}", other),
        };
        assert_eq!(request.payload, CommandPayload::Ping(true));
        codec::write_frame(&mut peer, &Frame::Command(reply_to(&request, "pong")))
            .await
            .unwrap();

        // ASSERT
        let reply = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.header.sequence_id, Some(id));
        assert_eq!(reply.header.node_id, NodeId(2));
    }
}
