//! Integration tests for the transport layer
//!
//! These tests run request sockets and the broadcast channel over real
//! loopback TCP connections.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use crate::protocol::{PublishItem, ZeroError, ZeroNetEventType};
    use crate::transport::{
        Connector, FrameListener, FrameTransport, Publisher, Subscriber, TcpConnector,
        TcpFrameTransport, TcpSubscriber,
    };

    async fn wait_for_subscribers(publisher: &Publisher, count: usize) {
        for _ in 0..200 {
            if publisher.subscriber_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscribers never registered");
    }

    #[tokio::test]
    async fn test_request_reply_over_tcp() {
        let listener = FrameListener::bind("tcp://127.0.0.1:0").await.unwrap();
        let endpoint = listener.endpoint().unwrap();

        let server = tokio::spawn(async move {
            let mut transport = listener.accept().await.unwrap();
            let frames = transport.recv_frames().await.unwrap();
            let mut reply = frames.clone();
            reply.reverse();
            transport.send_frames(reply).await.unwrap();
        });

        let mut client = TcpConnector::default().connect(&endpoint).await.unwrap();
        assert_eq!(client.endpoint(), endpoint);
        client
            .send_frames(vec![Bytes::from_static(b"a"), Bytes::new(), Bytes::from_static(b"c")])
            .await
            .unwrap();

        let reply = client.recv_frames().await.unwrap();
        assert_eq!(
            reply,
            vec![Bytes::from_static(b"c"), Bytes::new(), Bytes::from_static(b"a")]
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_error() {
        let listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.endpoint().unwrap();

        let server = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            drop(transport);
        });

        let mut client = TcpFrameTransport::connect(&endpoint).await.unwrap();
        server.await.unwrap();

        let err = client.recv_frames().await.unwrap_err();
        assert!(matches!(err, ZeroError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // bind then drop to get a port nobody listens on
        let listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.endpoint().unwrap();
        drop(listener);

        let result = TcpConnector::new(Duration::from_millis(500))
            .connect(&endpoint)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_with_prefix_filter() {
        let publisher = Publisher::bind("tcp://127.0.0.1:0").await.unwrap();

        let mut orders = TcpSubscriber::new(publisher.endpoint(), Bytes::from_static(b"order"));
        let mut everything = TcpSubscriber::new(publisher.endpoint(), Bytes::new());

        // first polls connect and subscribe
        assert!(orders.poll(Duration::from_millis(50)).await.unwrap().is_none());
        assert!(everything.poll(Duration::from_millis(50)).await.unwrap().is_none());
        wait_for_subscribers(&publisher, 2).await;

        let delivered = publisher.publish(
            PublishItem::new("user.created", ZeroNetEventType::None).with_content("u1"),
        );
        assert_eq!(delivered, 1);
        let delivered = publisher.publish(
            PublishItem::new("order.paid", ZeroNetEventType::None).with_content("o1"),
        );
        assert_eq!(delivered, 2);

        let frames = orders.poll(Duration::from_secs(2)).await.unwrap().unwrap();
        let item = PublishItem::unpack(&frames).unwrap();
        assert_eq!(item.title, "order.paid");
        assert_eq!(item.content.as_deref(), Some("o1"));

        let first = everything.poll(Duration::from_secs(2)).await.unwrap().unwrap();
        let second = everything.poll(Duration::from_secs(2)).await.unwrap().unwrap();
        assert_eq!(PublishItem::unpack(&first).unwrap().title, "user.created");
        assert_eq!(PublishItem::unpack(&second).unwrap().title, "order.paid");
    }

    #[tokio::test]
    async fn test_subscriber_poll_times_out_without_publisher() {
        let listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.endpoint().unwrap();
        drop(listener);

        let mut subscriber = TcpSubscriber::new(endpoint, Bytes::new())
            .with_connect_timeout(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        assert!(subscriber.poll(Duration::from_millis(100)).await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!subscriber.is_connected());
    }

    #[tokio::test]
    async fn test_subscriber_notices_publisher_drop() {
        let publisher = Publisher::bind("tcp://127.0.0.1:0").await.unwrap();
        let mut subscriber = TcpSubscriber::new(publisher.endpoint(), Bytes::new());
        assert!(subscriber.poll(Duration::from_millis(50)).await.unwrap().is_none());
        wait_for_subscribers(&publisher, 1).await;
        assert!(subscriber.is_connected());

        drop(publisher);
        assert!(subscriber.poll(Duration::from_secs(2)).await.unwrap().is_none());
        assert!(!subscriber.is_connected());
    }
}
