use futures_util::{SinkExt, StreamExt};
use mbx::core::backoff::Backoff;
use mbx::core::kernel::{
    BinanceCodec, ConnectionTarget, EventReceiver, SocketState, StreamEvent, WsClient, WsConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept_client(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.expect("accept");
    accept_async(stream).await.expect("websocket handshake")
}

async fn next_event(events: &mut EventReceiver) -> StreamEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Fast-cycling connection configuration for tests.
fn test_config() -> WsConfig {
    WsConfig::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_heartbeat_timeout(Duration::from_millis(300))
        .with_backoff(Backoff::unbounded(
            Duration::from_millis(20),
            2,
            Duration::from_millis(200),
        ))
}

#[tokio::test]
async fn frames_are_delivered_in_arrival_order() {
    let (listener, url) = bind_server().await;
    let server = tokio::spawn(async move {
        let mut socket = accept_client(&listener).await;
        for sequence in 0..3 {
            let frame = json!({"e": "trade", "sequence": sequence}).to_string();
            socket.send(Message::Text(frame)).await.unwrap();
        }
        // Keep the connection open until the client goes away.
        while socket.next().await.is_some() {}
    });

    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    for expected in 0..3 {
        match next_event(&mut events).await {
            StreamEvent::Message(message) => {
                assert_eq!(message.data["sequence"], expected);
                assert_eq!(message.stream, None);
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    client.force_disconnect().await;
    assert_eq!(client.state(), SocketState::Closed);
    server.abort();
}

#[tokio::test]
async fn combined_frames_are_unwrapped_before_delivery() {
    let (listener, url) = bind_server().await;
    let server = tokio::spawn(async move {
        let mut socket = accept_client(&listener).await;
        let frame = json!({
            "stream": "btcusdt@trade",
            "data": {"e": "trade", "s": "BTCUSDT"}
        })
        .to_string();
        socket.send(Message::Text(frame)).await.unwrap();
        while socket.next().await.is_some() {}
    });

    let combined_url = format!("{}/stream?streams=btcusdt@trade/ethusdt@trade", url);
    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(combined_url),
        BinanceCodec::combined(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    match next_event(&mut events).await {
        StreamEvent::Message(message) => {
            assert_eq!(message.stream.as_deref(), Some("btcusdt@trade"));
            assert_eq!(message.data["s"], "BTCUSDT");
            assert!(message.data.get("stream").is_none());
        }
        other => panic!("expected message, got {:?}", other),
    }

    client.force_disconnect().await;
    server.abort();
}

#[tokio::test]
async fn malformed_frames_pass_through_as_raw_text() {
    let (listener, url) = bind_server().await;
    let server = tokio::spawn(async move {
        let mut socket = accept_client(&listener).await;
        socket
            .send(Message::Text("not json at all".to_string()))
            .await
            .unwrap();
        while socket.next().await.is_some() {}
    });

    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    match next_event(&mut events).await {
        StreamEvent::Message(message) => {
            assert_eq!(message.data, json!("not json at all"));
        }
        other => panic!("expected message, got {:?}", other),
    }

    client.force_disconnect().await;
    server.abort();
}

#[tokio::test]
async fn silent_connection_is_torn_down_and_reconnected() {
    let (listener, url) = bind_server().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        // First connection stays silent; the heartbeat should replace it.
        let mut first = accept_client(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);
        let silent = async move { while first.next().await.is_some() {} };
        tokio::spawn(silent);

        let mut second = accept_client(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);
        second
            .send(Message::Text(json!({"e": "alive"}).to_string()))
            .await
            .unwrap();
        while second.next().await.is_some() {}
    });

    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    // The stalled transport is replaced without caller involvement.
    loop {
        match next_event(&mut events).await {
            StreamEvent::Open => break,
            StreamEvent::Reconnecting { .. } => {}
            other => panic!("expected reconnect lifecycle event, got {:?}", other),
        }
    }

    match next_event(&mut events).await {
        StreamEvent::Message(message) => assert_eq!(message.data["e"], "alive"),
        other => panic!("expected message from new connection, got {:?}", other),
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 2);

    client.force_disconnect().await;
    server.abort();
}

#[tokio::test]
async fn steady_traffic_keeps_the_connection_alive() {
    let (listener, url) = bind_server().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        loop {
            let mut socket = accept_client(&listener).await;
            server_accepts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                loop {
                    if socket
                        .send(Message::Text(json!({"e": "tick"}).to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                    sleep(Duration::from_millis(100)).await;
                }
            });
        }
    });

    let (mut client, _events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(client.state(), SocketState::Connected);
    assert_eq!(accepts.load(Ordering::SeqCst), 1, "no reconnect expected");

    client.force_disconnect().await;
    server.abort();
}

#[tokio::test]
async fn server_close_triggers_a_reconnect() {
    let (listener, url) = bind_server().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        let mut first = accept_client(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);
        first.close(None).await.unwrap();

        let mut second = accept_client(&listener).await;
        server_accepts.fetch_add(1, Ordering::SeqCst);
        second
            .send(Message::Text(json!({"e": "back"}).to_string()))
            .await
            .unwrap();
        while second.next().await.is_some() {}
    });

    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    loop {
        match next_event(&mut events).await {
            StreamEvent::Open => break,
            StreamEvent::Reconnecting { .. } => {}
            other => panic!("expected reconnect lifecycle event, got {:?}", other),
        }
    }

    match next_event(&mut events).await {
        StreamEvent::Message(message) => assert_eq!(message.data["e"], "back"),
        other => panic!("expected message, got {:?}", other),
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 2);

    client.force_disconnect().await;
    server.abort();
}

#[tokio::test]
async fn disconnect_is_terminal_and_suppresses_reconnects() {
    let (listener, url) = bind_server().await;
    let accepts = Arc::new(AtomicUsize::new(0));
    let server_accepts = Arc::clone(&accepts);
    let server = tokio::spawn(async move {
        loop {
            let mut socket = accept_client(&listener).await;
            server_accepts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move { while socket.next().await.is_some() {} });
        }
    });

    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        test_config(),
    );
    client.connect().await.expect("connect");
    assert!(matches!(next_event(&mut events).await, StreamEvent::Open));

    client.disconnect().await;
    assert_eq!(client.state(), SocketState::Closed);
    assert!(matches!(next_event(&mut events).await, StreamEvent::Closed));

    // The heartbeat window passes with no replacement connection dialed.
    sleep(Duration::from_millis(800)).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), SocketState::Closed);

    server.abort();
}

#[tokio::test]
async fn bounded_policy_exhaustion_fails_the_connect() {
    // Bind then immediately drop so the port refuses connections.
    let (listener, url) = bind_server().await;
    drop(listener);

    let config = WsConfig::default()
        .with_connect_timeout(Duration::from_millis(500))
        .with_backoff(Backoff::bounded(
            Duration::from_millis(50),
            2,
            Duration::from_secs(1),
            2,
        ));
    let (mut client, mut events) = WsClient::new(
        ConnectionTarget::Url(url),
        BinanceCodec::single(),
        config,
    );

    let started = Instant::now();
    let error = client.connect().await.unwrap_err();
    assert!(matches!(
        error,
        mbx::ExchangeError::ReconnectExhausted { attempts: 2 }
    ));
    // Two backoff waits: 50ms then 100ms.
    assert!(started.elapsed() >= Duration::from_millis(150));

    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StreamEvent::Reconnecting { delay, .. } = event {
            delays.push(delay);
        }
    }
    assert_eq!(delays.len(), 2);
    assert!(delays[0] <= delays[1], "delays must be non-decreasing");
}
