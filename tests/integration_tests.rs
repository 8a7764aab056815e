//! Integration tests for netgauge: real server, real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use netgauge::{Config, MeasurementRecord, Server};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Test source frames: negotiated size, timestamp layout, monotonicity
#[tokio::test]
async fn test_source_stream_frames() {
    let addr = spawn_server(Config::default()).await;
    let mut client = connect_source(addr, r#"{"download":"start","messagesize":2000}"#).await;

    let mut last = 0u64;
    for _ in 0..5 {
        let data = next_binary(&mut client).await;
        assert_eq!(data.len(), 2000);
        let ts = u64::from_be_bytes(data[..8].try_into().unwrap());
        assert!(ts >= last, "timestamps must be non-decreasing");
        last = ts;
    }

    close_and_drain(client).await;
}

/// Test source frame size defaulting and floor clamping
#[tokio::test]
async fn test_source_size_normalization() {
    let addr = spawn_server(Config::default()).await;

    // Omitted size: the default applies.
    let mut client = connect_source(addr, r#"{"download":"start"}"#).await;
    assert_eq!(next_binary(&mut client).await.len(), 100_000);
    close_and_drain(client).await;

    // Tiny size: clamped to the smallest frame that fits the timestamp.
    let mut client = connect_source(addr, r#"{"messagesize":10}"#).await;
    assert_eq!(next_binary(&mut client).await.len(), 125);
    close_and_drain(client).await;
}

/// Test sink measurements: one record per binary message, text ignored
#[tokio::test]
async fn test_sink_measurements() {
    let addr = spawn_server(Config::default()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/speedtest/sink"))
        .await
        .unwrap();

    for size in [1000usize, 37] {
        client.send(Message::Binary(vec![7; size])).await.unwrap();
        let record = next_record(&mut client).await;
        assert_eq!(record.messagesize, size);
        assert!(record.timestamp > 0.0);
    }

    // A text message produces no record; the next reply belongs to the
    // following binary message.
    client
        .send(Message::Text("ignore me".to_string()))
        .await
        .unwrap();
    client.send(Message::Binary(vec![7; 77])).await.unwrap();
    let record = next_record(&mut client).await;
    assert_eq!(record.messagesize, 77);

    client.close(None).await.unwrap();
}

/// Test concurrent sink sessions do not corrupt each other's measurements
#[tokio::test]
async fn test_concurrent_sinks_report_own_sizes() {
    let addr = spawn_server(Config::default()).await;

    let mut tasks = Vec::new();
    for size in [10_000usize, 333] {
        tasks.push(tokio::spawn(async move {
            let (mut client, _) = connect_async(format!("ws://{addr}/speedtest/sink"))
                .await
                .unwrap();
            for _ in 0..20 {
                client.send(Message::Binary(vec![1; size])).await.unwrap();
                let record = next_record(&mut client).await;
                assert_eq!(record.messagesize, size);
            }
            client.close(None).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

/// Test the address report endpoint
#[tokio::test]
async fn test_ip_endpoint() {
    let addr = spawn_server(Config::default()).await;
    let url = format!("http://{addr}/speedtest/ip");
    let client = reqwest::Client::new();

    // GET: the caller's address, with the CORS header.
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["remoteip"], "127.0.0.1");
    let port: u16 = json["remoteport"].as_str().unwrap().parse().unwrap();
    assert!(port > 0);

    // OPTIONS: empty 200 preflight acknowledgment, CORS header present.
    let resp = client
        .request(reqwest::Method::OPTIONS, &url)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("access-control-allow-origin")
        .is_some());
    assert!(resp.bytes().await.unwrap().is_empty());

    // Anything else is denied.
    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), 403);
}

/// Test unknown paths return 404
#[tokio::test]
async fn test_not_found() {
    let addr = spawn_server(Config::default()).await;
    let resp = reqwest::get(format!("http://{addr}/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

/// Test a streaming route without upgrade headers is a 400
#[tokio::test]
async fn test_missing_upgrade_headers() {
    let addr = spawn_server(Config::default()).await;
    let resp = reqwest::get(format!("http://{addr}/speedtest/source"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

/// Test the session limit refuses the excess upgrade with 503
#[tokio::test]
async fn test_session_limit() {
    let addr = spawn_server(Config {
        max_sessions: 1,
        ..Config::default()
    })
    .await;

    let (held, _) = connect_async(format!("ws://{addr}/speedtest/sink"))
        .await
        .unwrap();

    let refused = connect_async(format!("ws://{addr}/speedtest/sink")).await;
    match refused {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 503),
        other => panic!("expected 503 refusal, got {other:?}"),
    }

    // Releasing the held session frees the slot again.
    drop(held);
    let mut reconnected = None;
    for _ in 0..100 {
        match connect_async(format!("ws://{addr}/speedtest/sink")).await {
            Ok((client, _)) => {
                reconnected = Some(client);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut client = reconnected.expect("slot was not released");
    client.close(None).await.unwrap();
}

/// Test repeated source open/close cycles leak no session slots
#[tokio::test]
async fn test_source_sessions_release_slots() {
    let addr = spawn_server(Config {
        max_sessions: 2,
        ..Config::default()
    })
    .await;

    for _ in 0..5 {
        let mut client = connect_source(addr, r#"{"messagesize":256}"#).await;
        // Stream is live.
        assert_eq!(next_binary(&mut client).await.len(), 256);
        close_and_drain(client).await;
        // Wait for the server side to notice and release the slot.
        wait_for_free_slots(addr).await;
    }
}

// Helpers

async fn spawn_server(config: Config) -> SocketAddr {
    let config = Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        ..config
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

async fn connect_source(addr: SocketAddr, command: &str) -> WsClient {
    let (mut client, _) = connect_async(format!("ws://{addr}/speedtest/source"))
        .await
        .unwrap();
    client
        .send(Message::Text(command.to_string()))
        .await
        .unwrap();
    client
}

async fn next_binary(client: &mut WsClient) -> Vec<u8> {
    loop {
        let msg = client.next().await.expect("stream ended").unwrap();
        if msg.is_binary() {
            return msg.into_data();
        }
    }
}

async fn next_record(client: &mut WsClient) -> MeasurementRecord {
    loop {
        let msg = client.next().await.expect("stream ended").unwrap();
        if let Message::Text(line) = msg {
            return serde_json::from_str(&line).unwrap();
        }
    }
}

/// Close the client side and drain frames still in flight until the server
/// finishes its close handshake.
async fn close_and_drain(mut client: WsClient) {
    client.close(None).await.unwrap();
    while let Some(msg) = client.next().await {
        if msg.is_err() {
            break;
        }
    }
}

/// Block until a fresh sink session is admitted, proving a slot is free.
async fn wait_for_free_slots(addr: SocketAddr) {
    for _ in 0..100 {
        if let Ok((mut client, _)) = connect_async(format!("ws://{addr}/speedtest/sink")).await {
            let _ = client.close(None).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session slots were not released");
}
