//! WebSocket Transport Integration Tests
//!
//! Runs the client against a real local `tokio-tungstenite` server to check
//! the handshake headers, the subscribe message and reconnect after close.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use amber_price_stream::infrastructure::feed::ReconnectConfig;
use amber_price_stream::{
    ConnectRequest, FeedClientConfig, FeedConnector, StateCoordinator, SubscriptionClient,
    TransportError, TungsteniteConnector,
};

const WAIT: Duration = Duration::from_secs(5);

/// What the server saw on one connection.
#[derive(Debug)]
struct Accepted {
    authorization: Option<String>,
    origin: Option<String>,
    subscribe: String,
}

/// Serve connections that send `price` once after the subscribe message.
///
/// The first connection is closed by the server right after that; later
/// ones stay open until the client goes away.
async fn spawn_server(price: String) -> (SocketAddr, mpsc::UnboundedReceiver<Accepted>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut index = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            let price = price.clone();
            let close_after_price = index == 0;
            index += 1;

            tokio::spawn(async move {
                let headers: Arc<Mutex<Option<(Option<String>, Option<String>)>>> =
                    Arc::default();
                let captured = Arc::clone(&headers);
                let callback = move |request: &Request, response: Response| {
                    let header = |name: &str| {
                        request
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned)
                    };
                    *captured.lock() = Some((header("authorization"), header("origin")));
                    Ok::<Response, ErrorResponse>(response)
                };

                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    return;
                };

                let subscribe = loop {
                    match ws.next().await {
                        Some(Ok(Message::Text(text))) => break text.as_str().to_owned(),
                        Some(Ok(_)) => {}
                        _ => return,
                    }
                };

                let (authorization, origin) = headers.lock().take().unwrap_or_default();
                let _ = tx.send(Accepted {
                    authorization,
                    origin,
                    subscribe,
                });

                if ws.send(Message::text(price)).await.is_err() {
                    return;
                }
                if close_after_price {
                    let _ = ws.close(None).await;
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    (addr, rx)
}

fn client_for(addr: SocketAddr) -> SubscriptionClient {
    let mut config = FeedClientConfig::new(
        ConnectRequest {
            url: format!("ws://{addr}"),
            auth_token: "token-abc".to_string(),
            origin: "https://app.amber.com.au".to_string(),
        },
        "site-7",
    );
    config.reconnect = ReconnectConfig::new(
        Duration::from_millis(50),
        Duration::from_millis(200),
        2.0,
        0.0,
    );
    SubscriptionClient::new(config, Arc::new(TungsteniteConnector::new()))
}

#[tokio::test]
async fn handshake_headers_and_subscribe_message() {
    let price = json!({"data": {"prices": [{"channelType": "general", "perKwh": 28.4}]}});
    let (addr, mut accepted) = spawn_server(price.to_string()).await;
    let client = client_for(addr);

    client.start();
    let first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    client.stop().await;

    assert_eq!(first.authorization.as_deref(), Some("Bearer token-abc"));
    assert_eq!(first.origin.as_deref(), Some("https://app.amber.com.au"));
    let subscribe: serde_json::Value = serde_json::from_str(&first.subscribe).unwrap();
    assert_eq!(
        subscribe,
        json!({"service": "live-prices", "action": "subscribe", "data": {"siteId": "site-7"}})
    );
}

#[tokio::test]
async fn price_frame_updates_coordinator() {
    let price = json!({"data": {"prices": [
        {"channelType": "feedIn", "perKwh": 12.5, "descriptor": "low"}
    ]}});
    let (addr, _accepted) = spawn_server(price.to_string()).await;
    let client = client_for(addr);
    let coordinator = StateCoordinator::new(&client, client.site_id());
    let mut events = client.subscribe_events();

    client.start();
    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    client.stop().await;

    assert_eq!(event.site_id, "site-7");
    assert_eq!(coordinator.channel_value("feedIn", "perKwh"), Some(json!(12.5)));
    assert_eq!(
        coordinator.channel_value("feedIn", "descriptor"),
        Some(json!("low"))
    );
    assert!(coordinator.last_update_at().is_some());
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let (addr, mut accepted) = spawn_server(json!({}).to_string()).await;
    let client = client_for(addr);

    client.start();
    let first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    client.stop().await;

    assert_eq!(first.subscribe, second.subscribe);
    assert!(!client.is_running());
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let request = ConnectRequest {
        url: format!("ws://{addr}"),
        auth_token: "token".to_string(),
        origin: "https://app.amber.com.au".to_string(),
    };

    match TungsteniteConnector::new().connect(&request).await {
        Err(TransportError::Connect(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connection should be refused"),
    }
}

#[tokio::test]
async fn stop_while_connected_returns_promptly() {
    let (addr, mut accepted) = spawn_server(json!({}).to_string()).await;
    let client = client_for(addr);

    client.start();
    // First connection is closed by the server; wait for the long-lived one.
    timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    timeout(WAIT, client.stop()).await.unwrap();
    assert!(!client.is_running());
}
