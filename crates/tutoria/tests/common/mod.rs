//! Test utilities and common setup.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;
use tutoria::api::{self, AppState};
use tutoria::ws::{Connection, ConnectionHandle, ConnectionOptions, FrameSink};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State with the heartbeat disabled so tests never see pings.
pub fn test_state() -> AppState {
    AppState::new(ConnectionOptions {
        ping_interval: None,
        ..ConnectionOptions::default()
    })
}

/// Create a test application around `state`.
pub fn test_app(state: AppState) -> Router {
    api::create_router(state)
}

/// Serve `state` on an ephemeral local port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Open a WebSocket to `path` (e.g. `/ws/abc123`).
pub async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let (stream, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    stream
}

/// Next text frame as JSON, skipping control frames.
pub async fn next_json(client: &mut WsClient) -> Value {
    let fut = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out waiting for a frame")
}

pub async fn send_text(client: &mut WsClient, text: &str) {
    client.send(Message::Text(text.into())).await.unwrap();
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Send a JSON POST through the router and decode the response body.
pub async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    decode(response).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    decode(response).await
}

async fn decode(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Sink that forwards every text frame to a channel.
pub struct ChannelSink(mpsc::UnboundedSender<String>);

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        self.0.send(text)?;
        Ok(())
    }

    async fn send_ping(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&mut self, _code: u16, _reason: String) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Register an in-memory connection for `session_id` and return it with the
/// receiving end of everything written to it.
pub fn attach_session(
    state: &AppState,
    session_id: &str,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = Connection::new(session_id, Box::new(ChannelSink(tx)));
    connection.open();
    state.registry.register(session_id, &connection);
    (connection, rx)
}
