//! Loopback WebSocket helpers shared by the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use realtime_relay::config::Config;
use realtime_relay::metrics::Metrics;
use realtime_relay::RelayEngine;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

pub type ServerWs = WebSocketStream<TcpStream>;
pub type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const READY_EVENT: &str = r#"{"type":"session.created","session":{"id":"sess_1"}}"#;

/// One connection accepted by the fake upstream
pub struct UpstreamConn {
    pub uri: String,
    pub headers: HeaderMap,
    pub ws: ServerWs,
}

/// Fake realtime API: every accepted connection is handed to the test
pub async fn spawn_upstream() -> (String, mpsc::UnboundedReceiver<UpstreamConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let (req_tx, req_rx) = oneshot::channel();
                let callback = move |req: &HsRequest, resp: HsResponse| -> Result<HsResponse, ErrorResponse> {
                    let _ = req_tx.send((req.uri().to_string(), req.headers().clone()));
                    Ok(resp)
                };
                if let Ok(ws) = accept_hdr_async(stream, callback).await {
                    if let Ok((uri, headers)) = req_rx.await {
                        let _ = tx.send(UpstreamConn { uri, headers, ws });
                    }
                }
            });
        }
    });

    (format!("ws://{}/v1/realtime?model=test-model", addr), rx)
}

/// An address nothing is listening on
pub async fn dead_upstream_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/v1/realtime", addr)
}

pub fn test_config(upstream_url: &str) -> Config {
    let mut config = Config::default();
    config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
    config.server.shutdown_timeout = Duration::from_secs(2);
    config.upstream.url = upstream_url.to_string();
    config.upstream.token = "sk-test".to_string();
    config
}

pub fn test_engine(upstream_url: &str) -> Arc<RelayEngine> {
    Arc::new(RelayEngine::new(
        Arc::new(test_config(upstream_url)),
        Arc::new(Metrics::new().unwrap()),
    ))
}

/// A connected WebSocket pair: the accepted side (handed to the relay as its
/// client) and the connecting side (driven by the test)
pub async fn client_pair() -> (ServerWs, SocketAddr, ClientWs) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        (accept_async(stream).await.unwrap(), peer)
    });
    let (client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    let (relay_side, peer) = server.await.unwrap();
    (relay_side, peer, client)
}

/// Next frame, failing the test after two seconds
pub async fn recv<S>(ws: &mut S) -> Option<Message>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    match timeout(Duration::from_secs(2), ws.next()).await {
        Ok(Some(Ok(msg))) => Some(msg),
        Ok(Some(Err(_))) | Ok(None) => None,
        Err(_) => panic!("timed out waiting for a frame"),
    }
}

/// Send the ready event from upstream and wait for the client to see it,
/// which proves the relay has the upstream side open
pub async fn wait_until_open(upstream: &mut ServerWs, client: &mut ClientWs) {
    upstream.send(Message::Text(READY_EVENT.to_string())).await.unwrap();
    assert_eq!(recv(client).await, Some(Message::Text(READY_EVENT.to_string())));
}

/// Read until the stream ends and count the close frames seen
pub async fn count_close_frames(ws: &mut ServerWs) -> usize {
    let mut closes = 0;
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(msg))) if msg.is_close() => closes += 1,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => panic!("timed out waiting for the stream to end"),
        }
    }
    closes
}
