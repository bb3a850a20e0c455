//! Relay Engine

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{self, header, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};

use super::peer::{Peer, PeerRole, RelayStream};
use super::session::{Direction, RelaySession, SessionStats};
use crate::config::{Config, UpstreamConfig};
use crate::metrics::Metrics;
use crate::protocol::constants::*;
use crate::protocol::types::{payload, ErrorEvent, EventEnvelope};

/// Pairs each client with its own upstream connection and relays between them
pub struct RelayEngine {
    config: Arc<Config>,
    metrics: Arc<Metrics>,
    active_sessions: Arc<RwLock<HashMap<String, Arc<RelaySession>>>>,
}

/// Build the upstream handshake request with the bearer token and beta marker
pub fn build_upstream_request(upstream: &UpstreamConfig) -> Result<Request, WsError> {
    let mut request = upstream.url.as_str().into_client_request()?;

    let authorization = HeaderValue::from_str(&format!("Bearer {}", upstream.token))
        .map_err(http::Error::from)?;
    let beta_name = HeaderName::from_bytes(BETA_HEADER.as_bytes()).map_err(http::Error::from)?;
    let beta_value = HeaderValue::from_str(&upstream.beta).map_err(http::Error::from)?;

    let headers = request.headers_mut();
    headers.insert(header::AUTHORIZATION, authorization);
    headers.insert(beta_name, beta_value);

    Ok(request)
}

impl RelayEngine {
    /// Create a new relay engine
    pub fn new(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            metrics,
            active_sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Connect to the configured upstream for one client and relay until
    /// both sides are closed. No retry is attempted.
    pub async fn handle_client<C>(&self, client: C, client_addr: SocketAddr) -> SessionStats
    where
        C: RelayStream,
    {
        let request = build_upstream_request(&self.config.upstream);
        let connect = async move {
            let (stream, _response) = connect_async(request?).await?;
            Ok::<_, WsError>(stream)
        };

        self.run_session(client, client_addr, connect).await
    }

    /// Run one session: the client is already open, the upstream becomes
    /// open when `connect` resolves.
    ///
    /// Everything for the session happens on this one task, so frames in
    /// each direction are handled strictly in arrival order.
    pub async fn run_session<C, U, F>(
        &self,
        client: C,
        client_addr: SocketAddr,
        connect: F,
    ) -> SessionStats
    where
        C: RelayStream,
        U: RelayStream,
        F: Future<Output = Result<U, WsError>>,
    {
        let session = Arc::new(RelaySession::new(client_addr));
        self.register(Arc::clone(&session)).await;
        self.metrics.session_started();

        info!(
            session_id = %session.session_id,
            %client_addr,
            "Client connected, connecting to upstream"
        );

        let mut client = Peer::open(PeerRole::Client, client);
        let mut upstream: Peer<U> = Peer::connecting(PeerRole::Upstream);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect, if upstream.is_connecting() => {
                    self.on_upstream_connect(&session, &mut client, &mut upstream, result).await;
                }
                frame = client.next(), if client.is_open() => {
                    self.on_client_frame(&session, &mut client, &mut upstream, frame).await;
                }
                frame = upstream.next(), if upstream.is_open() => {
                    self.on_upstream_frame(&session, &mut client, &mut upstream, frame).await;
                }
                else => break,
            }
        }

        self.remove_session(&session.session_id).await;
        self.metrics.session_ended(session.duration());
        session.log_stats();
        session.to_stats()
    }

    async fn on_upstream_connect<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        result: Result<U, WsError>,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        match result {
            Ok(stream) => {
                if upstream.attach(stream) {
                    info!(session_id = %session.session_id, "Connected to upstream realtime API");
                }
            }
            Err(e) => {
                error!(session_id = %session.session_id, error = %e, "Failed to connect to upstream");
                self.metrics.upstream_error();
                self.send_error_event(session, client, CONNECT_FAILED_MESSAGE, &e).await;
                self.upstream_closed(session, client, upstream).await;
            }
        }
    }

    async fn on_client_frame<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        frame: Option<Result<Message, WsError>>,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        match frame {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                self.forward_to_upstream(session, client, upstream, msg).await;
            }
            Some(Ok(Message::Close(frame))) => {
                info!(
                    session_id = %session.session_id,
                    code = ?frame.as_ref().map(|f| f.code),
                    reason = frame.as_ref().map(|f| f.reason.as_ref()).unwrap_or(""),
                    "Client disconnected"
                );
                self.client_closed(session, client, upstream).await;
            }
            Some(Ok(_)) => {
                trace!(session_id = %session.session_id, "Ignoring client control frame");
            }
            Some(Err(e)) => {
                warn!(session_id = %session.session_id, error = %e, "Client WebSocket error");
                self.client_closed(session, client, upstream).await;
            }
            None => {
                info!(session_id = %session.session_id, "Client connection ended");
                self.client_closed(session, client, upstream).await;
            }
        }
    }

    async fn on_upstream_frame<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        frame: Option<Result<Message, WsError>>,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        match frame {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                self.forward_to_client(session, client, upstream, msg).await;
            }
            Some(Ok(Message::Close(frame))) => {
                info!(
                    session_id = %session.session_id,
                    code = ?frame.as_ref().map(|f| f.code),
                    reason = frame.as_ref().map(|f| f.reason.as_ref()).unwrap_or(""),
                    "Upstream connection closed"
                );
                self.upstream_closed(session, client, upstream).await;
            }
            Some(Ok(_)) => {
                trace!(session_id = %session.session_id, "Ignoring upstream control frame");
            }
            Some(Err(e)) => {
                self.upstream_failed(session, client, upstream, e).await;
            }
            None => {
                info!(session_id = %session.session_id, "Upstream connection ended");
                self.upstream_closed(session, client, upstream).await;
            }
        }
    }

    async fn forward_to_upstream<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        msg: Message,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        let len = msg.len();
        if let Some(bytes) = payload(&msg) {
            match EventEnvelope::decode(bytes) {
                Ok(event) => debug!(
                    session_id = %session.session_id,
                    kind = %event.kind,
                    audio_len = ?event.audio_len(),
                    "Client -> upstream"
                ),
                Err(e) => debug!(
                    session_id = %session.session_id,
                    error = %e,
                    len,
                    "Client message is not a JSON event"
                ),
            }
        }

        if !upstream.is_open() {
            warn!(
                session_id = %session.session_id,
                upstream_state = ?upstream.state(),
                "Upstream socket not ready, message dropped"
            );
            session.record_dropped();
            self.metrics.message_dropped();
            return;
        }

        match upstream.send(msg).await {
            Ok(()) => {
                session.record_forwarded(Direction::Upstream, len);
                self.metrics.message_forwarded(Direction::Upstream, len);
            }
            Err(e) => self.upstream_failed(session, client, upstream, e).await,
        }
    }

    async fn forward_to_client<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        msg: Message,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        let len = msg.len();
        if let Some(bytes) = payload(&msg) {
            match EventEnvelope::decode(bytes) {
                Ok(event) if event.is_error() => {
                    let detail = event.error.unwrap_or_default();
                    error!(
                        session_id = %session.session_id,
                        error_type = detail.kind.as_deref().unwrap_or("unknown"),
                        error_code = detail.code.as_deref().unwrap_or(""),
                        message = detail.message.as_deref().unwrap_or(""),
                        "Upstream reported an error"
                    );
                }
                Ok(event) => debug!(
                    session_id = %session.session_id,
                    kind = %event.kind,
                    "Upstream -> client"
                ),
                Err(e) => debug!(
                    session_id = %session.session_id,
                    error = %e,
                    len,
                    "Upstream message is not a JSON event"
                ),
            }
        }

        if !client.is_open() {
            trace!(session_id = %session.session_id, "Client not open, discarding upstream message");
            return;
        }

        match client.send(msg).await {
            Ok(()) => {
                session.record_forwarded(Direction::Downstream, len);
                self.metrics.message_forwarded(Direction::Downstream, len);
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Failed to forward to client");
                self.client_closed(session, client, upstream).await;
            }
        }
    }

    /// The client side is gone: close it and release the upstream
    async fn client_closed<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        client.close(None).await;

        let was_connecting = upstream.is_connecting();
        if upstream.close(None).await {
            if was_connecting {
                debug!(session_id = %session.session_id, "Abandoned pending upstream handshake");
            } else {
                debug!(session_id = %session.session_id, "Closed upstream after client disconnect");
            }
        }
    }

    /// The upstream side is gone: close it and tell the client with a normal
    /// closure
    async fn upstream_closed<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        upstream.close(None).await;

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: UPSTREAM_CLOSED_REASON.into(),
        };
        if client.close(Some(frame)).await {
            debug!(session_id = %session.session_id, "Closed client after upstream closure");
        }
    }

    async fn upstream_failed<C, U>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        upstream: &mut Peer<U>,
        e: WsError,
    ) where
        C: RelayStream,
        U: RelayStream,
    {
        error!(session_id = %session.session_id, error = %e, "Upstream WebSocket error");
        self.metrics.upstream_error();
        self.send_error_event(session, client, TRANSPORT_FAILED_MESSAGE, &e).await;
        self.upstream_closed(session, client, upstream).await;
    }

    /// Tell an open client about an upstream failure with one error event
    async fn send_error_event<C>(
        &self,
        session: &RelaySession,
        client: &mut Peer<C>,
        message: &str,
        e: &WsError,
    ) where
        C: RelayStream,
    {
        if !client.is_open() {
            return;
        }

        match ErrorEvent::connection_error(message, e).to_message() {
            Ok(msg) => {
                if let Err(send_err) = client.send(msg).await {
                    debug!(session_id = %session.session_id, error = %send_err, "Could not deliver error event");
                }
            }
            Err(encode_err) => {
                error!(session_id = %session.session_id, error = %encode_err, "Failed to encode error event");
            }
        }
    }

    async fn register(&self, session: Arc<RelaySession>) {
        let mut sessions = self.active_sessions.write().await;
        sessions.insert(session.session_id.clone(), session);
    }

    async fn remove_session(&self, session_id: &str) {
        let mut sessions = self.active_sessions.write().await;
        if sessions.remove(session_id).is_some() {
            debug!("Removed session {} from active tracking", session_id);
        }
    }

    /// Get active session count
    pub async fn active_session_count(&self) -> usize {
        self.active_sessions.read().await.len()
    }

    /// Get statistics for all active sessions
    pub async fn get_active_session_stats(&self) -> Vec<SessionStats> {
        self.active_sessions
            .read()
            .await
            .values()
            .map(|session| session.to_stats())
            .collect()
    }
}
