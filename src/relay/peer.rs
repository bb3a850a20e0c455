//! Relay Peer
//!
//! One side of a relay session. Each side moves through
//! `Connecting -> Open -> Closed` and never leaves `Closed`; sends and reads
//! are only attempted while `Open`.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

/// A full-duplex WebSocket message stream the relay can drive
pub trait RelayStream:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

impl<T> RelayStream for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

/// Connection state of one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Open,
    Closed,
}

/// Which side of the session a peer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Client,
    Upstream,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Client => f.write_str("client"),
            PeerRole::Upstream => f.write_str("upstream"),
        }
    }
}

pub struct Peer<S> {
    role: PeerRole,
    state: PeerState,
    stream: Option<S>,
}

impl<S: RelayStream> Peer<S> {
    /// A side whose handshake has not completed yet
    pub fn connecting(role: PeerRole) -> Self {
        Self {
            role,
            state: PeerState::Connecting,
            stream: None,
        }
    }

    /// A side that is already established
    pub fn open(role: PeerRole, stream: S) -> Self {
        Self {
            role,
            state: PeerState::Open,
            stream: Some(stream),
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_connecting(&self) -> bool {
        self.state == PeerState::Connecting
    }

    pub fn is_open(&self) -> bool {
        self.state == PeerState::Open
    }

    /// Complete the handshake. Returns false (and drops the stream) when the
    /// peer was closed while it was still connecting.
    pub fn attach(&mut self, stream: S) -> bool {
        if self.state != PeerState::Connecting {
            debug!(role = %self.role, state = ?self.state, "Discarding late handshake");
            return false;
        }
        self.stream = Some(stream);
        self.state = PeerState::Open;
        true
    }

    /// Next frame from this side. Never resolves unless the peer is open.
    pub async fn next(&mut self) -> Option<Result<Message, WsError>> {
        match (self.state, self.stream.as_mut()) {
            (PeerState::Open, Some(stream)) => stream.next().await,
            _ => std::future::pending().await,
        }
    }

    /// Send one frame; fails with `AlreadyClosed` unless the peer is open
    pub async fn send(&mut self, msg: Message) -> Result<(), WsError> {
        match (self.state, self.stream.as_mut()) {
            (PeerState::Open, Some(stream)) => stream.send(msg).await,
            _ => Err(WsError::AlreadyClosed),
        }
    }

    /// Close this side. Returns true if the peer was not already closed.
    ///
    /// A connecting peer is abandoned. An open peer gets a close frame (or
    /// the queued reply to a close it received); transport errors while
    /// closing are only logged.
    pub async fn close(&mut self, frame: Option<CloseFrame<'static>>) -> bool {
        match self.state {
            PeerState::Closed => false,
            PeerState::Connecting => {
                self.state = PeerState::Closed;
                true
            }
            PeerState::Open => {
                self.state = PeerState::Closed;
                if let Some(stream) = self.stream.as_mut() {
                    let result = match frame {
                        Some(frame) => stream.send(Message::Close(Some(frame))).await,
                        None => stream.close().await,
                    };
                    if let Err(e) = result {
                        debug!(role = %self.role, error = %e, "Error while closing");
                    }
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

    async fn ws_pair() -> (
        WebSocketStream<TcpStream>,
        WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });
        let (client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        (server.await.unwrap(), client)
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (server, mut remote) = ws_pair().await;
        let mut peer = Peer::open(PeerRole::Upstream, server);

        assert!(peer.close(None).await);
        assert_eq!(peer.state(), PeerState::Closed);
        assert!(!peer.close(None).await);
        drop(peer);

        let mut close_frames = 0;
        while let Some(Ok(msg)) = remote.next().await {
            if msg.is_close() {
                close_frames += 1;
            }
        }
        assert_eq!(close_frames, 1);
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let mut peer: Peer<WebSocketStream<TcpStream>> = Peer::connecting(PeerRole::Upstream);
        assert!(matches!(
            peer.send(Message::Text("x".into())).await,
            Err(WsError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn test_attach_after_close_is_rejected() {
        let (server, _remote) = ws_pair().await;
        let mut peer = Peer::connecting(PeerRole::Upstream);

        assert!(peer.close(None).await);
        assert!(!peer.attach(server));
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[tokio::test]
    async fn test_attach_opens_connecting_peer() {
        let (server, mut remote) = ws_pair().await;
        let mut peer = Peer::connecting(PeerRole::Client);

        assert!(peer.attach(server));
        assert!(peer.is_open());

        peer.send(Message::Text("hello".into())).await.unwrap();
        assert_eq!(remote.next().await.unwrap().unwrap(), Message::Text("hello".into()));
    }
}
