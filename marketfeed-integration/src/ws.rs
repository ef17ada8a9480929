//! Thin wrapper over a `tokio-tungstenite` websocket connection.
//!
//! Venue adapters and the stream-client state machine never touch
//! `tokio_tungstenite` directly; they speak in terms of [`WsMessage`] and
//! [`WebSocket`], which fold connect/send/receive/close failures into
//! [`SocketError`] and apply the timeouts spec.md §5 requires.

use crate::error::SocketError;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::Message as TungsteniteMessage,
};
use tracing::debug;
use url::Url;

/// Default handshake timeout: spec.md §5 `Connect` uses a 15s deadline.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default send timeout: spec.md §5 send operations use a 5s deadline.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

type InnerStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Transport-agnostic message sent or received over a [`WebSocket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

impl WsMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Borrow the text payload, if this is a [`WsMessage::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<WsMessage> for TungsteniteMessage {
    fn from(value: WsMessage) -> Self {
        match value {
            WsMessage::Text(text) => TungsteniteMessage::Text(text.into()),
            WsMessage::Binary(bytes) => TungsteniteMessage::Binary(bytes.into()),
            WsMessage::Ping(bytes) => TungsteniteMessage::Ping(bytes.into()),
            WsMessage::Pong(bytes) => TungsteniteMessage::Pong(bytes.into()),
        }
    }
}

impl TryFrom<TungsteniteMessage> for WsMessage {
    type Error = ();

    fn try_from(value: TungsteniteMessage) -> Result<Self, Self::Error> {
        match value {
            TungsteniteMessage::Text(text) => Ok(WsMessage::Text(text.to_string())),
            TungsteniteMessage::Binary(bytes) => Ok(WsMessage::Binary(bytes.into())),
            TungsteniteMessage::Ping(bytes) => Ok(WsMessage::Ping(bytes.into())),
            TungsteniteMessage::Pong(bytes) => Ok(WsMessage::Pong(bytes.into())),
            TungsteniteMessage::Close(_) | TungsteniteMessage::Frame(_) => Err(()),
        }
    }
}

/// A connected full-duplex websocket stream to a single venue endpoint.
pub struct WebSocket {
    inner: InnerStream,
}

impl WebSocket {
    /// Open a websocket connection, failing with [`SocketError::Timeout`] if
    /// the handshake does not complete within [`CONNECT_TIMEOUT`].
    pub async fn connect(url: &Url) -> Result<Self, SocketError> {
        debug!(%url, "opening websocket connection");
        let connect = connect_async(url.as_str());

        let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| SocketError::Timeout(CONNECT_TIMEOUT))?
            .map_err(|error| SocketError::Connect(Box::new(error)))?;

        Ok(Self { inner: stream })
    }

    /// Send a message, failing with [`SocketError::Timeout`] if the send
    /// does not complete within [`SEND_TIMEOUT`].
    pub async fn send(&mut self, message: WsMessage) -> Result<(), SocketError> {
        let send = self.inner.send(message.into());

        tokio::time::timeout(SEND_TIMEOUT, send)
            .await
            .map_err(|_| SocketError::Timeout(SEND_TIMEOUT))?
            .map_err(|error| SocketError::Send(Box::new(error)))
    }

    /// Await the next inbound frame. Returns `Ok(None)` when the peer closed
    /// the connection cleanly.
    pub async fn next(&mut self) -> Result<Option<WsMessage>, SocketError> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Ok(TungsteniteMessage::Close(_))) => return Ok(None),
                Some(Ok(message)) => match WsMessage::try_from(message) {
                    Ok(message) => return Ok(Some(message)),
                    Err(()) => continue,
                },
                Some(Err(error)) => return Err(SocketError::Receive(Box::new(error))),
            }
        }
    }

    /// Initiate a graceful close of the underlying connection.
    pub async fn close(&mut self) -> Result<(), SocketError> {
        self.inner
            .close(None)
            .await
            .map_err(|error| SocketError::Send(Box::new(error)))
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").finish_non_exhaustive()
    }
}
