use thiserror::Error;

/// Low-level transport error taxonomy shared by every venue adapter's
/// websocket plumbing.
///
/// This sits below the higher-level `MarketFeedError` taxonomy in
/// `marketfeed-data`: it is what a `Connect`/send/receive/close over the
/// wire can fail with, before the stream-client state machine folds it into
/// the spec's `TransportError` category.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("websocket handshake failed: {0}")]
    Connect(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("websocket send failed: {0}")]
    Send(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("websocket receive failed: {0}")]
    Receive(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("websocket closed by peer")]
    Closed,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Receive(Box::new(value))
    }
}

/// Marker for errors that can never succeed on retry (eg/ a channel whose
/// receiver has been dropped). Used by [`crate::channel::ChannelTxDroppable`]
/// to decide when to permanently disable a sender rather than keep trying.
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}
