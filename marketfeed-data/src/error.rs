use marketfeed_instrument::MarketParseError;
use thiserror::Error;

/// Unified error taxonomy for the stream-client state machine, the
/// order-book engine and venue adapters.
///
/// Propagation follows spec.md §7: the state machine swallows
/// [`MarketFeedError::Transport`], [`MarketFeedError::Protocol`] and
/// [`MarketFeedError::Parse`] internally (folding them into the observer and
/// the reconnect/quarantine machinery); only [`MarketFeedError::Argument`]
/// and [`MarketFeedError::Contract`] surface synchronously to the caller.
#[derive(Debug, Error)]
pub enum MarketFeedError {
    /// Connect/send/recv/close failure. Triggers reconnect.
    #[error("transport error: {0}")]
    Transport(#[from] marketfeed_integration::SocketError),

    /// The venue returned an explicit error frame. Surfaced via `OnError`,
    /// not fatal unless the venue marks it terminal.
    #[error("protocol error from venue: {0}")]
    Protocol(String),

    /// Payload shape did not match what the adapter expected. Counted
    /// towards the parse-failure quarantine threshold; the frame is
    /// dropped.
    #[error("failed to parse venue payload: {0}")]
    Parse(String),

    /// The caller asked for something the venue does not offer (eg/
    /// candles on Bitstamp, Kraken v2). Surfaced immediately; the subscribe
    /// call returns `false`.
    #[error("venue does not support requested operation: {0}")]
    Contract(String),

    /// Malformed symbol or otherwise invalid caller input. Thrown
    /// synchronously; no state change.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl From<MarketParseError> for MarketFeedError {
    fn from(value: MarketParseError) -> Self {
        Self::Argument(value.to_string())
    }
}

impl MarketFeedError {
    /// Whether this error should be folded into the parse-failure
    /// quarantine counter (spec.md §4.1 "Parse-failure quarantine").
    pub fn counts_toward_quarantine(&self) -> bool {
        matches!(self, MarketFeedError::Parse(_))
    }
}
