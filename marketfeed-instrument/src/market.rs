use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Immutable base/quote currency pair identifying a tradeable market.
///
/// Equality and hashing are structural over the (base, quote) pair. The
/// canonical textual form is `BASE/QUOTE`, always uppercase. Venue-specific
/// renderings (`tBTCUSD`, `btcusd`, `BTCUSDT`, `KRW-BTC`, `BTC_USDT`, ...)
/// are derived on demand by venue adapters and are never stored here.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Market {
    base: String,
    quote: String,
}

/// Error returned when a textual market identifier cannot be parsed.
///
/// Maps onto the `ArgumentError` category of the stream-client error
/// taxonomy: thrown synchronously, no state change.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MarketParseError {
    #[error("market identifier must contain exactly one '/', got: {0:?}")]
    InvalidFormat(String),
    #[error("market identifier base/quote must be non-empty, got: {0:?}")]
    EmptyComponent(String),
}

impl Market {
    /// Construct a new [`Market`], uppercasing both components.
    ///
    /// Panics are never used for invalid input here: use [`Market::parse`]
    /// when the components come from an untrusted textual source.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_ascii_uppercase(),
            quote: quote.into().to_ascii_uppercase(),
        }
    }

    /// Parse a canonical `BASE/QUOTE` textual market identifier.
    ///
    /// Requires exactly one `/`; any other shape is a [`MarketParseError`].
    pub fn parse(input: &str) -> Result<Self, MarketParseError> {
        let mut parts = input.split('/');
        let (Some(base), Some(quote), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MarketParseError::InvalidFormat(input.to_string()));
        };

        if base.is_empty() || quote.is_empty() {
            return Err(MarketParseError::EmptyComponent(input.to_string()));
        }

        Ok(Self::new(base, quote))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Market {
    type Err = MarketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Market {
    type Error = MarketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Market> for String {
    fn from(market: Market) -> Self {
        market.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let market = Market::parse("BTC/USDT").unwrap();
        assert_eq!(market.base(), "BTC");
        assert_eq!(market.quote(), "USDT");
    }

    #[test]
    fn test_parse_lowercase_uppercased() {
        let market = Market::parse("btc/usdt").unwrap();
        assert_eq!(market, Market::new("BTC", "USDT"));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(Market::parse("BTCUSDT").is_err());
    }

    #[test]
    fn test_parse_rejects_dash() {
        assert!(Market::parse("BTC-USDT").is_err());
    }

    #[test]
    fn test_parse_rejects_extra_separator() {
        assert!(Market::parse("BTC/USDT/ETH").is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Market::parse("").is_err());
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(Market::new("BTC", "USDT"), Market::new("BTC", "USDT"));
        assert_ne!(Market::new("BTC", "USDT"), Market::new("BTC", "KRW"));
    }

    #[test]
    fn test_display_canonical_form() {
        assert_eq!(Market::new("btc", "usdt").to_string(), "BTC/USDT");
    }
}
