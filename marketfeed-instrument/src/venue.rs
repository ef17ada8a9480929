use serde::{Deserialize, Serialize};

/// Unique identifier for a market-data venue (a cryptocurrency exchange or
/// one of its distinct API surfaces).
///
/// A venue may expose more than one distinct public stream API for
/// different instrument kinds (eg/ Kraken spot vs Kraken futures), in which
/// case each is represented as its own variant.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueId {
    Kraken,
    Bitfinex,
    Bitstamp,
    Mexc,
    Binance,
    BinanceUs,
    Bitget,
    Bitmart,
    Bitso,
    Bitvavo,
    Bithumb,
    Bybit,
    Cexio,
    Coinbase,
    Cryptocom,
    Deribit,
    Gateio,
    Gemini,
    Hitbtc,
    #[serde(alias = "huobi")]
    Htx,
    Kucoin,
    Okx,
    Poloniex,
    Hyperliquid,
    Upbit,
    Bittrex,
    Other,
}

impl VenueId {
    /// Return the `&str` representation of this [`VenueId`].
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Kraken => "kraken",
            VenueId::Bitfinex => "bitfinex",
            VenueId::Bitstamp => "bitstamp",
            VenueId::Mexc => "mexc",
            VenueId::Binance => "binance",
            VenueId::BinanceUs => "binance_us",
            VenueId::Bitget => "bitget",
            VenueId::Bitmart => "bitmart",
            VenueId::Bitso => "bitso",
            VenueId::Bitvavo => "bitvavo",
            VenueId::Bithumb => "bithumb",
            VenueId::Bybit => "bybit",
            VenueId::Cexio => "cexio",
            VenueId::Coinbase => "coinbase",
            VenueId::Cryptocom => "cryptocom",
            VenueId::Deribit => "deribit",
            VenueId::Gateio => "gateio",
            VenueId::Gemini => "gemini",
            VenueId::Hitbtc => "hitbtc",
            VenueId::Htx => "htx",
            VenueId::Kucoin => "kucoin",
            VenueId::Okx => "okx",
            VenueId::Poloniex => "poloniex",
            VenueId::Hyperliquid => "hyperliquid",
            VenueId::Upbit => "upbit",
            VenueId::Bittrex => "bittrex",
            VenueId::Other => "other",
        }
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
