//! Normalised market-data shapes common to every venue: ticker, trade and
//! candle records. Order-book shapes live in [`crate::books`].

use chrono::{DateTime, Utc};
use marketfeed_instrument::{Market, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which side of the book a trade or order-book level sits on.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// Best bid/ask plus rolling 24h stats for a symbol, as published by a
/// venue's ticker channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: VenueId,
    pub market: Market,
    pub time_exchange_ms: i64,
    pub best_bid_price: Decimal,
    pub best_bid_quantity: Decimal,
    pub best_ask_price: Decimal,
    pub best_ask_quantity: Decimal,
    pub last_price: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub price_change_pct_24h: Option<Decimal>,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub time_exchange_ms: i64,
    pub side: Side,
    pub order_type: Option<String>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub amount: Decimal,
}

/// A batch of trades delivered together on a venue's trade channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeBatch {
    pub venue: VenueId,
    pub market: Market,
    pub trades: Vec<Trade>,
}

/// A single OHLCV candle for a subscribed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub venue: VenueId,
    pub market: Market,
    pub interval: String,
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub is_closed: bool,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_epoch_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
