//! Bitstamp websocket adapter.
//!
//! See docs: <https://www.bitstamp.net/websocket/v2/>
//!
//! Bitstamp never sends an application-level ping, instead pushing its own
//! heartbeat frames; per spec.md §9's Open Question resolution this adapter
//! relies solely on the inbound-heartbeat deadline and never falls back to
//! a transport-level ping (see DESIGN.md). It requires one frame per
//! subscription and offers no candle channel.

use crate::books::{Level, OrderBookEvent};
use crate::client::{AdapterContext, MarketEvent, VenueAdapter};
use crate::error::MarketFeedError;
use crate::model::{Side, Trade, TradeBatch};
use crate::subscription::{Channel, SubscriptionKey};
use marketfeed_instrument::{Market, VenueId};
use marketfeed_integration::WsMessage;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

pub const PUBLIC_URL: &str = "wss://ws.bitstamp.net";
const PING_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Default)]
pub struct BitstampAdapter;

impl BitstampAdapter {
    pub fn new() -> Self {
        Self
    }

    fn lowercase_symbol(market: &Market) -> String {
        marketfeed_instrument::symbol::to_concat_lower(market.base(), market.quote())
    }

    fn channel_name(channel: &Channel, market: &Market) -> Result<String, MarketFeedError> {
        let symbol = Self::lowercase_symbol(market);
        match channel {
            Channel::Trades => Ok(format!("live_trades_{symbol}")),
            Channel::Orderbook => Ok(format!("diff_order_book_{symbol}")),
            Channel::Ticker => Ok(format!("live_ticker_{symbol}")),
            Channel::Candles(_) => Err(MarketFeedError::Contract("Bitstamp does not offer a candle channel".into())),
        }
    }
}

impl VenueAdapter for BitstampAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::Bitstamp
    }

    fn public_url(&self) -> Url {
        Url::parse(PUBLIC_URL).expect("static Bitstamp URL is valid")
    }

    fn ping_interval_ms(&self) -> u64 {
        PING_INTERVAL_MS
    }

    fn format_symbol(&self, market: &Market) -> String {
        Self::lowercase_symbol(market)
    }

    /// Bitstamp has no client-initiated ping; the heartbeat task relies
    /// entirely on the inbound-frame deadline.
    fn create_ping_message(&self) -> Option<WsMessage> {
        None
    }

    fn supports_batch_subscription(&self) -> bool {
        false
    }

    fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError> {
        keys.iter()
            .map(|key| {
                let channel = Self::channel_name(&key.channel, &key.market)?;
                Ok(WsMessage::text(json!({ "event": "bts:subscribe", "data": { "channel": channel } }).to_string()))
            })
            .collect()
    }

    fn build_unsubscribe_frame(&self, key: &SubscriptionKey) -> Option<WsMessage> {
        let channel = Self::channel_name(&key.channel, &key.market).ok()?;
        Some(WsMessage::text(json!({ "event": "bts:unsubscribe", "data": { "channel": channel } }).to_string()))
    }

    fn process_message(&self, message: &WsMessage, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let Some(text) = message.as_text() else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(text).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        let event = value.get("event").and_then(Value::as_str).unwrap_or_default();
        let channel = value.get("channel").and_then(Value::as_str).unwrap_or_default();

        match event {
            "bts:subscription_succeeded" | "bts:heartbeat" | "bts:request_reconnect" => Ok(()),
            "data" if channel.starts_with("diff_order_book_") || channel.starts_with("order_book_") => {
                self.process_book(channel, &value["data"], event == "data" && channel.starts_with("order_book_"), ctx)
            }
            "trade" if channel.starts_with("live_trades_") => self.process_trade(channel, &value["data"], ctx),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BitstampBookData {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
    microtimestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitstampTradeData {
    id: i64,
    price: f64,
    amount: f64,
    #[serde(rename = "type")]
    side: i64,
    microtimestamp: String,
}

impl BitstampAdapter {
    fn process_book(&self, channel: &str, data: &Value, is_snapshot: bool, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let parsed: BitstampBookData = serde_json::from_value(data.clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let time_exchange_ms = parsed
            .microtimestamp
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|micros| micros / 1000)
            .unwrap_or(0);

        let to_levels = |rows: &[[String; 2]]| -> Result<Vec<Level>, MarketFeedError> {
            rows.iter()
                .map(|[price, qty]| {
                    let price: Decimal = price.parse().map_err(|e: rust_decimal::Error| MarketFeedError::Parse(e.to_string()))?;
                    let qty: Decimal = qty.parse().map_err(|e: rust_decimal::Error| MarketFeedError::Parse(e.to_string()))?;
                    Ok(Level::new(price, qty))
                })
                .collect()
        };

        let bids = to_levels(&parsed.bids)?;
        let asks = to_levels(&parsed.asks)?;

        let event = if is_snapshot {
            OrderBookEvent::Snapshot { bids, asks, time_exchange_ms }
        } else {
            OrderBookEvent::Update { bids, asks, time_exchange_ms }
        };
        ctx.apply_orderbook(&market, event);
        Ok(())
    }

    fn process_trade(&self, channel: &str, data: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let parsed: BitstampTradeData = serde_json::from_value(data.clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let side = if parsed.side == 0 { Side::Bid } else { Side::Ask };
        let price = Decimal::try_from(parsed.price).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let quantity = Decimal::try_from(parsed.amount).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let time_exchange_ms = parsed.microtimestamp.parse::<i64>().unwrap_or(0) / 1000;

        ctx.sink.emit(MarketEvent::Trades(TradeBatch {
            venue: VenueId::Bitstamp,
            market,
            trades: vec![Trade {
                id: parsed.id.to_string(),
                time_exchange_ms,
                side,
                order_type: None,
                price,
                quantity,
                amount: price * quantity,
            }],
        }));
        Ok(())
    }
}

/// Recover the `Market` from a Bitstamp channel name like
/// `diff_order_book_btcusd`, via `marketfeed_instrument::symbol`'s
/// recognized-quote suffix table.
fn market_from_channel(channel: &str) -> Result<Market, MarketFeedError> {
    let symbol = channel.rsplit('_').next().ok_or_else(|| MarketFeedError::Parse(format!("malformed channel name: {channel}")))?;
    Market::parse(&marketfeed_instrument::symbol::normalize(symbol)).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::manager::OrderBookManager;
    use crate::client::EventSink;
    use rust_decimal_macros::dec;

    fn ctx<'a>(books: &'a OrderBookManager, sink: &'a EventSink) -> AdapterContext<'a> {
        AdapterContext { books, sink }
    }

    #[test]
    fn test_candles_unsupported() {
        let adapter = BitstampAdapter::new();
        let keys = vec![SubscriptionKey::new(Channel::Candles("1m".into()), Market::new("BTC", "USD"))];
        assert!(matches!(adapter.build_subscribe_frames(&keys), Err(MarketFeedError::Contract(_))));
    }

    #[test]
    fn test_no_ping_message() {
        assert!(BitstampAdapter::new().create_ping_message().is_none());
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let adapter = BitstampAdapter::new();
        let keys = vec![SubscriptionKey::new(Channel::Orderbook, Market::new("BTC", "USD"))];
        let frames = adapter.build_subscribe_frames(&keys).unwrap();
        assert!(frames[0].as_text().unwrap().contains("diff_order_book_btcusd"));
    }

    #[test]
    fn test_process_snapshot_then_diff_merge() {
        let adapter = BitstampAdapter::new();
        let books = OrderBookManager::new();
        let sink = EventSink::new();
        let market = Market::new("BTC", "USD");

        let snapshot = serde_json::json!({
            "event": "data",
            "channel": "order_book_btcusd",
            "data": { "bids": [["50003", "1"]], "asks": [["50005", "1"]], "microtimestamp": "1000000" }
        });
        adapter
            .process_book("order_book_btcusd", &snapshot["data"], true, &ctx(&books, &sink))
            .unwrap();

        let diff = serde_json::json!({ "bids": [["50003", "0"]], "asks": [], "microtimestamp": "2000000" });
        adapter.process_book("diff_order_book_btcusd", &diff, false, &ctx(&books, &sink)).unwrap();

        let book = books.snapshot(&market).unwrap();
        assert!(book.best_bid().is_none());
        assert_eq!(book.best_ask().unwrap().price, dec!(50005));
    }
}
