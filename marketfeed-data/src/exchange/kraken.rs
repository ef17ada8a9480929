//! Kraken v2 websocket adapter.
//!
//! See docs: <https://docs.kraken.com/api/docs/websocket-v2/book>
//!
//! Kraken groups subscribe requests by channel ("one frame per {ticker,
//! book, trade} containing the symbol array") and identifies snapshot vs
//! update frames by an explicit `"type"` field rather than by shape.

use crate::books::Level;
use crate::books::OrderBookEvent;
use crate::client::{AdapterContext, VenueAdapter};
use crate::error::MarketFeedError;
use crate::model::{Side, Ticker, Trade, TradeBatch};
use crate::subscription::{Channel, SubscriptionKey};
use marketfeed_instrument::{Market, VenueId};
use marketfeed_integration::WsMessage;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use url::Url;

pub const PUBLIC_URL: &str = "wss://ws.kraken.com/v2";
const PING_INTERVAL_MS: u64 = 20_000;

#[derive(Debug, Default)]
pub struct KrakenAdapter;

impl KrakenAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl VenueAdapter for KrakenAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::Kraken
    }

    fn public_url(&self) -> Url {
        Url::parse(PUBLIC_URL).expect("static Kraken v2 URL is valid")
    }

    fn ping_interval_ms(&self) -> u64 {
        PING_INTERVAL_MS
    }

    fn format_symbol(&self, market: &Market) -> String {
        market.to_string()
    }

    fn create_ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text(json!({"method": "ping"}).to_string()))
    }

    fn supports_batch_subscription(&self) -> bool {
        true
    }

    fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError> {
        // Group symbols by channel name, one frame per group.
        let mut groups: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for key in keys {
            let channel = kraken_channel_name(&key.channel)?;
            groups.entry(channel).or_default().push(self.format_symbol(&key.market));
        }

        Ok(groups
            .into_iter()
            .map(|(channel, symbols)| {
                let mut params = json!({ "channel": channel, "symbol": symbols });
                if channel == "book" {
                    params["depth"] = json!(25);
                    params["snapshot"] = json!(true);
                }
                WsMessage::text(json!({ "method": "subscribe", "params": params }).to_string())
            })
            .collect())
    }

    fn build_unsubscribe_frame(&self, key: &SubscriptionKey) -> Option<WsMessage> {
        let channel = kraken_channel_name(&key.channel).ok()?;
        Some(WsMessage::text(
            json!({
                "method": "unsubscribe",
                "params": { "channel": channel, "symbol": [self.format_symbol(&key.market)] }
            })
            .to_string(),
        ))
    }

    fn process_message(&self, message: &WsMessage, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let Some(text) = message.as_text() else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(text).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        // Acks (`{"method": "subscribe", "success": true, ...}`) and pongs
        // carry no `"channel"` field; ignore them here.
        let Some(channel) = value.get("channel").and_then(Value::as_str) else {
            return Ok(());
        };

        match channel {
            "book" => self.process_book(&value, ctx),
            "ticker" => self.process_ticker(&value, ctx),
            "trade" => self.process_trade(&value, ctx),
            _ => Ok(()),
        }
    }
}

fn kraken_channel_name(channel: &Channel) -> Result<&'static str, MarketFeedError> {
    match channel {
        Channel::Ticker => Ok("ticker"),
        Channel::Orderbook => Ok("book"),
        Channel::Trades => Ok("trade"),
        Channel::Candles(_) => Err(MarketFeedError::Contract("Kraken v2 candles not supported by this adapter".into())),
    }
}

#[derive(Debug, Deserialize)]
struct KrakenBookRow {
    price: Decimal,
    qty: Decimal,
}

#[derive(Debug, Deserialize)]
struct KrakenBookData {
    symbol: String,
    #[serde(default)]
    bids: Vec<KrakenBookRow>,
    #[serde(default)]
    asks: Vec<KrakenBookRow>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KrakenTickerData {
    symbol: String,
    bid: Decimal,
    bid_qty: Decimal,
    ask: Decimal,
    ask_qty: Decimal,
    last: Decimal,
    volume: Decimal,
    low: Decimal,
    high: Decimal,
    change_pct: Decimal,
}

#[derive(Debug, Deserialize)]
struct KrakenTradeData {
    symbol: String,
    side: String,
    price: Decimal,
    qty: Decimal,
    ord_type: Option<String>,
    trade_id: i64,
    timestamp: Option<String>,
}

impl KrakenAdapter {
    fn process_book(&self, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("update");
        let rows: Vec<KrakenBookData> = serde_json::from_value(value["data"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        for row in rows {
            let market = parse_market(&row.symbol)?;
            let time_exchange_ms = row.timestamp.as_deref().and_then(parse_rfc3339_ms).unwrap_or(0);
            let bids: Vec<Level> = row.bids.iter().map(|l| Level::new(l.price, l.qty)).collect();
            let asks: Vec<Level> = row.asks.iter().map(|l| Level::new(l.price, l.qty)).collect();

            let event = if kind == "snapshot" {
                OrderBookEvent::Snapshot { bids, asks, time_exchange_ms }
            } else {
                OrderBookEvent::Update { bids, asks, time_exchange_ms }
            };
            ctx.apply_orderbook(&market, event);
        }
        Ok(())
    }

    fn process_ticker(&self, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let rows: Vec<KrakenTickerData> = serde_json::from_value(value["data"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        for row in rows {
            let market = parse_market(&row.symbol)?;
            ctx.sink.emit(crate::client::MarketEvent::Ticker(Ticker {
                venue: VenueId::Kraken,
                market,
                time_exchange_ms: 0,
                best_bid_price: row.bid,
                best_bid_quantity: row.bid_qty,
                best_ask_price: row.ask,
                best_ask_quantity: row.ask_qty,
                last_price: Some(row.last),
                high_24h: Some(row.high),
                low_24h: Some(row.low),
                volume_24h: Some(row.volume),
                price_change_pct_24h: Some(row.change_pct),
            }));
        }
        Ok(())
    }

    fn process_trade(&self, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let rows: Vec<KrakenTradeData> = serde_json::from_value(value["data"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let mut by_market: BTreeMap<Market, Vec<Trade>> = BTreeMap::new();
        for row in rows {
            let market = parse_market(&row.symbol)?;
            let side = if row.side.eq_ignore_ascii_case("buy") { Side::Bid } else { Side::Ask };
            let time_exchange_ms = row.timestamp.as_deref().and_then(parse_rfc3339_ms).unwrap_or(0);
            by_market.entry(market).or_default().push(Trade {
                id: row.trade_id.to_string(),
                time_exchange_ms,
                side,
                order_type: row.ord_type,
                price: row.price,
                quantity: row.qty,
                amount: row.price * row.qty,
            });
        }
        for (market, trades) in by_market {
            ctx.sink.emit(crate::client::MarketEvent::Trades(TradeBatch { venue: VenueId::Kraken, market, trades }));
        }
        Ok(())
    }
}

fn parse_market(symbol: &str) -> Result<Market, MarketFeedError> {
    Market::parse(symbol).map_err(Into::into)
}

fn parse_rfc3339_ms(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Observer;
    use crate::books::manager::OrderBookManager;
    use crate::client::EventSink;

    fn ctx<'a>(books: &'a OrderBookManager, sink: &'a EventSink) -> AdapterContext<'a> {
        AdapterContext { books, sink }
    }

    #[test]
    fn test_build_subscribe_frames_groups_by_channel() {
        let adapter = KrakenAdapter::new();
        let keys = vec![
            SubscriptionKey::new(Channel::Orderbook, Market::new("BTC", "USD")),
            SubscriptionKey::new(Channel::Orderbook, Market::new("ETH", "USD")),
        ];
        let frames = adapter.build_subscribe_frames(&keys).unwrap();
        assert_eq!(frames.len(), 1);
        let text = frames[0].as_text().unwrap();
        assert!(text.contains("\"channel\":\"book\""));
        assert!(text.contains("BTC/USD"));
        assert!(text.contains("ETH/USD"));
    }

    #[test]
    fn test_candles_subscription_is_a_contract_error() {
        let adapter = KrakenAdapter::new();
        let keys = vec![SubscriptionKey::new(Channel::Candles("1m".into()), Market::new("BTC", "USD"))];
        assert!(matches!(adapter.build_subscribe_frames(&keys), Err(MarketFeedError::Contract(_))));
    }

    #[test]
    fn test_process_book_snapshot_then_update() {
        let adapter = KrakenAdapter::new();
        let books = OrderBookManager::new();
        let sink = EventSink::new();
        let _observer = Observer::new();

        let snapshot = r#"{"channel":"book","type":"snapshot","data":[{"symbol":"BTC/USD","bids":[{"price":50003,"qty":1}],"asks":[{"price":50005,"qty":1}]}]}"#;
        adapter.process_message(&WsMessage::text(snapshot), &ctx(&books, &sink)).unwrap();

        let book = books.snapshot(&Market::new("BTC", "USD")).unwrap();
        assert_eq!(book.best_bid().unwrap().price, rust_decimal_macros::dec!(50003));

        let update = r#"{"channel":"book","type":"update","data":[{"symbol":"BTC/USD","bids":[{"price":50003,"qty":0}],"asks":[]}]}"#;
        adapter.process_message(&WsMessage::text(update), &ctx(&books, &sink)).unwrap();
        let book = books.snapshot(&Market::new("BTC", "USD")).unwrap();
        assert!(book.best_bid().is_none());
    }
}
