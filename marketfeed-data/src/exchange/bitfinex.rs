//! Bitfinex v2 websocket adapter.
//!
//! See docs: <https://docs.bitfinex.com/docs/ws-general>
//!
//! Bitfinex identifies data frames by a numeric channel id assigned at
//! subscribe-ack time, not by name, so the adapter keeps a small
//! chanId -> subscription table. It requires one frame per subscription
//! (no batching) and encodes book rows with Bitfinex's signed-amount
//! convention: `count == 0` deletes, the sign of `amount` selects bid vs
//! ask, and `|amount|` is the resting quantity.

use crate::books::{decode_bitfinex_row, Level, OrderBookEvent};
use crate::client::{AdapterContext, MarketEvent, VenueAdapter};
use crate::error::MarketFeedError;
use crate::model::{Side, Ticker, Trade, TradeBatch};
use crate::subscription::{Channel, SubscriptionKey};
use marketfeed_instrument::{Market, VenueId};
use marketfeed_integration::WsMessage;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use url::Url;

pub const PUBLIC_URL: &str = "wss://api-pub.bitfinex.com/ws/2";
const PING_INTERVAL_MS: u64 = 15_000;

#[derive(Debug, Default)]
pub struct BitfinexAdapter {
    /// chanId -> (channel kind, market), populated from subscribe acks.
    channels: Mutex<HashMap<i64, (Channel, Market)>>,
}

impl BitfinexAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bitfinex_symbol(market: &Market) -> String {
        marketfeed_instrument::symbol::to_bitfinex(market.base(), market.quote())
    }

    fn bitfinex_channel_name(channel: &Channel) -> Result<&'static str, MarketFeedError> {
        match channel {
            Channel::Ticker => Ok("ticker"),
            Channel::Orderbook => Ok("book"),
            Channel::Trades => Ok("trades"),
            Channel::Candles(_) => Err(MarketFeedError::Contract("Bitfinex candles not implemented by this adapter".into())),
        }
    }
}

impl VenueAdapter for BitfinexAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::Bitfinex
    }

    fn public_url(&self) -> Url {
        Url::parse(PUBLIC_URL).expect("static Bitfinex URL is valid")
    }

    fn ping_interval_ms(&self) -> u64 {
        PING_INTERVAL_MS
    }

    fn format_symbol(&self, market: &Market) -> String {
        Self::bitfinex_symbol(market)
    }

    fn create_ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text(json!({"event": "ping"}).to_string()))
    }

    fn supports_batch_subscription(&self) -> bool {
        false
    }

    fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError> {
        keys.iter()
            .map(|key| {
                let channel = Self::bitfinex_channel_name(&key.channel)?;
                let symbol = Self::bitfinex_symbol(&key.market);
                let mut frame = json!({ "event": "subscribe", "channel": channel, "symbol": symbol });
                if channel == "book" {
                    frame["prec"] = json!("P0");
                    frame["freq"] = json!("F0");
                    frame["len"] = json!("25");
                }
                Ok(WsMessage::text(frame.to_string()))
            })
            .collect()
    }

    fn build_unsubscribe_frame(&self, key: &SubscriptionKey) -> Option<WsMessage> {
        let chan_id = self
            .channels
            .lock()
            .iter()
            .find(|(_, (channel, market))| *channel == key.channel && market == &key.market)
            .map(|(id, _)| *id)?;
        Some(WsMessage::text(json!({ "event": "unsubscribe", "chanId": chan_id }).to_string()))
    }

    fn process_message(&self, message: &WsMessage, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let Some(text) = message.as_text() else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(text).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        if value.is_object() {
            return self.process_event_frame(&value);
        }

        let array = value.as_array().ok_or_else(|| MarketFeedError::Parse("expected array frame".into()))?;
        let chan_id = array.first().and_then(Value::as_i64).ok_or_else(|| MarketFeedError::Parse("missing chanId".into()))?;

        // `[chanId, "hb"]` heartbeat frame: nothing to parse.
        if array.get(1).and_then(Value::as_str) == Some("hb") {
            return Ok(());
        }

        let Some((channel, market)) = self.channels.lock().get(&chan_id).cloned() else {
            return Ok(());
        };

        match channel {
            Channel::Orderbook => self.process_book(array, &market, ctx),
            Channel::Ticker => self.process_ticker(array, &market, ctx),
            Channel::Trades => self.process_trades(array, &market, ctx),
            Channel::Candles(_) => Ok(()),
        }
    }
}

impl BitfinexAdapter {
    fn process_event_frame(&self, value: &Value) -> Result<(), MarketFeedError> {
        if value.get("event").and_then(Value::as_str) == Some("subscribed") {
            let chan_id = value.get("chanId").and_then(Value::as_i64).ok_or_else(|| MarketFeedError::Parse("ack missing chanId".into()))?;
            let channel_name = value.get("channel").and_then(Value::as_str).unwrap_or_default();
            let symbol = value.get("symbol").or_else(|| value.get("key")).and_then(Value::as_str).unwrap_or_default();
            let market = parse_bitfinex_symbol(symbol)?;
            let channel = match channel_name {
                "book" => Channel::Orderbook,
                "ticker" => Channel::Ticker,
                "trades" => Channel::Trades,
                other => return Err(MarketFeedError::Protocol(format!("unrecognised ack channel: {other}"))),
            };
            self.channels.lock().insert(chan_id, (channel, market));
        }
        Ok(())
    }

    fn process_book(&self, array: &[Value], market: &Market, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let payload = &array[1];
        let rows = payload.as_array().ok_or_else(|| MarketFeedError::Parse("book payload not an array".into()))?;

        // Snapshot: array of [price, count, amount] rows. Update: a single
        // [price, count, amount] row (no nested array).
        let is_snapshot = rows.first().map(Value::is_array).unwrap_or(false);
        let row_values: Vec<&Value> = if is_snapshot { rows.iter().collect() } else { vec![payload] };

        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for row in row_values {
            let fields = row.as_array().ok_or_else(|| MarketFeedError::Parse("book row not an array".into()))?;
            let price = field_decimal(fields, 0)?;
            let count = fields.get(1).and_then(Value::as_i64).unwrap_or(0);
            let amount = field_decimal(fields, 2)?;
            let (side, level) = decode_bitfinex_row(price, count, amount);
            match side {
                Side::Bid => bids.push(level),
                Side::Ask => asks.push(level),
            }
        }

        let event = if is_snapshot {
            OrderBookEvent::Snapshot { bids, asks, time_exchange_ms: 0 }
        } else {
            OrderBookEvent::Update { bids, asks, time_exchange_ms: 0 }
        };
        ctx.apply_orderbook(market, event);
        Ok(())
    }

    fn process_ticker(&self, array: &[Value], market: &Market, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let fields = array[1].as_array().ok_or_else(|| MarketFeedError::Parse("ticker payload not an array".into()))?;
        if fields.len() < 10 {
            return Err(MarketFeedError::Parse("ticker payload too short".into()));
        }
        ctx.sink.emit(MarketEvent::Ticker(Ticker {
            venue: VenueId::Bitfinex,
            market: market.clone(),
            time_exchange_ms: 0,
            best_bid_price: field_decimal(fields, 0)?,
            best_bid_quantity: field_decimal(fields, 1)?,
            best_ask_price: field_decimal(fields, 2)?,
            best_ask_quantity: field_decimal(fields, 3)?,
            last_price: Some(field_decimal(fields, 6)?),
            high_24h: Some(field_decimal(fields, 8)?),
            low_24h: Some(field_decimal(fields, 9)?),
            volume_24h: Some(field_decimal(fields, 7)?),
            price_change_pct_24h: Some(field_decimal(fields, 5)?),
        }));
        Ok(())
    }

    fn process_trades(&self, array: &[Value], market: &Market, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        // Snapshot: [chanId, [[ID, MTS, AMOUNT, PRICE], ...]]. Update:
        // [chanId, "te"|"tu", [ID, MTS, AMOUNT, PRICE]].
        let rows: Vec<Vec<Value>> = if let Some(label) = array.get(1).and_then(Value::as_str) {
            if label == "tu" {
                // Trade-update echoes the same trade as "te"; skip to avoid double counting.
                return Ok(());
            }
            let fields = array.get(2).and_then(Value::as_array).ok_or_else(|| MarketFeedError::Parse("trade update missing fields".into()))?;
            vec![fields.clone()]
        } else {
            array[1]
                .as_array()
                .ok_or_else(|| MarketFeedError::Parse("trade snapshot not an array".into()))?
                .iter()
                .map(|row| row.as_array().cloned().unwrap_or_default())
                .collect()
        };

        let mut trades = Vec::with_capacity(rows.len());
        for fields in rows {
            let id = fields.first().and_then(Value::as_i64).unwrap_or_default();
            let time_exchange_ms = fields.get(1).and_then(Value::as_i64).unwrap_or(0);
            let amount = field_decimal(&fields, 2)?;
            let price = field_decimal(&fields, 3)?;
            let side = if amount.is_sign_positive() { Side::Bid } else { Side::Ask };
            trades.push(Trade {
                id: id.to_string(),
                time_exchange_ms,
                side,
                order_type: None,
                price,
                quantity: amount.abs(),
                amount: price * amount.abs(),
            });
        }

        if !trades.is_empty() {
            ctx.sink.emit(MarketEvent::Trades(TradeBatch { venue: VenueId::Bitfinex, market: market.clone(), trades }));
        }
        Ok(())
    }
}

fn field_decimal(fields: &[Value], index: usize) -> Result<Decimal, MarketFeedError> {
    fields
        .get(index)
        .and_then(|v| v.as_f64().map(|f| f.to_string()).or_else(|| v.as_str().map(str::to_string)))
        .ok_or_else(|| MarketFeedError::Parse(format!("missing field at index {index}")))?
        .parse::<Decimal>()
        .map_err(|e| MarketFeedError::Parse(e.to_string()))
}

/// Bitfinex symbols are `t` + concatenated base/quote, eg `tBTCUSD`. There
/// is no delimiter, so recognition relies on `marketfeed_instrument::symbol`'s
/// recognized-quote suffix table.
fn parse_bitfinex_symbol(symbol: &str) -> Result<Market, MarketFeedError> {
    let body = symbol.strip_prefix('t').unwrap_or(symbol);
    Market::parse(&marketfeed_instrument::symbol::normalize(body)).map_err(Into::into)
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
    fn test_subscribe_frame_has_book_precision_fields() {
        let adapter = BitfinexAdapter::new();
        let keys = vec![SubscriptionKey::new(Channel::Orderbook, Market::new("BTC", "USD"))];
        let frames = adapter.build_subscribe_frames(&keys).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].as_text().unwrap().contains("\"symbol\":\"tBTCUSD\""));
    }

    #[test]
    fn test_signed_amount_snapshot_then_delete_then_reinsert() {
        let adapter = BitfinexAdapter::new();
        let books = OrderBookManager::new();
        let sink = EventSink::new();
        let market = Market::new("BTC", "USD");

        adapter
            .process_event_frame(&serde_json::json!({"event":"subscribed","channel":"book","chanId":5,"symbol":"tBTCUSD"}))
            .unwrap();

        let snapshot = serde_json::json!([5, [[50000, 2, 1.5], [50004, 3, -2.0]]]);
        let array: Vec<Value> = snapshot.as_array().unwrap().clone();
        adapter.process_book(&array, &market, &ctx(&books, &sink)).unwrap();

        let book = books.snapshot(&market).unwrap();
        assert_eq!(book.best_bid().unwrap().price, dec!(50000));
        assert_eq!(book.best_ask().unwrap().price, dec!(50004));

        let delete = serde_json::json!([5, [50000, 0, 1.5]]);
        let array: Vec<Value> = delete.as_array().unwrap().clone();
        adapter.process_book(&array, &market, &ctx(&books, &sink)).unwrap();
        let book = books.snapshot(&market).unwrap();
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn test_parse_bitfinex_symbol() {
        assert_eq!(parse_bitfinex_symbol("tBTCUSD").unwrap(), Market::new("BTC", "USD"));
    }
}
