//! MEXC spot websocket adapter.
//!
//! See docs: <https://mexcdevelop.github.io/apidocs/spot_v3_en/#websocket-market-streams>
//!
//! MEXC coalesces every channel into a single `SUBSCRIPTION` frame
//! regardless of channel kind, the opposite of Kraken's per-channel
//! grouping, and expects an application-level `PING` every 20s.

use crate::books::Level;
use crate::books::OrderBookEvent;
use crate::client::{AdapterContext, MarketEvent, VenueAdapter};
use crate::error::MarketFeedError;
use crate::model::{Side, Ticker, Trade, TradeBatch};
use crate::subscription::{Channel, SubscriptionKey};
use marketfeed_instrument::{Market, VenueId};
use marketfeed_integration::WsMessage;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

pub const PUBLIC_URL: &str = "wss://wbs.mexc.com/ws";
const PING_INTERVAL_MS: u64 = 20_000;

#[derive(Debug, Default)]
pub struct MexcAdapter;

impl MexcAdapter {
    pub fn new() -> Self {
        Self
    }

    fn param(channel: &Channel, symbol: &str) -> Result<String, MarketFeedError> {
        match channel {
            Channel::Ticker => Ok(format!("spot@public.bookTicker.v3.api@{symbol}")),
            Channel::Orderbook => Ok(format!("spot@public.limit.depth.v3.api@{symbol}@20")),
            Channel::Trades => Ok(format!("spot@public.deals.v3.api@{symbol}")),
            Channel::Candles(interval) => Ok(format!("spot@public.kline.v3.api@{symbol}@{}", mexc_interval(interval)?)),
        }
    }
}

impl VenueAdapter for MexcAdapter {
    fn venue_id(&self) -> VenueId {
        VenueId::Mexc
    }

    fn public_url(&self) -> Url {
        Url::parse(PUBLIC_URL).expect("static MEXC URL is valid")
    }

    fn ping_interval_ms(&self) -> u64 {
        PING_INTERVAL_MS
    }

    fn format_symbol(&self, market: &Market) -> String {
        marketfeed_instrument::symbol::to_concat_upper(market.base(), market.quote())
    }

    fn create_ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text(json!({ "method": "PING" }).to_string()))
    }

    fn supports_batch_subscription(&self) -> bool {
        true
    }

    fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError> {
        let params = keys
            .iter()
            .map(|key| Self::param(&key.channel, &self.format_symbol(&key.market)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vec![WsMessage::text(json!({ "method": "SUBSCRIPTION", "params": params }).to_string())])
    }

    fn build_unsubscribe_frame(&self, key: &SubscriptionKey) -> Option<WsMessage> {
        let param = Self::param(&key.channel, &self.format_symbol(&key.market)).ok()?;
        Some(WsMessage::text(json!({ "method": "UNSUBSCRIPTION", "params": [param] }).to_string()))
    }

    fn process_message(&self, message: &WsMessage, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let Some(text) = message.as_text() else {
            return Ok(());
        };
        let value: Value = serde_json::from_str(text).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        // `{"id":0,"code":0,"msg":"PONG"}`-style acks/pongs carry no
        // `"c"` channel tag; ignore them here.
        let Some(channel) = value.get("c").and_then(Value::as_str) else {
            return Ok(());
        };

        if channel.contains("limit.depth") {
            self.process_book(channel, &value, ctx)
        } else if channel.contains("bookTicker") {
            self.process_ticker(channel, &value, ctx)
        } else if channel.contains("deals") {
            self.process_trade(channel, &value, ctx)
        } else if channel.contains("kline") {
            self.process_candle(channel, &value, ctx)
        } else {
            Ok(())
        }
    }
}

fn mexc_interval(interval: &str) -> Result<&'static str, MarketFeedError> {
    match interval {
        "1m" => Ok("Min1"),
        "5m" => Ok("Min5"),
        "15m" => Ok("Min15"),
        "30m" => Ok("Min30"),
        "1h" => Ok("Min60"),
        "1d" => Ok("Day1"),
        other => Err(MarketFeedError::Contract(format!("unsupported MEXC candle interval: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct MexcDepthData {
    #[serde(default)]
    bids: Vec<MexcDepthRow>,
    #[serde(default)]
    asks: Vec<MexcDepthRow>,
}

#[derive(Debug, Deserialize)]
struct MexcDepthRow {
    p: Decimal,
    v: Decimal,
}

#[derive(Debug, Deserialize)]
struct MexcBookTickerData {
    #[serde(rename = "b")]
    bid_price: Decimal,
    #[serde(rename = "B")]
    bid_qty: Decimal,
    #[serde(rename = "a")]
    ask_price: Decimal,
    #[serde(rename = "A")]
    ask_qty: Decimal,
}

#[derive(Debug, Deserialize)]
struct MexcDealRow {
    p: Decimal,
    v: Decimal,
    #[serde(rename = "S")]
    side: i64,
    t: i64,
}

#[derive(Debug, Deserialize)]
struct MexcDealsData {
    deals: Vec<MexcDealRow>,
}

#[derive(Debug, Deserialize)]
struct MexcKlineData {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
    interval: String,
}

impl MexcAdapter {
    fn process_book(&self, channel: &str, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let data: MexcDepthData = serde_json::from_value(value["d"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let time_exchange_ms = value.get("t").and_then(Value::as_i64).unwrap_or(0);

        let bids: Vec<Level> = data.bids.iter().map(|r| Level::new(r.p, r.v)).collect();
        let asks: Vec<Level> = data.asks.iter().map(|r| Level::new(r.p, r.v)).collect();
        // `limit.depth` is a partial-book snapshot of the top-N ladder on
        // every frame, not a diff: levels that fall out of the window carry
        // no delete marker, so this must replace state rather than merge.
        ctx.apply_orderbook(&market, OrderBookEvent::Snapshot { bids, asks, time_exchange_ms });
        Ok(())
    }

    fn process_ticker(&self, channel: &str, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let data: MexcBookTickerData = serde_json::from_value(value["d"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;
        let time_exchange_ms = value.get("t").and_then(Value::as_i64).unwrap_or(0);

        ctx.sink.emit(MarketEvent::Ticker(Ticker {
            venue: VenueId::Mexc,
            market,
            time_exchange_ms,
            best_bid_price: data.bid_price,
            best_bid_quantity: data.bid_qty,
            best_ask_price: data.ask_price,
            best_ask_quantity: data.ask_qty,
            last_price: None,
            high_24h: None,
            low_24h: None,
            volume_24h: None,
            price_change_pct_24h: None,
        }));
        Ok(())
    }

    fn process_trade(&self, channel: &str, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let data: MexcDealsData = serde_json::from_value(value["d"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        let trades = data
            .deals
            .into_iter()
            .map(|row| Trade {
                id: row.t.to_string(),
                time_exchange_ms: row.t,
                side: if row.side == 1 { Side::Bid } else { Side::Ask },
                order_type: None,
                price: row.p,
                quantity: row.v,
                amount: row.p * row.v,
            })
            .collect();

        ctx.sink.emit(MarketEvent::Trades(TradeBatch { venue: VenueId::Mexc, market, trades }));
        Ok(())
    }

    fn process_candle(&self, channel: &str, value: &Value, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
        let market = market_from_channel(channel)?;
        let data: MexcKlineData = serde_json::from_value(value["d"].clone()).map_err(|e| MarketFeedError::Parse(e.to_string()))?;

        ctx.sink.emit(MarketEvent::Candle(crate::model::Candle {
            venue: VenueId::Mexc,
            market,
            interval: data.interval,
            open_time_ms: data.open_time_ms,
            open: data.open,
            high: data.high,
            low: data.low,
            close: data.close,
            volume: data.volume,
            // MEXC's kline stream always pushes the in-progress bar; it
            // never tags a close boundary on the wire.
            is_closed: false,
        }));
        Ok(())
    }
}

/// Recover the `Market` from a MEXC channel tag like
/// `spot@public.limit.depth.v3.api@BTCUSDT@20`, via
/// `marketfeed_instrument::symbol`'s recognized-quote suffix table.
fn market_from_channel(channel: &str) -> Result<Market, MarketFeedError> {
    let symbol = channel
        .split('@')
        .find(|part| part.chars().all(|c| c.is_ascii_alphanumeric()) && part.len() >= 6 && part.chars().next().is_some_and(char::is_uppercase))
        .ok_or_else(|| MarketFeedError::Parse(format!("malformed channel tag: {channel}")))?;
    Market::parse(&marketfeed_instrument::symbol::normalize(symbol)).map_err(Into::into)
}
