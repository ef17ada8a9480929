//! Order-book maintenance engine: sorted bid/ask ladders, snapshot/delta
//! merge, Bitfinex's signed-amount encoding and best-effort cross detection.
//!
//! Per-symbol storage and reconnect-driven resets live in [`manager`].

use crate::model::Side;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use tracing::debug;

pub mod manager;

/// A single price level: price plus resting quantity. A zero quantity
/// means "remove this level", never a resting order of size zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Level {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Unit type tagging an [`OrderBookSide`] as the bid side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Display)]
pub struct Bids;

/// Unit type tagging an [`OrderBookSide`] as the ask side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Display)]
pub struct Asks;

impl Serialize for Bids {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("bids")
    }
}

impl Serialize for Asks {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("asks")
    }
}

/// One side of a sorted order book. Bids are kept descending by price, asks
/// ascending, so the best price is always `levels[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderBookSide<S> {
    #[serde(skip_serializing)]
    pub side: S,
    levels: Vec<Level>,
}

impl OrderBookSide<Bids> {
    pub fn bids(levels: impl IntoIterator<Item = Level>) -> Self {
        let mut levels: Vec<Level> = levels.into_iter().filter(|l| !l.quantity.is_zero()).collect();
        levels.sort_unstable_by(|a, b| b.price.cmp(&a.price));
        Self { side: Bids, levels }
    }

    /// Apply a delta batch per spec.md §4.2: zero quantity removes the
    /// level at that exact price (no-op if absent); otherwise overwrite in
    /// place or insert and keep the side sorted.
    pub fn apply_delta(&mut self, levels: impl IntoIterator<Item = Level>) {
        for level in levels {
            self.apply_one(level, |existing| existing.price.cmp(&level.price).reverse());
        }
    }
}

impl OrderBookSide<Asks> {
    pub fn asks(levels: impl IntoIterator<Item = Level>) -> Self {
        let mut levels: Vec<Level> = levels.into_iter().filter(|l| !l.quantity.is_zero()).collect();
        levels.sort_unstable_by(|a, b| a.price.cmp(&b.price));
        Self { side: Asks, levels }
    }

    pub fn apply_delta(&mut self, levels: impl IntoIterator<Item = Level>) {
        for level in levels {
            self.apply_one(level, |existing| existing.price.cmp(&level.price));
        }
    }
}

impl<S> OrderBookSide<S>
where
    S: std::fmt::Display + std::fmt::Debug,
{
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn best(&self) -> Option<Level> {
        self.levels.first().copied()
    }

    fn apply_one<FnOrd>(&mut self, level: Level, fn_ord: FnOrd)
    where
        FnOrd: Fn(&Level) -> Ordering,
    {
        match (self.levels.binary_search_by(fn_ord), level.quantity) {
            (Ok(index), qty) if qty.is_zero() => {
                self.levels.remove(index);
            }
            (Ok(index), qty) => {
                self.levels[index].quantity = qty;
            }
            (Err(_), qty) if qty.is_zero() => {
                debug!(?level, side = %self.side, "delta removed a level not present in the book");
            }
            (Err(index), _) => {
                self.levels.insert(index, level);
            }
        }
    }
}

impl Default for OrderBookSide<Bids> {
    fn default() -> Self {
        Self { side: Bids, levels: Vec::new() }
    }
}

impl Default for OrderBookSide<Asks> {
    fn default() -> Self {
        Self { side: Asks, levels: Vec::new() }
    }
}

/// Either a full snapshot or an incremental delta, as produced by a venue
/// adapter after parsing a wire frame.
#[derive(Debug, Clone)]
pub enum OrderBookEvent {
    Snapshot { bids: Vec<Level>, asks: Vec<Level>, time_exchange_ms: i64 },
    Update { bids: Vec<Level>, asks: Vec<Level>, time_exchange_ms: i64 },
}

/// Local, sorted order book for one symbol on one venue.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub time_exchange_ms: i64,
    pub crossed_event_count: u64,
    bids: OrderBookSide<Bids>,
    asks: OrderBookSide<Asks>,
}

impl OrderBook {
    pub fn bids(&self) -> &OrderBookSide<Bids> {
        &self.bids
    }

    pub fn asks(&self) -> &OrderBookSide<Asks> {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.best()
    }

    /// True when, after the last applied event, best bid >= best ask. The
    /// engine never auto-corrects this; it only counts it.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Midpoint of best bid and best ask, or `None` if either side is empty.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Quantity-weighted midpoint of best bid and best ask: skews towards
    /// the thinner side, since that's the side more likely to move first.
    pub fn volume_weighted_mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                let total = bid.quantity + ask.quantity;
                if total.is_zero() {
                    return None;
                }
                Some((bid.price * ask.quantity + ask.price * bid.quantity) / total)
            }
            _ => None,
        }
    }

    /// Apply a parsed event, replacing the book wholesale for a snapshot or
    /// merging in place for a delta. Timestamps are clamped to be
    /// non-decreasing: an out-of-order frame updates the ladder but leaves
    /// `time_exchange_ms` untouched.
    pub fn apply(&mut self, event: OrderBookEvent) {
        match event {
            OrderBookEvent::Snapshot { bids, asks, time_exchange_ms } => {
                self.bids = OrderBookSide::bids(bids);
                self.asks = OrderBookSide::asks(asks);
                self.time_exchange_ms = time_exchange_ms;
            }
            OrderBookEvent::Update { bids, asks, time_exchange_ms } => {
                self.bids.apply_delta(bids);
                self.asks.apply_delta(asks);
                if time_exchange_ms >= self.time_exchange_ms {
                    self.time_exchange_ms = time_exchange_ms;
                }
            }
        }

        if self.is_crossed() {
            self.crossed_event_count += 1;
        }
    }

    /// Clear the book back to empty. Called by the manager immediately
    /// after a reconnect, before the first post-reconnect frame lands, so a
    /// stale ladder can never be merged against a fresh snapshot sequence.
    pub fn reset(&mut self) {
        self.bids = OrderBookSide::default();
        self.asks = OrderBookSide::default();
        self.time_exchange_ms = 0;
    }
}

/// Decode Bitfinex's signed-amount row encoding into a side-tagged
/// [`Level`]: `count == 0` means delete, the sign of `amount` selects the
/// side, and `|amount|` is the resting quantity.
///
/// Returns `None` for `count == 0` deletions paired with a zero price,
/// which callers should treat as "no known level to remove" rather than a
/// level to insert.
pub fn decode_bitfinex_row(price: Decimal, count: i64, amount: Decimal) -> (Side, Level) {
    let side = if amount.is_sign_positive() { Side::Bid } else { Side::Ask };
    let quantity = if count == 0 { Decimal::ZERO } else { amount.abs() };
    (side, Level::new(price, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, qty: Decimal) -> Level {
        Level::new(price, qty)
    }

    #[test]
    fn test_snapshot_sorts_bids_descending_asks_ascending() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1)), level(dec!(102), dec!(1)), level(dec!(101), dec!(1))],
            asks: vec![level(dec!(105), dec!(1)), level(dec!(103), dec!(1))],
            time_exchange_ms: 1,
        });
        let bid_prices: Vec<_> = book.bids().levels().iter().map(|l| l.price).collect();
        let ask_prices: Vec<_> = book.asks().levels().iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(102), dec!(101), dec!(100)]);
        assert_eq!(ask_prices, vec![dec!(103), dec!(105)]);
    }

    #[test]
    fn test_snapshot_drops_zero_quantity_levels() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(0))],
            asks: vec![],
            time_exchange_ms: 1,
        });
        assert!(book.bids().levels().is_empty());
    }

    #[test]
    fn test_delta_removes_level_at_exact_price() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![],
            time_exchange_ms: 1,
        });
        book.apply(OrderBookEvent::Update {
            bids: vec![level(dec!(100), dec!(0))],
            asks: vec![],
            time_exchange_ms: 2,
        });
        assert!(book.bids().levels().is_empty());
    }

    #[test]
    fn test_delta_remove_of_absent_level_is_noop() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Update {
            bids: vec![level(dec!(100), dec!(0))],
            asks: vec![],
            time_exchange_ms: 1,
        });
        assert!(book.bids().levels().is_empty());
    }

    #[test]
    fn test_delta_overwrites_existing_level_quantity() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![],
            time_exchange_ms: 1,
        });
        book.apply(OrderBookEvent::Update {
            bids: vec![level(dec!(100), dec!(5))],
            asks: vec![],
            time_exchange_ms: 2,
        });
        assert_eq!(book.best_bid().unwrap().quantity, dec!(5));
    }

    #[test]
    fn test_delta_inserts_new_level_re_sorted() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1)), level(dec!(98), dec!(1))],
            asks: vec![],
            time_exchange_ms: 1,
        });
        book.apply(OrderBookEvent::Update {
            bids: vec![level(dec!(99), dec!(1))],
            asks: vec![],
            time_exchange_ms: 2,
        });
        let prices: Vec<_> = book.bids().levels().iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(100), dec!(99), dec!(98)]);
    }

    #[test]
    fn test_crossed_book_increments_counter_without_correcting() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![level(dec!(101), dec!(1))],
            time_exchange_ms: 1,
        });
        book.apply(OrderBookEvent::Update {
            bids: vec![level(dec!(102), dec!(1))],
            asks: vec![],
            time_exchange_ms: 2,
        });
        assert!(book.is_crossed());
        assert_eq!(book.crossed_event_count, 1);
        // the crossed ladder is emitted as-is, not auto-corrected
        assert_eq!(book.best_bid().unwrap().price, dec!(102));
        assert_eq!(book.best_ask().unwrap().price, dec!(101));
    }

    #[test]
    fn test_out_of_order_update_does_not_rewind_timestamp() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot { bids: vec![], asks: vec![], time_exchange_ms: 10 });
        book.apply(OrderBookEvent::Update { bids: vec![], asks: vec![], time_exchange_ms: 5 });
        assert_eq!(book.time_exchange_ms, 10);
    }

    #[test]
    fn test_reset_clears_both_sides() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![level(dec!(101), dec!(1))],
            time_exchange_ms: 1,
        });
        book.reset();
        assert!(book.bids().levels().is_empty());
        assert!(book.asks().levels().is_empty());
        assert_eq!(book.time_exchange_ms, 0);
    }

    #[test]
    fn test_decode_bitfinex_row_positive_amount_is_bid() {
        let (side, level) = decode_bitfinex_row(dec!(100), 1, dec!(2.5));
        assert_eq!(side, Side::Bid);
        assert_eq!(level.quantity, dec!(2.5));
    }

    #[test]
    fn test_decode_bitfinex_row_negative_amount_is_ask() {
        let (side, level) = decode_bitfinex_row(dec!(100), 1, dec!(-2.5));
        assert_eq!(side, Side::Ask);
        assert_eq!(level.quantity, dec!(2.5));
    }

    #[test]
    fn test_decode_bitfinex_row_zero_count_is_delete() {
        let (_, level) = decode_bitfinex_row(dec!(100), 0, dec!(-2.5));
        assert!(level.quantity.is_zero());
    }

    #[test]
    fn test_mid_price_is_midpoint_of_best_bid_and_ask() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![level(dec!(102), dec!(1))],
            time_exchange_ms: 1,
        });
        assert_eq!(book.mid_price().unwrap(), dec!(101));
    }

    #[test]
    fn test_volume_weighted_mid_price_skews_towards_thinner_side() {
        let mut book = OrderBook::default();
        book.apply(OrderBookEvent::Snapshot {
            bids: vec![level(dec!(100), dec!(3))],
            asks: vec![level(dec!(102), dec!(1))],
            time_exchange_ms: 1,
        });
        let vwap = book.volume_weighted_mid_price().unwrap();
        // heavier bid side pulls the weighted mid towards the ask price
        assert!(vwap > dec!(101));
    }

    #[test]
    fn test_mid_price_none_when_one_side_empty() {
        let book = OrderBook::default();
        assert!(book.mid_price().is_none());
        assert!(book.volume_weighted_mid_price().is_none());
    }
}
