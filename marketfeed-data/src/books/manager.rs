//! Per-symbol [`OrderBook`] storage shared between a venue's reader task and
//! any consumer reading the current ladder.

use crate::books::{OrderBook, OrderBookEvent};
use marketfeed_instrument::Market;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns one [`OrderBook`] per subscribed market for a single venue
/// connection. Cheaply cloneable: each [`OrderBook`] is behind its own
/// `Arc<RwLock<_>>` so readers on other tasks never block the writer for
/// an unrelated symbol.
#[derive(Debug, Clone, Default)]
pub struct OrderBookManager {
    books: Arc<RwLock<HashMap<Market, Arc<RwLock<OrderBook>>>>>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn book_handle(&self, market: &Market) -> Arc<RwLock<OrderBook>> {
        if let Some(book) = self.books.read().get(market) {
            return book.clone();
        }
        self.books
            .write()
            .entry(market.clone())
            .or_insert_with(|| Arc::new(RwLock::new(OrderBook::default())))
            .clone()
    }

    /// Apply a parsed event to the book for `market`, creating it on first
    /// use.
    pub fn apply(&self, market: &Market, event: OrderBookEvent) {
        let handle = self.book_handle(market);
        handle.write().apply(event);
    }

    /// Clear every tracked book. Called once on entering `Connected` after
    /// a reconnect, per spec.md §4.2's continuity rule: a symbol's cache
    /// entry is wiped before the first post-reconnect frame is applied.
    pub fn reset_all(&self) {
        for book in self.books.read().values() {
            book.write().reset();
        }
    }

    /// A snapshot clone of the current book for `market`, or `None` if
    /// nothing has been subscribed/applied for it yet.
    pub fn snapshot(&self, market: &Market) -> Option<OrderBook> {
        self.books.read().get(market).map(|b| b.read().clone())
    }

    pub fn markets(&self) -> Vec<Market> {
        self.books.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::Level;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market::new("BTC", "USD")
    }

    #[test]
    fn test_apply_creates_book_on_first_use() {
        let manager = OrderBookManager::new();
        manager.apply(
            &market(),
            OrderBookEvent::Snapshot {
                bids: vec![Level::new(dec!(100), dec!(1))],
                asks: vec![],
                time_exchange_ms: 1,
            },
        );
        let book = manager.snapshot(&market()).unwrap();
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
    }

    #[test]
    fn test_reset_all_clears_every_tracked_book() {
        let manager = OrderBookManager::new();
        manager.apply(
            &market(),
            OrderBookEvent::Snapshot {
                bids: vec![Level::new(dec!(100), dec!(1))],
                asks: vec![],
                time_exchange_ms: 1,
            },
        );
        manager.reset_all();
        let book = manager.snapshot(&market()).unwrap();
        assert!(book.best_bid().is_none());
    }

    #[test]
    fn test_snapshot_of_unknown_market_is_none() {
        let manager = OrderBookManager::new();
        assert!(manager.snapshot(&Market::new("ETH", "USD")).is_none());
    }
}
