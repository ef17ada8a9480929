//! Subscription bookkeeping: the channel taxonomy and the insertion-ordered
//! registry a [`crate::client::StreamClient`] replays against on reconnect.

use marketfeed_instrument::Market;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The data channels a venue adapter may expose.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Ticker,
    Orderbook,
    Trades,
    /// Carries the canonical interval string (eg/ `"1m"`), since a venue
    /// may be subscribed to several candle intervals for the same market.
    Candles(String),
}

/// Uniquely identifies one subscription: a channel on a market, with an
/// optional venue-specific qualifier (eg/ book depth) folded in so two
/// subscriptions that differ only by qualifier don't collide.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub market: Market,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, market: Market) -> Self {
        Self { channel, market }
    }
}

/// Lifecycle state and timing of one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionDescriptor {
    pub key: SubscriptionKey,
    pub is_active: bool,
    pub created_at_ms: i64,
    pub subscribed_at_ms: Option<i64>,
    pub last_update_at_ms: Option<i64>,
}

impl SubscriptionDescriptor {
    fn new(key: SubscriptionKey) -> Self {
        Self {
            key,
            is_active: false,
            created_at_ms: now_ms(),
            subscribed_at_ms: None,
            last_update_at_ms: None,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Tracks every subscription a [`crate::client::StreamClient`] has been asked
/// for, in the order the caller requested them.
///
/// Insertion order matters: spec.md §4.1 requires that on reconnect,
/// subscriptions are replayed "in the order originally requested", not in
/// whatever order a hash map happens to iterate.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    order: Vec<SubscriptionKey>,
    descriptors: std::collections::HashMap<SubscriptionKey, SubscriptionDescriptor>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new subscription request. No-op if already tracked (the
    /// existing descriptor's position and state are preserved).
    pub fn insert(&mut self, key: SubscriptionKey) {
        if !self.descriptors.contains_key(&key) {
            self.order.push(key.clone());
            self.descriptors.insert(key.clone(), SubscriptionDescriptor::new(key));
        }
    }

    /// Drop a subscription entirely, removing it from replay order.
    pub fn remove(&mut self, key: &SubscriptionKey) {
        self.order.retain(|k| k != key);
        self.descriptors.remove(key);
    }

    pub fn mark_subscribed(&mut self, key: &SubscriptionKey) {
        if let Some(d) = self.descriptors.get_mut(key) {
            d.is_active = true;
            d.subscribed_at_ms = Some(now_ms());
        }
    }

    pub fn mark_update(&mut self, key: &SubscriptionKey) {
        if let Some(d) = self.descriptors.get_mut(key) {
            d.last_update_at_ms = Some(now_ms());
        }
    }

    /// Mark every tracked subscription inactive. Called when a connection
    /// drops: subscriptions stay in the registry (for replay) but no longer
    /// count as live until resubscribed.
    pub fn mark_all_inactive(&mut self) {
        for d in self.descriptors.values_mut() {
            d.is_active = false;
            d.subscribed_at_ms = None;
        }
    }

    /// Keys in the order they were first requested, for reconnect replay.
    pub fn replay_order(&self) -> impl Iterator<Item = &SubscriptionKey> {
        self.order.iter()
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&SubscriptionDescriptor> {
        self.descriptors.get(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.descriptors.values().filter(|d| d.is_active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketfeed_instrument::Market;

    fn market(base: &str, quote: &str) -> Market {
        Market::new(base, quote)
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut reg = SubscriptionRegistry::new();
        reg.insert(SubscriptionKey::new(Channel::Trades, market("ETH", "USD")));
        reg.insert(SubscriptionKey::new(Channel::Orderbook, market("BTC", "USD")));
        reg.insert(SubscriptionKey::new(Channel::Ticker, market("SOL", "USD")));

        let order: Vec<_> = reg.replay_order().map(|k| k.market.base().to_string()).collect();
        assert_eq!(order, vec!["ETH", "BTC", "SOL"]);
    }

    #[test]
    fn test_duplicate_insert_is_noop_for_order() {
        let mut reg = SubscriptionRegistry::new();
        let key = SubscriptionKey::new(Channel::Trades, market("ETH", "USD"));
        reg.insert(key.clone());
        reg.mark_subscribed(&key);
        reg.insert(key.clone());
        assert_eq!(reg.len(), 1);
        assert!(reg.get(&key).unwrap().is_active);
    }

    #[test]
    fn test_remove_drops_from_replay() {
        let mut reg = SubscriptionRegistry::new();
        let key = SubscriptionKey::new(Channel::Trades, market("ETH", "USD"));
        reg.insert(key.clone());
        reg.remove(&key);
        assert!(reg.is_empty());
        assert!(reg.get(&key).is_none());
    }

    #[test]
    fn test_mark_all_inactive() {
        let mut reg = SubscriptionRegistry::new();
        let key = SubscriptionKey::new(Channel::Orderbook, market("BTC", "USD"));
        reg.insert(key.clone());
        reg.mark_subscribed(&key);
        assert_eq!(reg.active_count(), 1);
        reg.mark_all_inactive();
        assert_eq!(reg.active_count(), 0);
        // still tracked for replay
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_candles_channel_distinguishes_by_interval() {
        let mut reg = SubscriptionRegistry::new();
        reg.insert(SubscriptionKey::new(Channel::Candles("1m".into()), market("BTC", "USD")));
        reg.insert(SubscriptionKey::new(Channel::Candles("5m".into()), market("BTC", "USD")));
        assert_eq!(reg.len(), 2);
    }
}
