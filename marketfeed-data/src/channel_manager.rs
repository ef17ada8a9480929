//! Owns the set of active subscriptions across every connected venue.
//!
//! A [`ChannelManager`] is the entry point a consumer actually holds: it
//! routes `subscribe(venue, channel, market)` to the right
//! [`StreamClient`], so callers never need to look one up themselves.
//! Batch-vs-single dispatch is still the venue adapter's call (via
//! [`crate::client::VenueAdapter::supports_batch_subscription`]); this type
//! only owns the cross-venue routing.

use crate::client::{ClientState, MarketEvent, StreamClient};
use crate::error::MarketFeedError;
use crate::observer::Health;
use crate::subscription::Channel;
use marketfeed_instrument::{Market, VenueId};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Routes subscribe/unsubscribe calls to the [`StreamClient`] for the
/// requested venue.
#[derive(Clone, Default)]
pub struct ChannelManager {
    clients: HashMap<VenueId, StreamClient>,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager").field("venues", &self.clients.keys().collect::<Vec<_>>()).finish()
    }
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for a venue, replacing any existing registration
    /// for that venue.
    pub fn register(&mut self, client: StreamClient) {
        self.clients.insert(client.venue(), client);
    }

    pub fn client(&self, venue: VenueId) -> Option<&StreamClient> {
        self.clients.get(&venue)
    }

    pub fn venues(&self) -> impl Iterator<Item = VenueId> + '_ {
        self.clients.keys().copied()
    }

    /// Open every registered client's transport. Keeps going past a single
    /// venue's connect failure so one dead venue doesn't block the rest;
    /// returns the first error encountered, if any.
    pub async fn connect_all(&self) -> Result<(), MarketFeedError> {
        let mut first_error = None;
        for client in self.clients.values() {
            if let Err(error) = client.connect().await {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub async fn disconnect_all(&self) {
        for client in self.clients.values() {
            client.disconnect().await;
        }
    }

    /// Subscribe on the client registered for `venue`. Returns `false` if
    /// no client is registered for that venue, matching [`StreamClient::subscribe`]'s
    /// own false-on-failure contract.
    pub async fn subscribe(&self, venue: VenueId, channel: Channel, market: Market) -> bool {
        match self.clients.get(&venue) {
            Some(client) => client.subscribe(channel, market).await,
            None => false,
        }
    }

    pub async fn unsubscribe(&self, venue: VenueId, channel: Channel, market: Market) {
        if let Some(client) = self.clients.get(&venue) {
            client.unsubscribe(channel, market).await;
        }
    }

    pub fn state(&self, venue: VenueId) -> Option<ClientState> {
        self.clients.get(&venue).map(|c| c.state())
    }

    pub fn health(&self, venue: VenueId) -> Health {
        self.clients.get(&venue).map(|c| c.health()).unwrap_or(Health::Unhealthy)
    }

    /// A merged event stream across every registered venue. Each client's
    /// events are forwarded onto one shared broadcast channel; a slow
    /// consumer drops the oldest events, same as each client's own sink.
    pub fn events(&self) -> broadcast::Receiver<MarketEvent> {
        let (tx, rx) = broadcast::channel(4096);
        for client in self.clients.values() {
            let mut upstream = client.events();
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = upstream.recv().await {
                    let _ = tx.send(event);
                }
            });
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::exchange::KrakenAdapter;
    use crate::observer::Observer;

    #[test]
    fn test_register_and_lookup_by_venue() {
        let mut manager = ChannelManager::new();
        let client = StreamClient::new(Box::new(KrakenAdapter::new()), Settings::default(), Observer::new());
        manager.register(client);
        assert!(manager.client(VenueId::Kraken).is_some());
        assert!(manager.client(VenueId::Bitfinex).is_none());
    }

    #[test]
    fn test_state_and_health_default_when_unregistered() {
        let manager = ChannelManager::new();
        assert!(manager.state(VenueId::Kraken).is_none());
        assert_eq!(manager.health(VenueId::Kraken), Health::Unhealthy);
    }

    #[tokio::test]
    async fn test_subscribe_to_unregistered_venue_returns_false() {
        let manager = ChannelManager::new();
        let ok = manager.subscribe(VenueId::Mexc, Channel::Ticker, Market::new("BTC", "USDT")).await;
        assert!(!ok);
    }
}
