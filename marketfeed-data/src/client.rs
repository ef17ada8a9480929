//! The per-venue stream-client state machine.
//!
//! A [`StreamClient`] owns one [`VenueAdapter`] plus the shared state a
//! venue connection needs: subscription registry, order-book manager,
//! metrics observer and an event sink. It drives one reader task and one
//! heartbeat/reconnect supervisor, per spec.md §5's "parallel tasks with
//! shared nothing between venues" model.

use crate::books::{OrderBookEvent, manager::OrderBookManager};
use crate::error::MarketFeedError;
use crate::model::{Candle, Ticker, TradeBatch};
use crate::observer::Observer;
use crate::reconnect::{BackoffPolicy, ReconnectionState};
use crate::subscription::{Channel, SubscriptionKey, SubscriptionRegistry};
use crate::config::Settings;
use marketfeed_instrument::{Market, VenueId};
use marketfeed_integration::{WebSocket, WsMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

/// Lifecycle state of a [`StreamClient`], per spec.md §4.1.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Subscribing,
    Streaming,
    Degraded,
    Reconnecting,
    Closed,
}

/// Normalized event produced by a venue adapter while parsing an inbound
/// frame. The client applies order-book events to the [`OrderBookManager`]
/// itself; everything else is simply forwarded to the event sink.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    Ticker(Ticker),
    Orderbook { market: Market, event_kind: OrderbookEventKind },
    Trades(TradeBatch),
    Candle(Candle),
}

/// A thin description of the orderbook change, separate from
/// [`OrderBookEvent`] which also carries the raw levels the manager needs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OrderbookEventKind {
    Snapshot,
    Update,
}

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Multi-consumer fan-out for parsed market events. Cloning is cheap; every
/// clone shares the same underlying broadcast channel. A slow consumer
/// drops the oldest events rather than stalling the reader task, per
/// spec.md §9's design note.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MarketEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared context handed to a [`VenueAdapter`] while it parses a frame: the
/// order-book storage for this venue and the event sink to publish
/// ticker/trade/candle events onto.
pub struct AdapterContext<'a> {
    pub books: &'a OrderBookManager,
    pub sink: &'a EventSink,
}

impl<'a> AdapterContext<'a> {
    pub fn apply_orderbook(&self, market: &Market, event: OrderBookEvent) {
        let kind = match event {
            OrderBookEvent::Snapshot { .. } => OrderbookEventKind::Snapshot,
            OrderBookEvent::Update { .. } => OrderbookEventKind::Update,
        };
        self.books.apply(market, event);
        self.sink.emit(MarketEvent::Orderbook { market: market.clone(), event_kind: kind });
    }
}

/// Polymorphism over the capability set a venue exposes: URLs, ping
/// discipline, symbol formatting, subscribe/unsubscribe frame shapes and
/// the frame parser. Every method is synchronous and CPU-only; transport
/// I/O is the client's responsibility, not the adapter's.
pub trait VenueAdapter: Send + Sync {
    fn venue_id(&self) -> VenueId;
    fn public_url(&self) -> Url;
    fn private_url(&self) -> Option<Url> {
        None
    }
    /// Interval between heartbeat pings, in milliseconds.
    fn ping_interval_ms(&self) -> u64;
    fn format_symbol(&self, market: &Market) -> String;

    /// The adapter's application-level ping frame. `None` means "rely on a
    /// transport-level ping / inbound heartbeat instead".
    fn create_ping_message(&self) -> Option<WsMessage>;

    fn supports_batch_subscription(&self) -> bool;

    /// Build one or more subscribe frames for the given keys. Venues that
    /// support batching coalesce per spec.md §4.1's grouping rules;
    /// otherwise one frame per key.
    fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError>;

    /// Build an unsubscribe frame, if the venue offers one.
    fn build_unsubscribe_frame(&self, key: &SubscriptionKey) -> Option<WsMessage>;

    /// Parse an inbound frame, applying any order-book event to
    /// `ctx.books` and emitting ticker/trade/candle events on `ctx.sink`.
    fn process_message(&self, message: &WsMessage, ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError>;
}

struct ClientInner {
    venue: VenueId,
    adapter: Box<dyn VenueAdapter>,
    settings: Settings,
    observer: Observer,
    books: OrderBookManager,
    sink: EventSink,
    state: parking_lot::RwLock<ClientState>,
    registry: Mutex<SubscriptionRegistry>,
    ws: Mutex<Option<WebSocket>>,
    failure_window: parking_lot::Mutex<VecDeque<Instant>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ClientInner {
    fn set_state(&self, next: ClientState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(venue = %self.venue, ?state, ?next, "state transition");
            *state = next;
        }
    }

    fn state(&self) -> ClientState {
        *self.state.read()
    }
}

/// Drives the connection lifecycle for one venue.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl StreamClient {
    pub fn new(adapter: Box<dyn VenueAdapter>, settings: Settings, observer: Observer) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        let venue = adapter.venue_id();
        Self {
            inner: Arc::new(ClientInner {
                venue,
                adapter,
                settings,
                observer,
                books: OrderBookManager::new(),
                sink: EventSink::new(),
                state: parking_lot::RwLock::new(ClientState::Idle),
                registry: Mutex::new(SubscriptionRegistry::new()),
                ws: Mutex::new(None),
                failure_window: parking_lot::Mutex::new(VecDeque::new()),
                shutdown_tx,
            }),
        }
    }

    pub fn state(&self) -> ClientState {
        self.inner.state()
    }

    pub fn venue(&self) -> VenueId {
        self.inner.venue
    }

    pub fn events(&self) -> broadcast::Receiver<MarketEvent> {
        self.inner.sink.subscribe()
    }

    pub fn books(&self) -> &OrderBookManager {
        &self.inner.books
    }

    /// This venue's current health classification, per the shared observer.
    pub fn health(&self) -> crate::observer::Health {
        self.inner.observer.get_health(self.inner.venue)
    }

    /// Open the public transport. Idempotent: a second call while already
    /// `Connected` or past it is a no-op.
    pub async fn connect(&self) -> Result<(), MarketFeedError> {
        if !matches!(self.inner.state(), ClientState::Idle | ClientState::Reconnecting | ClientState::Closed) {
            return Ok(());
        }

        self.inner.set_state(ClientState::Connecting);
        let socket = WebSocket::connect(&self.inner.adapter.public_url()).await?;
        *self.inner.ws.lock().await = Some(socket);
        self.inner.observer.on_connection_state_changed(self.inner.venue, true);
        self.inner.set_state(ClientState::Connected);

        self.spawn_supervisor();
        Ok(())
    }

    fn spawn_supervisor(&self) {
        let inner = self.inner.clone();
        let mut shutdown_rx = inner.shutdown_tx.subscribe();
        tokio::spawn(async move {
            run_supervisor(inner, &mut shutdown_rx).await;
        });
    }

    /// Register and send a subscribe frame for one channel/market pair.
    /// Returns `false` (without tearing down the connection) on a transport
    /// write failure.
    pub async fn subscribe(&self, channel: Channel, market: Market) -> bool {
        if self.inner.state() == ClientState::Closed {
            return false;
        }
        self.inner.set_state(ClientState::Subscribing);
        let key = SubscriptionKey::new(channel.clone(), market.clone());
        self.inner.registry.lock().await.insert(key.clone());

        let frames = match self.inner.adapter.build_subscribe_frames(&[key.clone()]) {
            Ok(frames) => frames,
            Err(error) => {
                self.inner.observer.on_error(self.inner.venue, error.to_string());
                return false;
            }
        };

        for frame in frames {
            if let Err(error) = self.send(frame).await {
                self.inner.observer.on_error(self.inner.venue, error.to_string());
                return false;
            }
        }

        self.inner.registry.lock().await.mark_subscribed(&key);
        self.inner
            .observer
            .on_subscription_changed(self.inner.venue, channel_name(&channel), &market.to_string(), true);
        self.inner.set_state(ClientState::Streaming);
        true
    }

    /// Best-effort unsubscribe: sends the venue's unsubscribe frame (if
    /// any) and removes the descriptor from the registry regardless of
    /// whether the send succeeds.
    pub async fn unsubscribe(&self, channel: Channel, market: Market) {
        let key = SubscriptionKey::new(channel.clone(), market.clone());
        if let Some(frame) = self.inner.adapter.build_unsubscribe_frame(&key) {
            let _ = self.send(frame).await;
        }
        self.inner.registry.lock().await.remove(&key);
        self.inner
            .observer
            .on_subscription_changed(self.inner.venue, channel_name(&channel), &market.to_string(), false);
    }

    /// Initiate a graceful close. Cancels the heartbeat/reader tasks and
    /// transitions to `Closed`; metrics are left untouched.
    pub async fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        if let Some(ws) = self.inner.ws.lock().await.as_mut() {
            let _ = ws.close().await;
        }
        *self.inner.ws.lock().await = None;
        self.inner.observer.on_connection_state_changed(self.inner.venue, false);
        self.inner.set_state(ClientState::Closed);
    }

    async fn send(&self, message: WsMessage) -> Result<(), MarketFeedError> {
        let mut guard = self.inner.ws.lock().await;
        match guard.as_mut() {
            Some(ws) => Ok(ws.send(message).await?),
            None => Err(MarketFeedError::Protocol("not connected".into())),
        }
    }
}

fn channel_name(channel: &Channel) -> &'static str {
    match channel {
        Channel::Ticker => "ticker",
        Channel::Orderbook => "orderbook",
        Channel::Trades => "trades",
        Channel::Candles(_) => "candles",
    }
}

async fn run_supervisor(inner: Arc<ClientInner>, shutdown_rx: &mut watch::Receiver<bool>) {
    let mut backoff = ReconnectionState::new(BackoffPolicy::new(
        inner.settings.reconnect_backoff_base(),
        inner.settings.reconnect_backoff_cap(),
    ));

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        run_reader(&inner, shutdown_rx).await;

        if *shutdown_rx.borrow() || inner.state() == ClientState::Closed {
            return;
        }

        inner.set_state(ClientState::Reconnecting);
        inner.observer.on_connection_state_changed(inner.venue, false);
        let delay = backoff.next_delay();
        warn!(venue = %inner.venue, ?delay, attempt = backoff.attempt(), "reconnecting");
        tokio::time::sleep(delay).await;

        if *shutdown_rx.borrow() {
            return;
        }

        match WebSocket::connect(&inner.adapter.public_url()).await {
            Ok(socket) => {
                *inner.ws.lock().await = Some(socket);
                inner.books.reset_all();
                inner.registry.lock().await.mark_all_inactive();
                inner.observer.on_connection_state_changed(inner.venue, true);
                backoff.reset();
                inner.set_state(ClientState::Connected);
                replay_subscriptions(&inner).await;
                inner.set_state(ClientState::Streaming);
            }
            Err(error) => {
                inner.observer.on_error(inner.venue, error.to_string());
            }
        }
    }
}

/// Resend every tracked subscription in insertion order after a reconnect,
/// coalescing into batch frames when the adapter supports it.
async fn replay_subscriptions(inner: &Arc<ClientInner>) {
    let keys: Vec<SubscriptionKey> = inner.registry.lock().await.replay_order().cloned().collect();
    if keys.is_empty() {
        return;
    }

    let frames = if inner.adapter.supports_batch_subscription() && keys.len() >= 2 {
        inner.adapter.build_subscribe_frames(&keys)
    } else {
        let mut frames = Vec::with_capacity(keys.len());
        for key in &keys {
            match inner.adapter.build_subscribe_frames(std::slice::from_ref(key)) {
                Ok(mut f) => frames.append(&mut f),
                Err(error) => return inner.observer.on_error(inner.venue, error.to_string()),
            }
        }
        Ok(frames)
    };

    let frames = match frames {
        Ok(frames) => frames,
        Err(error) => {
            inner.observer.on_error(inner.venue, error.to_string());
            return;
        }
    };

    let mut guard = inner.ws.lock().await;
    let Some(ws) = guard.as_mut() else { return };
    for frame in frames {
        if let Err(error) = ws.send(frame).await {
            inner.observer.on_error(inner.venue, error.to_string());
            return;
        }
    }
    drop(guard);

    let mut registry = inner.registry.lock().await;
    for key in &keys {
        registry.mark_subscribed(key);
    }
}

async fn run_reader(inner: &Arc<ClientInner>, shutdown_rx: &mut watch::Receiver<bool>) {
    let ping_interval = Duration::from_millis(inner.adapter.ping_interval_ms().max(1));
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await; // first tick fires immediately; discard

    let deadline_missed_limit = inner.settings.heartbeat_deadline_multiplier;
    let mut missed_intervals: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                return;
            }
            _ = ticker.tick() => {
                missed_intervals += 1;
                if missed_intervals >= deadline_missed_limit {
                    warn!(venue = %inner.venue, "heartbeat deadline exceeded");
                    return;
                }
                if let Some(ping) = inner.adapter.create_ping_message() {
                    let mut guard = inner.ws.lock().await;
                    if let Some(ws) = guard.as_mut() {
                        if ws.send(ping).await.is_err() {
                            return;
                        }
                    }
                }
            }
            frame = read_next(inner) => {
                match frame {
                    Some(Ok(message)) => {
                        missed_intervals = 0;
                        handle_frame(inner, &message);
                    }
                    Some(Err(error)) => {
                        error!(venue = %inner.venue, %error, "transport read failed");
                        inner.observer.on_error(inner.venue, error.to_string());
                        return;
                    }
                    None => {
                        info!(venue = %inner.venue, "connection closed by peer");
                        return;
                    }
                }
            }
        }
    }
}

async fn read_next(inner: &Arc<ClientInner>) -> Option<Result<WsMessage, MarketFeedError>> {
    let mut guard = inner.ws.lock().await;
    let ws = guard.as_mut()?;
    match ws.next().await {
        Ok(Some(message)) => Some(Ok(message)),
        Ok(None) => None,
        Err(error) => Some(Err(error.into())),
    }
}

fn handle_frame(inner: &Arc<ClientInner>, message: &WsMessage) {
    let size = match message {
        WsMessage::Text(text) => text.len() as u64,
        WsMessage::Binary(bytes) => bytes.len() as u64,
        WsMessage::Ping(bytes) | WsMessage::Pong(bytes) => bytes.len() as u64,
    };
    // Per-channel attribution happens inside the adapter (it alone knows
    // which subscription a frame belongs to); this records raw inbound
    // traffic at the connection level.
    inner.observer.on_message_received(inner.venue, "_raw", "_all", size, 0);

    let ctx = AdapterContext { books: &inner.books, sink: &inner.sink };
    match inner.adapter.process_message(message, &ctx) {
        Ok(()) => on_parse_success(inner),
        Err(error) => on_parse_failure(inner, error),
    }
}

fn on_parse_success(inner: &Arc<ClientInner>) {
    if inner.state() == ClientState::Degraded {
        let mut window = inner.failure_window.lock();
        let now = Instant::now();
        let horizon = inner.settings.failure_window();
        while window.front().is_some_and(|t| now.duration_since(*t) > horizon) {
            window.pop_front();
        }
        let still_degraded = !window.is_empty();
        drop(window);
        if !still_degraded {
            inner.set_state(ClientState::Streaming);
        }
    }
}

fn on_parse_failure(inner: &Arc<ClientInner>, error: MarketFeedError) {
    inner.observer.on_error(inner.venue, error.to_string());
    if !error.counts_toward_quarantine() {
        return;
    }

    let mut window = inner.failure_window.lock();
    let now = Instant::now();
    window.push_back(now);
    let horizon = inner.settings.failure_window();
    while window.front().is_some_and(|t| now.duration_since(*t) > horizon) {
        window.pop_front();
    }
    let failures_in_window = window.len() as u32;
    drop(window);

    if inner.state() == ClientState::Streaming {
        inner.set_state(ClientState::Degraded);
    }

    if failures_in_window > inner.settings.max_msg_failures {
        warn!(venue = %inner.venue, failures_in_window, "parse-failure quarantine threshold exceeded");
        inner.set_state(ClientState::Reconnecting);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketfeed_instrument::Market;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopAdapter {
        failures: Arc<AtomicUsize>,
    }

    impl VenueAdapter for NoopAdapter {
        fn venue_id(&self) -> VenueId {
            VenueId::Other
        }
        fn public_url(&self) -> Url {
            Url::parse("wss://example.invalid/").unwrap()
        }
        fn ping_interval_ms(&self) -> u64 {
            15_000
        }
        fn format_symbol(&self, market: &Market) -> String {
            market.to_string()
        }
        fn create_ping_message(&self) -> Option<WsMessage> {
            None
        }
        fn supports_batch_subscription(&self) -> bool {
            false
        }
        fn build_subscribe_frames(&self, keys: &[SubscriptionKey]) -> Result<Vec<WsMessage>, MarketFeedError> {
            Ok(keys.iter().map(|_| WsMessage::text("sub")).collect())
        }
        fn build_unsubscribe_frame(&self, _key: &SubscriptionKey) -> Option<WsMessage> {
            None
        }
        fn process_message(&self, _message: &WsMessage, _ctx: &AdapterContext<'_>) -> Result<(), MarketFeedError> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(MarketFeedError::Parse("bad frame".into()))
        }
    }

    #[test]
    fn test_new_client_starts_idle() {
        let adapter = Box::new(NoopAdapter { failures: Arc::new(AtomicUsize::new(0)) });
        let client = StreamClient::new(adapter, Settings::default(), Observer::new());
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn test_quarantine_transitions_to_reconnecting_past_threshold() {
        let adapter = Box::new(NoopAdapter { failures: Arc::new(AtomicUsize::new(0)) });
        let mut settings = Settings::default();
        settings.max_msg_failures = 2;
        let client = StreamClient::new(adapter, settings, Observer::new());
        client.inner.set_state(ClientState::Streaming);

        on_parse_failure(&client.inner, MarketFeedError::Parse("1".into()));
        assert_eq!(client.state(), ClientState::Degraded);
        on_parse_failure(&client.inner, MarketFeedError::Parse("2".into()));
        on_parse_failure(&client.inner, MarketFeedError::Parse("3".into()));
        assert_eq!(client.state(), ClientState::Reconnecting);
    }

    #[test]
    fn test_degraded_recovers_to_streaming_once_window_is_stale() {
        let adapter = Box::new(NoopAdapter { failures: Arc::new(AtomicUsize::new(0)) });
        let mut settings = Settings::default();
        settings.max_msg_failures = 10;
        settings.failure_window_secs = 0; // every prior timestamp is immediately stale
        let client = StreamClient::new(adapter, settings, Observer::new());
        client.inner.set_state(ClientState::Streaming);

        on_parse_failure(&client.inner, MarketFeedError::Parse("1".into()));
        assert_eq!(client.state(), ClientState::Degraded);

        // A clean parse must prune the (now stale) failure window itself,
        // not rely on a future failure to do it, or Degraded is permanent.
        on_parse_success(&client.inner);
        assert_eq!(client.state(), ClientState::Streaming);
    }

    #[tokio::test]
    async fn test_subscribe_is_a_noop_once_closed() {
        let adapter = Box::new(NoopAdapter { failures: Arc::new(AtomicUsize::new(0)) });
        let client = StreamClient::new(adapter, Settings::default(), Observer::new());
        client.inner.set_state(ClientState::Closed);

        let ok = client.subscribe(Channel::Ticker, Market::new("BTC", "USD")).await;
        assert!(!ok);
        assert_eq!(client.state(), ClientState::Closed);
    }
}
