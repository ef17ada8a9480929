//! Real-time market-data ingestion layer for cryptocurrency venues.
//!
//! A [`client::StreamClient`] drives one websocket connection's lifecycle
//! for a single venue: connect, subscribe, parse inbound frames into
//! normalised events, maintain an [`books::OrderBook`] per market, and
//! reconnect with full-jitter backoff while replaying subscriptions. A
//! shared [`observer::Observer`] tracks per-venue/per-channel metrics and
//! exposes a rolled-up health classification.
//!
//! Venue-specific wire formats live under [`exchange`], each implementing
//! [`client::VenueAdapter`].

pub mod books;
pub mod channel_manager;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod model;
pub mod observer;
pub mod reconnect;
pub mod subscription;

pub use channel_manager::ChannelManager;
pub use client::{ClientState, MarketEvent, StreamClient, VenueAdapter};
pub use config::Settings;
pub use error::MarketFeedError;
pub use observer::{Health, Observer};
pub use subscription::{Channel, SubscriptionKey};
