//! Venue adapters implementing [`crate::client::VenueAdapter`].
//!
//! Four canonical venues are fully implemented, spanning the representative
//! wire-shape variety the ingestion layer needs to handle: Kraken's
//! channel-grouped batch subscriptions, Bitfinex's signed-amount book
//! encoding, Bitstamp's no-ping/server-heartbeat model, and MEXC's
//! single-frame batch subscriptions.

pub mod bitfinex;
pub mod bitstamp;
pub mod kraken;
pub mod mexc;

pub use bitfinex::BitfinexAdapter;
pub use bitstamp::BitstampAdapter;
pub use kraken::KrakenAdapter;
pub use mexc::MexcAdapter;
