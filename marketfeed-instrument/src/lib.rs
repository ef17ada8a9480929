//! Venue-agnostic market identifier, symbol normalization and candle
//! interval utilities shared by the `marketfeed` ingestion layer.
//!
//! Nothing in this crate is aware of transports, subscriptions or the
//! order-book engine — it is the pure-function/data-model layer that
//! `marketfeed-data`'s venue adapters call into.

pub mod interval;
pub mod market;
pub mod symbol;
pub mod venue;

pub use market::{Market, MarketParseError};
pub use venue::VenueId;
