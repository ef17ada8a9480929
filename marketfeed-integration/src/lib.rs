//! Low-level, transport-agnostic plumbing shared by every piece of the
//! `marketfeed` ingestion layer: channel/fan-out primitives, the websocket
//! transport wrapper, the socket-level error taxonomy and a generic metric
//! value type for plugging into external metrics systems.
//!
//! Nothing in this crate knows about venues, subscriptions or order books.

/// Unbounded mpsc channel primitives used for event fan-out, adapted for a
/// single-producer/drop-on-disconnect usage pattern.
pub mod channel;

/// Socket-level error taxonomy and the [`error::Unrecoverable`] marker trait.
pub mod error;

/// Generic tagged metric value type, for bridging into external metrics
/// backends (Prometheus, StatsD, ...) alongside the typed statistics the
/// observer exposes directly.
pub mod metric;

/// Websocket transport wrapper built on `tokio-tungstenite`.
pub mod ws;

pub use error::SocketError;
pub use ws::{WebSocket, WsMessage};
