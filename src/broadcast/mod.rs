//! Broadcast engine
//!
//! Computes a room's recipient set as a filter over the registry and offers
//! the frame to each recipient's outbound queue. Delivery is fire-and-forget:
//! per-recipient failures are logged and isolated, never returned to the
//! sender.

pub mod engine;

pub use engine::{BroadcastEngine, BroadcastReport};
