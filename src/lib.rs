//! Room-scoped WebSocket message relay
//!
//! Clients connect to `/room/{room_id}` and receive every message sent by
//! the other members of the same room. Everything is in memory in a single
//! process.
//!
//! - [`registry`]: live connections keyed by id; rooms are filters over it
//! - [`broadcast`]: fan-out of one frame to the rest of a room
//! - [`session`]: per-connection state machine and lifecycle dispatcher
//! - [`server`]: HTTP routes, WebSocket upgrade, per-connection tasks
//!
//! # Example
//!
//! ```no_run
//! use room_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> room_relay::Result<()> {
//!     let server = RelayServer::new(ServerConfig::default(), ());
//!     server.run().await
//! }
//! ```

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{BroadcastEngine, BroadcastReport};
pub use error::{Error, Result};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryConfig, RelayFrame, RoomId};
pub use server::{RelayHandler, RelayServer, ServerConfig};
pub use session::{LifecycleDispatcher, SessionContext};
pub use stats::ServerStats;
