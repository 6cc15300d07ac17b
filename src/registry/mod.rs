//! Connection registry for room-scoped routing
//!
//! The registry tracks every live connection and is the only shared mutable
//! state in the relay. Rooms are not materialized: a room is the set of
//! registered connections that carry the same `RoomId`.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<ConnectionRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ connections: HashMap<Id,     │
//!                  │   Arc<Connection> {          │
//!                  │     room,                    │
//!                  │     tx: mpsc::Sender,        │
//!                  │   }                          │
//!                  │ >                            │
//!                  └──────────────┬───────────────┘
//!                                 │ for_each_matching(same room, not sender)
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!    [Connection]            [Connection]            [Connection]
//!    outbound queue          outbound queue          outbound queue
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!      writer ──► WS          writer ──► WS           writer ──► WS
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all recipients of a frame
//! share the sender's allocation. Text and binary frames alike are built
//! over the buffer received from the socket and handed back to each
//! recipient's socket without copying.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Connection, SendOutcome};
pub use error::RegistryError;
pub use frame::{ConnectionId, FrameKind, RelayFrame, RoomId, MAX_ROOM_ID_LEN};
pub use store::ConnectionRegistry;
