//! Relay server
//!
//! The transport around the core: HTTP routing, WebSocket upgrade, and one
//! task per connection feeding the lifecycle dispatcher.

pub mod config;
mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::RelayHandler;
pub use listener::RelayServer;
