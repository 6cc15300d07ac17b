//! Crate error types

use crate::registry::RegistryError;

/// Error type for relay operations
///
/// None of these ever cross a connection boundary: a failure on one link
/// closes that link and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind/accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry contract violation or invalid room
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// WebSocket send/receive failure
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// Connection refused by the relay handler
    #[error("connection rejected")]
    Rejected,

    /// Peer stopped answering heartbeats
    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    /// An outbound write did not complete in time
    #[error("write timed out")]
    WriteTimeout,

    /// Invalid configuration value
    #[error("invalid config: {0}")]
    Config(String),
}

/// Result alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
