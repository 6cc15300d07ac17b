//! Registry error types
//!
//! Error types for connection registry operations.

use super::frame::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection with this id is already registered
    DuplicateConnection(ConnectionId),
    /// Room name is empty or too long
    InvalidRoom(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateConnection(id) => {
                write!(f, "Connection already registered: {}", id)
            }
            RegistryError::InvalidRoom(name) => write!(f, "Invalid room id: {:?}", name),
        }
    }
}

impl std::error::Error for RegistryError {}
