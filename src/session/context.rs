//! Handler context
//!
//! Context passed to handler callbacks containing connection information.

use std::net::SocketAddr;

use super::state::SessionState;
use crate::registry::{ConnectionId, RoomId};

/// Context passed to `RelayHandler` callbacks
///
/// Read-only snapshot of the connection. To influence the relay, use the
/// return values of the handler methods.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Connection id
    pub conn_id: ConnectionId,

    /// Room the connection joined
    pub room: RoomId,

    /// Remote peer address
    pub peer_addr: Option<SocketAddr>,

    /// Messages received so far
    pub messages_received: u64,
}

impl From<&SessionState> for SessionContext {
    fn from(state: &SessionState) -> Self {
        Self {
            conn_id: state.id,
            room: state.room.clone(),
            peer_addr: state.peer_addr,
            messages_received: state.messages_received,
        }
    }
}
