//! Connection state machine
//!
//! Tracks one connection from handshake to teardown:
//! `Connecting → Open → Closed`. `Closed` is terminal; a client that comes
//! back gets a new connection with a new id.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::registry::{ConnectionId, RoomId};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Transport handshake done, not yet registered
    Connecting,
    /// Registered and relaying
    Open,
    /// Unregistered; terminal
    Closed,
}

/// Per-connection state, owned by the connection's task
#[derive(Debug)]
pub struct SessionState {
    /// Connection id
    pub id: ConnectionId,

    /// Room, bound at connect time and never re-derived
    pub room: RoomId,

    /// Remote peer address
    pub peer_addr: Option<SocketAddr>,

    /// Current phase
    pub phase: ConnectionPhase,

    /// When the handshake completed
    pub connected_at: Instant,

    /// When the connection was closed
    pub closed_at: Option<Instant>,

    /// Messages received from this client
    pub messages_received: u64,

    /// Payload bytes received from this client
    pub bytes_received: u64,
}

impl SessionState {
    /// Create a new state in the `Connecting` phase
    pub fn new(id: ConnectionId, room: RoomId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            room,
            peer_addr,
            phase: ConnectionPhase::Connecting,
            connected_at: Instant::now(),
            closed_at: None,
            messages_received: 0,
            bytes_received: 0,
        }
    }

    /// `Connecting → Open`
    ///
    /// Returns `false` from any other phase.
    pub fn open(&mut self) -> bool {
        if self.phase != ConnectionPhase::Connecting {
            return false;
        }
        self.phase = ConnectionPhase::Open;
        true
    }

    /// `Connecting | Open → Closed`
    ///
    /// Returns `false` if already closed, which makes repeated disconnect
    /// notifications no-ops.
    pub fn close(&mut self) -> bool {
        if self.phase == ConnectionPhase::Closed {
            return false;
        }
        self.phase = ConnectionPhase::Closed;
        self.closed_at = Some(Instant::now());
        true
    }

    /// Count an inbound message
    pub fn record_message(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Check if the connection is open
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// Time the connection has been (or was) alive
    pub fn duration(&self) -> Duration {
        match self.closed_at {
            Some(closed) => closed.duration_since(self.connected_at),
            None => self.connected_at.elapsed(),
        }
    }
}
