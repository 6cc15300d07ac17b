//! Connection handle stored in the registry
//!
//! A `Connection` is the registry's view of one live client link: its
//! identity, its room, and a non-blocking send capability backed by a bounded
//! per-connection outbound queue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

use super::frame::{ConnectionId, RelayFrame, RoomId};

/// Result of offering a frame to a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame was queued for delivery
    Delivered,
    /// Queue is full; the frame was dropped
    Full,
    /// Connection is closed or its writer is gone
    Closed,
}

/// Handle for a single live connection
pub struct Connection {
    id: ConnectionId,

    /// Room, fixed at connect time
    room: RoomId,

    /// Remote peer address, when the transport knows it
    peer_addr: Option<SocketAddr>,

    /// Outbound queue feeding the connection's writer
    tx: mpsc::Sender<RelayFrame>,

    /// Frames successfully queued
    delivered: AtomicU64,

    /// Frames dropped because the queue was full
    dropped: AtomicU64,

    /// Close latch, set exactly once
    closed: AtomicBool,

    /// Wakes the connection task when the latch is set from elsewhere
    shutdown: Notify,

    connected_at: Instant,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(
        id: ConnectionId,
        room: RoomId,
        peer_addr: Option<SocketAddr>,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<RelayFrame>) {
        let (tx, rx) = mpsc::channel(outbound_capacity.max(1));

        let connection = Self {
            id,
            room,
            peer_addr,
            tx,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            connected_at: Instant::now(),
        };

        (connection, rx)
    }

    /// Get the connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the room this connection belongs to
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Get the remote peer address
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Offer a frame to the outbound queue without waiting
    ///
    /// Safe to call concurrently from any number of senders and while the
    /// connection is being torn down.
    pub fn try_send(&self, frame: RelayFrame) -> SendOutcome {
        if self.is_closed() {
            return SendOutcome::Closed;
        }

        match self.tx.try_send(frame) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Delivered
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Set the close latch
    ///
    /// Returns `true` only for the call that actually closed the connection.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.shutdown.notify_one();
        }
        first
    }

    /// Check if the close latch is set
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.shutdown.notified().await;
    }

    /// Number of frames queued for this connection
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of frames dropped for this connection
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Time since the connection was opened
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
