//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Server-wide counters, updated lock-free from every connection task
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: Instant,
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    messages_received: AtomicU64,
    deliveries: AtomicU64,
    dropped_frames: AtomicU64,
    evictions: AtomicU64,
}

impl RelayMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn record_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one broadcast's outcome into the totals
    pub fn record_broadcast(&self, delivered: u64, dropped: u64, evicted: u64) {
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.dropped_frames.fetch_add(dropped, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters
    ///
    /// Live connection and room counts come from the registry, so the caller
    /// supplies them.
    pub fn snapshot(&self, active_connections: usize, active_rooms: usize) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: active_connections as u64,
            active_rooms: active_rooms as u64,
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current live connections
    pub active_connections: u64,
    /// Rooms with at least one member
    pub active_rooms: u64,
    /// Connections refused (limit reached or handler rejected)
    pub rejected_connections: u64,
    /// Inbound messages accepted for broadcast
    pub messages_received: u64,
    /// Frames queued to recipients
    pub deliveries: u64,
    /// Frames dropped on full recipient queues
    pub dropped_frames: u64,
    /// Recipients removed as slow or dead during broadcast
    pub evictions: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    /// Average recipients per inbound message
    pub fn fan_out(&self) -> f64 {
        if self.messages_received > 0 {
            self.deliveries as f64 / self.messages_received as f64
        } else {
            0.0
        }
    }
}
