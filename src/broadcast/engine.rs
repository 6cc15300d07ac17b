//! Room-scoped fan-out
//!
//! Delivers one sender's frame to every other member of the sender's room.

use std::sync::Arc;

use crate::registry::{Connection, ConnectionId, ConnectionRegistry, RelayFrame, SendOutcome};
use crate::stats::RelayMetrics;

/// Outcome of a single broadcast
///
/// Informational only. Nothing here is ever reported back to the sending
/// client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that matched (same room, not the sender)
    pub recipients: usize,
    /// Recipients whose queue accepted the frame
    pub delivered: usize,
    /// Recipients whose queue was full
    pub dropped: usize,
    /// Recipients removed from the registry as slow or dead
    pub evicted: usize,
}

/// Fan-out engine over a shared registry
#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl BroadcastEngine {
    /// Create an engine over the given registry
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Get the registry this engine delivers through
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `frame` to every connection in the sender's room except the
    /// sender itself
    ///
    /// Each recipient is handled independently. A full queue drops the frame
    /// for that recipient only; a recipient that keeps dropping, or whose
    /// link is already gone, is evicted after the pass. Never retries and
    /// never fails.
    pub async fn broadcast(&self, sender: &Connection, frame: &RelayFrame) -> BroadcastReport {
        let sender_id = sender.id();
        let room = sender.room();
        let max_drops = self.registry.config().max_dropped_frames;

        let mut delivered = 0;
        let mut dropped = 0;
        let mut to_evict: Vec<ConnectionId> = Vec::new();

        let recipients = self
            .registry
            .for_each_matching(
                |c| c.id() != sender_id && c.room() == room,
                |c| match c.try_send(frame.clone()) {
                    SendOutcome::Delivered => delivered += 1,
                    SendOutcome::Full => {
                        dropped += 1;
                        let drops = c.dropped_count();
                        if max_drops > 0 && drops >= max_drops {
                            tracing::warn!(
                                conn_id = %c.id(),
                                room = %room,
                                drops = drops,
                                connected_ms = c.duration().as_millis() as u64,
                                "Evicting slow consumer"
                            );
                            to_evict.push(c.id());
                        } else {
                            tracing::warn!(
                                conn_id = %c.id(),
                                room = %room,
                                total_drops = drops,
                                "Outbound queue full, frame dropped"
                            );
                        }
                    }
                    SendOutcome::Closed => {
                        tracing::debug!(
                            conn_id = %c.id(),
                            room = %room,
                            "Recipient link closed during broadcast"
                        );
                        to_evict.push(c.id());
                    }
                },
            )
            .await;

        let mut evicted = 0;
        for id in to_evict {
            if self.registry.remove(id).await.is_some() {
                evicted += 1;
            }
        }

        self.metrics
            .record_broadcast(delivered as u64, dropped as u64, evicted as u64);

        tracing::debug!(
            conn_id = %sender_id,
            room = %room,
            bytes = frame.len(),
            recipients = recipients,
            delivered = delivered,
            "Broadcast frame"
        );

        BroadcastReport {
            recipients,
            delivered,
            dropped,
            evicted,
        }
    }
}
