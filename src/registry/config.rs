//! Registry configuration

/// Configuration for the connection registry and its outbound queues
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each connection's outbound queue, in frames
    pub outbound_capacity: usize,

    /// Total frames a connection may drop (queue full) before it is evicted
    /// as a slow consumer (0 = never evict)
    pub max_dropped_frames: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            max_dropped_frames: 100,
        }
    }
}

impl RegistryConfig {
    /// Set the per-connection outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        // mpsc::channel panics on zero capacity
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the slow consumer drop threshold
    pub fn max_dropped_frames(mut self, max: u64) -> Self {
        self.max_dropped_frames = max;
        self
    }
}
