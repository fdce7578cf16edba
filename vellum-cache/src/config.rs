//! Cache configuration.

/// Configuration for the cache's write side.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity of the invalidation event channel.
    pub event_queue_capacity: usize,
    /// Whether a content update refreshes the cached document in place
    /// (preserving handle identity) or simply evicts it. Eviction is
    /// the cheap mode for callers that re-fetch on next access anyway.
    pub refresh_on_update: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 256,
            refresh_on_update: true,
        }
    }
}

impl CacheConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the invalidation event channel capacity.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Choose between in-place refresh and eviction on content updates.
    pub fn with_refresh_on_update(mut self, refresh: bool) -> Self {
        self.refresh_on_update = refresh;
        self
    }
}
