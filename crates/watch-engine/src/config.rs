//! Engine configuration.

use crate::coalescer::TickClass;
use std::time::Duration;

/// Tunables for the watch-and-stream engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a request waits for a session's initial list.
    pub sync_timeout: Duration,
    /// Tick interval for high-churn resources.
    pub fast_tick: Duration,
    /// Tick interval for low-churn resources.
    pub slow_tick: Duration,
    /// Maximum pending keys per coalescer before the oldest is evicted.
    pub coalescer_capacity: usize,
    /// Per-subscriber payload buffer.
    pub subscriber_buffer: usize,
    /// Lifetime of cached discovery results.
    pub discovery_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(10),
            fast_tick: Duration::from_millis(250),
            slow_tick: Duration::from_secs(1),
            coalescer_capacity: 1024,
            subscriber_buffer: 16,
            discovery_ttl: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Set the initial sync timeout.
    #[must_use]
    pub const fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the fast and slow tick intervals.
    #[must_use]
    pub const fn with_ticks(mut self, fast: Duration, slow: Duration) -> Self {
        self.fast_tick = fast;
        self.slow_tick = slow;
        self
    }

    /// Set the coalescer capacity.
    #[must_use]
    pub const fn with_coalescer_capacity(mut self, capacity: usize) -> Self {
        self.coalescer_capacity = capacity;
        self
    }

    /// Set the per-subscriber buffer.
    #[must_use]
    pub const fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    /// Set the discovery cache lifetime.
    #[must_use]
    pub const fn with_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    /// Tick interval for a churn class.
    #[must_use]
    pub const fn tick_for(&self, class: TickClass) -> Duration {
        match class {
            TickClass::Fast => self.fast_tick,
            TickClass::Slow => self.slow_tick,
        }
    }
}
