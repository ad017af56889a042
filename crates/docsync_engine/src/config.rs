//! Engine configuration.

use std::time::Duration;

/// Configuration for the transition engine and sync orchestrator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of documents worked concurrently in a sync run.
    ///
    /// An explicit bound, not a global lock: documents below the cap
    /// proceed fully in parallel; conflicting work on one document is
    /// serialized by its per-document lock.
    pub max_in_flight: usize,
    /// How long a document must stay missing before it is pruned.
    pub missing_grace: Duration,
    /// How many transition attempts the in-memory log retains.
    pub attempt_log_capacity: usize,
}

impl EngineConfig {
    /// Creates a configuration with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_in_flight: 4,
            missing_grace: Duration::from_secs(60 * 60),
            attempt_log_capacity: 1024,
        }
    }

    /// Sets the concurrency cap.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Sets the missing-document grace period.
    #[must_use]
    pub fn with_missing_grace(mut self, grace: Duration) -> Self {
        self.missing_grace = grace;
        self
    }

    /// Sets the attempt log capacity.
    #[must_use]
    pub fn with_attempt_log_capacity(mut self, capacity: usize) -> Self {
        self.attempt_log_capacity = capacity;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = EngineConfig::new()
            .with_max_in_flight(16)
            .with_missing_grace(Duration::from_secs(5))
            .with_attempt_log_capacity(64);
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.missing_grace, Duration::from_secs(5));
        assert_eq!(config.attempt_log_capacity, 64);
    }

    #[test]
    fn concurrency_cap_is_at_least_one() {
        let config = EngineConfig::new().with_max_in_flight(0);
        assert_eq!(config.max_in_flight, 1);
    }
}
