//! Queue configuration.
//!
//! All parameters are fixed at construction time and immutable for the life
//! of the queue. The four optimization flags select which batching layers are
//! active; their legality constraint (backtracking and adaptive tuning only
//! make sense on top of consumer batching) is enforced by [`QueueConfig::validate`]
//! rather than silently ignored.

use thiserror::Error;

/// Default number of slots.
pub const DEFAULT_CAPACITY: usize = 8192;

/// Default wait after a failed batch probe, in ticks of the internal
/// cycle counter.
pub const DEFAULT_CONGESTION_PENALTY: u64 = 1000;

/// Batch sizes default to `capacity / 16`.
const DEFAULT_BATCH_DIVISOR: usize = 16;

/// Rejected queue configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Capacity must be at least one slot.
    #[error("capacity must be greater than 0")]
    ZeroCapacity,

    /// An enabled batch size must be nonzero, at most the capacity, and
    /// divide it evenly so batch boundaries land on slot indices.
    #[error("{side} batch size {batch} must be in 1..={capacity} and divide capacity {capacity} evenly")]
    BadBatchSize {
        /// Which side's batch size was rejected (`"producer"` or `"consumer"`).
        side: &'static str,
        /// The offending batch size.
        batch: usize,
        /// The configured capacity.
        capacity: usize,
    },

    /// Backtracking only applies when consumer batching is enabled.
    #[error("backtracking requires consumer batching")]
    BacktrackingWithoutBatching,

    /// Adaptive tuning only applies when consumer batching is enabled.
    #[error("adaptive tuning requires consumer batching")]
    AdaptiveWithoutBatching,
}

/// Construction-time queue configuration.
///
/// The defaults mirror a throughput-oriented setup: consumer batching with
/// backtracking and adaptive tuning on, producer batching off, batch sizes of
/// one sixteenth of the capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of slots. Enabled batch sizes must divide this evenly.
    pub capacity: usize,

    /// Ticks to wait after a failed batch probe before reporting
    /// full/empty to the caller, bounding retry-loop coherence traffic.
    pub congestion_penalty: u64,

    /// Amortize the producer's occupancy check over a batch of slots.
    pub producer_batching: bool,

    /// Amortize the consumer's occupancy check over a batch of slots.
    pub consumer_batching: bool,

    /// Let the consumer claim progressively smaller sub-batches when a full
    /// batch is not ready. Requires `consumer_batching`.
    pub backtracking: bool,

    /// Persist the learned sub-batch size across claims so backtracking does
    /// not restart from the full batch size. Requires `consumer_batching`.
    pub adaptive: bool,

    /// Slots granted per producer batch claim (used iff `producer_batching`).
    pub producer_batch_size: usize,

    /// Slots granted per consumer batch claim (used iff `consumer_batching`).
    pub consumer_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            congestion_penalty: DEFAULT_CONGESTION_PENALTY,
            producer_batching: false,
            consumer_batching: true,
            backtracking: true,
            adaptive: true,
            producer_batch_size: DEFAULT_CAPACITY / DEFAULT_BATCH_DIVISOR,
            consumer_batch_size: DEFAULT_CAPACITY / DEFAULT_BATCH_DIVISOR,
        }
    }
}

impl QueueConfig {
    /// Builder-style setter for capacity.
    ///
    /// Also re-derives both batch sizes to `capacity / 16` (minimum 1); call
    /// the batch-size setters afterwards to override.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        let batch = (capacity / DEFAULT_BATCH_DIVISOR).max(1);
        self.producer_batch_size = batch;
        self.consumer_batch_size = batch;
        self
    }

    /// Builder-style setter for the congestion penalty, in ticks.
    #[must_use]
    pub const fn with_congestion_penalty(mut self, ticks: u64) -> Self {
        self.congestion_penalty = ticks;
        self
    }

    /// Builder-style setter for producer batching.
    #[must_use]
    pub const fn with_producer_batching(mut self, enabled: bool) -> Self {
        self.producer_batching = enabled;
        self
    }

    /// Builder-style setter for consumer batching.
    #[must_use]
    pub const fn with_consumer_batching(mut self, enabled: bool) -> Self {
        self.consumer_batching = enabled;
        self
    }

    /// Builder-style setter for consumer backtracking.
    #[must_use]
    pub const fn with_backtracking(mut self, enabled: bool) -> Self {
        self.backtracking = enabled;
        self
    }

    /// Builder-style setter for adaptive batch-size tuning.
    #[must_use]
    pub const fn with_adaptive(mut self, enabled: bool) -> Self {
        self.adaptive = enabled;
        self
    }

    /// Builder-style setter for the producer batch size.
    #[must_use]
    pub const fn with_producer_batch_size(mut self, batch: usize) -> Self {
        self.producer_batch_size = batch;
        self
    }

    /// Builder-style setter for the consumer batch size.
    #[must_use]
    pub const fn with_consumer_batch_size(mut self, batch: usize) -> Self {
        self.consumer_batch_size = batch;
        self
    }

    /// Checks the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the capacity is zero, an enabled batch
    /// size does not evenly partition the capacity, or backtracking/adaptive
    /// tuning is requested without consumer batching.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.producer_batching {
            Self::check_batch("producer", self.producer_batch_size, self.capacity)?;
        }
        if self.consumer_batching {
            Self::check_batch("consumer", self.consumer_batch_size, self.capacity)?;
        }
        if self.backtracking && !self.consumer_batching {
            return Err(ConfigError::BacktrackingWithoutBatching);
        }
        if self.adaptive && !self.consumer_batching {
            return Err(ConfigError::AdaptiveWithoutBatching);
        }
        Ok(())
    }

    fn check_batch(side: &'static str, batch: usize, capacity: usize) -> Result<(), ConfigError> {
        if batch == 0 || batch > capacity || capacity % batch != 0 {
            return Err(ConfigError::BadBatchSize {
                side,
                batch,
                capacity,
            });
        }
        Ok(())
    }

    /// Producer batch size as seen by collaborators: 0 when producer
    /// batching is off.
    #[must_use]
    pub const fn effective_producer_batch_size(&self) -> usize {
        if self.producer_batching {
            self.producer_batch_size
        } else {
            0
        }
    }

    /// Consumer batch size as seen by collaborators: 0 when consumer
    /// batching is off.
    #[must_use]
    pub const fn effective_consumer_batch_size(&self) -> usize {
        if self.consumer_batching {
            self.consumer_batch_size
        } else {
            0
        }
    }

    /// Step by which `batch_history` recovers toward the full batch size
    /// after a complete wrap (half a batch, minimum 1).
    pub(crate) const fn batch_increment(&self) -> usize {
        let half = self.consumer_batch_size / 2;
        if half == 0 { 1 } else { half }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.consumer_batch_size, DEFAULT_CAPACITY / 16);
    }

    #[test]
    fn builder_pattern() {
        let config = QueueConfig::default()
            .with_capacity(64)
            .with_congestion_penalty(500)
            .with_producer_batching(true)
            .with_producer_batch_size(8);

        assert_eq!(config.capacity, 64);
        assert_eq!(config.congestion_penalty, 500);
        assert!(config.producer_batching);
        assert_eq!(config.producer_batch_size, 8);
        // with_capacity re-derived the consumer batch size
        assert_eq!(config.consumer_batch_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = QueueConfig::default().with_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn uneven_batch_rejected() {
        let config = QueueConfig::default()
            .with_capacity(16)
            .with_consumer_batch_size(5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::BadBatchSize {
                side: "consumer",
                batch: 5,
                capacity: 16,
            })
        );
    }

    #[test]
    fn oversized_producer_batch_rejected() {
        let config = QueueConfig::default()
            .with_capacity(16)
            .with_producer_batching(true)
            .with_producer_batch_size(32);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadBatchSize {
                side: "producer",
                ..
            })
        ));
    }

    #[test]
    fn disabled_side_batch_size_is_ignored() {
        // Producer batching off: its batch size is irrelevant.
        let config = QueueConfig::default()
            .with_capacity(16)
            .with_producer_batch_size(7);
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_producer_batch_size(), 0);
        assert_eq!(config.effective_consumer_batch_size(), 1);
    }

    #[test]
    fn backtracking_requires_consumer_batching() {
        let config = QueueConfig::default()
            .with_consumer_batching(false)
            .with_adaptive(false);
        assert_eq!(
            config.validate(),
            Err(ConfigError::BacktrackingWithoutBatching)
        );
    }

    #[test]
    fn adaptive_requires_consumer_batching() {
        let config = QueueConfig::default()
            .with_consumer_batching(false)
            .with_backtracking(false);
        assert_eq!(config.validate(), Err(ConfigError::AdaptiveWithoutBatching));
    }

    #[test]
    fn batch_increment_is_half_batch() {
        let config = QueueConfig::default()
            .with_capacity(32)
            .with_consumer_batch_size(8);
        assert_eq!(config.batch_increment(), 4);

        let tiny = QueueConfig::default()
            .with_capacity(4)
            .with_consumer_batch_size(1);
        assert_eq!(tiny.batch_increment(), 1);
    }
}
