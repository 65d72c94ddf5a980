//! Safe facade over the batched SPSC ring.
//!
//! A queue is created with [`channel`], which validates the configuration,
//! initializes the ring (slots cleared to the sentinel, cursors zeroed,
//! batch history at the full batch size), and returns the two ends:
//!
//! - [`Producer`] - write end (single producer per queue)
//! - [`Consumer`] - read end (single consumer per queue)
//!
//! Both ends are `Send` but not `Sync`, so the single-producer /
//! single-consumer contract is enforced by the type system: each end can be
//! moved to its thread, but a shared reference cannot be used from two
//! threads at once.
//!
//! # Example
//!
//! ```
//! use bqueue::{QueueConfig, channel};
//!
//! let config = QueueConfig::default().with_capacity(64);
//! let (producer, consumer) = channel::<u64>(config).unwrap();
//!
//! producer.push(42).expect("queue full");
//! assert_eq!(consumer.pop(), Some(42));
//! ```
//!
//! Full and empty are expected steady-state outcomes, not failures:
//! `push` hands the value back as `Err(value)` and `pop` returns `None`, and
//! callers retry. The ring has already paid the configured congestion
//! penalty before either status is reported, so a tight retry loop does not
//! saturate the cross-core cache traffic the design exists to avoid.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;

use crate::config::{ConfigError, QueueConfig};
use crate::ring::Ring;
use crate::trace::debug;
use crate::word::Word;

/// Timeout specification for the blocking convenience wrappers.
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Retry indefinitely.
    Infinite,
    /// Retry for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Marker type to opt out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the queue.
///
/// # Thread safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]: ownership can move to the
/// producer thread, but `&Producer` cannot be shared for concurrent pushes.
pub struct Producer<W: Word> {
    ring: Arc<Ring<W>>,
    _unsync: PhantomUnsync,
}

/// Read end of the queue.
///
/// See [`Producer`] for thread-safety details; the same semantics apply.
pub struct Consumer<W: Word> {
    ring: Arc<Ring<W>>,
    _unsync: PhantomUnsync,
}

/// Creates a new batched SPSC channel with the given configuration.
///
/// Initialization runs to completion here, before either end exists, so the
/// ordering requirement "init happens before concurrent use" holds by
/// construction.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the configuration violates its invariants
/// (zero capacity, a batch size that does not evenly partition the capacity,
/// or backtracking/adaptive tuning without consumer batching).
pub fn channel<W: Word>(config: QueueConfig) -> Result<(Producer<W>, Consumer<W>), ConfigError> {
    config.validate()?;
    debug!(
        capacity = config.capacity,
        producer_batching = config.producer_batching,
        consumer_batching = config.consumer_batching,
        backtracking = config.backtracking,
        adaptive = config.adaptive,
        "spsc channel created"
    );

    let ring = Arc::new(Ring::new(config));

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    Ok((producer, consumer))
}

impl<W: Word> Producer<W> {
    /// Attempts to enqueue `value`.
    ///
    /// With producer batching enabled, a failed batch probe rejects the whole
    /// batch and pays the congestion penalty before returning.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full (or the next write batch is
    /// unavailable), handing the value back for retry.
    ///
    /// # Panics
    ///
    /// Panics if `value` is the zero sentinel: a zero element would be
    /// indistinguishable from an empty slot.
    #[inline]
    pub fn push(&self, value: W) -> Result<(), W> {
        assert!(
            value != W::ZERO,
            "the zero sentinel cannot be enqueued as data"
        );
        // SAFETY: Producer is Send + !Sync, so exactly one thread can be
        // calling into the producer side of the ring. The ring was
        // initialized by channel() before this end existed.
        unsafe { self.ring.push(value) }
    }

    /// Retries [`Self::push`] until it succeeds or the timeout expires.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` on timeout.
    #[inline]
    pub fn push_blocking(&self, mut value: W, timeout: Timeout) -> Result<(), W> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            match self.push(value) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    value = returned;
                    if deadline.is_some_and(|dl| Instant::now() > dl) {
                        return Err(value);
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// The queue's immutable configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        self.ring.config()
    }
}

impl<W: Word> Consumer<W> {
    /// Attempts to dequeue the next value.
    ///
    /// Returns `None` if the queue is empty or, with consumer batching, if no
    /// batch boundary could be claimed this call; the ring has already paid
    /// the congestion penalty in the latter case.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<W> {
        // SAFETY: Consumer is Send + !Sync, so exactly one thread can be
        // calling into the consumer side of the ring. The ring was
        // initialized by channel() before this end existed.
        unsafe { self.ring.pop() }
    }

    /// Retries [`Self::pop`] until a value arrives or the timeout expires.
    ///
    /// Returns `None` on timeout.
    #[inline]
    #[must_use]
    pub fn pop_blocking(&self, timeout: Timeout) -> Option<W> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(Instant::now() + d),
        };
        loop {
            if let Some(value) = self.pop() {
                return Some(value);
            }
            if deadline.is_some_and(|dl| Instant::now() > dl) {
                return None;
            }
            std::hint::spin_loop();
        }
    }

    /// The queue's immutable configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        self.ring.config()
    }

    /// Current learned sub-batch size, for tests on the consumer thread.
    #[cfg(test)]
    pub(crate) fn batch_history(&self) -> usize {
        // SAFETY: This end is the single consumer.
        unsafe { self.ring.batch_history() }
    }
}
