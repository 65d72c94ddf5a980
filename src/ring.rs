//! Core lock-free batched SPSC ring algorithm.
//!
//! This module holds the slot array, the zero-sentinel occupancy protocol,
//! and the batch-claim algorithms for both sides, including consumer
//! backtracking and adaptive batch-size tuning.
//!
//! Slot occupancy is the only cross-thread signal: a slot differing from
//! [`Word::ZERO`] is live, a zero slot is free. The producer writes slots in
//! strictly increasing index order (mod capacity) and the consumer clears
//! them in strictly increasing index order, which is what makes a single
//! boundary probe stand in for per-slot occupancy checks: if the boundary
//! slot of a candidate batch is in the required state, every slot before it
//! must be too, because neither side can skip ahead.
//!
//! # Safety
//!
//! The types in this module have unsafe APIs because they require the caller
//! to uphold the SPSC invariant: exactly one producer and one consumer, with
//! no concurrent access to either role.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use crate::config::QueueConfig;
use crate::trace::trace;
use crate::wait::wait_ticks;
use crate::word::Word;

/// Role marker: fields with this role are owned exclusively by the producer.
pub(crate) struct ProducerRole;

/// Role marker: fields with this role are owned exclusively by the consumer.
pub(crate) struct ConsumerRole;

/// Interior-mutable cell with a role marker for nominal type safety.
///
/// The `Role` parameter has no runtime effect; it makes producer-owned and
/// consumer-owned cursor cells distinct types at compile time.
#[repr(transparent)]
pub(crate) struct RoleCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T, Role> RoleCell<T, Role> {
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    pub(crate) const fn get(&self) -> &UnsafeCell<T> {
        &self.0
    }
}

// SAFETY: RoleCell is Sync because every cell is written by exactly one
// thread (the one holding its role) and never read by the other; the slot
// array, not these cells, carries all cross-thread communication.
unsafe impl<T: Send, Role> Sync for RoleCell<T, Role> {}
unsafe impl<T: Send, Role> Send for RoleCell<T, Role> {}

/// Cursor cell owned exclusively by the producer.
pub(crate) type ProducerCursor = RoleCell<usize, ProducerRole>;

/// Cursor cell owned exclusively by the consumer.
pub(crate) type ConsumerCursor = RoleCell<usize, ConsumerRole>;

/// Producer-side cursors, on their own cache line.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ProducerState {
    /// Next slot the producer will write.
    head: ProducerCursor,

    /// One past the furthest slot currently granted for writing without a
    /// probe. Equals `head` when no batch is outstanding; meaningful only
    /// with producer batching.
    batch_head: ProducerCursor,
}

impl ProducerState {
    const fn new() -> Self {
        Self {
            head: ProducerCursor::new(0),
            batch_head: ProducerCursor::new(0),
        }
    }
}

/// Consumer-side cursors, on their own cache line.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct ConsumerState {
    /// Next slot the consumer will read.
    tail: ConsumerCursor,

    /// One past the furthest slot currently granted for reading without a
    /// probe. Meaningful only with consumer batching.
    batch_tail: ConsumerCursor,

    /// Learned estimate of a sustainable sub-batch size; the starting point
    /// for backtracking. Always in `[0, consumer_batch_size]`.
    batch_history: ConsumerCursor,
}

impl ConsumerState {
    const fn new(full_batch: usize) -> Self {
        Self {
            tail: ConsumerCursor::new(0),
            batch_tail: ConsumerCursor::new(0),
            batch_history: ConsumerCursor::new(full_batch),
        }
    }
}

/// The batched SPSC ring.
///
/// Construction performs the whole `init` protocol: all slots cleared to the
/// sentinel, cursors zeroed, `batch_history` set to the full consumer batch
/// size. The configuration is immutable thereafter.
pub(crate) struct Ring<W: Word> {
    producer: ProducerState,
    consumer: ConsumerState,
    config: QueueConfig,
    slots: Box<[W::Atomic]>,
}

impl<W: Word> Ring<W> {
    /// Creates an initialized ring. `config` must already be validated.
    pub(crate) fn new(config: QueueConfig) -> Self {
        debug_assert!(config.validate().is_ok());

        let slots = (0..config.capacity)
            .map(|_| W::atomic_new(W::ZERO))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(config.consumer_batch_size),
            config,
            slots,
        }
    }

    pub(crate) const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Advances a cursor to the next slot index, wrapping to 0 at capacity.
    #[inline]
    fn bump(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.config.capacity { 0 } else { next }
    }

    /// `(cursor + n) mod capacity` for `n <= capacity`.
    #[inline]
    fn wrap_add(&self, cursor: usize, n: usize) -> usize {
        debug_assert!(n <= self.config.capacity);
        let sum = cursor + n;
        if sum >= self.config.capacity {
            sum - self.config.capacity
        } else {
            sum
        }
    }

    /// Attempts to enqueue `value`.
    ///
    /// Returns `Err(value)` if the queue (or, with producer batching, the
    /// next write batch) is not available, handing the value back for retry.
    ///
    /// # Safety
    ///
    /// Caller must ensure only one thread ever calls this method (single
    /// producer).
    #[inline]
    pub(crate) unsafe fn push(&self, value: W) -> Result<(), W> {
        debug_assert!(value != W::ZERO, "the sentinel is not a legal element");

        // SAFETY: Producer has exclusive access to its head cursor.
        let head = unsafe { *self.producer.head.get().get() };

        if self.config.producer_batching {
            // SAFETY: Producer has exclusive access to batch_head.
            let batch_head = unsafe { *self.producer.batch_head.get().get() };
            if head == batch_head {
                // Batch exhausted: probe the single boundary slot. The
                // consumer clears slots in order, so a free boundary implies
                // every interior slot is free as well.
                let mut boundary = self.wrap_add(head, self.config.producer_batch_size);
                if W::load(&self.slots[boundary], Ordering::Acquire) != W::ZERO {
                    // Whole batch rejected even though interior slots may be
                    // free; pay the penalty so the retry loop does not hammer
                    // the boundary line.
                    trace!(head, boundary, "write batch probe failed");
                    wait_ticks(self.config.congestion_penalty);
                    return Err(value);
                }
                // A grant must cover at least one slot.
                if boundary == head {
                    boundary = self.bump(boundary);
                }
                trace!(head, boundary, "write batch granted");
                // SAFETY: Producer has exclusive write access to batch_head.
                unsafe {
                    *self.producer.batch_head.get().get() = boundary;
                }
            }
        } else if W::load(&self.slots[head], Ordering::Acquire) != W::ZERO {
            // Head slot still occupied: full, no wait on the unbatched path.
            return Err(value);
        }

        // Publish the value; Release pairs with the consumer's acquire loads
        // of this slot (probe or read).
        W::store(&self.slots[head], value, Ordering::Release);

        // SAFETY: Producer has exclusive write access to its head cursor;
        // bump preserves the [0, capacity) invariant.
        unsafe {
            *self.producer.head.get().get() = self.bump(head);
        }

        Ok(())
    }

    /// Attempts to dequeue a value. Returns `None` if no element (or, with
    /// consumer batching, no claimable batch) is ready.
    ///
    /// # Safety
    ///
    /// Caller must ensure only one thread ever calls this method (single
    /// consumer).
    #[inline]
    pub(crate) unsafe fn pop(&self) -> Option<W> {
        // SAFETY: Consumer has exclusive access to its tail cursor.
        let tail = unsafe { *self.consumer.tail.get().get() };

        if self.config.consumer_batching {
            // SAFETY: Consumer has exclusive access to batch_tail.
            let batch_tail = unsafe { *self.consumer.batch_tail.get().get() };
            if tail == batch_tail {
                // Previous batch fully drained; claim the next one.
                // SAFETY: Forwarding the single-consumer contract.
                if !unsafe { self.claim_read_batch(tail) } {
                    return None;
                }
            }
        } else if W::load(&self.slots[tail], Ordering::Acquire) == W::ZERO {
            return None;
        }

        // Acquire pairs with the producer's release store of this slot.
        let value = W::load(&self.slots[tail], Ordering::Acquire);
        debug_assert!(value != W::ZERO);

        // Clearing the slot is the free signal to the producer; Release so
        // the producer's acquire probe orders our read before its overwrite.
        W::store(&self.slots[tail], W::ZERO, Ordering::Release);

        // SAFETY: Consumer has exclusive write access to its tail cursor;
        // bump preserves the [0, capacity) invariant.
        unsafe {
            *self.consumer.tail.get().get() = self.bump(tail);
        }

        Some(value)
    }

    /// Claims the next read batch, backtracking to smaller sub-batches when
    /// enabled. Returns `false` if nothing could be claimed this call.
    ///
    /// # Safety
    ///
    /// Single-consumer contract as for [`Self::pop`].
    unsafe fn claim_read_batch(&self, tail: usize) -> bool {
        let full = self.config.consumer_batch_size;
        let mut boundary = self.wrap_add(tail, full);

        if tail + full >= self.config.capacity && self.config.adaptive {
            // Completed a full wrap without starving: let the learned batch
            // size creep back up toward the configured one.
            // SAFETY: Consumer has exclusive access to batch_history.
            let history = unsafe { &mut *self.consumer.batch_history.get().get() };
            if *history < full {
                *history = full.min(*history + self.config.batch_increment());
                trace!(batch_history = *history, "adaptive batch size recovered");
            }
        }

        if self.config.backtracking {
            // Start from the learned sub-batch size, not the full batch, and
            // halve on every miss. A probe at distance 0 is the tail slot
            // itself, i.e. plain per-slot availability.
            // SAFETY: Consumer has exclusive access to batch_history.
            let mut sub = unsafe { *self.consumer.batch_history.get().get() };
            boundary = self.wrap_add(tail, sub);
            loop {
                if W::load(&self.slots[boundary], Ordering::Acquire) != W::ZERO {
                    break;
                }
                wait_ticks(self.config.congestion_penalty);
                if sub == 0 {
                    return false;
                }
                sub >>= 1;
                trace!(sub, "backtracking shrink");
                boundary = self.wrap_add(tail, sub);
            }
            if self.config.adaptive {
                // SAFETY: Consumer has exclusive write access to batch_history.
                unsafe {
                    *self.consumer.batch_history.get().get() = sub;
                }
            }
        } else if W::load(&self.slots[boundary], Ordering::Acquire) == W::ZERO {
            trace!(tail, boundary, "read batch probe failed");
            wait_ticks(self.config.congestion_penalty);
            return false;
        }

        // A grant must cover at least one slot.
        if boundary == tail {
            boundary = self.bump(boundary);
        }
        trace!(tail, boundary, "read batch granted");

        // SAFETY: Consumer has exclusive write access to batch_tail.
        unsafe {
            *self.consumer.batch_tail.get().get() = boundary;
        }
        true
    }

    /// Current `batch_history`, for consumer-side inspection in tests.
    ///
    /// # Safety
    ///
    /// Single-consumer contract as for [`Self::pop`].
    #[cfg(test)]
    pub(crate) unsafe fn batch_history(&self) -> usize {
        // SAFETY: Caller is the consumer thread.
        unsafe { *self.consumer.batch_history.get().get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(config: QueueConfig) -> Ring<u64> {
        config.validate().expect("test config must be valid");
        Ring::new(config)
    }

    fn plain(capacity: usize) -> QueueConfig {
        QueueConfig::default()
            .with_capacity(capacity)
            .with_consumer_batching(false)
            .with_backtracking(false)
            .with_adaptive(false)
            .with_congestion_penalty(0)
    }

    #[test]
    fn unbatched_fill_and_drain() {
        let r = ring(plain(4));
        unsafe {
            for i in 1..=4 {
                assert_eq!(r.push(i), Ok(()));
            }
            assert_eq!(r.push(99), Err(99));
            for i in 1..=4 {
                assert_eq!(r.pop(), Some(i));
            }
            assert_eq!(r.pop(), None);
            assert_eq!(r.push(99), Ok(()));
        }
    }

    #[test]
    fn producer_batch_reserves_headroom() {
        let config = plain(32)
            .with_producer_batching(true)
            .with_producer_batch_size(8);
        let r = ring(config);
        unsafe {
            // With batch size 8 the probe hits an occupied slot once
            // capacity - 8 values are in flight.
            for i in 1..=24u64 {
                assert_eq!(r.push(i), Ok(()), "push {i} should fit");
            }
            assert_eq!(r.push(25), Err(25));
            // Draining one batch frees the boundary slot.
            for i in 1..=8 {
                assert_eq!(r.pop(), Some(i));
            }
            assert_eq!(r.push(25), Ok(()));
        }
    }

    #[test]
    fn consumer_batch_claims_only_full_batches_without_backtracking() {
        let config = plain(16)
            .with_consumer_batching(true)
            .with_consumer_batch_size(4);
        let r = ring(config);
        unsafe {
            // Three elements: less than a batch, boundary slot empty.
            for i in 1..=3 {
                assert_eq!(r.push(i), Ok(()));
            }
            assert_eq!(r.pop(), None);
            // A fourth element occupies the boundary probe target's
            // predecessor; the probe at tail+4 still sees slot 4 empty.
            assert_eq!(r.push(4), Ok(()));
            assert_eq!(r.pop(), None);
            // One more makes slot 4 occupied, so the full batch is granted.
            assert_eq!(r.push(5), Ok(()));
            for i in 1..=4 {
                assert_eq!(r.pop(), Some(i));
            }
        }
    }

    #[test]
    fn backtracking_claims_partial_batches() {
        let config = plain(16)
            .with_consumer_batching(true)
            .with_consumer_batch_size(4)
            .with_backtracking(true)
            .with_adaptive(true);
        let r = ring(config);
        unsafe {
            r.push(1).unwrap();
            r.push(2).unwrap();
            // Probes shrink 4 -> 2 -> 1; slot at tail+1 is occupied.
            assert_eq!(r.pop(), Some(1));
            assert_eq!(r.batch_history(), 1);
            // Probe at tail+1 empty, then the tail slot itself is occupied.
            assert_eq!(r.pop(), Some(2));
            assert_eq!(r.batch_history(), 0);
            assert_eq!(r.pop(), None);
        }
    }

    #[test]
    fn adaptive_history_recovers_on_wrap() {
        let config = plain(8)
            .with_consumer_batching(true)
            .with_consumer_batch_size(4)
            .with_backtracking(true)
            .with_adaptive(true);
        let r = ring(config);
        unsafe {
            // Shrink history to 1 with a nearly-starved queue.
            r.push(1).unwrap();
            assert_eq!(r.pop(), Some(1));
            assert!(r.batch_history() <= 1);

            // Drive the cursors around the ring; each claim whose full-batch
            // boundary wraps nudges history up by batch_increment (2).
            let mut next = 2u64;
            for _ in 0..8 {
                for _ in 0..4 {
                    r.push(next).unwrap();
                    next += 1;
                }
                for _ in 0..4 {
                    assert!(r.pop().is_some());
                }
            }
            let history = r.batch_history();
            assert!(history <= 4, "history {history} exceeded the batch size");
        }
    }

    #[test]
    fn wraparound_preserves_fifo() {
        let config = plain(16)
            .with_consumer_batching(true)
            .with_consumer_batch_size(4)
            .with_backtracking(true)
            .with_adaptive(true);
        let r = ring(config);
        unsafe {
            let mut value = 1u64;
            let mut expect = 1u64;
            // 5+ full wraps in small interleaved bursts.
            for _ in 0..40 {
                for _ in 0..2 {
                    r.push(value).unwrap();
                    value += 1;
                }
                for _ in 0..2 {
                    assert_eq!(r.pop(), Some(expect));
                    expect += 1;
                }
            }
        }
    }
}
