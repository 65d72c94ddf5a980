//! Element types the queue can carry.
//!
//! The queue moves fixed-width machine words and uses the all-zeros bit
//! pattern as its occupancy sentinel: a slot holding [`Word::ZERO`] is empty.
//! This is what lets each side infer slot availability from the slot itself
//! instead of reading the other side's cursor, at the cost of forbidding zero
//! as a payload.
//!
//! Each word type is paired with its atomic cell so slots shared between the
//! producer and consumer cores are accessed with explicit atomic loads and
//! stores of the appropriate ordering.

use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};

mod private {
    pub trait Sealed {}
}

/// A fixed-width unsigned machine word usable as a queue element.
///
/// Sealed: implemented for `u8`, `u16`, `u32`, `u64`, and `usize` only.
/// `ZERO` is reserved as the empty-slot sentinel and must never be enqueued.
pub trait Word: Copy + Eq + std::fmt::Debug + Send + private::Sealed + 'static {
    /// The reserved sentinel marking an unoccupied slot.
    const ZERO: Self;

    /// The atomic cell type backing a shared slot of this width.
    type Atomic: Send + Sync;

    /// Creates an atomic slot cell holding `value`.
    fn atomic_new(value: Self) -> Self::Atomic;

    /// Atomically loads the slot value.
    fn load(cell: &Self::Atomic, order: Ordering) -> Self;

    /// Atomically stores `value` into the slot.
    fn store(cell: &Self::Atomic, value: Self, order: Ordering);
}

macro_rules! impl_word {
    ($($word:ty => $atomic:ty),* $(,)?) => {
        $(
            impl private::Sealed for $word {}

            impl Word for $word {
                const ZERO: Self = 0;

                type Atomic = $atomic;

                #[inline]
                fn atomic_new(value: Self) -> Self::Atomic {
                    <$atomic>::new(value)
                }

                #[inline]
                fn load(cell: &Self::Atomic, order: Ordering) -> Self {
                    cell.load(order)
                }

                #[inline]
                fn store(cell: &Self::Atomic, value: Self, order: Ordering) {
                    cell.store(value, order)
                }
            }
        )*
    };
}

impl_word! {
    u8 => AtomicU8,
    u16 => AtomicU16,
    u32 => AtomicU32,
    u64 => AtomicU64,
    usize => AtomicUsize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_zero() {
        assert_eq!(<u64 as Word>::ZERO, 0);
        assert_eq!(<usize as Word>::ZERO, 0);
    }

    #[test]
    fn atomic_round_trip() {
        let cell = <u32 as Word>::atomic_new(7);
        assert_eq!(<u32 as Word>::load(&cell, Ordering::Acquire), 7);
        <u32 as Word>::store(&cell, 0, Ordering::Release);
        assert_eq!(<u32 as Word>::load(&cell, Ordering::Acquire), 0);
    }
}
