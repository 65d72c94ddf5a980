//! Bounded lock-free SPSC queue optimized for core-to-core streams.
//!
//! `bqueue` passes a high-rate stream of fixed-width machine words between
//! one producer thread and one consumer thread, each typically pinned to a
//! dedicated core, with no locks, no compare-and-swap, and minimal
//! cache-coherence traffic. On top of a baseline circular buffer it layers
//! two independent optimizations:
//!
//! - **Batched occupancy checks**: each side verifies slot availability once
//!   per batch of slots instead of once per slot, amortizing the cross-core
//!   cache-line read. A single boundary probe is sound because each side
//!   advances through the ring strictly in order.
//! - **Backtracking with adaptive tuning**: when a full read batch is not
//!   ready, the consumer probes progressively smaller sub-batches, making
//!   partial progress instead of starving, and remembers the sub-batch size
//!   that worked so the next claim starts near the sustainable rate.
//!
//! Occupancy is encoded in the slots themselves: a slot equal to
//! [`Word::ZERO`] is empty, so zero can never be enqueued as data. Full and
//! empty are ordinary retryable outcomes; a failed batch probe first pays a
//! configurable congestion penalty (a bounded busy-wait on the cycle
//! counter) so retry loops stay off the shared cache lines.
//!
//! # Example
//!
//! ```
//! use bqueue::{QueueConfig, channel};
//!
//! let config = QueueConfig::default()
//!     .with_capacity(1024)
//!     .with_consumer_batch_size(64);
//! let (producer, consumer) = channel::<u64>(config).unwrap();
//!
//! let handle = std::thread::spawn(move || {
//!     for i in 1..=100u64 {
//!         while producer.push(i).is_err() {
//!             std::hint::spin_loop();
//!         }
//!     }
//! });
//!
//! let mut received = 0u64;
//! while received < 100 {
//!     if let Some(value) = consumer.pop() {
//!         received += 1;
//!         assert_eq!(value, received);
//!     }
//! }
//! handle.join().unwrap();
//! ```

pub mod config;
pub mod queue;
pub mod word;

mod ring;
mod trace;
mod wait;

pub use config::{ConfigError, QueueConfig};
pub use queue::{Consumer, Producer, Timeout, channel};
pub use trace::init_tracing;
pub use word::Word;
