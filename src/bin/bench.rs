//! Batched SPSC queue throughput and ping-pong benchmark.
//!
//! Usage:
//!     cargo run --release --bin bqueue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bqueue::{Consumer, Producer, QueueConfig, channel};

const QUEUE_SIZE: usize = 1 << 16;
const BATCH_SIZE: usize = 1 << 8;
const ITERATIONS: u64 = 1 << 24;

type Payload = u64;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn batched_config() -> QueueConfig {
    QueueConfig::default()
        .with_capacity(QUEUE_SIZE)
        .with_producer_batching(true)
        .with_producer_batch_size(BATCH_SIZE)
        .with_consumer_batch_size(BATCH_SIZE)
}

fn bench_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let (producer, consumer) = channel::<Payload>(batched_config()).expect("valid config");

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    // Consumer thread; payloads start at 1 because zero is the sentinel.
    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        for expected in 1..=ITERATIONS {
            loop {
                if let Some(value) = consumer.pop() {
                    assert_eq!(value, expected, "FIFO order violated");
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    pin_to_cpu(producer_cpu);

    let start = Instant::now();

    for i in 1..=ITERATIONS {
        while producer.push(i).is_err() {
            hint::spin_loop();
        }
    }

    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = u128::from(ITERATIONS) * 1_000_000 / elapsed.as_nanos();
    println!("{ops_per_ms} ops/ms");
}

fn ping_pong_responder(rx: Consumer<Payload>, tx: Producer<Payload>, rounds: u64) {
    for _ in 0..rounds {
        loop {
            if let Some(value) = rx.pop() {
                while tx.push(value).is_err() {
                    hint::spin_loop();
                }
                break;
            }
            hint::spin_loop();
        }
    }
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    // Unbatched queues: round trips are latency-bound, one element in flight.
    let config = QueueConfig::default()
        .with_capacity(QUEUE_SIZE)
        .with_consumer_batching(false)
        .with_backtracking(false)
        .with_adaptive(false);
    let rounds = ITERATIONS / 16;

    let (q1_tx, q1_rx) = channel::<Payload>(config.clone()).expect("valid config");
    let (q2_tx, q2_rx) = channel::<Payload>(config).expect("valid config");

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);
        ping_pong_responder(q1_rx, q2_tx, rounds);
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    pin_to_cpu(producer_cpu);

    let start = Instant::now();

    for i in 1..=rounds {
        while q1_tx.push(i).is_err() {
            hint::spin_loop();
        }
        loop {
            if q2_rx.pop().is_some() {
                break;
            }
            hint::spin_loop();
        }
    }

    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / u128::from(rounds);
    println!("{rtt_ns} ns RTT");
}

fn main() {
    bqueue::init_tracing();
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!(
        "bqueue SPSC (size={QUEUE_SIZE}, batch={BATCH_SIZE}, iters={ITERATIONS}):"
    );
    bench_throughput(producer_cpu, consumer_cpu);
    bench_rtt(producer_cpu, consumer_cpu);
}
