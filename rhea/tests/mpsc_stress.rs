//! Multi-producer stress tests for the MPSC queue.
//!
//! These tests drive many producer threads against one consumer and verify
//! the queue's conservation properties:
//! 1. Every element whose offer succeeded is polled exactly once
//! 2. Per producer, elements come out in offer order
//! 3. Occupancy never exceeds capacity
//!
//! The full-scale run (3 producers x 1,000,000 elements) is `#[ignore]`d to
//! keep CI fast:
//! ```bash
//! cargo test --release --test mpsc_stress -- --ignored
//! ```
//!
//! The suite is a good ThreadSanitizer target:
//! ```bash
//! RUSTFLAGS="-Zsanitizer=thread" cargo +nightly test --test mpsc_stress
//! ```
//!
//! To see construction traces:
//! ```bash
//! RUST_LOG=rhea=debug cargo test --features tracing --test mpsc_stress -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;

use rhea::sync::mpsc;

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        rhea::init_tracing();
    });
}

/// Per-producer sequence numbers are packed below this stride, so a polled
/// value identifies both its producer and its position in that producer's
/// offer order.
const STRIDE: u64 = 1 << 32;

/// Runs `producers` threads each offering `items_per_producer` sequenced
/// values (retrying on full) against one consumer, then checks conservation
/// and per-producer FIFO.
fn run_stress(producers: usize, items_per_producer: usize, capacity: usize) {
    let (producer, mut consumer) = mpsc::queue::<u64>(capacity).unwrap();
    let total = producers * items_per_producer;

    let producer_threads: Vec<_> = (0..producers)
        .map(|p| {
            let producer = producer.clone();
            thread::spawn(move || {
                for seq in 0..items_per_producer as u64 {
                    let value = p as u64 * STRIDE + seq;
                    while producer.offer(value).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    drop(producer);

    let consumer_thread = thread::spawn(move || {
        let mut next_seq = vec![0u64; producers];
        let mut received = 0usize;
        while received < total {
            if let Some(value) = consumer.poll() {
                let p = (value / STRIDE) as usize;
                let seq = value % STRIDE;
                assert_eq!(
                    seq, next_seq[p],
                    "producer {p} out of order (received {received} of {total})"
                );
                next_seq[p] += 1;
                received += 1;

                if received % 1024 == 0 {
                    let size = consumer.size();
                    assert!(size <= capacity, "size {size} exceeds capacity {capacity}");
                }
            } else {
                thread::yield_now();
            }
        }
        (consumer, next_seq)
    });

    for t in producer_threads {
        t.join().unwrap();
    }
    let (mut consumer, next_seq) = consumer_thread.join().unwrap();

    // Everything offered arrived; nothing extra is left behind.
    for (p, seq) in next_seq.iter().enumerate() {
        assert_eq!(*seq as usize, items_per_producer, "producer {p} short");
    }
    assert_eq!(consumer.poll(), None);
    assert!(consumer.is_empty());
    assert_eq!(consumer.size(), 0);
}

#[test]
fn test_three_producers_one_consumer() {
    init_test_tracing();
    run_stress(3, 100_000, 1024);
}

#[test]
fn test_many_producers_small_queue() {
    init_test_tracing();
    // A tiny queue forces constant full/empty transitions and wrap-around.
    run_stress(8, 10_000, 4);
}

#[test]
fn test_sparse_layout_under_contention() {
    init_test_tracing();
    let config = rhea::Config {
        sparse_shift: 2,
        ..rhea::Config::default()
    };
    let (producer, mut consumer) = mpsc::queue_with::<u64>(256, config).unwrap();

    let producer_threads: Vec<_> = (0..4)
        .map(|p| {
            let producer = producer.clone();
            thread::spawn(move || {
                for seq in 0..50_000u64 {
                    while producer.offer(p as u64 * STRIDE + seq).is_err() {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut next_seq = [0u64; 4];
    let mut received = 0;
    while received < 200_000 {
        if let Some(value) = consumer.poll() {
            let p = (value / STRIDE) as usize;
            assert_eq!(value % STRIDE, next_seq[p]);
            next_seq[p] += 1;
            received += 1;
        } else {
            thread::yield_now();
        }
    }

    for t in producer_threads {
        t.join().unwrap();
    }
}

#[test]
fn test_rejected_offers_are_not_delivered() {
    init_test_tracing();
    // Producers do NOT retry: the consumer must see exactly the accepted
    // elements, no more, no fewer.
    let (producer, mut consumer) = mpsc::queue::<u64>(8).unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let producer_threads: Vec<_> = (0..3)
        .map(|p| {
            let producer = producer.clone();
            let accepted = accepted.clone();
            thread::spawn(move || {
                for seq in 0..10_000u64 {
                    if producer.offer(p as u64 * STRIDE + seq).is_ok() {
                        accepted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    drop(producer);

    let done_clone = done.clone();
    let consumer_thread = thread::spawn(move || {
        let mut received = 0usize;
        loop {
            if consumer.poll().is_some() {
                received += 1;
            } else if done_clone.load(Ordering::Acquire) && consumer.is_empty() {
                return received;
            } else {
                thread::yield_now();
            }
        }
    });

    for t in producer_threads {
        t.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let received = consumer_thread.join().unwrap();
    assert_eq!(received, accepted.load(Ordering::Relaxed));
}

#[test]
#[ignore]
fn test_full_scale_three_million() {
    init_test_tracing();
    run_stress(3, 1_000_000, 1024);
}
