//! MPSC queue throughput and round-trip benchmark.
//!
//! Usage:
//!     cargo run --release --bin mpsc_bench
//!
//! Environment variables:
//!     NUM_PRODUCERS=3   Number of producer threads (default: 3)
//!     PRODUCER_CPUS=0,4 Pin producers to these CPUs (default: unpinned)
//!     CONSUMER_CPU=2    Pin consumer to CPU 2 (default: 2)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rhea::sync::mpsc;

const QUEUE_SIZE: usize = 1 << 16;
const ITERATIONS: usize = 1 << 22;
const RTT_ITERATIONS: usize = 1 << 20;

/// Per-producer sequence numbers are packed below this stride.
const STRIDE: u64 = 1 << 32;

fn num_producers() -> usize {
    env::var("NUM_PRODUCERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3)
}

fn producer_cpus() -> Vec<usize> {
    env::var("PRODUCER_CPUS")
        .ok()
        .map(|s| s.split(',').filter_map(|c| c.trim().parse().ok()).collect())
        .unwrap_or_default()
}

fn consumer_cpu() -> Option<usize> {
    env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2))
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn bench_throughput(producers: usize, producer_cpus: &[usize], consumer_cpu: Option<usize>) {
    let (producer, mut consumer) = mpsc::queue::<u64>(QUEUE_SIZE).unwrap();
    let per_producer = ITERATIONS / producers;

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    // Consumer thread: drain everything, checking per-producer order.
    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        let mut next_seq = vec![0u64; producers];
        for _ in 0..per_producer * producers {
            loop {
                if let Some(value) = consumer.poll() {
                    let p = (value / STRIDE) as usize;
                    let seq = value % STRIDE;
                    if seq != next_seq[p] {
                        panic!(
                            "order broken for producer {}: expected {}, got {}",
                            p, next_seq[p], seq
                        );
                    }
                    next_seq[p] += 1;
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    let start = Instant::now();

    let producer_threads: Vec<_> = (0..producers)
        .map(|p| {
            let producer = producer.clone();
            let cpu = producer_cpus.get(p).copied();
            std::thread::spawn(move || {
                pin_to_cpu(cpu);
                for seq in 0..per_producer as u64 {
                    let value = p as u64 * STRIDE + seq;
                    while producer.offer(value).is_err() {
                        hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    for t in producer_threads {
        t.join().unwrap();
    }
    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = (per_producer * producers) as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{} ops/ms ({} producers)", ops_per_ms, producers);
}

fn bench_rtt(producer_cpus: &[usize], consumer_cpu: Option<usize>) {
    let (ping_tx, mut ping_rx) = mpsc::queue::<u64>(QUEUE_SIZE).unwrap();
    let (pong_tx, mut pong_rx) = mpsc::queue::<u64>(QUEUE_SIZE).unwrap();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    // Responder thread: echo each ping back on the pong queue.
    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        for _ in 0..RTT_ITERATIONS {
            loop {
                if let Some(value) = ping_rx.poll() {
                    pong_tx.offer(value).unwrap();
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }

    pin_to_cpu(producer_cpus.first().copied());

    let start = Instant::now();

    for i in 0..RTT_ITERATIONS as u64 {
        ping_tx.offer(i).unwrap();
        loop {
            if pong_rx.poll().is_some() {
                break;
            }
            hint::spin_loop();
        }
    }

    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / RTT_ITERATIONS as u128;
    println!("{} ns RTT", rtt_ns);
}

fn main() {
    rhea::init_tracing();

    let producers = num_producers();
    let producer_cpus = producer_cpus();
    let consumer_cpu = consumer_cpu();

    println!(
        "rhea MPSC (size={}, iters={}):",
        QUEUE_SIZE, ITERATIONS
    );
    bench_throughput(producers, &producer_cpus, consumer_cpu);
    bench_rtt(&producer_cpus, consumer_cpu);
}
