//! Shard a Collatz sweep into tasks, run it on the pool, and print what
//! the scheduler did.
//!
//! Run with: cargo run --example collatz --release

use corvid::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const NUM_SHARDS: usize = 50_000;
const SHARD_SIZE: u64 = 200;

fn collatz_steps(mut n: u64) -> u64 {
    let mut steps = 0;
    while n != 1 {
        if n % 2 == 0 {
            n /= 2;
        } else {
            n = 3 * n + 1;
        }
        steps += 1;
    }
    steps
}

fn collatz_range(lower: u64, upper: u64) -> u64 {
    (lower..upper).filter(|&n| n != 0).map(collatz_steps).sum()
}

fn main() -> corvid::Result<()> {
    let pool = Pool::with_config(Config::default())?;
    pool.start()?;
    println!("pool: {} workers", pool.num_workers());

    let result = Arc::new(AtomicU64::new(0));
    let tasks = generate_n_tasks(NUM_SHARDS, {
        let result = result.clone();
        move |i| {
            let lower = i as u64 * SHARD_SIZE;
            result.fetch_add(collatz_range(lower, lower + SHARD_SIZE), Ordering::Relaxed);
        }
    });

    let started = Instant::now();
    pool.execute(tasks);
    let elapsed = started.elapsed();

    println!(
        "total steps over [0, {}): {} in {:.3}s",
        NUM_SHARDS as u64 * SHARD_SIZE,
        result.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );

    for status in pool.status() {
        println!(
            "worker {}: executed {} received {} donated {}",
            status.id, status.tasks_executed, status.tasks_received, status.tasks_donated
        );
    }

    let metrics = pool.metrics();
    println!(
        "{:.0} tasks/s, p50 {}ns p99 {}ns, {} donations, {} failed steals",
        metrics.tasks_per_second(),
        metrics.p50_latency_ns,
        metrics.p99_latency_ns,
        metrics.tasks_donated,
        metrics.steal_failures
    );

    pool.terminate();
    Ok(())
}
