//! corvid - fork/join task runtime on a fixed worker pool
//!
//! A task-parallel runtime that executes batches of tasks, and anything
//! they transitively fork, on a fixed pool of worker threads. Scheduling
//! is work stealing over receiver-initiated private deques: every worker
//! keeps its queue to itself, idle workers post steal requests, and busy
//! workers donate between tasks.
//!
//! # Quick Start
//!
//! ```no_run
//! use corvid::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! corvid::init().unwrap();
//!
//! let sum = Arc::new(AtomicUsize::new(0));
//! let tasks = generate_n_tasks(1000, {
//!     let sum = sum.clone();
//!     move |i| {
//!         sum.fetch_add(i, Ordering::Relaxed);
//!     }
//! });
//!
//! corvid::execute(tasks).unwrap();
//! assert_eq!(sum.load(Ordering::Relaxed), 499_500);
//!
//! corvid::shutdown();
//! ```
//!
//! # Features
//!
//! - **Private deques**: workers never touch each other's queues; all
//!   cross-worker traffic goes through a lock-free request handshake
//! - **Receiver-initiated stealing**: idle workers ask, busy workers
//!   donate the oldest half (or one) of their stealable tasks
//! - **Fork/join**: task bodies spawn children on their own worker and
//!   wait on their handles; anchored children never migrate
//! - **Telemetry**: task latency percentiles and steal accounting

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod runtime;
pub mod telemetry;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, StealPolicy};
pub use error::{Error, Result};
pub use executor::{generate_n_tasks, Pool, RawTask, Task};
pub use runtime::{execute, init, init_with_config, shutdown};
