//! Fixed pool of private-deque workers with a blocking batch entry point.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::task::{RawTask, Task};
use crate::executor::worker::{Worker, WorkerStatus};
use crate::telemetry::{Metrics, MetricsSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A fixed set of workers plus their OS threads.
///
/// The pool runs sessions: [`execute`](Pool::execute) submits a batch and
/// blocks until the batch and everything transitively spawned from it has
/// completed, at which point the pool is quiescent again. Worker count is
/// fixed at construction.
pub struct Pool {
    workers: Vec<Arc<Worker>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    terminated: AtomicBool,
    in_session: AtomicBool,
    config: Config,
    metrics: Arc<Metrics>,
}

impl Pool {
    /// Pool with `num_workers` workers and default configuration.
    pub fn new(num_workers: usize) -> Result<Self> {
        Self::with_config(Config::builder().num_workers(num_workers).build()?)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(Metrics::new());
        let workers = (0..config.worker_count())
            .map(|id| Arc::new(Worker::new(id, config.steal_policy, metrics.clone())))
            .collect();

        Ok(Self {
            workers,
            threads: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            in_session: AtomicBool::new(false),
            config,
            metrics,
        })
    }

    /// Launch one OS thread per worker. Each worker gets a snapshot of all
    /// peers, itself included, passed into its main loop.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::pool("pool already started"));
        }

        log::debug!("starting pool with {} workers", self.workers.len());
        let mut threads = self.threads.lock();
        for worker in &self.workers {
            let worker = worker.clone();
            let peers = self.workers.clone();
            let name = format!("{}-{}", self.config.thread_name_prefix, worker.id());

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || worker.run(&peers))
                .map_err(|e| Error::pool(format!("spawn failed: {}", e)))?;
            threads.push(handle);
        }

        Ok(())
    }

    /// A single session of execution, blocking until the whole batch (and
    /// every task it transitively spawned and joined) is complete.
    ///
    /// The batch is seeded onto worker 0; stealing spreads it from there.
    /// Tasks may run on any worker; the done flags reflect completion
    /// wherever they ran, and memory the bodies wrote is visible to the
    /// caller when this returns.
    pub fn execute(&self, tasks: Vec<RawTask>) {
        debug_assert!(
            self.started.load(Ordering::Acquire),
            "execute() before start()"
        );
        let was_in_session = self.in_session.swap(true, Ordering::AcqRel);
        debug_assert!(!was_in_session, "execute() re-entered");

        if !tasks.is_empty() {
            let handles: Vec<Task> = tasks.into_iter().map(Task::new).collect();
            log::debug!("executing batch of {} tasks", handles.len());

            self.workers[0].seed(handles.clone());
            for handle in &handles {
                handle.wait();
            }
        }

        self.in_session.store(false, Ordering::Release);
    }

    /// Broadcast termination and join all worker threads. Only meaningful
    /// once the pool is quiescent; idempotent.
    pub fn terminate(&self) {
        if !self.started.load(Ordering::Acquire) || self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        for worker in &self.workers {
            worker.terminate();
        }
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        log::debug!("pool terminated");
    }

    /// Relaxed per-worker snapshots; no ordering guarantees.
    pub fn status(&self) -> Vec<WorkerStatus> {
        self.workers.iter().map(|worker| worker.status()).collect()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("num_workers", &self.workers.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("terminated", &self.terminated.load(Ordering::Relaxed))
            .finish()
    }
}
