//! Task execution infrastructure.
//!
//! This module provides the runtime core: the task handle, the
//! work-stealing private-deque worker, and the fixed worker pool.

pub mod pool;
pub mod task;
pub mod worker;

pub use pool::Pool;
pub use task::{generate_n_tasks, RawTask, Task};
pub use worker::{current, current_task, yield_hook, Worker, WorkerStatus};
