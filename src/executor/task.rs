//! Task representation: the raw callable form and the shared handle used
//! to express fork/join dependencies.

use crate::executor::worker;
use crate::util::Backoff;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The wire form accepted by [`Pool::execute`](crate::executor::Pool::execute):
/// a callable with no inputs and no result. Results are encoded through
/// shared atomics or memory the closure captures.
pub type RawTask = Box<dyn FnOnce() + Send + 'static>;

/// Build `n` raw tasks, each binding `f(i)` for `i` in `0..n`.
///
/// Benchmark kernels and the parallelizing pass use this to shard a loop
/// into one task per iteration chunk.
pub fn generate_n_tasks<F>(n: usize, f: F) -> Vec<RawTask>
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    (0..n)
        .map(|i| {
            let f = f.clone();
            Box::new(move || f(i)) as RawTask
        })
        .collect()
}

struct TaskInner {
    body: Mutex<Option<RawTask>>,
    done: AtomicBool,
    parent: Option<Task>,
}

/// Shared handle to one unit of work.
///
/// The handle is the synchronization object between submitter and executor:
/// whoever holds a clone can [`wait`](Task::wait) on completion, and exactly
/// one worker [`run`](Task::run)s the body. A parent body forks by creating
/// child tasks, pushing them onto its own worker with
/// [`Worker::add_task`](crate::executor::Worker::add_task), and waiting on
/// each handle.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Wrap a raw callable.
    pub fn new(body: RawTask) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                body: Mutex::new(Some(body)),
                done: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Convenience constructor from any closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(Box::new(f))
    }

    /// Wrap a raw callable anchored under `parent`.
    ///
    /// The parent link is what makes a task anchored: workers derive the
    /// holder's pinning from it, so a parented task stays on the worker
    /// that enqueues it while parentless tasks migrate freely. Bodies
    /// obtain their own handle through
    /// [`current_task`](crate::executor::current_task).
    pub fn child_of(body: RawTask, parent: &Task) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                body: Mutex::new(Some(body)),
                done: AtomicBool::new(false),
                parent: Some(parent.clone()),
            }),
        }
    }

    /// Invoke the body, then publish completion.
    ///
    /// The body runs at most once no matter how many clones call `run`;
    /// `done` flips false to true exactly once, after the body returns.
    pub fn run(&self) {
        self.run_then(|| {});
    }

    /// Like [`run`](Task::run), but invokes `before_done` between the body
    /// returning and the done flag being published. Executor-side
    /// accounting goes here so that anyone who observes completion also
    /// observes the counts.
    pub(crate) fn run_then<F: FnOnce()>(&self, before_done: F) {
        let body = self.inner.body.lock().take();
        if let Some(body) = body {
            body();
            before_done();
            self.inner.done.store(true, Ordering::Release);
        }
    }

    /// Block until the task has completed, wherever it ran.
    ///
    /// On a worker thread the wait loop keeps the scheduler moving: it
    /// services steal requests and executes tasks from the worker's own
    /// deque, so a parent joining children it just spawned makes progress
    /// even when no peer can take them. Off the pool (the submitter inside
    /// `execute`) this is a yielding spin.
    pub fn wait(&self) {
        let mut backoff = Backoff::new();
        while !self.is_done() {
            let progressed = worker::with_current(|current| current.make_progress());
            match progressed {
                Some(true) => backoff.reset(),
                _ => backoff.snooze(),
            }
        }
    }

    /// Whether the body has completed. Memory written by the body is
    /// visible to any thread that observes `true`.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// The task this one is anchored under, if any.
    pub fn parent(&self) -> Option<&Task> {
        self.inner.parent.as_ref()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("done", &self.is_done())
            .field("anchored", &self.inner.parent.is_some())
            .finish()
    }
}
