//! Work-stealing private-deque worker, receiver initiated.
//!
//! Each worker owns a private deque of task holders that only its own
//! thread ever touches. Peers interact with a worker exclusively through
//! three channels: an atomic steal-request slot they claim by CAS, an
//! inbox the slot winner writes a donation into, and a notify flag flipped
//! after the inbox write. Idle workers ask; busy workers answer between
//! tasks. There is no concurrent deque and no lock arbitration on the hot
//! path.

use crate::config::StealPolicy;
use crate::executor::task::Task;
use crate::telemetry::Metrics;
use crate::util::{Backoff, CachePadded};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

const NO_REQUEST: isize = -1;

const RNG_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// A task queued on a worker. Anchored holders are pinned to the worker
/// that created them and are never donated.
struct TaskHolder {
    task: Task,
    is_anchored: bool,
}

/// One scheduling unit of the pool: a private deque, an inbox, and the
/// atomic flags peers signal through.
pub struct Worker {
    id: usize,
    policy: StealPolicy,

    // Locked only by the owning thread; front is the self (LIFO) end,
    // back is the donation (FIFO) end.
    deque: Mutex<VecDeque<TaskHolder>>,
    // Written by one donor per handshake cycle, drained by the owner.
    inbox: Mutex<Vec<TaskHolder>>,

    steal_request: CachePadded<AtomicIsize>,
    has_tasks: CachePadded<AtomicBool>,
    received_notify: CachePadded<AtomicBool>,
    terminate_notify: AtomicBool,
    is_alive: AtomicBool,

    tasks_executed: AtomicU64,
    tasks_received: AtomicU64,
    tasks_donated: AtomicU64,

    thread: Mutex<Option<ThreadId>>,
    metrics: Arc<Metrics>,
}

/// Relaxed diagnostic snapshot of one worker. No ordering guarantees.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub id: usize,
    pub is_alive: bool,
    pub has_tasks: bool,
    /// Deque length, or `None` if the owner held the deque at snapshot time.
    pub queued: Option<usize>,
    pub pending_request: Option<usize>,
    pub tasks_executed: u64,
    pub tasks_received: u64,
    pub tasks_donated: u64,
}

impl Worker {
    pub fn new(id: usize, policy: StealPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            id,
            policy,
            deque: Mutex::new(VecDeque::new()),
            inbox: Mutex::new(Vec::new()),
            steal_request: CachePadded::new(AtomicIsize::new(NO_REQUEST)),
            has_tasks: CachePadded::new(AtomicBool::new(false)),
            received_notify: CachePadded::new(AtomicBool::new(false)),
            terminate_notify: AtomicBool::new(false),
            is_alive: AtomicBool::new(false),
            tasks_executed: AtomicU64::new(0),
            tasks_received: AtomicU64::new(0),
            tasks_donated: AtomicU64::new(0),
            thread: Mutex::new(None),
            metrics,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Main loop. Binds the calling thread as the owner and blocks until
    /// termination is observed with an empty deque; a non-empty deque is
    /// drained to completion first so `execute` can return.
    pub fn run(self: &Arc<Self>, peers: &[Arc<Worker>]) {
        {
            let mut thread = self.thread.lock();
            debug_assert!(thread.is_none(), "worker {} run() entered twice", self.id);
            *thread = Some(thread::current().id());
        }
        let _context = CurrentGuard::install(self.clone(), peers.to_vec());
        self.is_alive.store(true, Ordering::Release);
        log::debug!("worker {} running", self.id);

        let mut rng = Pcg64::seed_from_u64(RNG_SEED ^ self.id as u64);
        let mut backoff = Backoff::new();
        // Whether a steal request of ours is posted and unanswered.
        let mut requested = false;

        loop {
            self.communicate(peers);

            if self.execute_one() {
                backoff.reset();
                continue;
            }

            match self.drain_inbox() {
                Some(received) if received > 0 => {
                    requested = false;
                    backoff.reset();
                    continue;
                }
                Some(_) => {
                    // Empty donation: the victim had nothing stealable.
                    if requested {
                        self.metrics.record_steal_failure();
                    }
                    requested = false;
                }
                None => {}
            }

            if self.terminate_notify.load(Ordering::Acquire) {
                break;
            }

            if !requested {
                requested = self.try_send_steal_request(peers, &mut rng);
                if requested {
                    continue;
                }
            }
            backoff.snooze();
        }

        self.is_alive.store(false, Ordering::Release);
        log::debug!(
            "worker {} exiting after {} tasks",
            self.id,
            self.tasks_executed.load(Ordering::Relaxed)
        );
    }

    /// Deliver one task cross-thread. Only valid while the target's deque
    /// is empty; anchored (parent-linked) tasks are worker-local and must
    /// not be sent.
    pub fn send_task(&self, task: Task) {
        debug_assert!(
            !self.has_tasks.load(Ordering::Acquire),
            "send_task requires an empty target deque"
        );
        debug_assert!(
            task.parent().is_none() || self.owns_current_thread(),
            "anchored tasks must not be sent cross-thread"
        );
        let is_anchored = task.parent().is_some();
        self.deliver(vec![TaskHolder { task, is_anchored }]);
    }

    /// Push a task onto the front of the private deque. Owner thread only;
    /// this is the fork half of fork/join. A task carrying a parent link
    /// becomes an anchored holder: it stays here and is never donated.
    pub fn add_task(&self, task: Task) {
        debug_assert!(
            self.owns_current_thread(),
            "add_task must be called from the owning worker thread"
        );
        let is_anchored = task.parent().is_some();
        let mut deque = self.deque.lock();
        deque.push_front(TaskHolder { task, is_anchored });
        self.has_tasks.store(true, Ordering::Release);
    }

    /// Ask the worker to exit once its deque is empty. Safe from any thread.
    pub fn terminate(&self) {
        self.terminate_notify.store(true, Ordering::Release);
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            is_alive: self.is_alive.load(Ordering::Relaxed),
            has_tasks: self.has_tasks.load(Ordering::Relaxed),
            queued: self.deque.try_lock().map(|deque| deque.len()),
            pending_request: match self.steal_request.load(Ordering::Relaxed) {
                NO_REQUEST => None,
                requester => Some(requester as usize),
            },
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_received: self.tasks_received.load(Ordering::Relaxed),
            tasks_donated: self.tasks_donated.load(Ordering::Relaxed),
        }
    }

    /// Seed a quiescent worker with a whole batch under one inbox cycle,
    /// so the empty-deque precondition holds for the entire batch.
    pub(crate) fn seed(&self, tasks: Vec<Task>) {
        debug_assert!(
            !self.has_tasks.load(Ordering::Acquire),
            "seeding requires an empty target deque"
        );
        let holders = tasks
            .into_iter()
            .map(|task| {
                let is_anchored = task.parent().is_some();
                TaskHolder { task, is_anchored }
            })
            .collect();
        self.deliver(holders);
    }

    /// One scheduling step on behalf of a task waiting on this worker's
    /// thread: answer steal requests, then run local work if any.
    pub(crate) fn make_progress(&self, peers: &[Arc<Worker>]) -> bool {
        self.communicate(peers);
        if self.execute_one() {
            return true;
        }
        matches!(self.drain_inbox(), Some(received) if received > 0)
    }

    /// Victim side of the protocol: answer a pending steal request, if any.
    ///
    /// An empty donation still flips the requester's notify flag so the
    /// thief observes the failed steal and moves on. The request slot is
    /// released only after the donation landed.
    pub(crate) fn communicate(&self, peers: &[Arc<Worker>]) {
        let request = self.steal_request.load(Ordering::Acquire);
        if request == NO_REQUEST {
            return;
        }

        let requester = &peers[request as usize];
        let donation = self.take_stealable();
        if !donation.is_empty() {
            let count = donation.len() as u64;
            self.tasks_donated.fetch_add(count, Ordering::Relaxed);
            self.metrics.record_tasks_donated(count);
            log::trace!(
                "worker {} donated {} tasks to worker {}",
                self.id,
                count,
                requester.id
            );
        }
        requester.deliver(donation);
        self.steal_request.store(NO_REQUEST, Ordering::Release);
    }

    /// Pop from the front of the deque and run one task.
    fn execute_one(&self) -> bool {
        let holder = {
            let mut deque = self.deque.lock();
            let holder = deque.pop_front();
            self.has_tasks.store(!deque.is_empty(), Ordering::Release);
            holder
        };
        let Some(holder) = holder else {
            return false;
        };

        let started = Instant::now();
        let previous = CURRENT_TASK.with(|cell| cell.replace(Some(holder.task.clone())));
        holder.task.run_then(|| {
            self.tasks_executed.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .record_task_execution(started.elapsed().as_nanos() as u64);
        });
        CURRENT_TASK.with(|cell| *cell.borrow_mut() = previous);
        true
    }

    /// Move received tasks into the deque, preserving arrival order.
    /// Returns `None` when no delivery was signalled, otherwise the count.
    fn drain_inbox(&self) -> Option<usize> {
        if !self.received_notify.swap(false, Ordering::AcqRel) {
            return None;
        }

        let received = std::mem::take(&mut *self.inbox.lock());
        let count = received.len();
        if count > 0 {
            let mut deque = self.deque.lock();
            for holder in received {
                deque.push_back(holder);
            }
            self.has_tasks.store(true, Ordering::Release);
            self.tasks_received.fetch_add(count as u64, Ordering::Relaxed);
        }
        Some(count)
    }

    /// Thief side: claim a victim's request slot. At most one thief wins
    /// per cycle; losers retry elsewhere on a later iteration.
    fn try_send_steal_request(&self, peers: &[Arc<Worker>], rng: &mut Pcg64) -> bool {
        let Some(victim) = self.select_victim(peers, rng) else {
            return false;
        };
        victim
            .steal_request
            .compare_exchange(
                NO_REQUEST,
                self.id as isize,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Pick a victim, preferring peers that advertise work over a blind
    /// uniform pick. The advertisement may be stale; a wasted attempt just
    /// comes back as an empty donation.
    fn select_victim<'a>(
        &self,
        peers: &'a [Arc<Worker>],
        rng: &mut Pcg64,
    ) -> Option<&'a Arc<Worker>> {
        if peers.len() < 2 {
            return None;
        }

        let advertising = |peer: &&Arc<Worker>| {
            peer.id != self.id && peer.has_tasks.load(Ordering::Acquire)
        };
        let count = peers.iter().filter(advertising).count();
        if count > 0 {
            let nth = rng.gen_range(0..count);
            if let Some(victim) = peers.iter().filter(advertising).nth(nth) {
                return Some(victim);
            }
        }

        loop {
            let victim = &peers[rng.gen_range(0..peers.len())];
            if victim.id != self.id {
                return Some(victim);
            }
        }
    }

    /// Remove the donation quota from the back (FIFO end) of the deque,
    /// skipping anchored holders in place. Oldest tasks first.
    fn take_stealable(&self) -> Vec<TaskHolder> {
        let mut deque = self.deque.lock();
        let stealable = deque.iter().filter(|holder| !holder.is_anchored).count();
        if stealable == 0 {
            return Vec::new();
        }

        let quota = match self.policy {
            StealPolicy::One => 1,
            StealPolicy::Half => (stealable + 1) / 2,
        };

        let mut taken = Vec::with_capacity(quota);
        let mut kept = VecDeque::with_capacity(deque.len() - quota);
        while let Some(holder) = deque.pop_back() {
            if !holder.is_anchored && taken.len() < quota {
                taken.push(holder);
            } else {
                kept.push_front(holder);
            }
        }
        *deque = kept;
        self.has_tasks.store(!deque.is_empty(), Ordering::Release);
        taken
    }

    /// Land a donation in the inbox, then signal. The notify store is the
    /// release edge the owner's drain acquires from.
    fn deliver(&self, holders: Vec<TaskHolder>) {
        if !holders.is_empty() {
            self.inbox.lock().extend(holders);
        }
        self.received_notify.store(true, Ordering::Release);
    }

    fn owns_current_thread(&self) -> bool {
        *self.thread.lock() == Some(thread::current().id())
    }

    #[cfg(test)]
    fn bind_to_current_thread(&self) {
        *self.thread.lock() = Some(thread::current().id());
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("is_alive", &self.is_alive.load(Ordering::Relaxed))
            .field("has_tasks", &self.has_tasks.load(Ordering::Relaxed))
            .finish()
    }
}

// Thread-local context giving task bodies access to the worker executing
// them and to the task being executed, for forking children and servicing
// requests mid-task.
thread_local! {
    static CURRENT: RefCell<Option<CurrentWorker>> = RefCell::new(None);
    static CURRENT_TASK: RefCell<Option<Task>> = RefCell::new(None);
}

pub(crate) struct CurrentWorker {
    worker: Arc<Worker>,
    peers: Vec<Arc<Worker>>,
}

impl CurrentWorker {
    pub(crate) fn make_progress(&self) -> bool {
        self.worker.make_progress(&self.peers)
    }
}

pub(crate) fn with_current<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&CurrentWorker) -> R,
{
    CURRENT.with(|current| current.borrow().as_ref().map(f))
}

/// The worker bound to the calling thread, if the caller is a pool thread.
pub fn current() -> Option<Arc<Worker>> {
    with_current(|current| current.worker.clone())
}

/// The task executing on the calling thread, if any. Bodies pass this as
/// the parent when forking anchored children with [`Task::child_of`].
pub fn current_task() -> Option<Task> {
    CURRENT_TASK.with(|cell| cell.borrow().clone())
}

/// Service pending steal requests from inside a long-running task body.
///
/// Long tasks are otherwise opaque to stealing; a loop that calls this at
/// coarse intervals lets idle peers take queued work in the meantime. No-op
/// off the pool.
pub fn yield_hook() {
    with_current(|current| current.worker.communicate(&current.peers));
}

struct CurrentGuard;

impl CurrentGuard {
    fn install(worker: Arc<Worker>, peers: Vec<Arc<Worker>>) -> Self {
        CURRENT.with(|current| *current.borrow_mut() = Some(CurrentWorker { worker, peers }));
        CurrentGuard
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| *current.borrow_mut() = None);
    }
}
