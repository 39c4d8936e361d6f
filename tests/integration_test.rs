use corvid::prelude::*;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

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

#[test]
fn test_empty_batch_returns_immediately() {
    let pool = Pool::new(2).unwrap();
    pool.start().unwrap();

    pool.execute(Vec::new());

    assert!(pool.status().iter().all(|status| status.tasks_executed == 0));
    pool.terminate();
}

#[test]
fn test_single_task_single_worker() {
    let pool = Pool::new(1).unwrap();
    pool.start().unwrap();

    let result = Arc::new(AtomicU64::new(0));
    let task = {
        let result = result.clone();
        Box::new(move || {
            result.store(42, Ordering::Relaxed);
        }) as RawTask
    };

    pool.execute(vec![task]);
    assert_eq!(result.load(Ordering::Relaxed), 42);

    pool.terminate();
}

#[test]
fn test_body_writes_visible_after_execute() {
    let pool = Pool::new(4).unwrap();
    pool.start().unwrap();

    // Relaxed stores in the bodies; visibility to the submitter comes from
    // the release/acquire pairing on each task's done flag.
    let cells: Arc<Vec<AtomicU64>> = Arc::new((0..64).map(|_| AtomicU64::new(0)).collect());
    let tasks = generate_n_tasks(64, {
        let cells = cells.clone();
        move |i| {
            cells[i].store(i as u64 + 1, Ordering::Relaxed);
        }
    });

    pool.execute(tasks);
    for (i, cell) in cells.iter().enumerate() {
        assert_eq!(cell.load(Ordering::Relaxed), i as u64 + 1);
    }

    pool.terminate();
}

#[test]
fn test_collatz_fanout_checksum() {
    const NUM_SHARDS: usize = 2_000;
    const SHARD_SIZE: u64 = 50;

    let pool = Pool::new(8).unwrap();
    pool.start().unwrap();

    let result = Arc::new(AtomicU64::new(0));
    let tasks = generate_n_tasks(NUM_SHARDS, {
        let result = result.clone();
        move |i| {
            let lower = i as u64 * SHARD_SIZE;
            result.fetch_add(collatz_range(lower, lower + SHARD_SIZE), Ordering::Relaxed);
        }
    });

    pool.execute(tasks);

    let reference = collatz_range(0, NUM_SHARDS as u64 * SHARD_SIZE);
    assert_eq!(result.load(Ordering::Relaxed), reference);

    pool.terminate();
}

#[test]
fn test_recursive_fork_join() {
    let pool = Pool::new(4).unwrap();
    pool.start().unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let seed = {
        let completed = completed.clone();
        Box::new(move || {
            let worker = corvid::executor::current().expect("body runs on a worker");
            let children: Vec<Task> = (0..2)
                .map(|_| {
                    let completed = completed.clone();
                    Task::from_fn(move || {
                        completed.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect();

            for child in &children {
                worker.add_task(child.clone());
            }
            for child in &children {
                child.wait();
            }
            completed.fetch_add(1, Ordering::Relaxed);
        }) as RawTask
    };

    pool.execute(vec![seed]);
    assert_eq!(completed.load(Ordering::Relaxed), 3);

    pool.terminate();
}

#[test]
fn test_anchored_children_stay_with_creator() {
    let pool = Pool::new(2).unwrap();
    pool.start().unwrap();

    let parent_worker = Arc::new(AtomicUsize::new(usize::MAX));
    let child_workers: Arc<Vec<AtomicUsize>> =
        Arc::new((0..10).map(|_| AtomicUsize::new(usize::MAX)).collect());

    let seed = {
        let parent_worker = parent_worker.clone();
        let child_workers = child_workers.clone();
        Box::new(move || {
            let worker = corvid::executor::current().expect("body runs on a worker");
            let parent = corvid::executor::current_task().expect("body has a task context");
            parent_worker.store(worker.id(), Ordering::Relaxed);

            // Children anchored under the running task never migrate.
            let children: Vec<Task> = (0..10)
                .map(|i| {
                    let child_workers = child_workers.clone();
                    Task::child_of(
                        Box::new(move || {
                            let executor = corvid::executor::current().expect("on a worker");
                            child_workers[i].store(executor.id(), Ordering::Relaxed);
                        }),
                        &parent,
                    )
                })
                .collect();

            for child in &children {
                worker.add_task(child.clone());
            }
            for child in &children {
                child.wait();
            }
        }) as RawTask
    };

    pool.execute(vec![seed]);

    let creator = parent_worker.load(Ordering::Relaxed);
    assert_ne!(creator, usize::MAX);
    for cell in child_workers.iter() {
        assert_eq!(cell.load(Ordering::Relaxed), creator);
    }

    pool.terminate();
}

#[test]
fn test_steal_half_relieves_starved_workers() {
    const NUM_TASKS: usize = 1_000;
    const NUM_WORKERS: usize = 4;

    let pool = Pool::with_config(
        Config::builder()
            .num_workers(NUM_WORKERS)
            .steal_policy(StealPolicy::Half)
            .build()
            .unwrap(),
    )
    .unwrap();
    pool.start().unwrap();

    // The whole batch lands on worker 0; only stealing spreads it. Tasks
    // are coarse enough that donation happens many times over the run.
    let per_worker: Arc<Vec<AtomicUsize>> =
        Arc::new((0..NUM_WORKERS).map(|_| AtomicUsize::new(0)).collect());
    let tasks = generate_n_tasks(NUM_TASKS, {
        let per_worker = per_worker.clone();
        move |i| {
            let lower = i as u64 * 3_000;
            std::hint::black_box(collatz_range(lower, lower + 3_000));
            let me = corvid::executor::current().expect("on a worker").id();
            per_worker[me].fetch_add(1, Ordering::Relaxed);
        }
    });

    pool.execute(tasks);

    let counts: Vec<usize> = per_worker
        .iter()
        .map(|count| count.load(Ordering::Relaxed))
        .collect();
    assert_eq!(counts.iter().sum::<usize>(), NUM_TASKS);
    for (id, &count) in counts.iter().enumerate() {
        assert!(
            count >= 150,
            "worker {} executed only {} of {} tasks: {:?}",
            id,
            count,
            NUM_TASKS,
            counts
        );
    }

    pool.terminate();
}

#[test]
fn test_steal_one_policy_completes() {
    let pool = Pool::with_config(
        Config::builder()
            .num_workers(4)
            .steal_policy(StealPolicy::One)
            .build()
            .unwrap(),
    )
    .unwrap();
    pool.start().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    let tasks = generate_n_tasks(500, {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    pool.execute(tasks);
    assert_eq!(counter.load(Ordering::Relaxed), 500);

    pool.terminate();
}

#[test]
fn test_repeated_sessions_stay_quiescent() {
    let pool = Pool::new(4).unwrap();
    pool.start().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    for session in 0..20 {
        let tasks = generate_n_tasks(100, {
            let counter = counter.clone();
            move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
        pool.execute(tasks);
        assert_eq!(counter.load(Ordering::Relaxed), (session + 1) * 100);

        pool.execute(Vec::new());
    }

    pool.terminate();
}

#[test]
fn test_metrics_account_for_batch() {
    let pool = Pool::new(2).unwrap();
    pool.start().unwrap();

    let tasks = generate_n_tasks(200, |_| {});
    pool.execute(tasks);

    // Workers fold their accounting into each task's completion edge, so
    // the counts are exact by the time execute returns.
    let snapshot = pool.metrics();
    assert_eq!(snapshot.tasks_executed, 200);

    pool.terminate();
}

#[test]
fn test_yield_hook_lets_peers_steal_mid_task() {
    const SIBLINGS: usize = 8;

    let pool = Pool::new(2).unwrap();
    pool.start().unwrap();

    let long_worker = Arc::new(AtomicUsize::new(usize::MAX));
    let sibling_workers: Arc<Vec<AtomicUsize>> =
        Arc::new((0..SIBLINGS).map(|_| AtomicUsize::new(usize::MAX)).collect());
    let siblings_done = Arc::new(AtomicUsize::new(0));

    // One long task at the front of the batch, siblings queued behind it.
    // The long body never returns until every sibling has run, so the
    // siblings can only complete if yield_hook donates them to the peer.
    let mut tasks: Vec<RawTask> = Vec::with_capacity(SIBLINGS + 1);
    tasks.push({
        let long_worker = long_worker.clone();
        let siblings_done = siblings_done.clone();
        Box::new(move || {
            let me = corvid::executor::current().expect("on a worker").id();
            long_worker.store(me, Ordering::Relaxed);
            while siblings_done.load(Ordering::Relaxed) < SIBLINGS {
                corvid::executor::yield_hook();
                std::thread::yield_now();
            }
        }) as RawTask
    });
    for i in 0..SIBLINGS {
        let sibling_workers = sibling_workers.clone();
        let siblings_done = siblings_done.clone();
        tasks.push(Box::new(move || {
            let me = corvid::executor::current().expect("on a worker").id();
            sibling_workers[i].store(me, Ordering::Relaxed);
            siblings_done.fetch_add(1, Ordering::Relaxed);
        }) as RawTask);
    }

    pool.execute(tasks);

    let long_id = long_worker.load(Ordering::Relaxed);
    assert_ne!(long_id, usize::MAX);
    for cell in sibling_workers.iter() {
        let id = cell.load(Ordering::Relaxed);
        assert_ne!(id, usize::MAX);
        assert_ne!(
            id, long_id,
            "sibling ran on the worker that was inside the long task"
        );
    }

    pool.terminate();
}
