// Behavioural tests for the cooperative worker pool (threadpool.rs).
//
// Coverage:
//   - enqueued tasks execute exactly once
//   - wait_idle blocks until all pending tasks finish and is reusable
//   - thread count is clamped to >= 1
//   - request_stop discards queued tasks and flips every stop token
//   - enqueue after request_stop fails loudly
//   - a panicking task still releases its pending slot
//   - tasks run concurrently across workers
//   - Drop stops the pool and joins all workers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use chisel::threadpool::WorkerPool;

#[test]
fn enqueued_task_executes_once() {
    let pool = WorkerPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    pool.enqueue(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn all_enqueued_tasks_execute() {
    let pool = WorkerPool::new(2);
    let counter = Arc::new(AtomicUsize::new(0));
    const N: usize = 32;

    for _ in 0..N {
        let c = Arc::clone(&counter);
        pool.enqueue(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), N);
}

#[test]
fn zero_threads_is_clamped_to_one() {
    let pool = WorkerPool::new(0);
    let done = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&done);
    pool.enqueue(move |_| {
        d.store(1, Ordering::SeqCst);
    })
    .unwrap();
    pool.wait_idle();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[test]
fn wait_idle_returns_immediately_when_idle() {
    let pool = WorkerPool::new(2);
    pool.wait_idle();
}

#[test]
fn wait_idle_blocks_until_slow_task_finishes() {
    let pool = WorkerPool::new(1);
    let flag = Arc::new(AtomicUsize::new(0));

    let f = Arc::clone(&flag);
    pool.enqueue(move |_| {
        std::thread::sleep(Duration::from_millis(50));
        f.store(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.wait_idle();
    assert_eq!(flag.load(Ordering::SeqCst), 1);
}

#[test]
fn pool_is_reusable_after_wait_idle() {
    let pool = WorkerPool::new(2);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let c = Arc::clone(&counter);
        pool.enqueue(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), 4);

    for _ in 0..4 {
        let c = Arc::clone(&counter);
        pool.enqueue(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), 8);
}

#[test]
fn enqueue_after_stop_fails() {
    let pool = WorkerPool::new(1);
    pool.request_stop();
    let result = pool.enqueue(|_| {});
    assert!(result.is_err());
    assert!(pool.is_stopped());
}

#[test]
fn request_stop_discards_queued_tasks() {
    // One worker blocked on a gate; everything queued behind it must be
    // discarded by request_stop, and wait_idle must still terminate.
    let pool = WorkerPool::new(1);
    let gate = Arc::new(Barrier::new(2));
    let ran = Arc::new(AtomicUsize::new(0));

    {
        let gate = Arc::clone(&gate);
        pool.enqueue(move |_| {
            gate.wait();
            std::thread::sleep(Duration::from_millis(200));
        })
        .unwrap();
    }
    for _ in 0..16 {
        let ran = Arc::clone(&ran);
        pool.enqueue(move |_| {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    gate.wait(); // first task is now running and sleeping
    pool.request_stop();
    pool.wait_idle();

    // Every queued task was dropped while the first one was in flight.
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn running_tasks_observe_the_stop_token() {
    let pool = WorkerPool::new(1);
    let observed = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Barrier::new(2));

    {
        let observed = Arc::clone(&observed);
        let gate = Arc::clone(&gate);
        pool.enqueue(move |token| {
            gate.wait();
            // Spin until the stop request becomes visible.
            while !token.is_stop_requested() {
                std::thread::sleep(Duration::from_millis(1));
            }
            observed.store(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    gate.wait();
    pool.request_stop();
    pool.wait_idle();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_task_still_releases_pending_slot() {
    let pool = WorkerPool::new(1);
    let after = Arc::new(AtomicUsize::new(0));

    pool.enqueue(|_| panic!("task blew up")).unwrap();
    let a = Arc::clone(&after);
    pool.enqueue(move |_| {
        a.store(1, Ordering::SeqCst);
    })
    .unwrap();

    // Must not hang: the panicking task's slot is released by the guard,
    // and the worker survives to run the second task.
    pool.wait_idle();
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[test]
fn tasks_run_concurrently_across_workers() {
    // All N tasks rendezvous at a barrier; a pool with fewer than N live
    // workers would deadlock here.
    const N: usize = 4;
    let pool = WorkerPool::new(N);
    let barrier = Arc::new(Barrier::new(N));
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..N {
        let b = Arc::clone(&barrier);
        let c = Arc::clone(&counter);
        pool.enqueue(move |_| {
            b.wait();
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.wait_idle();
    assert_eq!(counter.load(Ordering::SeqCst), N);
}

#[test]
fn drop_joins_all_workers() {
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let pool = WorkerPool::new(2);
        for i in 0..4 {
            let log = Arc::clone(&log);
            pool.enqueue(move |_| {
                std::thread::sleep(Duration::from_millis(10));
                log.lock().unwrap().push(i);
            })
            .unwrap();
        }
        pool.wait_idle();
        // pool drops here; workers are joined
    }
    assert_eq!(log.lock().unwrap().len(), 4);
}
