//! Fixed-size cooperative worker pool.
//!
//! Workers loop on a shared FIFO queue (a `crossbeam_channel`), taking one
//! task at a time. Every task receives a [`StopToken`] it is expected to
//! poll at natural synchronization points. A shared `pending` counter plus
//! condvar implements [`WorkerPool::wait_idle`]; the counter is decremented
//! by a scope guard around the task body so that a panicking task still
//! counts as finished.
//!
//! [`WorkerPool::request_stop`] sets the stop flag (observable through
//! every task's token), then drains queued-but-not-started tasks,
//! adjusting `pending` so `wait_idle` terminates. Dropping the pool stops
//! it and joins all workers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{Error, Result};

/// Cooperative cancellation flag observed by running tasks.
#[derive(Clone)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

type Task = Box<dyn FnOnce(&StopToken) + Send + 'static>;

/// Shared pending-task counter with an idle condvar.
struct PendingState {
    state: Mutex<usize>,
    idle: Condvar,
}

impl PendingState {
    fn increment(&self) {
        *self.state.lock().unwrap() += 1;
    }

    fn decrement(&self) {
        let mut pending = self.state.lock().unwrap();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Guard that decrements `pending` when dropped, so panicking tasks still
/// release their slot.
struct PendingGuard(Arc<PendingState>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Fixed-size pool of worker threads with cooperative stop support.
pub struct WorkerPool {
    queue_tx: Option<Sender<Task>>,
    queue_rx: Receiver<Task>,
    stop: Arc<AtomicBool>,
    pending: Arc<PendingState>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start a pool with `threads` workers (clamped to >= 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (queue_tx, queue_rx) = unbounded::<Task>();
        let stop = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(PendingState {
            state: Mutex::new(0),
            idle: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = queue_rx.clone();
            let stop = Arc::clone(&stop);
            let pending = Arc::clone(&pending);
            let handle = std::thread::Builder::new()
                .name(format!("chisel-worker-{i}"))
                .spawn(move || worker_loop(rx, stop, pending))
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        WorkerPool {
            queue_tx: Some(queue_tx),
            queue_rx,
            stop,
            pending,
            workers,
        }
    }

    /// Submit a task. Fails with [`Error::PoolStopped`] once
    /// [`WorkerPool::request_stop`] has been called.
    pub fn enqueue(&self, task: impl FnOnce(&StopToken) + Send + 'static) -> Result<()> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(Error::PoolStopped);
        }
        // Increment before posting so wait_idle cannot observe zero between
        // submission and execution start.
        self.pending.increment();
        let tx = self.queue_tx.as_ref().expect("pool sender alive");
        if tx.send(Box::new(task)).is_err() {
            self.pending.decrement();
            return Err(Error::PoolStopped);
        }
        Ok(())
    }

    /// Block until every submitted task has finished (or been discarded by
    /// a stop request).
    pub fn wait_idle(&self) {
        let mut pending = self.pending.state.lock().unwrap();
        while *pending > 0 {
            pending = self.pending.idle.wait(pending).unwrap();
        }
    }

    /// Set the stop flag, discard queued-but-not-started tasks, and let
    /// running tasks observe the stop through their tokens. Returns
    /// immediately.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        // Discard tasks that never started; each was counted at enqueue.
        while let Ok(task) = self.queue_rx.try_recv() {
            drop(task);
            self.pending.decrement();
        }
    }

    /// True once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.request_stop();
        // Closing the channel wakes blocked workers so they can exit.
        drop(self.queue_tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: Receiver<Task>, stop: Arc<AtomicBool>, pending: Arc<PendingState>) {
    let token = StopToken(Arc::clone(&stop));
    while let Ok(task) = rx.recv() {
        let _guard = PendingGuard(Arc::clone(&pending));
        // Keep the worker alive across panicking tasks; the guard still
        // releases the pending slot.
        let result = catch_unwind(AssertUnwindSafe(|| task(&token)));
        if result.is_err() {
            log::error!("worker task panicked");
        }
    }
}
