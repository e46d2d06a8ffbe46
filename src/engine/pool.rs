//! Fixed-size worker pool with a pass barrier.
//!
//! ## Purpose
//!
//! The driver submits the cells of one rule pass and blocks until every
//! submitted cell has been processed. Workers pull chunks of cells from one
//! bounded shared queue.
//!
//! ## Pass Barrier
//!
//! The barrier opens only when the queue is empty **and** no worker is in
//! the middle of a chunk. "Queue empty" alone is not enough: the last chunk
//! may have been popped but still be running. Workers also release their
//! handle on the job before reporting completion, so once the barrier opens
//! the driver holds the only reference to the pass.
//!
//! ## Failure
//!
//! The first error (or panic) raised by a job is recorded against its cell.
//! Submission stops, queued chunks are discarded unprocessed, and the pass
//! returns [`PoolError::CellFailed`] once in-flight chunks have finished.
//!
//! ## Modes
//!
//! | Threads | Mode | Order |
//! |---------|------|-------|
//! | 0 or 1 | sequential, on the driver thread | submission order |
//! | N > 1 | N workers | unspecified within a pass |

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::RuleError;
use crate::lattice::CellId;

/// Default number of worker threads.
pub const DEFAULT_THREADS: usize = 8;

/// Unit of per-cell work executed by the pool.
pub trait Job: Send + Sync {
    /// Process one cell.
    fn run(&self, cell: CellId) -> Result<(), RuleError>;
}

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A job failed on a cell; the pass was aborted.
    #[error("job failed on cell {cell:?}: {source}")]
    CellFailed {
        /// The failing cell.
        cell: CellId,
        /// What went wrong.
        #[source]
        source: RuleError,
    },
    /// The pool no longer accepts work.
    #[error("worker pool is shut down")]
    ShutDown,
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Worker threads; 0 or 1 selects sequential mode.
    pub threads: usize,
    /// Maximum queued chunks before the driver blocks.
    pub queue_capacity: usize,
    /// Cells per queued chunk.
    pub chunk_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            queue_capacity: 64,
            chunk_size: 256,
        }
    }
}

impl PoolConfig {
    /// Sequential configuration.
    pub fn sequential() -> Self {
        Self {
            threads: 1,
            ..Self::default()
        }
    }

    /// Default configuration with `threads` workers.
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// True when this configuration runs on the driver thread.
    pub fn is_sequential(&self) -> bool {
        self.threads <= 1
    }
}

/// Statistics for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Cells processed successfully.
    pub cells: usize,
    /// Chunks submitted (1 per cell in sequential mode).
    pub tasks: usize,
    /// Wall time from first submission to barrier.
    pub elapsed: Duration,
}

struct Task {
    job: Arc<dyn Job>,
    cells: Vec<CellId>,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    in_flight: usize,
    processed: usize,
    failure: Option<(CellId, RuleError)>,
    closed: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.tasks.is_empty() && self.in_flight == 0
    }
}

struct Shared {
    queue: Mutex<QueueState>,
    /// Queue non-empty or closed.
    work_ready: Condvar,
    /// Queue below capacity or pass aborted.
    space_ready: Condvar,
    /// Queue empty and nothing in flight.
    drained: Condvar,
    abort: AtomicBool,
    capacity: usize,
}

/// Fixed-size pool of worker threads, or the driver thread in sequential mode.
pub struct WorkerPool {
    config: PoolConfig,
    shared: Option<Arc<Shared>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl WorkerPool {
    /// Start a pool. Sequential configurations start no threads.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let config = PoolConfig {
            queue_capacity: config.queue_capacity.max(1),
            chunk_size: config.chunk_size.max(1),
            ..config
        };
        if config.is_sequential() {
            return Ok(Self {
                config,
                shared: None,
                workers: Vec::new(),
            });
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            space_ready: Condvar::new(),
            drained: Condvar::new(),
            abort: AtomicBool::new(false),
            capacity: config.queue_capacity,
        });

        let mut pool = Self {
            config,
            shared: Some(Arc::clone(&shared)),
            workers: Vec::with_capacity(config.threads),
        };
        for i in 0..config.threads {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("lattice-worker-{i}"))
                .spawn(move || worker_loop(&shared))
                .map_err(PoolError::Spawn)?;
            pool.workers.push(handle);
        }
        tracing::debug!(threads = config.threads, "worker pool started");
        Ok(pool)
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// True when work runs on the driver thread.
    pub fn is_sequential(&self) -> bool {
        self.shared.is_none()
    }

    /// Run `job` over `cells` and block until all of them are processed.
    pub fn run_pass(&mut self, job: Arc<dyn Job>, cells: &[CellId]) -> Result<PassStats, PoolError> {
        let started = Instant::now();
        match &self.shared {
            None => run_sequential(job.as_ref(), cells, started),
            Some(shared) => {
                let shared = Arc::clone(shared);
                run_parallel(&shared, job, cells, self.config.chunk_size, started)
            }
        }
    }

    /// Stop accepting work, let in-flight chunks finish, and join the workers.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        shared.queue.lock().closed = true;
        shared.work_ready.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked outside a job");
            }
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_sequential(job: &dyn Job, cells: &[CellId], started: Instant) -> Result<PassStats, PoolError> {
    for (done, &cell) in cells.iter().enumerate() {
        if let Err(source) = run_guarded(job, cell) {
            tracing::debug!(processed = done, "sequential pass aborted");
            return Err(PoolError::CellFailed { cell, source });
        }
    }
    Ok(PassStats {
        cells: cells.len(),
        tasks: cells.len(),
        elapsed: started.elapsed(),
    })
}

fn run_parallel(
    shared: &Shared,
    job: Arc<dyn Job>,
    cells: &[CellId],
    chunk_size: usize,
    started: Instant,
) -> Result<PassStats, PoolError> {
    {
        let mut queue = shared.queue.lock();
        if queue.closed {
            return Err(PoolError::ShutDown);
        }
        queue.failure = None;
        queue.processed = 0;
    }
    shared.abort.store(false, Ordering::Release);

    let mut tasks = 0;
    for chunk in cells.chunks(chunk_size) {
        let mut queue = shared.queue.lock();
        while queue.tasks.len() >= shared.capacity && !shared.abort.load(Ordering::Acquire) {
            shared.space_ready.wait(&mut queue);
        }
        if shared.abort.load(Ordering::Acquire) {
            break;
        }
        queue.tasks.push_back(Task {
            job: Arc::clone(&job),
            cells: chunk.to_vec(),
        });
        tasks += 1;
        drop(queue);
        shared.work_ready.notify_one();
    }
    drop(job);

    let mut queue = shared.queue.lock();
    while !queue.is_drained() {
        shared.drained.wait(&mut queue);
    }
    let processed = queue.processed;
    match queue.failure.take() {
        Some((cell, source)) => Err(PoolError::CellFailed { cell, source }),
        None => Ok(PassStats {
            cells: processed,
            tasks,
            elapsed: started.elapsed(),
        }),
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    queue.in_flight += 1;
                    shared.space_ready.notify_one();
                    break task;
                }
                if queue.closed {
                    return;
                }
                shared.work_ready.wait(&mut queue);
            }
        };

        let mut done = 0;
        let mut failure = None;
        for &cell in &task.cells {
            if shared.abort.load(Ordering::Acquire) {
                break;
            }
            match run_guarded(task.job.as_ref(), cell) {
                Ok(()) => done += 1,
                Err(e) => {
                    failure = Some((cell, e));
                    break;
                }
            }
        }
        // Release the job before reporting, so the barrier implies no live references.
        drop(task);

        let mut queue = shared.queue.lock();
        queue.processed += done;
        if let Some(failure) = failure {
            shared.abort.store(true, Ordering::Release);
            if queue.failure.is_none() {
                queue.failure = Some(failure);
            }
            shared.space_ready.notify_all();
        }
        queue.in_flight -= 1;
        if queue.is_drained() {
            shared.drained.notify_all();
        }
    }
}

fn run_guarded(job: &dyn Job, cell: CellId) -> Result<(), RuleError> {
    match catch_unwind(AssertUnwindSafe(|| job.run(cell))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RuleError::Panicked(message))
        }
    }
}
