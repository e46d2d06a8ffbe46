//! Rule pipeline driver.
//!
//! ## Pass Lifecycle
//!
//! ```text
//! prepare → begin_pass → select → pool.run_pass (barrier) → complete → commit → observe
//! ```
//!
//! Rules run strictly one after another. Within a pass, cells of the same
//! rule may run in any order and in parallel; rules only ever read the
//! before plane, so that order is unobservable to them. Shared side state
//! written during a pass (the cluster graph) must tolerate concurrency.
//!
//! ## Failure
//!
//! The first cell error or panic aborts the run. The failing rule's
//! `complete` hook is skipped and nothing is committed, so the lattice keeps
//! the state produced by the last successful rule.

pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::ClusterError;
use crate::lattice::{Cell, CellId, Lattice, LatticeError, LatticeSnapshot, PassView};
use crate::types::Coord;
pub use pool::{Job, PassStats, PoolConfig, PoolError, WorkerPool, DEFAULT_THREADS};

/// Error raised by a rule while updating one cell.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Lattice invariant violated (double write, foreign cell).
    #[error(transparent)]
    Lattice(#[from] LatticeError),
    /// Cluster graph rejected a cell.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// A cell id submitted to the pool is outside the lattice.
    #[error("cell id {0:?} is outside the lattice")]
    UnknownCell(CellId),
    /// The update panicked.
    #[error("update panicked: {0}")]
    Panicked(String),
    /// Rule-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Terminal error for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A rule failed on a cell.
    #[error("rule `{rule}` failed at cell {coord}: {source}")]
    RuleFailed {
        /// Rule name.
        rule: String,
        /// Failing cell.
        coord: Coord,
        /// Cause.
        #[source]
        source: RuleError,
    },
    /// The lattice refused to open or commit a pass.
    #[error("rule `{rule}`: {source}")]
    Lattice {
        /// Rule name.
        rule: String,
        /// Cause.
        #[source]
        source: LatticeError,
    },
    /// The worker pool could not run the pass.
    #[error(transparent)]
    Pool(PoolError),
}

/// Which cells a rule wants updated this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellSelection {
    /// Every cell, row-major.
    All,
    /// A rule-chosen subset, in submission order.
    Subset(Vec<CellId>),
}

/// Per-cell update logic with pass hooks.
///
/// `update` may be called from several threads at once. It reads through
/// the pass view (before plane) and writes only its own cell.
pub trait Rule<S>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Called on the driver thread before any cell is submitted.
    fn prepare(&self) {}

    /// Cells to submit. Defaults to the whole lattice.
    fn select(&self, _lattice: &Lattice<S>) -> CellSelection {
        CellSelection::All
    }

    /// Update one cell.
    fn update(&self, cell: Cell, pass: &PassView<S>) -> Result<(), RuleError>;

    /// Called on the driver thread after the barrier, before commit.
    fn complete(&self) {}
}

/// Receives a read-only view of the before plane after each committed pass.
pub trait PassObserver<S>: Send {
    /// Called once per committed pass.
    fn on_pass(&mut self, rule: &str, snapshot: &LatticeSnapshot<S>);
}

/// Record of one committed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    /// Rule name.
    pub rule: String,
    /// Cells submitted.
    pub submitted: usize,
    /// Cells whose state was written.
    pub written: usize,
    /// Lattice generation after commit.
    pub generation: u64,
    /// Time from first submission to barrier.
    pub elapsed: Duration,
}

struct RuleJob<S> {
    rule: Arc<dyn Rule<S>>,
    view: PassView<S>,
}

impl<S: Send + Sync> Job for RuleJob<S> {
    fn run(&self, id: CellId) -> Result<(), RuleError> {
        let cell = self.view.cell(id).ok_or(RuleError::UnknownCell(id))?;
        self.rule.update(cell, &self.view)
    }
}

/// Drives rules over a lattice through a worker pool.
pub struct Engine<S> {
    lattice: Lattice<S>,
    pool: WorkerPool,
    observer: Option<Box<dyn PassObserver<S>>>,
    history: Vec<PassRecord>,
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("geometry", &self.lattice.geometry())
            .field("pool", &self.pool)
            .field("passes", &self.history.len())
            .finish()
    }
}

impl<S: Clone + Send + Sync + 'static> Engine<S> {
    /// Create an engine over `lattice`.
    pub fn new(lattice: Lattice<S>, pool: WorkerPool) -> Self {
        Self {
            lattice,
            pool,
            observer: None,
            history: Vec::new(),
        }
    }

    /// Attach a pass observer.
    ///
    /// Snapshots are only delivered in sequential mode; a parallel engine
    /// keeps the observer but never calls it.
    pub fn with_observer(mut self, observer: Box<dyn PassObserver<S>>) -> Self {
        if !self.pool.is_sequential() {
            tracing::warn!(
                threads = self.pool.config().threads,
                "pass observer ignored in parallel mode"
            );
        }
        self.observer = Some(observer);
        self
    }

    /// The lattice.
    pub fn lattice(&self) -> &Lattice<S> {
        &self.lattice
    }

    /// Consume the engine, returning the lattice.
    pub fn into_lattice(self) -> Lattice<S> {
        self.lattice
    }

    /// Committed passes so far.
    pub fn history(&self) -> &[PassRecord] {
        &self.history
    }

    /// Run one rule as one pass.
    pub fn apply(&mut self, rule: Arc<dyn Rule<S>>) -> Result<&PassRecord, EngineError> {
        let name = rule.name().to_string();
        let lattice_err = |source| EngineError::Lattice {
            rule: name.clone(),
            source,
        };

        rule.prepare();
        let view = self.lattice.begin_pass().map_err(lattice_err)?;
        let cells: Vec<CellId> = match rule.select(&self.lattice) {
            CellSelection::All => self.lattice.cells().map(|c| c.id).collect(),
            CellSelection::Subset(ids) => ids,
        };

        let job = Arc::new(RuleJob {
            rule: Arc::clone(&rule),
            view,
        });
        let stats = match self.pool.run_pass(job, &cells) {
            Ok(stats) => stats,
            Err(PoolError::CellFailed { cell, source }) => {
                let coord = self.lattice.geometry().coord(cell.index());
                tracing::error!(rule = %name, cell = %coord, error = %source, "rule failed");
                return Err(EngineError::RuleFailed {
                    rule: name,
                    coord,
                    source,
                });
            }
            Err(e) => return Err(EngineError::Pool(e)),
        };

        rule.complete();
        let commit = self.lattice.commit().map_err(lattice_err)?;
        tracing::debug!(
            rule = %name,
            cells = cells.len(),
            written = commit.written,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "pass committed"
        );

        if self.pool.is_sequential() {
            if let Some(observer) = self.observer.as_mut() {
                observer.on_pass(&name, &self.lattice.snapshot());
            }
        }

        self.history.push(PassRecord {
            rule: name,
            submitted: cells.len(),
            written: commit.written,
            generation: commit.generation,
            elapsed: stats.elapsed,
        });
        Ok(&self.history[self.history.len() - 1])
    }

    /// Run rules in order, stopping at the first failure.
    pub fn run(&mut self, rules: &[Arc<dyn Rule<S>>]) -> Result<(), EngineError> {
        for rule in rules {
            self.apply(Arc::clone(rule))?;
        }
        Ok(())
    }
}
