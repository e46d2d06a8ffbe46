//! Concurrent disjoint-set forest over cell identities.
//!
//! ## Purpose
//!
//! Workers evaluating different cells of the same pass discover that pairs
//! of cells belong together and call [`ClusterGraph::connect`] concurrently.
//! The graph must never lose a merge and never leave a cell momentarily
//! unreachable from its true root.
//!
//! ## Locking Protocol
//!
//! | Operation | Locks held |
//! |-----------|------------|
//! | `root` / `is_connected` | none (atomic parent reads, CAS path halving) |
//! | `connect` | both current roots, lower id first |
//! | `size` / `add_outline` | the current root |
//!
//! A parent pointer of a root changes only while that root's lock is held,
//! so a root observed *after* locking and re-checking is stable until the
//! lock is released. Non-root parent pointers only ever move to an ancestor
//! (path halving), which every concurrent reader tolerates.
//!
//! Root identities are not stable across merges. Callers re-resolve roots
//! instead of caching them across merge-producing passes.

pub mod outline;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::lattice::CellId;
pub use outline::{ClusterOutline, OutlineMap};

/// Error type for cluster graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// A cell id outside the graph.
    #[error("cell {id:?} outside cluster graph of {len} cells")]
    UnknownCell {
        /// Offending id.
        id: CellId,
        /// Number of cells in the graph.
        len: usize,
    },
}

/// Per-root bookkeeping. Meaningful only while the owning node is a root.
#[derive(Debug, Default)]
struct ClusterSlot {
    size: usize,
    outline: BTreeSet<CellId>,
}

/// Concurrent union-find with union by size.
#[derive(Debug)]
pub struct ClusterGraph {
    parent: Box<[AtomicUsize]>,
    slots: Box<[Mutex<ClusterSlot>]>,
    merges: AtomicUsize,
}

impl ClusterGraph {
    /// A forest of `len` singleton clusters.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).map(AtomicUsize::new).collect(),
            slots: (0..len)
                .map(|_| {
                    Mutex::new(ClusterSlot {
                        size: 1,
                        outline: BTreeSet::new(),
                    })
                })
                .collect(),
            merges: AtomicUsize::new(0),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// True for a graph without cells.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of successful merges so far.
    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::Relaxed)
    }

    /// Number of clusters (roots).
    pub fn cluster_count(&self) -> usize {
        self.len() - self.merges()
    }

    /// Current representative of the cell's cluster.
    ///
    /// Path-compressing and lock-free. The result may be superseded by a
    /// concurrent merge; re-resolve before acting on it.
    pub fn root(&self, cell: CellId) -> Result<CellId, ClusterError> {
        let index = self.check(cell)?;
        Ok(CellId::new(self.find(index)))
    }

    /// True when both cells are currently in the same cluster.
    ///
    /// Lock-free. A `false` answer was true at some instant during the call.
    pub fn is_connected(&self, a: CellId, b: CellId) -> Result<bool, ClusterError> {
        let a = self.check(a)?;
        let b = self.check(b)?;
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return Ok(true);
            }
            // `rb` was a root when found; if `ra` still is, they were apart then.
            if self.is_root(ra) {
                return Ok(false);
            }
        }
    }

    /// Merge the clusters of `a` and `b`.
    ///
    /// Returns `true` when a merge happened, `false` when the cells were
    /// already connected. Idempotent and commutative.
    pub fn connect(&self, a: CellId, b: CellId) -> Result<bool, ClusterError> {
        let a = self.check(a)?;
        let b = self.check(b)?;
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return Ok(false);
            }

            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            let lo_slot = self.slots[lo].lock();
            let hi_slot = self.slots[hi].lock();
            if !self.is_root(lo) || !self.is_root(hi) {
                continue;
            }

            let (big, mut big_slot, small, mut small_slot) = if lo_slot.size >= hi_slot.size {
                (lo, lo_slot, hi, hi_slot)
            } else {
                (hi, hi_slot, lo, lo_slot)
            };
            big_slot.size += small_slot.size;
            small_slot.size = 0;
            let moved = std::mem::take(&mut small_slot.outline);
            big_slot.outline.extend(moved);
            self.parent[small].store(big, Ordering::Release);
            self.merges.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }
    }

    /// Number of cells in the cell's cluster.
    pub fn size(&self, cell: CellId) -> Result<usize, ClusterError> {
        let index = self.check(cell)?;
        let (_, slot) = self.lock_root(index);
        Ok(slot.size)
    }

    /// Record `cell` as a boundary cell of its own cluster.
    ///
    /// Appends under the cluster's root lock. Returns `false` when the cell
    /// was already recorded.
    pub fn add_outline(&self, cell: CellId) -> Result<bool, ClusterError> {
        let index = self.check(cell)?;
        let (_, mut slot) = self.lock_root(index);
        Ok(slot.outline.insert(cell))
    }

    /// Move every recorded boundary set out of the graph.
    ///
    /// Intended for the driver thread once the boundary pass has drained.
    pub fn take_outlines(&self) -> OutlineMap {
        let mut map = OutlineMap::new();
        for index in 0..self.len() {
            if !self.is_root(index) {
                continue;
            }
            let mut slot = self.slots[index].lock();
            if slot.outline.is_empty() {
                continue;
            }
            let cells = std::mem::take(&mut slot.outline);
            map.insert(ClusterOutline::new(CellId::new(index), slot.size, cells));
        }
        map
    }

    /// Current roots in id order.
    pub fn roots(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.len())
            .filter(|&i| self.is_root(i))
            .map(CellId::new)
    }

    fn check(&self, cell: CellId) -> Result<usize, ClusterError> {
        if cell.index() < self.len() {
            Ok(cell.index())
        } else {
            Err(ClusterError::UnknownCell {
                id: cell,
                len: self.len(),
            })
        }
    }

    fn is_root(&self, index: usize) -> bool {
        self.parent[index].load(Ordering::Acquire) == index
    }

    /// Find with path halving. Only ever rewires a node to an ancestor.
    fn find(&self, mut x: usize) -> usize {
        loop {
            let p = self.parent[x].load(Ordering::Acquire);
            if p == x {
                return x;
            }
            let gp = self.parent[p].load(Ordering::Acquire);
            if gp != p {
                let _ = self.parent[x].compare_exchange_weak(
                    p,
                    gp,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            x = gp;
        }
    }

    /// Lock the cluster containing `x`, retrying until the locked node is still a root.
    fn lock_root(&self, x: usize) -> (usize, MutexGuard<'_, ClusterSlot>) {
        loop {
            let r = self.find(x);
            let slot = self.slots[r].lock();
            if self.is_root(r) {
                return (r, slot);
            }
        }
    }
}
