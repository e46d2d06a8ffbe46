//! Ordering an unordered boundary set into one cyclic polygon.
//!
//! ## Algorithm
//!
//! 1. Start at the seed (conventionally the first cell of the topmost row)
//! 2. At the current cell scan the 8 Outline-model neighbours, clockwise from
//!    directly above, resuming after the last direction already tried
//! 3. Accept the first neighbour that is in the boundary set and not on the
//!    current path; accept the seed instead when the path holds at least
//!    [`MIN_LOOP_CELLS`] cells (loop closed)
//! 4. On a dead end pop the current cell, mark it dead and resume scanning
//!    at the previous cell (backtracking)
//! 5. Fail when the seed itself is popped, or when the optional backtrack
//!    cap is exceeded
//!
//! Dead cells are never re-entered, so single-cell spurs are explored once
//! and dropped from the output. The walk is iterative: the path is an
//! explicit stack and its depth is observable through [`LoopWalk`].
//!
//! Failure is an expected, data-driven outcome (irregular or tiny shapes)
//! and is reported as [`LoopResult::Degenerate`], never as an error.

use std::collections::{BTreeSet, HashSet};

use crate::lattice::NeighbourhoodModel;
use crate::types::{Coord, Polygon};

/// Smallest boundary set, and smallest closed path, that forms a polygon.
pub const MIN_LOOP_CELLS: usize = 4;

/// Why no polygon was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// The boundary set is too small to enclose anything.
    TooFewCells {
        /// Cells in the boundary set.
        count: usize,
    },
    /// The seed is not part of the boundary set.
    SeedNotInBoundary,
    /// Backtracking popped the whole path without closing a loop.
    Exhausted {
        /// Dead ends encountered.
        backtracks: usize,
    },
    /// The backtrack cap was reached before the loop closed.
    BacktrackLimit {
        /// Configured cap.
        limit: usize,
    },
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewCells { count } => write!(f, "boundary of {count} cells is too small"),
            Self::SeedNotInBoundary => write!(f, "seed is not a boundary cell"),
            Self::Exhausted { backtracks } => {
                write!(f, "shape too irregular: no loop after {backtracks} backtracks")
            }
            Self::BacktrackLimit { limit } => write!(f, "backtrack limit {limit} reached"),
        }
    }
}

/// Outcome of ordering one boundary set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopResult {
    /// A closed walk back to the seed.
    Closed(Polygon),
    /// No polygon could be formed.
    Degenerate(Degeneracy),
}

impl LoopResult {
    /// The polygon, if the loop closed.
    pub fn polygon(&self) -> Option<&Polygon> {
        match self {
            Self::Closed(p) => Some(p),
            Self::Degenerate(_) => None,
        }
    }

    /// Consume into the polygon, if the loop closed.
    pub fn into_polygon(self) -> Option<Polygon> {
        match self {
            Self::Closed(p) => Some(p),
            Self::Degenerate(_) => None,
        }
    }

    /// True when a polygon was produced.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// A loop result plus walk statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopWalk {
    /// The outcome.
    pub result: LoopResult,
    /// Dead ends backed out of.
    pub backtracks: usize,
    /// Deepest path length reached.
    pub max_depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    coord: Coord,
    next_dir: usize,
}

/// Orders boundary cells into polygons.
#[derive(Debug, Clone)]
pub struct LoopFinder {
    directions: Vec<(i32, i32)>,
    max_backtrack: Option<usize>,
}

impl Default for LoopFinder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LoopFinder {
    /// Create a finder. `max_backtrack` caps dead ends per walk; `None` is unbounded.
    pub fn new(max_backtrack: Option<usize>) -> Self {
        Self {
            directions: NeighbourhoodModel::Outline.offsets(1),
            max_backtrack,
        }
    }

    /// Order `cells` starting at their first cell in row-major order.
    pub fn trace(&self, cells: &BTreeSet<Coord>) -> LoopResult {
        match cells.first() {
            Some(&seed) => self.get_loop(cells, seed),
            None => LoopResult::Degenerate(Degeneracy::TooFewCells { count: 0 }),
        }
    }

    /// Order `cells` into a cyclic polygon starting at `seed`.
    pub fn get_loop(&self, cells: &BTreeSet<Coord>, seed: Coord) -> LoopResult {
        self.walk(cells, seed).result
    }

    /// Like [`LoopFinder::get_loop`], also reporting walk statistics.
    pub fn walk(&self, cells: &BTreeSet<Coord>, seed: Coord) -> LoopWalk {
        let finish = |result, backtracks, max_depth| LoopWalk {
            result,
            backtracks,
            max_depth,
        };

        if cells.len() < MIN_LOOP_CELLS {
            let d = Degeneracy::TooFewCells { count: cells.len() };
            return finish(LoopResult::Degenerate(d), 0, 0);
        }
        if !cells.contains(&seed) {
            return finish(LoopResult::Degenerate(Degeneracy::SeedNotInBoundary), 0, 0);
        }

        let mut path = vec![Frame {
            coord: seed,
            next_dir: 0,
        }];
        let mut on_path: HashSet<Coord> = HashSet::from([seed]);
        let mut dead: HashSet<Coord> = HashSet::new();
        let mut backtracks = 0;
        let mut max_depth = 1;

        while let Some(top) = path.len().checked_sub(1) {
            let depth = path.len();
            let mut next = None;
            while path[top].next_dir < self.directions.len() {
                let (dx, dy) = self.directions[path[top].next_dir];
                path[top].next_dir += 1;
                let candidate = path[top].coord.offset(dx, dy);
                if !cells.contains(&candidate) {
                    continue;
                }
                if candidate == seed {
                    if depth >= MIN_LOOP_CELLS {
                        let polygon = Polygon::new(path.iter().map(|f| f.coord).collect());
                        return finish(LoopResult::Closed(polygon), backtracks, max_depth);
                    }
                    continue;
                }
                if on_path.contains(&candidate) || dead.contains(&candidate) {
                    continue;
                }
                next = Some(candidate);
                break;
            }

            match next {
                Some(coord) => {
                    path.push(Frame { coord, next_dir: 0 });
                    on_path.insert(coord);
                    max_depth = max_depth.max(path.len());
                }
                None => {
                    let Some(frame) = path.pop() else { break };
                    on_path.remove(&frame.coord);
                    dead.insert(frame.coord);
                    if path.is_empty() {
                        break;
                    }
                    backtracks += 1;
                    if let Some(limit) = self.max_backtrack {
                        if backtracks > limit {
                            let d = Degeneracy::BacktrackLimit { limit };
                            return finish(LoopResult::Degenerate(d), backtracks, max_depth);
                        }
                    }
                }
            }
        }

        tracing::trace!(backtracks, max_depth, "boundary walk exhausted");
        finish(
            LoopResult::Degenerate(Degeneracy::Exhausted { backtracks }),
            backtracks,
            max_depth,
        )
    }
}
