//! The 2-D cell grid and its double-buffered state planes.
//!
//! ## Read/Write Separation
//!
//! During a pass rules read only the **before** plane and write only the
//! **after** plane. The after plane is a row of write-once slots: each cell
//! may be written at most once per pass, so no per-cell lock is needed and a
//! second write is reported as [`LatticeError::DoubleWrite`].
//!
//! [`Lattice::commit`] builds a *new* before plane from the previous one and
//! the written slots. Anyone still holding the old plane (a [`LatticeSnapshot`]
//! or a finished [`PassView`]) keeps seeing the old values.
//!
//! ## Padding
//!
//! Out-of-range coordinates resolve to [`Site::Padding`] rather than failing,
//! so neighbourhood gathering never special-cases the border. Padding has no
//! state and is never a cluster member.

pub mod neighbourhood;

use std::sync::{Arc, OnceLock};

use crate::types::Coord;
pub use neighbourhood::{NeighbourCache, NeighbourhoodModel};

/// Error type for lattice operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LatticeError {
    /// Width or height is zero.
    #[error("lattice must be non-empty, got {width}x{height}")]
    Empty {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
    /// Dimensions do not fit the signed coordinate space.
    #[error("lattice {width}x{height} exceeds the addressable coordinate range")]
    TooLarge {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
    /// Initial state count does not match the dimensions.
    #[error("dimension mismatch: expected {expected} states, got {actual}")]
    DimensionMismatch {
        /// Cells implied by the dimensions.
        expected: usize,
        /// States supplied.
        actual: usize,
    },
    /// Neighbourhood radius must be at least 1.
    #[error("neighbourhood radius must be >= 1")]
    InvalidRadius,
    /// Radius reaches past every cell of the lattice.
    #[error("neighbourhood radius {radius} exceeds the {width}x{height} lattice")]
    RadiusTooLarge {
        /// Requested radius.
        radius: u32,
        /// Lattice width.
        width: usize,
        /// Lattice height.
        height: usize,
    },
    /// A cell that does not belong to this lattice.
    #[error("cell {0:?} does not belong to this lattice")]
    ForeignCell(Cell),
    /// A cell's after-state was written twice in one pass.
    #[error("cell {0} written twice in one pass")]
    DoubleWrite(Coord),
    /// A pass handle was still alive when the planes were swapped.
    #[error("pass view still shared at commit")]
    PassStillShared,
}

/// Dense identity of a cell: its row-major index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

impl CellId {
    /// Wrap a row-major index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The row-major index.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A real lattice position: identity plus immutable coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Identity within the lattice.
    pub id: CellId,
    /// Grid position.
    pub coord: Coord,
}

/// Result of addressing the lattice at any coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    /// An in-range cell.
    Cell(Cell),
    /// An out-of-range position: dead, stateless, never merged.
    Padding(Coord),
}

impl Site {
    /// The cell, if this site is in range.
    pub fn cell(&self) -> Option<Cell> {
        match self {
            Self::Cell(c) => Some(*c),
            Self::Padding(_) => None,
        }
    }

    /// True for out-of-range positions.
    pub fn is_padding(&self) -> bool {
        matches!(self, Self::Padding(_))
    }

    /// Coordinates of the site.
    pub fn coord(&self) -> Coord {
        match self {
            Self::Cell(c) => c.coord,
            Self::Padding(c) => *c,
        }
    }
}

/// Fixed lattice dimensions and the index/coordinate mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    width: usize,
    height: usize,
}

impl Geometry {
    /// Create a geometry. Callers validate the dimensions.
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// True for a zero-sized geometry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of a row-major index.
    pub fn coord(&self, index: usize) -> Coord {
        Coord::new((index % self.width) as i32, (index / self.width) as i32)
    }

    /// Resolve any coordinate to a cell or padding.
    pub fn site(&self, c: Coord) -> Site {
        if c.x < 0 || c.y < 0 || c.x as usize >= self.width || c.y as usize >= self.height {
            return Site::Padding(c);
        }
        let index = c.y as usize * self.width + c.x as usize;
        Site::Cell(Cell {
            id: CellId(index),
            coord: c,
        })
    }

    /// The cell with a given identity.
    pub fn cell(&self, id: CellId) -> Option<Cell> {
        (id.0 < self.len()).then(|| Cell {
            id,
            coord: self.coord(id.0),
        })
    }

    /// True when the cell touches the lattice edge.
    pub fn on_border(&self, c: Coord) -> bool {
        c.x == 0 || c.y == 0 || c.x as usize == self.width - 1 || c.y as usize == self.height - 1
    }

    fn check(&self, cell: Cell) -> Result<usize, LatticeError> {
        match self.cell(cell.id) {
            Some(own) if own == cell => Ok(cell.id.0),
            _ => Err(LatticeError::ForeignCell(cell)),
        }
    }
}

type AfterPlane<S> = Box<[OnceLock<S>]>;

/// Statistics returned by [`Lattice::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    /// Cells whose after-state was written during the pass.
    pub written: usize,
    /// Pass counter after the commit.
    pub generation: u64,
}

/// Validate lattice dimensions and radius, returning the cell count.
///
/// A radius larger than both dimensions only adds padding sites, so it is
/// rejected rather than materialised.
fn check_dimensions(width: usize, height: usize, radius: u32) -> Result<usize, LatticeError> {
    if width == 0 || height == 0 {
        return Err(LatticeError::Empty { width, height });
    }
    if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
        return Err(LatticeError::TooLarge { width, height });
    }
    if radius == 0 {
        return Err(LatticeError::InvalidRadius);
    }
    if usize::try_from(radius).map_or(true, |r| r > width.max(height)) {
        return Err(LatticeError::RadiusTooLarge { radius, width, height });
    }
    width
        .checked_mul(height)
        .ok_or(LatticeError::TooLarge { width, height })
}

/// The cell grid plus its before/after state planes.
///
/// Dimensions are fixed at construction. `S` is the per-cell state.
#[derive(Debug)]
pub struct Lattice<S> {
    geometry: Geometry,
    before: Arc<[S]>,
    after: Arc<AfterPlane<S>>,
    neighbours: Arc<NeighbourCache>,
    generation: u64,
}

impl<S: Clone + Send + Sync> Lattice<S> {
    /// Create a lattice from row-major initial states.
    pub fn new(width: usize, height: usize, radius: u32, states: Vec<S>) -> Result<Self, LatticeError> {
        let expected = check_dimensions(width, height, radius)?;
        if states.len() != expected {
            return Err(LatticeError::DimensionMismatch {
                expected,
                actual: states.len(),
            });
        }

        let geometry = Geometry::new(width, height);
        Ok(Self {
            geometry,
            before: states.into(),
            after: Arc::new(empty_plane(expected)),
            neighbours: Arc::new(NeighbourCache::new(geometry, radius)),
            generation: 0,
        })
    }

    /// Create a lattice by evaluating `init` at every coordinate.
    ///
    /// Dimensions are checked before `init` is called.
    pub fn from_fn<F: FnMut(Coord) -> S>(
        width: usize,
        height: usize,
        radius: u32,
        mut init: F,
    ) -> Result<Self, LatticeError> {
        check_dimensions(width, height, radius)?;
        let geometry = Geometry::new(width, height);
        let states = (0..geometry.len()).map(|i| init(geometry.coord(i))).collect();
        Self::new(width, height, radius, states)
    }

    /// Open a pass: a fresh after plane and a shareable handle for workers.
    ///
    /// Fails if a previous pass handle is still alive.
    pub fn begin_pass(&mut self) -> Result<PassView<S>, LatticeError> {
        let after = Arc::get_mut(&mut self.after).ok_or(LatticeError::PassStillShared)?;
        if after.iter().any(|slot| slot.get().is_some()) {
            *after = empty_plane(self.geometry.len());
        }
        Ok(PassView {
            geometry: self.geometry,
            before: Arc::clone(&self.before),
            after: Arc::clone(&self.after),
            neighbours: Arc::clone(&self.neighbours),
        })
    }

    /// Close the pass: copy written after-states into a new before plane.
    ///
    /// Every [`PassView`] of the pass must have been dropped.
    pub fn commit(&mut self) -> Result<CommitStats, LatticeError> {
        let after = Arc::get_mut(&mut self.after).ok_or(LatticeError::PassStillShared)?;
        let mut written = 0;
        let next: Vec<S> = self
            .before
            .iter()
            .zip(after.iter_mut())
            .map(|(old, slot)| match slot.take() {
                Some(new) => {
                    written += 1;
                    new
                }
                None => old.clone(),
            })
            .collect();
        self.before = next.into();
        self.generation += 1;
        Ok(CommitStats {
            written,
            generation: self.generation,
        })
    }

    /// Read-only view of the current before plane.
    pub fn snapshot(&self) -> LatticeSnapshot<S> {
        LatticeSnapshot {
            geometry: self.geometry,
            states: Arc::clone(&self.before),
            generation: self.generation,
        }
    }
}

impl<S> Lattice<S> {
    /// Lattice dimensions.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.geometry.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.geometry.height
    }

    /// Number of committed passes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Address any coordinate.
    pub fn get(&self, x: i32, y: i32) -> Site {
        self.geometry.site(Coord::new(x, y))
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.geometry.len()).map(|i| Cell {
            id: CellId(i),
            coord: self.geometry.coord(i),
        })
    }

    /// Committed (before-plane) state of a cell.
    pub fn get_state(&self, cell: Cell) -> Result<&S, LatticeError> {
        let index = self.geometry.check(cell)?;
        Ok(&self.before[index])
    }

    /// Ordered neighbour sites of a cell.
    pub fn neighbours(&self, cell: Cell, model: NeighbourhoodModel) -> Result<&[Site], LatticeError> {
        let index = self.geometry.check(cell)?;
        Ok(self.neighbours.get(index, model))
    }

    /// Drop all cached neighbour lists.
    ///
    /// Fails while a pass handle still shares the cache.
    pub fn invalidate_neighbours(&mut self) -> Result<(), LatticeError> {
        Arc::get_mut(&mut self.neighbours)
            .ok_or(LatticeError::PassStillShared)?
            .invalidate();
        Ok(())
    }
}

fn empty_plane<S>(len: usize) -> AfterPlane<S> {
    (0..len).map(|_| OnceLock::new()).collect::<Vec<_>>().into_boxed_slice()
}

/// Handle given to rules for one pass.
///
/// Cloning is cheap; clones share the same planes. Reads come from the
/// before plane, writes go to the after plane.
#[derive(Debug)]
pub struct PassView<S> {
    geometry: Geometry,
    before: Arc<[S]>,
    after: Arc<AfterPlane<S>>,
    neighbours: Arc<NeighbourCache>,
}

impl<S> Clone for PassView<S> {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry,
            before: Arc::clone(&self.before),
            after: Arc::clone(&self.after),
            neighbours: Arc::clone(&self.neighbours),
        }
    }
}

impl<S> PassView<S> {
    /// Lattice dimensions.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Address any coordinate.
    pub fn site(&self, c: Coord) -> Site {
        self.geometry.site(c)
    }

    /// The cell with a given identity.
    pub fn cell(&self, id: CellId) -> Option<Cell> {
        self.geometry.cell(id)
    }

    /// State of a cell as of the start of this pass.
    pub fn get_state(&self, cell: Cell) -> Result<&S, LatticeError> {
        let index = self.geometry.check(cell)?;
        Ok(&self.before[index])
    }

    /// Write the cell's state for the end of this pass.
    pub fn set_state(&self, cell: Cell, state: S) -> Result<(), LatticeError> {
        let index = self.geometry.check(cell)?;
        self.after[index]
            .set(state)
            .map_err(|_| LatticeError::DoubleWrite(cell.coord))
    }

    /// Ordered neighbour sites of a cell, padding included.
    pub fn neighbours(&self, cell: Cell, model: NeighbourhoodModel) -> Result<&[Site], LatticeError> {
        let index = self.geometry.check(cell)?;
        Ok(self.neighbours.get(index, model))
    }

    /// In-range neighbours of a cell, in model order.
    pub fn live_neighbours(
        &self,
        cell: Cell,
        model: NeighbourhoodModel,
    ) -> Result<impl Iterator<Item = Cell> + '_, LatticeError> {
        Ok(self.neighbours(cell, model)?.iter().filter_map(Site::cell))
    }
}

/// Read-only view over a committed before plane.
///
/// Used for per-pass debug snapshots. The view keeps its plane alive and
/// never observes later commits.
#[derive(Debug, Clone)]
pub struct LatticeSnapshot<S> {
    geometry: Geometry,
    states: Arc<[S]>,
    generation: u64,
}

impl<S> LatticeSnapshot<S> {
    /// Lattice dimensions.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Pass counter at the time of the snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// State at `(x, y)`, `None` for padding.
    pub fn get(&self, x: i32, y: i32) -> Option<&S> {
        self.geometry
            .site(Coord::new(x, y))
            .cell()
            .map(|c| &self.states[c.id.index()])
    }

    /// All states in row-major order.
    pub fn states(&self) -> &[S] {
        &self.states
    }
}
