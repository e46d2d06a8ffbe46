//! Integer grid coordinates and axis-aligned bounds.

use serde::{Deserialize, Serialize};

/// An integer grid position.
///
/// Coordinates are signed so that neighbourhood offsets can step outside the
/// lattice (into padding) without wrapping.
///
/// Ordering is row-major: `y` first, then `x`. The loop finder relies on this
/// to pick "the first cell of the topmost row" as its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Coord {
    /// Create a coordinate.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by an offset.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Chebyshev distance (king moves).
    pub fn chebyshev(self, other: Coord) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    /// True when `other` is one of the 8 surrounding positions.
    pub fn is_adjacent8(self, other: Coord) -> bool {
        self.chebyshev(other) == 1
    }
}

impl PartialOrd for Coord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive axis-aligned bounding box in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Top-left corner (inclusive).
    pub min: Coord,
    /// Bottom-right corner (inclusive).
    pub max: Coord,
}

impl BoundingBox {
    /// A box covering exactly one position.
    pub fn at(c: Coord) -> Self {
        Self { min: c, max: c }
    }

    /// Smallest box covering all coordinates, or `None` for an empty input.
    pub fn covering<I: IntoIterator<Item = Coord>>(coords: I) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::at(first);
        for c in iter {
            bounds.include(c);
        }
        Some(bounds)
    }

    /// Grow the box to include `c`.
    pub fn include(&mut self, c: Coord) {
        self.min.x = self.min.x.min(c.x);
        self.min.y = self.min.y.min(c.y);
        self.max.x = self.max.x.max(c.x);
        self.max.y = self.max.y.max(c.y);
    }

    /// Number of columns covered.
    pub fn width(&self) -> u32 {
        (self.max.x - self.min.x) as u32 + 1
    }

    /// Number of rows covered.
    pub fn height(&self) -> u32 {
        (self.max.y - self.min.y) as u32 + 1
    }

    /// True when `c` lies inside the box.
    pub fn contains(&self, c: Coord) -> bool {
        c.x >= self.min.x && c.x <= self.max.x && c.y >= self.min.y && c.y <= self.max.y
    }
}
