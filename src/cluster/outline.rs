//! Per-cluster boundary sets extracted after the boundary pass.

use std::collections::{BTreeMap, BTreeSet};

use crate::lattice::{CellId, Geometry};
use crate::types::Coord;

/// Boundary cells of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOutline {
    root: CellId,
    size: usize,
    cells: BTreeSet<CellId>,
}

impl ClusterOutline {
    /// Create an outline record.
    pub fn new(root: CellId, size: usize, cells: BTreeSet<CellId>) -> Self {
        Self { root, size, cells }
    }

    /// Cluster root at extraction time.
    pub fn root(&self) -> CellId {
        self.root
    }

    /// Number of cells in the whole cluster.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Boundary cells, in row-major order.
    pub fn cells(&self) -> &BTreeSet<CellId> {
        &self.cells
    }

    /// Boundary cells as coordinates.
    pub fn coords(&self, geometry: &Geometry) -> BTreeSet<Coord> {
        self.cells.iter().map(|id| geometry.coord(id.index())).collect()
    }
}

/// Cluster root → boundary cells, for one detector run.
///
/// Iteration is in root order, which keeps single-threaded runs
/// reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineMap {
    entries: BTreeMap<CellId, ClusterOutline>,
}

impl OutlineMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `outline.root()`.
    pub fn insert(&mut self, outline: ClusterOutline) {
        self.entries.insert(outline.root, outline);
    }

    /// Entry for a root.
    pub fn get(&self, root: CellId) -> Option<&ClusterOutline> {
        self.entries.get(&root)
    }

    /// Number of clusters with a non-empty boundary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no cluster has a boundary.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in root order.
    pub fn iter(&self) -> impl Iterator<Item = &ClusterOutline> {
        self.entries.values()
    }

    /// Drop clusters smaller than `min_area`, returning how many were dropped.
    pub fn retain_min_area(&mut self, min_area: usize) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, outline| outline.size >= min_area);
        before - self.entries.len()
    }
}

impl IntoIterator for OutlineMap {
    type Item = ClusterOutline;
    type IntoIter = std::collections::btree_map::IntoValues<CellId, ClusterOutline>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(root: usize, size: usize, cells: &[usize]) -> ClusterOutline {
        ClusterOutline::new(
            CellId::new(root),
            size,
            cells.iter().copied().map(CellId::new).collect(),
        )
    }

    #[test]
    fn test_retain_min_area() {
        let mut map = OutlineMap::new();
        map.insert(outline(0, 3, &[0, 1]));
        map.insert(outline(5, 20, &[5, 6, 7]));
        assert_eq!(map.retain_min_area(16), 1);
        assert_eq!(map.len(), 1);
        assert!(map.get(CellId::new(5)).is_some());
    }

    #[test]
    fn test_coords() {
        let geometry = Geometry::new(4, 4);
        let o = outline(5, 2, &[5, 9]);
        let coords: Vec<_> = o.coords(&geometry).into_iter().collect();
        assert_eq!(coords, vec![Coord::new(1, 1), Coord::new(1, 2)]);
    }

    #[test]
    fn test_iteration_in_root_order() {
        let mut map = OutlineMap::new();
        map.insert(outline(9, 1, &[9]));
        map.insert(outline(2, 1, &[2]));
        let roots: Vec<_> = map.into_iter().map(|o| o.root().index()).collect();
        assert_eq!(roots, vec![2, 9]);
    }
}
