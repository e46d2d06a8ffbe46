//! Neighbourhood models and the lazy per-cell neighbour cache.
//!
//! ## Ordering Contract
//!
//! Every model emits neighbours clockwise starting directly above the cell.
//! Radii above 1 are emitted ring by ring, innermost first, each ring again
//! clockwise from directly above:
//!
//! ```text
//!   Moore r=1        Von Neumann r=1     Outline
//!   7 0 1              . 0 .             7 0 1
//!   6 . 2              3 . 1             6 . 2
//!   5 4 3              . 2 .             5 4 3
//! ```
//!
//! The loop finder breaks ties by this order, so it is part of the public
//! contract. Caching never changes the result: a cached list always equals
//! the freshly computed one.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::{Geometry, Site};

/// Which positions count as adjacent to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighbourhoodModel {
    /// Square neighbourhood (Chebyshev distance <= radius).
    Moore,
    /// Diamond neighbourhood (Manhattan distance <= radius).
    VonNeumann,
    /// The 8 surrounding positions, clockwise from above, ignoring radius.
    ///
    /// Only the loop finder walks this model.
    Outline,
}

impl NeighbourhoodModel {
    fn slot(self) -> usize {
        match self {
            Self::Moore => 0,
            Self::VonNeumann => 1,
            Self::Outline => 2,
        }
    }

    /// Relative offsets in contract order.
    pub fn offsets(self, radius: u32) -> Vec<(i32, i32)> {
        match self {
            Self::Moore => (1..=radius as i32).flat_map(moore_ring).collect(),
            Self::VonNeumann => (1..=radius as i32).flat_map(von_neumann_ring).collect(),
            Self::Outline => moore_ring(1),
        }
    }

    /// Number of neighbours a cell has under this model.
    pub fn count(self, radius: u32) -> usize {
        let r = radius as usize;
        match self {
            Self::Moore => 4 * r * (r + 1),
            Self::VonNeumann => 2 * r * (r + 1),
            Self::Outline => 8,
        }
    }
}

/// Square ring at Chebyshev distance `k`, clockwise from `(0, -k)`.
fn moore_ring(k: i32) -> Vec<(i32, i32)> {
    let mut ring = Vec::with_capacity(8 * k as usize);
    for dx in 0..=k {
        ring.push((dx, -k));
    }
    for dy in (-k + 1)..=k {
        ring.push((k, dy));
    }
    for dx in (-k..k).rev() {
        ring.push((dx, k));
    }
    for dy in (-k..k).rev() {
        ring.push((-k, dy));
    }
    for dx in (-k + 1)..0 {
        ring.push((dx, -k));
    }
    ring
}

/// Diamond ring at Manhattan distance `k`, clockwise from `(0, -k)`.
fn von_neumann_ring(k: i32) -> Vec<(i32, i32)> {
    let mut ring = Vec::with_capacity(4 * k as usize);
    for i in 0..k {
        ring.push((i, -k + i));
    }
    for i in 0..k {
        ring.push((k - i, i));
    }
    for i in 0..k {
        ring.push((-i, k - i));
    }
    for i in 0..k {
        ring.push((-k + i, -i));
    }
    ring
}

/// Lazily populated neighbour lists, one per (model, cell).
///
/// Lists are built on first request, from any thread, and shared afterwards.
/// The per-model offset and list tables are themselves allocated on first
/// use so that a lattice never pays for models it does not query.
#[derive(Debug)]
pub struct NeighbourCache {
    geometry: Geometry,
    radius: u32,
    offsets: [OnceLock<Box<[(i32, i32)]>>; 3],
    tables: [OnceLock<Box<[OnceLock<Box<[Site]>>]>>; 3],
}

impl NeighbourCache {
    /// Create an empty cache for a lattice geometry.
    pub fn new(geometry: Geometry, radius: u32) -> Self {
        Self {
            geometry,
            radius,
            offsets: Default::default(),
            tables: Default::default(),
        }
    }

    /// Radius used by the Moore and Von Neumann models.
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Neighbour sites of the cell at `index`, building the list on first use.
    ///
    /// `index` must be a valid cell index of the geometry.
    pub fn get(&self, index: usize, model: NeighbourhoodModel) -> &[Site] {
        let table = self.tables[model.slot()].get_or_init(|| {
            (0..self.geometry.len())
                .map(|_| OnceLock::new())
                .collect::<Vec<_>>()
                .into_boxed_slice()
        });
        table[index].get_or_init(|| self.compute(index, model))
    }

    /// Compute a neighbour list without touching the cache.
    pub fn compute(&self, index: usize, model: NeighbourhoodModel) -> Box<[Site]> {
        let centre = self.geometry.coord(index);
        self.offsets(model)
            .iter()
            .map(|&(dx, dy)| self.geometry.site(centre.offset(dx, dy)))
            .collect()
    }

    fn offsets(&self, model: NeighbourhoodModel) -> &[(i32, i32)] {
        self.offsets[model.slot()].get_or_init(|| model.offsets(self.radius).into_boxed_slice())
    }

    /// Drop every cached list.
    pub fn invalidate(&mut self) {
        self.tables = Default::default();
    }

    /// Whether the offset table for a model has been built (diagnostics).
    pub fn has_offsets(&self, model: NeighbourhoodModel) -> bool {
        self.offsets[model.slot()].get().is_some()
    }

    /// Number of cached lists for a model (diagnostics).
    pub fn cached(&self, model: NeighbourhoodModel) -> usize {
        self.tables[model.slot()]
            .get()
            .map(|t| t.iter().filter(|slot| slot.get().is_some()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coord;

    #[test]
    fn test_moore_radius_one_clockwise_from_above() {
        assert_eq!(
            NeighbourhoodModel::Moore.offsets(1),
            vec![(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)]
        );
    }

    #[test]
    fn test_von_neumann_radius_one() {
        assert_eq!(
            NeighbourhoodModel::VonNeumann.offsets(1),
            vec![(0, -1), (1, 0), (0, 1), (-1, 0)]
        );
    }

    #[test]
    fn test_outline_ignores_radius() {
        assert_eq!(
            NeighbourhoodModel::Outline.offsets(3),
            NeighbourhoodModel::Moore.offsets(1)
        );
    }

    #[test]
    fn test_ring_sizes_and_uniqueness() {
        for model in [NeighbourhoodModel::Moore, NeighbourhoodModel::VonNeumann] {
            for radius in 1..=4 {
                let offsets = model.offsets(radius);
                assert_eq!(offsets.len(), model.count(radius), "{model:?} r={radius}");
                let mut sorted = offsets.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(sorted.len(), offsets.len(), "duplicate offsets for {model:?}");
                assert!(!offsets.contains(&(0, 0)));
            }
        }
    }

    #[test]
    fn test_radius_two_ring_starts_above() {
        let offsets = NeighbourhoodModel::Moore.offsets(2);
        assert_eq!(offsets[8], (0, -2));
        assert_eq!(offsets[9], (1, -2));
        assert_eq!(*offsets.last().unwrap(), (-1, -2));
        assert!(offsets[8..].iter().all(|(dx, dy)| dx.abs().max(dy.abs()) == 2));
    }

    #[test]
    fn test_cache_matches_recomputation() {
        let geometry = Geometry::new(4, 3);
        let cache = NeighbourCache::new(geometry, 1);
        for index in 0..geometry.len() {
            let cached = cache.get(index, NeighbourhoodModel::Moore).to_vec();
            assert_eq!(cached, cache.compute(index, NeighbourhoodModel::Moore).to_vec());
        }
        assert_eq!(cache.cached(NeighbourhoodModel::Moore), 12);
        assert_eq!(cache.cached(NeighbourhoodModel::VonNeumann), 0);
        assert!(cache.has_offsets(NeighbourhoodModel::Moore));
        assert!(!cache.has_offsets(NeighbourhoodModel::VonNeumann));
        assert!(!cache.has_offsets(NeighbourhoodModel::Outline));
    }

    #[test]
    fn test_corner_neighbours_include_padding() {
        let geometry = Geometry::new(3, 3);
        let cache = NeighbourCache::new(geometry, 1);
        let sites = cache.get(0, NeighbourhoodModel::Moore);
        let live: Vec<_> = sites.iter().filter_map(Site::cell).map(|c| c.coord).collect();
        assert_eq!(live, vec![Coord::new(1, 0), Coord::new(1, 1), Coord::new(0, 1)]);
        assert_eq!(sites.iter().filter(|s| s.is_padding()).count(), 5);
    }

    #[test]
    fn test_invalidate_clears() {
        let mut cache = NeighbourCache::new(Geometry::new(2, 2), 1);
        assert_eq!(cache.radius(), 1);
        cache.get(0, NeighbourhoodModel::Outline);
        assert_eq!(cache.cached(NeighbourhoodModel::Outline), 1);
        cache.invalidate();
        assert_eq!(cache.cached(NeighbourhoodModel::Outline), 0);
    }
}
