//! Boundary collection.

use std::sync::Arc;

use super::PixelState;
use crate::cluster::ClusterGraph;
use crate::engine::{CellSelection, Rule, RuleError};
use crate::lattice::{Cell, Lattice, NeighbourhoodModel, PassView};

/// Adds edge cells that border a different cluster to their cluster's outline.
///
/// Only cells flagged by classification are submitted.
#[derive(Debug, Clone)]
pub struct BoundaryRule {
    graph: Arc<ClusterGraph>,
    model: NeighbourhoodModel,
}

impl BoundaryRule {
    /// Create the rule over a shared graph.
    pub fn new(graph: Arc<ClusterGraph>, model: NeighbourhoodModel) -> Self {
        Self { graph, model }
    }
}

impl Rule<PixelState> for BoundaryRule {
    fn name(&self) -> &str {
        "boundary"
    }

    fn select(&self, lattice: &Lattice<PixelState>) -> CellSelection {
        let snapshot = lattice.snapshot();
        let edges = lattice
            .cells()
            .filter(|c| snapshot.states()[c.id.index()].edge)
            .map(|c| c.id)
            .collect();
        CellSelection::Subset(edges)
    }

    fn update(&self, cell: Cell, pass: &PassView<PixelState>) -> Result<(), RuleError> {
        if !pass.get_state(cell)?.edge {
            return Ok(());
        }
        for n in pass.live_neighbours(cell, self.model)? {
            if !self.graph.is_connected(cell.id, n.id)? {
                self.graph.add_outline(cell.id)?;
                break;
            }
        }
        Ok(())
    }

    fn complete(&self) {
        tracing::debug!(clusters = self.graph.cluster_count(), "boundaries collected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, PoolConfig, WorkerPool};
    use crate::rules::{ClassifyRule, ConnectRule};
    use crate::types::{Color, Coord};

    #[test]
    fn test_outline_of_bar() {
        // A 3x1 black bar inside a 5x3 white field.
        let lattice = Lattice::from_fn(5, 3, 1, |c| {
            PixelState::new(if c.y == 1 && (1..=3).contains(&c.x) {
                Color::BLACK
            } else {
                Color::WHITE
            })
        })
        .unwrap();
        let graph = Arc::new(ClusterGraph::new(15));
        let model = NeighbourhoodModel::Moore;
        let mut engine = Engine::new(lattice, WorkerPool::new(PoolConfig::sequential()).unwrap());
        engine.apply(Arc::new(ClassifyRule::new(0.1, model))).unwrap();
        engine
            .apply(Arc::new(ConnectRule::new(Arc::clone(&graph), 0.1, model)))
            .unwrap();
        engine
            .apply(Arc::new(BoundaryRule::new(Arc::clone(&graph), model)))
            .unwrap();

        assert_eq!(graph.cluster_count(), 2);
        let geometry = engine.lattice().geometry();
        let outlines = graph.take_outlines();
        let bar_root = graph.root(crate::lattice::CellId::new(6)).unwrap();
        let bar: Vec<Coord> = outlines.get(bar_root).unwrap().coords(&geometry).into_iter().collect();
        assert_eq!(bar, vec![Coord::new(1, 1), Coord::new(2, 1), Coord::new(3, 1)]);
        // Every white cell is within one step of the bar.
        let white_root = graph.root(crate::lattice::CellId::new(0)).unwrap();
        assert_eq!(outlines.get(white_root).unwrap().cells().len(), 12);
    }
}
