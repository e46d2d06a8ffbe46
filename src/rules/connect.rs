//! Cluster formation.

use std::sync::Arc;

use super::PixelState;
use crate::cluster::ClusterGraph;
use crate::engine::{Rule, RuleError};
use crate::lattice::{Cell, NeighbourhoodModel, PassView};

/// Merges each cell with every similar live neighbour.
///
/// Writes no cell state. Each unordered pair is visited once, from the cell
/// with the lower id.
#[derive(Debug, Clone)]
pub struct ConnectRule {
    graph: Arc<ClusterGraph>,
    epsilon: f64,
    model: NeighbourhoodModel,
}

impl ConnectRule {
    /// Create the rule over a shared graph.
    pub fn new(graph: Arc<ClusterGraph>, epsilon: f64, model: NeighbourhoodModel) -> Self {
        Self {
            graph,
            epsilon,
            model,
        }
    }
}

impl Rule<PixelState> for ConnectRule {
    fn name(&self) -> &str {
        "connect"
    }

    fn update(&self, cell: Cell, pass: &PassView<PixelState>) -> Result<(), RuleError> {
        let own = pass.get_state(cell)?.color;
        for n in pass.live_neighbours(cell, self.model)? {
            if n.id > cell.id && own.is_similar(&pass.get_state(n)?.color, self.epsilon) {
                self.graph.connect(cell.id, n.id)?;
            }
        }
        Ok(())
    }

    fn complete(&self) {
        tracing::debug!(
            clusters = self.graph.cluster_count(),
            merges = self.graph.merges(),
            "clusters formed"
        );
    }
}
