//! Edge/difference classification.

use super::PixelState;
use crate::engine::{Rule, RuleError};
use crate::lattice::{Cell, NeighbourhoodModel, PassView};

/// Flags every cell that has a live neighbour differing by more than epsilon.
#[derive(Debug, Clone)]
pub struct ClassifyRule {
    epsilon: f64,
    model: NeighbourhoodModel,
}

impl ClassifyRule {
    /// Create the rule.
    pub fn new(epsilon: f64, model: NeighbourhoodModel) -> Self {
        Self { epsilon, model }
    }
}

impl Rule<PixelState> for ClassifyRule {
    fn name(&self) -> &str {
        "classify"
    }

    fn update(&self, cell: Cell, pass: &PassView<PixelState>) -> Result<(), RuleError> {
        let own = *pass.get_state(cell)?;
        let mut edge = false;
        for n in pass.live_neighbours(cell, self.model)? {
            if !own.color.is_similar(&pass.get_state(n)?.color, self.epsilon) {
                edge = true;
                break;
            }
        }
        pass.set_state(cell, PixelState { edge, ..own })?;
        Ok(())
    }
}
