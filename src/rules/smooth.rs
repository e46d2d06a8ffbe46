//! Noise smoothing.
//!
//! A cell whose colour stands apart from at least `quorum` of its live
//! neighbours is replaced by their mean colour. Isolated speckles vanish in
//! one pass; corners and edges of real shapes disagree with only part of
//! their neighbourhood and survive.

use super::PixelState;
use crate::engine::{Rule, RuleError};
use crate::lattice::{Cell, NeighbourhoodModel, PassView};
use crate::types::Color;

/// Replaces outlier cells with their neighbourhood mean.
#[derive(Debug, Clone)]
pub struct SmoothRule {
    epsilon: f64,
    quorum: f64,
    model: NeighbourhoodModel,
}

impl SmoothRule {
    /// `quorum` is the fraction of live neighbours that must differ.
    pub fn new(epsilon: f64, quorum: f64, model: NeighbourhoodModel) -> Self {
        Self {
            epsilon,
            quorum,
            model,
        }
    }

    /// The replacement colour for a cell, if it is an outlier.
    fn replacement(&self, own: Color, neighbours: &[Color]) -> Option<Color> {
        if neighbours.is_empty() {
            return None;
        }
        let differing = neighbours
            .iter()
            .filter(|n| !own.is_similar(n, self.epsilon))
            .count();
        if (differing as f64) < self.quorum * neighbours.len() as f64 {
            return None;
        }
        Color::mean(neighbours.iter().copied()).filter(|mean| *mean != own)
    }
}

impl Rule<PixelState> for SmoothRule {
    fn name(&self) -> &str {
        "smooth"
    }

    fn update(&self, cell: Cell, pass: &PassView<PixelState>) -> Result<(), RuleError> {
        let own = *pass.get_state(cell)?;
        let mut colors = Vec::new();
        for n in pass.live_neighbours(cell, self.model)? {
            colors.push(pass.get_state(n)?.color);
        }
        if let Some(color) = self.replacement(own.color, &colors) {
            pass.set_state(cell, PixelState { color, ..own })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> SmoothRule {
        SmoothRule::new(0.1, 0.875, NeighbourhoodModel::Moore)
    }

    #[test]
    fn test_isolated_speckle_replaced() {
        let neighbours = [Color::WHITE; 8];
        assert_eq!(rule().replacement(Color::BLACK, &neighbours), Some(Color::WHITE));
    }

    #[test]
    fn test_shape_corner_kept() {
        // Corner of a dark square: 3 of 8 neighbours agree.
        let mut neighbours = [Color::WHITE; 8];
        neighbours[2..5].fill(Color::BLACK);
        assert_eq!(rule().replacement(Color::BLACK, &neighbours), None);
    }

    #[test]
    fn test_similar_cell_kept() {
        let neighbours = [Color::rgb(250, 250, 250); 8];
        assert_eq!(rule().replacement(Color::WHITE, &neighbours), None);
    }

    #[test]
    fn test_no_neighbours() {
        assert_eq!(rule().replacement(Color::BLACK, &[]), None);
    }

    #[test]
    fn test_quorum_boundary() {
        // 7 of 8 differ: exactly the default quorum.
        let mut neighbours = [Color::WHITE; 8];
        neighbours[0] = Color::BLACK;
        let mean = rule().replacement(Color::BLACK, &neighbours).unwrap();
        assert_ne!(mean, Color::BLACK);

        let strict = SmoothRule::new(0.1, 1.0, NeighbourhoodModel::Moore);
        assert_eq!(strict.replacement(Color::BLACK, &neighbours), None);
    }
}
