//! The outlining pipeline as cellular-automaton rules.
//!
//! | Order | Rule | Writes state | Side effect |
//! |-------|------|--------------|-------------|
//! | 1..n | [`SmoothRule`] | colour of noisy cells | - |
//! | n+1 | [`ClassifyRule`] | edge flag of every cell | - |
//! | n+2 | [`ConnectRule`] | nothing | merges similar neighbours |
//! | n+3 | [`BoundaryRule`] | nothing | collects cluster outlines |
//!
//! Rules read colours and flags from the before plane, so the result of
//! every pass is independent of the order in which cells are visited.

pub mod boundary;
pub mod classify;
pub mod connect;
pub mod smooth;

use serde::{Deserialize, Serialize};

use crate::types::Color;
pub use boundary::BoundaryRule;
pub use classify::ClassifyRule;
pub use connect::ConnectRule;
pub use smooth::SmoothRule;

/// Per-cell state carried through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelState {
    /// Current (possibly smoothed) colour.
    pub color: Color,
    /// Set by classification: some neighbour differs by more than epsilon.
    pub edge: bool,
}

impl PixelState {
    /// Unclassified state for a colour.
    pub fn new(color: Color) -> Self {
        Self { color, edge: false }
    }
}
