//! Detector configuration.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! `epsilon` and `smoothing_quorum` are quantized to integers before
//! hashing (factor 1e6, rounded to i64), so `params_hash` does not depend on
//! float formatting.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::engine::{PoolConfig, DEFAULT_THREADS};
use crate::lattice::NeighbourhoodModel;
use crate::CONFIG_SCHEMA_VERSION;

/// Quantization factor for float normalization.
const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Error type for rejected configurations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Epsilon outside `0.0..=1.0` or not finite.
    #[error("epsilon must be within 0.0..=1.0, got {0}")]
    InvalidEpsilon(f64),
    /// Radius of zero.
    #[error("neighbourhood radius must be >= 1")]
    InvalidRadius,
    /// Radius larger than both image dimensions.
    #[error("neighbourhood radius {radius} exceeds the {width}x{height} image")]
    RadiusExceedsImage {
        /// Configured radius.
        radius: u32,
        /// Image width.
        width: usize,
        /// Image height.
        height: usize,
    },
    /// Quorum outside `(0.0, 1.0]` or not finite.
    #[error("smoothing quorum must be within (0.0, 1.0], got {0}")]
    InvalidQuorum(f64),
    /// Zero-sized chunks or queue.
    #[error("{field} must be >= 1")]
    ZeroCapacity {
        /// Offending field.
        field: &'static str,
    },
    /// The outline model is reserved for loop ordering.
    #[error("neighbourhood model {0:?} cannot be used for connectivity; use moore or von_neumann")]
    UnsupportedModel(NeighbourhoodModel),
}

/// Parameters of one detector.
///
/// ## Parameters
///
/// - `epsilon`: colour distance (0..=1) under which two cells are similar
/// - `radius`: neighbourhood radius for smoothing, classification and connect
/// - `model`: neighbourhood shape for those rules
/// - `thread_count`: workers; 0 or 1 runs on the calling thread
/// - `smoothing_passes`, `smoothing_quorum`: noise removal (0 passes disables)
/// - `min_area`: clusters with fewer cells produce no shape
/// - `max_backtrack`: cap on loop-ordering dead ends per cluster
/// - `discard_border_clusters`: drop clusters touching the image edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Similarity threshold on the normalised colour distance.
    pub epsilon: f64,
    /// Neighbourhood radius.
    pub radius: u32,
    /// Neighbourhood model for the pixel rules.
    pub model: NeighbourhoodModel,
    /// Worker threads.
    pub thread_count: usize,
    /// Cells per queued chunk.
    pub chunk_size: usize,
    /// Queued chunks before submission blocks.
    pub queue_capacity: usize,
    /// Smoothing passes before classification.
    pub smoothing_passes: usize,
    /// Fraction of differing neighbours that marks a cell as noise.
    pub smoothing_quorum: f64,
    /// Minimum cluster size in cells.
    pub min_area: usize,
    /// Loop-ordering backtrack cap; `None` is unbounded.
    pub max_backtrack: Option<usize>,
    /// Whether clusters touching the lattice border are discarded.
    pub discard_border_clusters: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            epsilon: 0.1,
            radius: 1,
            model: NeighbourhoodModel::Moore,
            thread_count: DEFAULT_THREADS,
            chunk_size: pool.chunk_size,
            queue_capacity: pool.queue_capacity,
            smoothing_passes: 1,
            smoothing_quorum: 0.875,
            min_area: 4,
            max_backtrack: None,
            discard_border_clusters: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct QuantizedDetectorParams {
    version: &'static str,
    epsilon: i64,
    radius: u32,
    model: NeighbourhoodModel,
    smoothing_passes: usize,
    smoothing_quorum: i64,
    min_area: usize,
    max_backtrack: Option<usize>,
    discard_border_clusters: bool,
}

fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}

impl DetectorConfig {
    /// Default configuration with the given core parameters.
    pub fn new(epsilon: f64, radius: u32, thread_count: usize) -> Self {
        Self {
            epsilon,
            radius,
            thread_count,
            ..Self::default()
        }
    }

    /// Reject parameters the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.epsilon.is_finite() || !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        if self.radius == 0 {
            return Err(ConfigError::InvalidRadius);
        }
        if !self.smoothing_quorum.is_finite()
            || self.smoothing_quorum <= 0.0
            || self.smoothing_quorum > 1.0
        {
            return Err(ConfigError::InvalidQuorum(self.smoothing_quorum));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroCapacity { field: "chunk_size" });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "queue_capacity",
            });
        }
        if self.model == NeighbourhoodModel::Outline {
            return Err(ConfigError::UnsupportedModel(self.model));
        }
        Ok(())
    }

    /// Reject a radius that reaches past every pixel of a `width`x`height` image.
    ///
    /// Empty images are left to lattice construction to report.
    pub fn validate_for_image(&self, width: usize, height: usize) -> Result<(), ConfigError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        if usize::try_from(self.radius).map_or(true, |r| r > width.max(height)) {
            return Err(ConfigError::RadiusExceedsImage {
                radius: self.radius,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Worker pool sizing for this configuration.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            threads: self.thread_count,
            queue_capacity: self.queue_capacity,
            chunk_size: self.chunk_size,
        }
    }

    /// Hash of every parameter that affects detection output.
    ///
    /// Scheduling parameters (threads, chunk size, queue capacity) are
    /// excluded: they never change the shapes produced.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedDetectorParams {
            version: CONFIG_SCHEMA_VERSION,
            epsilon: quantize_float(self.epsilon),
            radius: self.radius,
            model: self.model,
            smoothing_passes: self.smoothing_passes,
            smoothing_quorum: quantize_float(self.smoothing_quorum),
            min_area: self.min_area,
            max_backtrack: self.max_backtrack,
            discard_border_clusters: self.discard_border_clusters,
        })
    }
}
