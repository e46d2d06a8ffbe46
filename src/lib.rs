//! # lattice-outline
//!
//! Shape outlining for raster images with a cellular automaton.
//!
//! The crate answers one question:
//!
//! > Which connected regions does this image contain, and what is the
//! > ordered outline of each?
//!
//! ## Core Contract
//!
//! 1. Cells update from the **before** plane into the **after** plane; a pass
//!    becomes visible only when it is committed
//! 2. Similar neighbouring cells are merged into clusters concurrently
//! 3. Each cluster's boundary cells are ordered into one cyclic polygon, or
//!    reported as degenerate
//!
//! ## Architecture
//!
//! ```text
//! PixelGrid → Lattice<PixelState> → Engine (Rule passes on a WorkerPool)
//!                                        ↓
//!                              ClusterGraph → OutlineMap → LoopFinder → DetectedShape
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Single-threaded runs produce byte-identical reports (see
//!   [`DetectionReport::fingerprint`])
//! - Parallel runs produce the same shapes: rules read only committed state,
//!   and shapes are sorted by geometry rather than by cluster root
//! - Neighbour order is fixed (clockwise from directly above)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod cluster;
pub mod config;
pub mod detector;
pub mod engine;
pub mod lattice;
pub mod loop_finder;
pub mod rules;
pub mod types;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use cluster::{ClusterError, ClusterGraph, ClusterOutline, OutlineMap};
pub use config::{ConfigError, DetectorConfig};
pub use detector::{run, DetectionReport, DetectionStats, DetectorError, ShapeDetector};
pub use engine::{
    CellSelection, Engine, EngineError, Job, PassObserver, PassRecord, PassStats, PoolConfig,
    PoolError, Rule, RuleError, WorkerPool,
};
pub use lattice::{
    Cell, CellId, CommitStats, Geometry, Lattice, LatticeError, LatticeSnapshot,
    NeighbourhoodModel, PassView, Site,
};
pub use loop_finder::{Degeneracy, LoopFinder, LoopResult, LoopWalk, MIN_LOOP_CELLS};
pub use rules::{BoundaryRule, ClassifyRule, ConnectRule, PixelState, SmoothRule};
pub use types::{
    BoundingBox, Color, Coord, DetectedShape, PixelBuffer, PixelError, PixelGrid, Point2, Polygon,
    ShapeClassifier,
};

/// Schema version mixed into configuration parameter hashes.
pub const CONFIG_SCHEMA_VERSION: &str = "lattice_outline.config.v1";

/// Schema version mixed into detection report fingerprints.
pub const OUTPUT_SCHEMA_VERSION: &str = "lattice_outline.report.v1";
