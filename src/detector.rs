//! End-to-end shape detection.
//!
//! ## Pipeline
//!
//! ```text
//! PixelGrid → Lattice<PixelState>
//!   → smooth × n → classify → connect → boundary      (engine passes)
//!   → take_outlines → min_area / border filter
//!   → LoopFinder per cluster → DetectedShape
//! ```
//!
//! A fresh [`ClusterGraph`] is built for every run. Shapes are returned
//! sorted by bounding box (top, then left), so output does not depend on
//! which cell ended up as a cluster root.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::cluster::{ClusterError, ClusterGraph, ClusterOutline};
use crate::config::{ConfigError, DetectorConfig};
use crate::engine::{Engine, EngineError, PassObserver, PoolError, Rule, WorkerPool};
use crate::lattice::{CellId, Geometry, Lattice, LatticeError};
use crate::loop_finder::{LoopFinder, LoopResult};
use crate::rules::{BoundaryRule, ClassifyRule, ConnectRule, PixelState, SmoothRule};
use crate::types::{BoundingBox, Coord, DetectedShape, PixelGrid, Point2, ShapeClassifier};
use crate::OUTPUT_SCHEMA_VERSION;

/// Error type for detection runs.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Rejected before any thread started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The image could not be mapped onto a lattice.
    #[error("invalid image: {0}")]
    Lattice(#[from] LatticeError),
    /// The worker pool could not be started.
    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),
    /// A pass failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Cluster extraction addressed a cell outside the graph.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Image width.
    pub width: usize,
    /// Image height.
    pub height: usize,
    /// Committed engine passes.
    pub passes: usize,
    /// Clusters after the connect pass.
    pub clusters: usize,
    /// Clusters with at least `min_area` cells.
    pub clusters_above_min_area: usize,
    /// Clusters with a non-empty boundary set.
    pub outlined_clusters: usize,
    /// Outlined clusters dropped for being below `min_area`.
    pub below_min_area: usize,
    /// Outlined clusters dropped for touching the image border.
    pub touching_border: usize,
    /// Boundary sets that did not form a polygon.
    pub degenerate: usize,
    /// Dead ends backed out of across all loop walks.
    pub backtracks: usize,
}

/// Shapes plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Detected shapes, sorted by bounding box.
    pub shapes: Vec<DetectedShape>,
    /// Run counters.
    pub stats: DetectionStats,
    /// `DetectorConfig::params_hash` of the producing configuration.
    pub params_hash: String,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    schema: &'static str,
    params_hash: &'a str,
    shapes: &'a [DetectedShape],
}

impl DetectionReport {
    /// Deterministic fingerprint of the shapes and the parameters that produced them.
    ///
    /// Run counters are excluded.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&FingerprintInput {
            schema: OUTPUT_SCHEMA_VERSION,
            params_hash: &self.params_hash,
            shapes: &self.shapes,
        })
    }

    /// Hand every shape to an external classifier, in report order.
    pub fn classify<C: ShapeClassifier>(&self, classifier: &C) -> Vec<C::Label> {
        self.shapes.iter().map(|s| classifier.classify(s)).collect()
    }
}

/// Runs the outlining pipeline with a fixed configuration.
#[derive(Debug, Clone)]
pub struct ShapeDetector {
    config: DetectorConfig,
    finder: LoopFinder,
}

impl ShapeDetector {
    /// Validate `config` and build a detector.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self {
            finder: LoopFinder::new(config.max_backtrack),
            config,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect shapes in `image`.
    pub fn detect<G: PixelGrid + ?Sized>(&self, image: &G) -> Result<DetectionReport, DetectorError> {
        self.detect_inner(image, None)
    }

    /// Detect shapes, delivering a snapshot after every pass.
    ///
    /// Snapshots are only delivered when `thread_count` is 0 or 1.
    pub fn detect_with_observer<G: PixelGrid + ?Sized>(
        &self,
        image: &G,
        observer: Box<dyn PassObserver<PixelState>>,
    ) -> Result<DetectionReport, DetectorError> {
        self.detect_inner(image, Some(observer))
    }

    /// Run only the smoothing passes and write changed pixels back to `image`.
    ///
    /// Returns the number of pixels changed.
    pub fn smooth_into<G: PixelGrid + ?Sized>(&self, image: &mut G) -> Result<usize, DetectorError> {
        let mut engine = self.engine(&*image)?;
        let before = engine.lattice().snapshot();
        let smooth = self.smooth_rule();
        for _ in 0..self.config.smoothing_passes {
            engine.apply(Arc::clone(&smooth))?;
        }

        let after = engine.lattice().snapshot();
        let mut changed = 0;
        for (i, (old, new)) in before.states().iter().zip(after.states()).enumerate() {
            if old.color != new.color {
                let c = after.geometry().coord(i);
                image.set(c.x as usize, c.y as usize, new.color);
                changed += 1;
            }
        }
        tracing::debug!(changed, passes = self.config.smoothing_passes, "smoothed image");
        Ok(changed)
    }

    fn detect_inner<G: PixelGrid + ?Sized>(
        &self,
        image: &G,
        observer: Option<Box<dyn PassObserver<PixelState>>>,
    ) -> Result<DetectionReport, DetectorError> {
        let span = tracing::info_span!(
            "detect",
            width = image.width(),
            height = image.height(),
            threads = self.config.thread_count,
        );
        let _enter = span.enter();

        let mut engine = self.engine(image)?;
        if let Some(observer) = observer {
            engine = engine.with_observer(observer);
        }
        let geometry = engine.lattice().geometry();
        let graph = Arc::new(ClusterGraph::new(geometry.len()));

        let smooth = self.smooth_rule();
        for _ in 0..self.config.smoothing_passes {
            engine.apply(Arc::clone(&smooth))?;
        }
        let model = self.config.model;
        let rules: [Arc<dyn Rule<PixelState>>; 3] = [
            Arc::new(ClassifyRule::new(self.config.epsilon, model)),
            Arc::new(ConnectRule::new(Arc::clone(&graph), self.config.epsilon, model)),
            Arc::new(BoundaryRule::new(Arc::clone(&graph), model)),
        ];
        engine.run(&rules)?;

        let mut stats = DetectionStats {
            width: geometry.width(),
            height: geometry.height(),
            passes: engine.history().len(),
            clusters: graph.cluster_count(),
            ..DetectionStats::default()
        };
        let shapes = self.extract_shapes(&graph, geometry, &mut stats)?;

        tracing::info!(
            shapes = shapes.len(),
            clusters = stats.clusters,
            degenerate = stats.degenerate,
            "detection complete"
        );
        Ok(DetectionReport {
            shapes,
            stats,
            params_hash: self.config.params_hash(),
        })
    }

    fn extract_shapes(
        &self,
        graph: &ClusterGraph,
        geometry: Geometry,
        stats: &mut DetectionStats,
    ) -> Result<Vec<DetectedShape>, DetectorError> {
        for root in graph.roots() {
            if graph.size(root)? >= self.config.min_area {
                stats.clusters_above_min_area += 1;
            }
        }

        let mut outlines = graph.take_outlines();
        stats.outlined_clusters = outlines.len();
        stats.below_min_area = outlines.retain_min_area(self.config.min_area);

        let members = cluster_members(graph, geometry, outlines.iter().map(ClusterOutline::root))?;
        let mut shapes = Vec::with_capacity(outlines.len());
        for outline in outlines {
            let Some(cells) = members.get(&outline.root()) else {
                continue;
            };
            if self.config.discard_border_clusters && cells.iter().any(|&c| geometry.on_border(c)) {
                stats.touching_border += 1;
                continue;
            }

            let boundary: BTreeSet<Coord> = outline.coords(&geometry);
            let Some(&seed) = boundary.first() else {
                continue;
            };
            let walk = self.finder.walk(&boundary, seed);
            stats.backtracks += walk.backtracks;
            match walk.result {
                LoopResult::Closed(polygon) => {
                    if let Some(shape) = measure(polygon, cells) {
                        shapes.push(shape);
                    }
                }
                LoopResult::Degenerate(reason) => {
                    stats.degenerate += 1;
                    tracing::debug!(
                        seed = %seed,
                        boundary = boundary.len(),
                        area = outline.size(),
                        %reason,
                        "no polygon for cluster"
                    );
                }
            }
        }

        shapes.sort_by(|a, b| {
            (a.bounds.min, a.bounds.max, a.area).cmp(&(b.bounds.min, b.bounds.max, b.area))
        });
        Ok(shapes)
    }

    fn engine<G: PixelGrid + ?Sized>(&self, image: &G) -> Result<Engine<PixelState>, DetectorError> {
        self.config.validate_for_image(image.width(), image.height())?;
        let lattice = lattice_from(image, self.config.radius)?;
        let pool = WorkerPool::new(self.config.pool_config())?;
        Ok(Engine::new(lattice, pool))
    }

    fn smooth_rule(&self) -> Arc<dyn Rule<PixelState>> {
        Arc::new(SmoothRule::new(
            self.config.epsilon,
            self.config.smoothing_quorum,
            self.config.model,
        ))
    }
}

fn lattice_from<G: PixelGrid + ?Sized>(image: &G, radius: u32) -> Result<Lattice<PixelState>, LatticeError> {
    Lattice::from_fn(image.width(), image.height(), radius, |c| {
        PixelState::new(image.get(c.x as usize, c.y as usize))
    })
}

/// Member coordinates of the requested roots, in row-major order.
fn cluster_members(
    graph: &ClusterGraph,
    geometry: Geometry,
    roots: impl Iterator<Item = CellId>,
) -> Result<BTreeMap<CellId, Vec<Coord>>, DetectorError> {
    let mut members: BTreeMap<CellId, Vec<Coord>> = roots.map(|r| (r, Vec::new())).collect();
    for index in 0..geometry.len() {
        let root = graph.root(CellId::new(index))?;
        if let Some(cells) = members.get_mut(&root) {
            cells.push(geometry.coord(index));
        }
    }
    Ok(members)
}

fn measure(polygon: crate::types::Polygon, cells: &[Coord]) -> Option<DetectedShape> {
    let bounds = BoundingBox::covering(cells.iter().copied())?;
    let n = cells.len() as f64;
    let (sx, sy) = cells
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + f64::from(c.x), sy + f64::from(c.y)));
    Some(DetectedShape {
        polygon,
        bounds,
        centroid: Point2 { x: sx / n, y: sy / n },
        area: cells.len(),
    })
}

/// Detect shapes with default settings for everything but the core parameters.
///
/// `thread_count` of 0 or 1 runs on the calling thread.
pub fn run<G: PixelGrid + ?Sized>(
    image: &G,
    epsilon: f64,
    radius: u32,
    thread_count: usize,
) -> Result<Vec<DetectedShape>, DetectorError> {
    let detector = ShapeDetector::new(DetectorConfig::new(epsilon, radius, thread_count))?;
    Ok(detector.detect(image)?.shapes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PixelBuffer};

    fn square_image() -> PixelBuffer {
        let mut image = PixelBuffer::new_fill(10, 10, Color::WHITE);
        image.fill_rect(3, 3, 6, 6, Color::BLACK);
        image
    }

    #[test]
    fn test_square_detected() {
        let detector = ShapeDetector::new(DetectorConfig::new(0.1, 1, 1)).unwrap();
        let report = detector.detect(&square_image()).unwrap();

        assert_eq!(report.stats.clusters, 2);
        assert_eq!(report.stats.clusters_above_min_area, 2);
        assert_eq!(report.stats.touching_border, 1);
        assert_eq!(report.shapes.len(), 1);
        let shape = &report.shapes[0];
        assert_eq!(shape.area, 16);
        assert_eq!(shape.bounds, BoundingBox { min: Coord::new(3, 3), max: Coord::new(6, 6) });
        assert_eq!(shape.polygon.len(), 12);
        assert!(shape.polygon.is_closed_chain());
        assert_eq!(shape.centroid, Point2 { x: 4.5, y: 4.5 });
    }

    #[test]
    fn test_background_kept_when_border_filter_off() {
        let config = DetectorConfig {
            discard_border_clusters: false,
            ..DetectorConfig::new(0.1, 1, 1)
        };
        let report = ShapeDetector::new(config).unwrap().detect(&square_image()).unwrap();
        assert_eq!(report.shapes.len(), 2);
        // The background outline is the ring just outside the square.
        let background = &report.shapes[0];
        assert_eq!(background.area, 84);
        assert_eq!(background.polygon.len(), 20);
    }

    #[test]
    fn test_square_at_radius_two() {
        let detector = ShapeDetector::new(DetectorConfig::new(0.1, 2, 1)).unwrap();
        let report = detector.detect(&square_image()).unwrap();

        assert_eq!(report.shapes.len(), 1);
        let shape = &report.shapes[0];
        // Every square cell is within two steps of white, so the whole
        // block is boundary and the walk doubles back through the middle.
        assert_eq!(shape.area, 16);
        assert_eq!(shape.bounds, BoundingBox { min: Coord::new(3, 3), max: Coord::new(6, 6) });
        assert_eq!(shape.polygon.len(), 14);
        assert_eq!(
            &shape.polygon.vertices()[..4],
            &[Coord::new(3, 3), Coord::new(4, 3), Coord::new(5, 3), Coord::new(6, 3)]
        );
        assert!(shape.polygon.is_closed_chain());
    }

    #[test]
    fn test_radius_past_image_is_a_config_error() {
        let detector = ShapeDetector::new(DetectorConfig::new(0.1, 3000, 1)).unwrap();
        let err = detector.detect(&square_image()).unwrap_err();
        assert!(matches!(
            err,
            DetectorError::Config(ConfigError::RadiusExceedsImage { radius: 3000, width: 10, height: 10 })
        ));
        let mut image = square_image();
        assert!(matches!(detector.smooth_into(&mut image), Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_solid_colour_has_no_shapes() {
        let image = PixelBuffer::new_fill(8, 6, Color::rgb(10, 200, 30));
        let report = ShapeDetector::new(DetectorConfig::new(0.1, 1, 1))
            .unwrap()
            .detect(&image)
            .unwrap();
        assert_eq!(report.stats.clusters, 1);
        assert_eq!(report.stats.outlined_clusters, 0);
        assert!(report.shapes.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ShapeDetector::new(DetectorConfig::new(-0.5, 1, 1)).unwrap_err();
        assert!(matches!(err, DetectorError::Config(ConfigError::InvalidEpsilon(_))));
    }

    #[test]
    fn test_smooth_into_removes_speckle() {
        let mut image = PixelBuffer::new_fill(5, 5, Color::WHITE);
        image.set(2, 2, Color::BLACK);
        let detector = ShapeDetector::new(DetectorConfig::new(0.1, 1, 1)).unwrap();
        assert_eq!(detector.smooth_into(&mut image).unwrap(), 1);
        assert_eq!(image.get(2, 2), Color::WHITE);
    }

    #[test]
    fn test_classify_hand_off() {
        struct Corners;
        impl ShapeClassifier for Corners {
            type Label = (usize, u32);
            fn classify(&self, shape: &DetectedShape) -> (usize, u32) {
                (shape.polygon.len(), shape.bounds.width())
            }
        }
        let report = ShapeDetector::new(DetectorConfig::new(0.1, 1, 1))
            .unwrap()
            .detect(&square_image())
            .unwrap();
        assert_eq!(report.classify(&Corners), vec![(12, 4)]);
    }
}
