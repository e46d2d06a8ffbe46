//! Golden tests for the outlining pipeline.
//!
//! These tests pin the end-to-end behaviour: shapes found, determinism of
//! single-threaded runs, and agreement between sequential and parallel runs.

use std::sync::Arc;

use lattice_outline::{
    run, Cell, Color, ConfigError, Coord, DetectorConfig, DetectorError, Engine, EngineError, Lattice,
    LatticeSnapshot, PassObserver, PassView, PixelBuffer, PixelGrid, PixelState, PoolConfig, Rule,
    RuleError, ShapeDetector, WorkerPool, MIN_LOOP_CELLS,
};
use parking_lot::Mutex;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn square_image() -> PixelBuffer {
    let mut image = PixelBuffer::new_fill(10, 10, Color::WHITE);
    image.fill_rect(3, 3, 6, 6, Color::BLACK);
    image
}

/// Three separated rectangles on white.
fn scene() -> PixelBuffer {
    let mut image = PixelBuffer::new_fill(40, 30, Color::WHITE);
    image.fill_rect(5, 5, 12, 10, Color::BLACK);
    image.fill_rect(20, 4, 30, 8, Color::rgb(255, 0, 0));
    image.fill_rect(8, 18, 25, 26, Color::rgb(0, 0, 255));
    image
}

/// Scene plus isolated single-pixel noise inside the background.
fn noisy_scene() -> PixelBuffer {
    let mut image = scene();
    for (x, y) in [(2, 2), (35, 15), (16, 14), (33, 27), (2, 25)] {
        image.set(x, y, Color::rgb(90, 160, 40));
    }
    image
}

fn detector(threads: usize) -> ShapeDetector {
    ShapeDetector::new(DetectorConfig::new(0.1, 1, threads)).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Golden Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_square_on_white() {
    init_tracing();
    let report = detector(1).detect(&square_image()).unwrap();

    // Background and square are both above the minimum area.
    assert_eq!(report.stats.clusters, 2);
    assert_eq!(report.stats.clusters_above_min_area, 2);
    // The background touches the border and is not a shape.
    assert_eq!(report.shapes.len(), 1);

    let square = &report.shapes[0];
    assert_eq!(square.area, 16);
    assert_eq!(square.bounds.min, Coord::new(3, 3));
    assert_eq!(square.bounds.max, Coord::new(6, 6));
    assert_eq!(square.polygon.vertices()[0], Coord::new(3, 3));
    assert_eq!(square.polygon.len(), 12);
    assert!(square.polygon.is_closed_chain());
}

#[test]
fn test_run_entry_point() {
    init_tracing();
    let shapes = run(&square_image(), 0.1, 1, 1).unwrap();
    assert_eq!(shapes.len(), 1);
    assert_eq!(shapes[0].area, 16);

    let parallel = run(&square_image(), 0.1, 1, 4).unwrap();
    assert_eq!(parallel, shapes);
}

#[test]
fn test_solid_colour() {
    init_tracing();
    let image = PixelBuffer::new_fill(16, 12, Color::rgb(40, 40, 200));
    let report = detector(4).detect(&image).unwrap();
    assert_eq!(report.stats.clusters, 1);
    assert!(report.shapes.is_empty());
}

#[test]
fn test_scene_rectangles() {
    init_tracing();
    let report = detector(1).detect(&scene()).unwrap();
    let summary: Vec<(Coord, usize, usize)> = report
        .shapes
        .iter()
        .map(|s| (s.bounds.min, s.area, s.polygon.len()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Coord::new(20, 4), 55, 28),
            (Coord::new(5, 5), 48, 24),
            (Coord::new(8, 18), 162, 50),
        ]
    );
    assert_eq!(report.stats.degenerate, 0);
}

#[test]
fn test_square_at_radius_two() {
    init_tracing();
    let shapes = run(&square_image(), 0.1, 2, 1).unwrap();
    assert_eq!(shapes.len(), 1);
    let square = &shapes[0];
    assert_eq!(square.area, 16);
    assert_eq!(square.bounds.min, Coord::new(3, 3));
    assert_eq!(square.bounds.max, Coord::new(6, 6));
    assert_eq!(square.polygon.vertices()[0], Coord::new(3, 3));
    assert_eq!(square.polygon.len(), 14);
    assert!(square.polygon.is_closed_chain());

    assert_eq!(run(&square_image(), 0.1, 2, 4).unwrap(), shapes);
}

#[test]
fn test_scene_rectangles_at_radius_two() {
    init_tracing();
    let config = DetectorConfig::new(0.1, 2, 1);
    let report = ShapeDetector::new(config).unwrap().detect(&scene()).unwrap();
    // Areas and bounds do not depend on the radius; the boundary band is
    // two cells deep, so the polygons are longer.
    let summary: Vec<(Coord, Coord, usize, usize)> = report
        .shapes
        .iter()
        .map(|s| (s.bounds.min, s.bounds.max, s.area, s.polygon.len()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Coord::new(20, 4), Coord::new(30, 8), 55, 30),
            (Coord::new(5, 5), Coord::new(12, 10), 48, 26),
            (Coord::new(8, 18), Coord::new(25, 26), 162, 52),
        ]
    );
    assert_eq!(report.stats.degenerate, 0);
    assert!(report.shapes.iter().all(|s| s.polygon.is_closed_chain()));
}

#[test]
fn test_noise_is_smoothed_away() {
    init_tracing();
    let clean = detector(1).detect(&scene()).unwrap();
    let noisy = detector(1).detect(&noisy_scene()).unwrap();
    assert_eq!(noisy.shapes, clean.shapes);

    let unsmoothed = ShapeDetector::new(DetectorConfig {
        smoothing_passes: 0,
        ..DetectorConfig::new(0.1, 1, 1)
    })
    .unwrap()
    .detect(&noisy_scene())
    .unwrap();
    // Each speckle is its own single-cell cluster, below the minimum area.
    assert!(unsmoothed.stats.below_min_area >= 5);
    assert_eq!(unsmoothed.shapes, clean.shapes);
}

#[test]
fn test_open_line_is_degenerate() {
    init_tracing();
    let mut image = PixelBuffer::new_fill(9, 7, Color::WHITE);
    image.fill_rect(2, 3, 6, 3, Color::BLACK);
    let config = DetectorConfig {
        smoothing_passes: 0,
        ..DetectorConfig::new(0.1, 1, 1)
    };
    let report = ShapeDetector::new(config).unwrap().detect(&image).unwrap();

    assert!(report.shapes.is_empty());
    assert_eq!(report.stats.degenerate, 1);
    assert!(report.stats.backtracks >= MIN_LOOP_CELLS);
}

// ─────────────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_threaded_runs_are_identical() {
    init_tracing();
    let image = noisy_scene();
    let a = detector(1).detect(&image).unwrap();
    let b = detector(0).detect(&image).unwrap();

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(
        lattice_outline::to_canonical_bytes(&a),
        lattice_outline::to_canonical_bytes(&b)
    );
}

#[test]
fn test_parallel_matches_sequential() {
    init_tracing();
    let image = noisy_scene();
    let sequential = detector(1).detect(&image).unwrap();

    for threads in [2, 4, 8] {
        let config = DetectorConfig {
            chunk_size: 7,
            queue_capacity: 3,
            ..DetectorConfig::new(0.1, 1, threads)
        };
        let parallel = ShapeDetector::new(config).unwrap().detect(&image).unwrap();
        assert_eq!(parallel.shapes, sequential.shapes, "threads = {threads}");
        assert_eq!(parallel.stats.clusters, sequential.stats.clusters);
        assert_eq!(parallel.fingerprint(), sequential.fingerprint());
    }
}

#[test]
fn test_fingerprint_tracks_parameters() {
    let image = scene();
    let a = detector(1).detect(&image).unwrap();
    let b = ShapeDetector::new(DetectorConfig {
        min_area: 50,
        ..DetectorConfig::new(0.1, 1, 1)
    })
    .unwrap()
    .detect(&image)
    .unwrap();
    assert_eq!(b.shapes.len(), 2);
    assert_ne!(a.fingerprint(), b.fingerprint());
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Writes `10 * x + y` into cells of even rows only.
struct EvenRows;

impl Rule<u32> for EvenRows {
    fn name(&self) -> &str {
        "even-rows"
    }

    fn update(&self, cell: Cell, pass: &PassView<u32>) -> Result<(), RuleError> {
        if cell.coord.y % 2 == 0 {
            pass.set_state(cell, (10 * cell.coord.x + cell.coord.y) as u32)?;
        }
        Ok(())
    }
}

#[test]
fn test_commit_publishes_exactly_the_written_values() {
    for threads in [1, 4] {
        let lattice = Lattice::new(6, 5, 1, vec![7u32; 30]).unwrap();
        let mut engine = Engine::new(lattice, WorkerPool::new(PoolConfig::with_threads(threads)).unwrap());
        let record = engine.apply(Arc::new(EvenRows)).unwrap().clone();
        assert_eq!(record.written, 18);

        let snapshot = engine.lattice().snapshot();
        for y in 0..5 {
            for x in 0..6 {
                let expected = if y % 2 == 0 { (10 * x + y) as u32 } else { 7 };
                assert_eq!(snapshot.get(x, y), Some(&expected), "cell ({x}, {y})");
            }
        }
    }
}

struct WritesTwice;

impl Rule<u32> for WritesTwice {
    fn name(&self) -> &str {
        "writes-twice"
    }

    fn update(&self, cell: Cell, pass: &PassView<u32>) -> Result<(), RuleError> {
        pass.set_state(cell, 1)?;
        pass.set_state(cell, 2)?;
        Ok(())
    }
}

struct PanicsAt(Coord);

impl Rule<u32> for PanicsAt {
    fn name(&self) -> &str {
        "panics"
    }

    fn update(&self, cell: Cell, _pass: &PassView<u32>) -> Result<(), RuleError> {
        assert_ne!(cell.coord, self.0, "bad cell");
        Ok(())
    }
}

#[test]
fn test_double_write_aborts_run() {
    init_tracing();
    let lattice = Lattice::new(4, 4, 1, vec![0u32; 16]).unwrap();
    let mut engine = Engine::new(lattice, WorkerPool::new(PoolConfig::with_threads(4)).unwrap());
    let err = engine.apply(Arc::new(WritesTwice)).unwrap_err();
    match err {
        EngineError::RuleFailed { rule, source, .. } => {
            assert_eq!(rule, "writes-twice");
            assert!(matches!(
                source,
                RuleError::Lattice(lattice_outline::LatticeError::DoubleWrite(_))
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.lattice().generation(), 0);
}

#[test]
fn test_panic_aborts_run_with_cell() {
    init_tracing();
    let lattice = Lattice::new(8, 8, 1, vec![0u32; 64]).unwrap();
    let mut engine = Engine::new(lattice, WorkerPool::new(PoolConfig::with_threads(3)).unwrap());
    let err = engine.apply(Arc::new(PanicsAt(Coord::new(5, 6)))).unwrap_err();
    assert!(err.to_string().contains("panics"));
    match err {
        EngineError::RuleFailed { coord, source, .. } => {
            assert_eq!(coord, Coord::new(5, 6));
            assert!(matches!(source, RuleError::Panicked(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct Generations(Arc<Mutex<Vec<(String, u64)>>>);

impl PassObserver<PixelState> for Generations {
    fn on_pass(&mut self, rule: &str, snapshot: &LatticeSnapshot<PixelState>) {
        self.0.lock().push((rule.to_string(), snapshot.generation()));
    }
}

#[test]
fn test_observer_sees_every_pass() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    detector(1)
        .detect_with_observer(&square_image(), Box::new(Generations(Arc::clone(&seen))))
        .unwrap();
    let rules: Vec<String> = seen.lock().iter().map(|(r, _)| r.clone()).collect();
    assert_eq!(rules, vec!["smooth", "classify", "connect", "boundary"]);
    let generations: Vec<u64> = seen.lock().iter().map(|(_, g)| *g).collect();
    assert_eq!(generations, vec![1, 2, 3, 4]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_parameters_rejected_before_running() {
    let image = square_image();
    assert!(matches!(run(&image, 2.0, 1, 1), Err(DetectorError::Config(_))));
    assert!(matches!(run(&image, 0.1, 0, 1), Err(DetectorError::Config(_))));
}

#[test]
fn test_radius_larger_than_image_rejected() {
    let image = square_image();
    let err = run(&image, 0.1, 3000, 1).unwrap_err();
    assert!(matches!(
        err,
        DetectorError::Config(ConfigError::RadiusExceedsImage { radius: 3000, .. })
    ));
    assert!(run(&image, 0.1, 10, 1).is_ok());
}

#[test]
fn test_empty_image_rejected() {
    let image = PixelBuffer::new_fill(0, 4, Color::WHITE);
    assert!(matches!(run(&image, 0.1, 1, 1), Err(DetectorError::Lattice(_))));
}

#[test]
fn test_config_from_json() {
    let config: DetectorConfig =
        serde_json::from_str(r#"{"epsilon": 0.1, "thread_count": 1, "model": "von_neumann"}"#).unwrap();
    let report = ShapeDetector::new(config).unwrap().detect(&square_image()).unwrap();
    assert_eq!(report.shapes.len(), 1);
    assert_eq!(report.shapes[0].area, 16);
}
