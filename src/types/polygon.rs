//! Outline polygons and the per-cluster record handed to shape classifiers.

use serde::{Deserialize, Serialize};

use super::coord::{BoundingBox, Coord};

/// A point with real-valued coordinates (centroids).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// An ordered, cyclic sequence of boundary cells.
///
/// The last vertex is implicitly followed by the first. Consecutive vertices
/// (including last → first) are 8-neighbours when produced by the loop
/// finder. A polygon is never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<Coord>,
}

impl Polygon {
    /// Wrap an ordered vertex list.
    pub fn new(vertices: Vec<Coord>) -> Self {
        Self { vertices }
    }

    /// Vertices in walk order.
    pub fn vertices(&self) -> &[Coord] {
        &self.vertices
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// True for a polygon without vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterate `(from, to)` steps, including the closing step.
    pub fn edges(&self) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// True when every step, including the closing one, joins 8-neighbours.
    pub fn is_closed_chain(&self) -> bool {
        self.len() >= 2 && self.edges().all(|(a, b)| a.is_adjacent8(b))
    }

    /// Bounding box of the vertices.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::covering(self.vertices.iter().copied())
    }

    /// Signed shoelace area over cell centres.
    ///
    /// Positive for clockwise walks in image coordinates (y grows downward).
    pub fn signed_area(&self) -> f64 {
        let twice: i64 = self
            .edges()
            .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
            .sum();
        twice as f64 / 2.0
    }

    /// Absolute shoelace area over cell centres.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Euclidean length of the closed walk.
    pub fn perimeter(&self) -> f64 {
        self.edges()
            .map(|(a, b)| {
                let dx = f64::from(b.x - a.x);
                let dy = f64::from(b.y - a.y);
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    /// Mean of the vertex positions.
    pub fn centroid(&self) -> Option<Point2> {
        if self.vertices.is_empty() {
            return None;
        }
        let n = self.vertices.len() as f64;
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + f64::from(c.x), sy + f64::from(c.y)));
        Some(Point2 { x: sx / n, y: sy / n })
    }
}

/// One detected region: its outline plus cluster-level measurements.
///
/// `bounds`, `centroid` and `area` describe the whole cluster (every member
/// cell), not only the outline vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedShape {
    /// Ordered boundary of the cluster.
    pub polygon: Polygon,
    /// Bounding box of all cluster cells.
    pub bounds: BoundingBox,
    /// Mean position of all cluster cells.
    pub centroid: Point2,
    /// Number of cells in the cluster.
    pub area: usize,
}

/// Seam to the external shape classifier.
///
/// Template matching (ellipse, rectangle, triangle, ...) lives outside this
/// crate; implementors receive every shape above the minimum area.
pub trait ShapeClassifier {
    /// Classification label.
    type Label;

    /// Classify one detected shape.
    fn classify(&self, shape: &DetectedShape) -> Self::Label;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_3x3() -> Polygon {
        Polygon::new(vec![
            Coord::new(0, 0),
            Coord::new(1, 0),
            Coord::new(2, 0),
            Coord::new(2, 1),
            Coord::new(2, 2),
            Coord::new(1, 2),
            Coord::new(0, 2),
            Coord::new(0, 1),
        ])
    }

    #[test]
    fn test_ring_geometry() {
        let p = ring_3x3();
        assert!(p.is_closed_chain());
        assert_eq!(p.area(), 4.0);
        assert!(p.signed_area() > 0.0);
        assert_eq!(p.perimeter(), 8.0);
        let c = p.centroid().unwrap();
        assert_eq!((c.x, c.y), (1.0, 1.0));
        let b = p.bounds().unwrap();
        assert_eq!((b.min, b.max), (Coord::new(0, 0), Coord::new(2, 2)));
    }

    #[test]
    fn test_open_chain_detected() {
        let p = Polygon::new(vec![Coord::new(0, 0), Coord::new(1, 0), Coord::new(3, 0)]);
        assert!(!p.is_closed_chain());
    }

    #[test]
    fn test_empty_polygon() {
        let p = Polygon::new(Vec::new());
        assert!(p.is_empty());
        assert!(p.bounds().is_none());
        assert!(p.centroid().is_none());
        assert_eq!(p.area(), 0.0);
    }
}
