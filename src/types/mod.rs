//! Core value types shared across the engine.

pub mod coord;
pub mod pixel;
pub mod polygon;

pub use coord::{BoundingBox, Coord};
pub use pixel::{Color, PixelBuffer, PixelError, PixelGrid};
pub use polygon::{DetectedShape, Point2, Polygon, ShapeClassifier};
