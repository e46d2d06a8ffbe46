//! Colours and the pixel-grid seam to image I/O.
//!
//! The crate never decodes or encodes image files. Callers adapt whatever
//! image type they hold to [`PixelGrid`]; [`PixelBuffer`] is the in-memory
//! implementation used by tests and benchmarks.
//!
//! ## Colour distance
//!
//! Distances use the "redmean" weighted Euclidean approximation of perceptual
//! difference, normalised so that black vs. white is `1.0`. All rule
//! thresholds (`epsilon`) are expressed on this `0.0..=1.0` scale.

use serde::{Deserialize, Serialize};

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Pure black.
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    /// Pure white.
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// Create a colour from channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalised perceptual distance in `0.0..=1.0`.
    pub fn distance(&self, other: &Color) -> f64 {
        (redmean(self, other) / redmean(&Color::BLACK, &Color::WHITE)).min(1.0)
    }

    /// True when the colours differ by no more than `epsilon`.
    pub fn is_similar(&self, other: &Color, epsilon: f64) -> bool {
        self.distance(other) <= epsilon
    }

    /// Channel-wise mean of a set of colours, rounded to nearest.
    ///
    /// Returns `None` for an empty input.
    pub fn mean<I: IntoIterator<Item = Color>>(colors: I) -> Option<Color> {
        let (mut r, mut g, mut b, mut n) = (0u64, 0u64, 0u64, 0u64);
        for c in colors {
            r += u64::from(c.r);
            g += u64::from(c.g);
            b += u64::from(c.b);
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let avg = |sum: u64| ((sum + n / 2) / n) as u8;
        Some(Color::rgb(avg(r), avg(g), avg(b)))
    }
}

fn redmean(a: &Color, b: &Color) -> f64 {
    let r_mean = (f64::from(a.r) + f64::from(b.r)) / 2.0;
    let dr = f64::from(a.r) - f64::from(b.r);
    let dg = f64::from(a.g) - f64::from(b.g);
    let db = f64::from(a.b) - f64::from(b.b);
    ((2.0 + r_mean / 256.0) * dr * dr
        + 4.0 * dg * dg
        + (2.0 + (255.0 - r_mean) / 256.0) * db * db)
        .sqrt()
}

/// Error type for pixel buffer construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PixelError {
    /// Data length does not match `width * height`.
    #[error("size mismatch: expected {expected} pixels, got {actual}")]
    SizeMismatch {
        /// Pixels implied by the dimensions.
        expected: usize,
        /// Pixels supplied.
        actual: usize,
    },
}

/// Read/write access to a raster image.
///
/// Coordinates are always in range when called by this crate.
pub trait PixelGrid {
    /// Number of columns.
    fn width(&self) -> usize;

    /// Number of rows.
    fn height(&self) -> usize;

    /// Colour at `(x, y)`.
    fn get(&self, x: usize, y: usize) -> Color;

    /// Overwrite the colour at `(x, y)`.
    fn set(&mut self, x: usize, y: usize, color: Color);
}

/// Row-major in-memory RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    data: Vec<Color>,
}

impl PixelBuffer {
    /// Wrap existing row-major pixel data.
    pub fn from_vec(width: usize, height: usize, data: Vec<Color>) -> Result<Self, PixelError> {
        let expected = width.checked_mul(height).ok_or(PixelError::SizeMismatch {
            expected: usize::MAX,
            actual: data.len(),
        })?;
        if data.len() != expected {
            return Err(PixelError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer filled with one colour.
    pub fn new_fill(width: usize, height: usize, color: Color) -> Self {
        Self {
            width,
            height,
            data: vec![color; width * height],
        }
    }

    /// Paint the inclusive rectangle `(x0, y0)..=(x1, y1)`, clipped to the buffer.
    pub fn fill_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize, color: Color) {
        for y in y0..=y1.min(self.height.saturating_sub(1)) {
            for x in x0..=x1.min(self.width.saturating_sub(1)) {
                self.data[y * self.width + x] = color;
            }
        }
    }

    /// Raw row-major pixels.
    pub fn data(&self) -> &[Color] {
        &self.data
    }
}

impl PixelGrid for PixelBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn get(&self, x: usize, y: usize) -> Color {
        self.data[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, color: Color) {
        self.data[y * self.width + x] = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_scale() {
        assert_eq!(Color::BLACK.distance(&Color::WHITE), 1.0);
        assert_eq!(Color::WHITE.distance(&Color::BLACK), 1.0);
        assert_eq!(Color::WHITE.distance(&Color::WHITE), 0.0);

        let grey = Color::rgb(128, 128, 128);
        let d = grey.distance(&Color::BLACK);
        assert!(d > 0.4 && d < 0.6, "mid grey should sit near half scale, got {d}");
    }

    #[test]
    fn test_similarity_threshold() {
        let a = Color::rgb(200, 200, 200);
        let b = Color::rgb(205, 200, 198);
        assert!(a.is_similar(&b, 0.1));
        assert!(!a.is_similar(&Color::BLACK, 0.1));
    }

    #[test]
    fn test_mean() {
        let m = Color::mean([Color::BLACK, Color::WHITE]).unwrap();
        assert_eq!(m, Color::rgb(128, 128, 128));
        assert_eq!(Color::mean(std::iter::empty()), None);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let err = PixelBuffer::from_vec(3, 3, vec![Color::BLACK; 8]).unwrap_err();
        assert_eq!(err, PixelError::SizeMismatch { expected: 9, actual: 8 });
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut buf = PixelBuffer::new_fill(4, 4, Color::WHITE);
        buf.fill_rect(2, 2, 10, 10, Color::BLACK);
        assert_eq!(buf.get(3, 3), Color::BLACK);
        assert_eq!(buf.get(1, 3), Color::WHITE);
        assert_eq!(buf.data().iter().filter(|c| **c == Color::BLACK).count(), 4);
    }
}
