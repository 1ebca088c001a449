// THEORY:
// The `geometry` module holds the smallest vocabulary the engine speaks in: a 2D
// point and the two measurements the anchor math needs. Like the other leaf data
// types it is a "dumb" container; it knows nothing about faces or jewelry.
//
// Points are `f64` throughout. Landmarks arrive frame-normalized in [0, 1] and are
// only scaled to pixels by the anchor resolver, so the same type serves both
// coordinate spaces. Truncation to integer pixels happens once, in placement.

use serde::{Deserialize, Serialize};

/// A point in either normalized or pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scales a normalized point into a `width` x `height` pixel space.
    pub fn scale(&self, width: u32, height: u32) -> Point2D {
        Point2D::new(self.x * width as f64, self.y * height as f64)
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Point2D::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_maps_unit_square_to_frame() {
        let p = Point2D::new(0.5, 0.25).scale(640, 480);
        assert_eq!(p, Point2D::new(320.0, 120.0));
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
    }
}
