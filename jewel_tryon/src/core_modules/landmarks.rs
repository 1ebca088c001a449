// THEORY:
// The `landmarks` module defines the boundary between the engine and the face
// landmark model. The model itself is an external capability; the engine only
// relies on two promises it makes:
// 1.  **Canonical Indexing**: index `i` always names the same anatomical point.
//     The engine uses the MediaPipe Face Mesh topology (468 points).
// 2.  **Normalized Coordinates**: points are expressed relative to the frame, in
//     [0, 1], so the anchor math is resolution-independent until the resolver
//     scales it back to pixels.
//
// "Zero or one face" is an explicit sum type (`Detection`) so that every caller
// has to decide what the no-face branch means for it.

use crate::core_modules::geometry::Point2D;
use crate::error::Result;
use crate::Frame;

/// Canonical Face Mesh indices consumed by the anchor resolver.
pub mod face_mesh {
    /// Number of points produced by the Face Mesh network (without iris refinement).
    pub const NUM_LANDMARKS: usize = 468;
    /// Upper forehead, on the vertical midline.
    pub const FOREHEAD: usize = 10;
    /// Tip of the chin.
    pub const CHIN: usize = 152;
    /// Left jaw corner next to the ear lobe (image-left).
    pub const LEFT_EAR_LOBE: usize = 234;
    /// Right jaw corner next to the ear lobe (image-right).
    pub const RIGHT_EAR_LOBE: usize = 454;
}

/// An ordered, canonically indexed set of frame-normalized face landmarks.
///
/// Valid only for the frame that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point2D>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Point2D> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<Point2D> for LandmarkSet {
    fn from_iter<I: IntoIterator<Item = Point2D>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Outcome of running the landmark model on one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NoFace,
    Face(LandmarkSet),
}

impl Detection {
    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        match self {
            Detection::Face(set) => Some(set),
            Detection::NoFace => None,
        }
    }
}

impl From<Option<LandmarkSet>> for Detection {
    fn from(value: Option<LandmarkSet>) -> Self {
        match value {
            Some(set) if !set.is_empty() => Detection::Face(set),
            _ => Detection::NoFace,
        }
    }
}

/// A face landmark model wrapped for the engine.
///
/// An `Err` means this frame could not be analyzed; the pipeline downgrades it to
/// `Detection::NoFace` for that frame only.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        (**self).detect(frame)
    }
}
