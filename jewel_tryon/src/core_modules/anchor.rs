// THEORY:
// The `anchor` module turns a raw landmark set into the handful of named points
// the placement layer cares about. It is the only place that knows which
// landmark index means "chin" or "ear lobe".
//
// Key architectural principles:
// 1.  **Pixel Space Output**: Landmarks come in normalized; anchors go out in
//     pixels of the frame they were detected on.
// 2.  **Face Width as the Unit**: Every jewelry size is a ratio of `face_width`,
//     measured jaw-to-jaw. When the jaw points are not part of the set, the
//     horizontal extent of all landmarks stands in for it.
// 3.  **No Degenerate Bundles**: An `AnchorBundle` with a non-positive face width
//     would produce zero-sized overlays downstream, so it is never built. The
//     frame is treated as faceless instead.

use crate::core_modules::geometry::Point2D;
use crate::core_modules::landmarks::{face_mesh, LandmarkSet};

/// Named anchor points for one detected face, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorBundle {
    /// Tip of the chin.
    pub chin: Point2D,
    /// Upper forehead on the facial midline.
    pub forehead: Point2D,
    /// Image-left ear lobe, if the landmark set contains it.
    pub left_ear: Option<Point2D>,
    /// Image-right ear lobe, if the landmark set contains it.
    pub right_ear: Option<Point2D>,
    /// Jaw-to-jaw width of the face. Always strictly positive.
    pub face_width: f64,
}

impl AnchorBundle {
    /// Builds a bundle without ear anchors. Returns `None` for a non-positive width.
    pub fn new(chin: Point2D, forehead: Point2D, face_width: f64) -> Option<Self> {
        if !(face_width.is_finite() && face_width > 0.0) {
            return None;
        }
        Some(Self {
            chin,
            forehead,
            left_ear: None,
            right_ear: None,
            face_width,
        })
    }

    pub fn with_ears(mut self, left: Point2D, right: Point2D) -> Self {
        self.left_ear = Some(left);
        self.right_ear = Some(right);
        self
    }
}

/// Derives an `AnchorBundle` from a landmark set detected on a frame of `frame_size`
/// (width, height).
pub fn resolve(landmarks: &LandmarkSet, frame_size: (u32, u32)) -> Option<AnchorBundle> {
    if landmarks.is_empty() {
        return None;
    }
    let (width, height) = frame_size;
    let to_pixels = |index: usize| landmarks.get(index).map(|p| p.scale(width, height));

    let chin = to_pixels(face_mesh::CHIN)?;
    let forehead = to_pixels(face_mesh::FOREHEAD)?;
    let left_ear = to_pixels(face_mesh::LEFT_EAR_LOBE);
    let right_ear = to_pixels(face_mesh::RIGHT_EAR_LOBE);

    let face_width = match (left_ear, right_ear) {
        (Some(left), Some(right)) => left.distance(&right),
        _ => bounding_width(landmarks, width),
    };

    let mut bundle = AnchorBundle::new(chin, forehead, face_width)?;
    bundle.left_ear = left_ear;
    bundle.right_ear = right_ear;
    Some(bundle)
}

/// Horizontal extent of all landmarks, in pixels.
fn bounding_width(landmarks: &LandmarkSet, frame_width: u32) -> f64 {
    let (min_x, max_x) = landmarks
        .points()
        .iter()
        .map(|p| p.x * frame_width as f64)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });
    max_x - min_x
}
