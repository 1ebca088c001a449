// THEORY:
// The `pipeline` module is the per-frame API of the try-on engine. It chains the
// core modules into one call: a raw frame goes in, a composited frame and a short
// report of what happened come out.
//
// Stages, strictly in sequence:
// 1.  **Detection**: the landmark detector looks for a face. A detector error is
//     logged and handled like "no face" for this frame only.
// 2.  **Anchoring**: the landmark set is reduced to an `AnchorBundle`. Degenerate
//     faces (zero width) stop here.
// 3.  **Placement**: the product category selects a row of the placement table,
//     which turns the anchors into overlay rectangles.
// 4.  **Compositing**: the overlay is blended into the frame.
//
// When stage 1 or 2 yields nothing, the frame leaves the pipeline untouched.

use log::{debug, warn};

use crate::core_modules::anchor::{self, AnchorBundle};
use crate::core_modules::compositor;
use crate::core_modules::landmarks::{Detection, LandmarkDetector};
use crate::core_modules::overlay_asset::OverlayAsset;
use crate::core_modules::placement::{OverlayPlacement, PlacementPolicy};
use crate::Frame;

/// What the overlay stages did with a frame that had a face.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayData {
    pub anchors: AnchorBundle,
    /// Every computed instance, including ones clipped away entirely.
    pub placements: Vec<OverlayPlacement>,
    /// How many instances actually touched the frame.
    pub drawn: usize,
}

/// The outcome of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// No usable face; the frame was passed through unchanged.
    NoFace,
    Overlaid(OverlayData),
}

/// A processed frame together with its report.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub frame: Frame,
    pub report: Report,
}

/// Owns the detector, the loaded asset, and the placement table for one session.
pub struct TryOnPipeline<D> {
    detector: D,
    asset: OverlayAsset,
    policy: PlacementPolicy,
    frame_count: u64,
}

impl<D: LandmarkDetector> TryOnPipeline<D> {
    pub fn new(detector: D, asset: OverlayAsset, policy: PlacementPolicy) -> Self {
        Self {
            detector,
            asset,
            policy,
            frame_count: 0,
        }
    }

    pub fn asset(&self) -> &OverlayAsset {
        &self.asset
    }

    pub fn policy(&self) -> &PlacementPolicy {
        &self.policy
    }

    /// Number of frames processed so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn process_frame(&mut self, mut frame: Frame) -> FrameAnalysis {
        self.frame_count += 1;

        // Stage 1: Detection
        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(err) => {
                warn!("frame {}: {err}; showing it without overlay", self.frame_count);
                Detection::NoFace
            }
        };

        // Stage 2: Anchoring
        let anchors = detection
            .landmarks()
            .and_then(|landmarks| anchor::resolve(landmarks, frame.dimensions()));
        let Some(anchors) = anchors else {
            return FrameAnalysis {
                frame,
                report: Report::NoFace,
            };
        };

        // Stages 3 and 4: Placement and Compositing
        let data = apply_overlay(&mut frame, &self.asset, &self.policy, &anchors);
        debug!(
            "frame {}: face width {:.1}px, {} of {} overlay(s) drawn",
            self.frame_count,
            anchors.face_width,
            data.drawn,
            data.placements.len()
        );
        FrameAnalysis {
            frame,
            report: Report::Overlaid(data),
        }
    }
}

/// Places and composites `asset` on `frame` for an already resolved face.
pub fn apply_overlay(
    frame: &mut Frame,
    asset: &OverlayAsset,
    policy: &PlacementPolicy,
    anchors: &AnchorBundle,
) -> OverlayData {
    let spec = policy.lookup(asset.category());
    let placements = spec.place(anchors, asset.dimensions());
    let drawn = compositor::composite_all(frame, asset.image(), &placements);
    OverlayData {
        anchors: *anchors,
        placements,
        drawn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Point2D;
    use crate::core_modules::landmarks::{face_mesh, LandmarkSet};
    use crate::core_modules::overlay_asset::Product;
    use crate::error::{Error, Result};
    use image::{DynamicImage, Rgb, Rgba, RgbaImage};

    struct Scripted(Vec<Result<Detection>>);

    impl LandmarkDetector for Scripted {
        fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
            self.0.remove(0)
        }
    }

    fn necklace() -> OverlayAsset {
        let product = Product {
            id: 1,
            name: "Gold Necklace".into(),
            category: "Necklace".into(),
            image_path: None,
        };
        OverlayAsset::from_image(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([255, 215, 0, 255]))),
            &product,
        )
    }

    fn centered_face() -> LandmarkSet {
        let mut points = vec![Point2D::new(0.5, 0.5); face_mesh::NUM_LANDMARKS];
        points[face_mesh::CHIN] = Point2D::new(0.5, 0.625);
        points[face_mesh::FOREHEAD] = Point2D::new(0.5, 0.2);
        points[face_mesh::LEFT_EAR_LOBE] = Point2D::new(0.34375, 0.5);
        points[face_mesh::RIGHT_EAR_LOBE] = Point2D::new(0.65625, 0.5);
        LandmarkSet::new(points)
    }

    #[test]
    fn face_gets_an_overlay() {
        let mut pipeline = TryOnPipeline::new(
            Scripted(vec![Ok(Detection::Face(centered_face()))]),
            necklace(),
            PlacementPolicy::default(),
        );
        let frame = Frame::from_pixel(640, 480, Rgb([30, 30, 30]));

        let analysis = pipeline.process_frame(frame);

        let Report::Overlaid(data) = analysis.report else {
            panic!("expected an overlay");
        };
        assert_eq!(data.anchors.face_width, 200.0);
        assert_eq!(data.drawn, 1);
        assert_eq!((data.placements[0].x, data.placements[0].y), (220, 330));
        assert_eq!(*analysis.frame.get_pixel(320, 340), Rgb([255, 215, 0]));
        assert_eq!(*analysis.frame.get_pixel(320, 100), Rgb([30, 30, 30]));
    }

    #[test]
    fn detector_error_degrades_to_raw_frame() {
        let mut pipeline = TryOnPipeline::new(
            Scripted(vec![
                Err(Error::Detection("model hiccup".into())),
                Ok(Detection::Face(centered_face())),
            ]),
            necklace(),
            PlacementPolicy::default(),
        );
        let frame = Frame::from_pixel(640, 480, Rgb([1, 2, 3]));

        let first = pipeline.process_frame(frame.clone());
        assert_eq!(first.report, Report::NoFace);
        assert_eq!(first.frame, frame);

        let second = pipeline.process_frame(frame);
        assert!(matches!(second.report, Report::Overlaid(_)));
        assert_eq!(pipeline.frame_count(), 2);
    }
}
