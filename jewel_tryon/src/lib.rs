// THEORY:
// This file is the main entry point for the `jewel_tryon` library crate.
// It defines the public API that front-ends (like `tryon_viewer`) build on.
//
// The engine is pure image processing on `image` buffers. It has no opinion on
// where frames come from, which landmark model is used, or how frames are shown:
// those are the `CaptureSource`, `LandmarkDetector` and `FrameSink` traits, and
// the concrete implementations live with the front-end.

pub mod catalog;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

/// A dense RGB video frame, height x width x 3.
pub type Frame = image::RgbImage;

pub use catalog::Catalog;
pub use config::{DetectorConfig, TryOnConfig};
pub use core_modules::anchor::AnchorBundle;
pub use core_modules::geometry::Point2D;
pub use core_modules::landmarks::{Detection, LandmarkDetector, LandmarkSet};
pub use core_modules::overlay_asset::{OverlayAsset, Product};
pub use core_modules::placement::{AnchorKind, OffsetBasis, OverlayPlacement, PlacementPolicy, PlacementSpec};
pub use core_modules::snapshot::SnapshotRecorder;
pub use error::{Error, Result};
pub use pipeline::{FrameAnalysis, OverlayData, Report, TryOnPipeline};
pub use session::{Capture, CaptureSource, Command, FrameSink, Session, SessionState, StepOutcome};
