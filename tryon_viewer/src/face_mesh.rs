// THEORY:
// `FaceMeshDetector` is the production `LandmarkDetector`. It runs two ONNX
// networks through OpenCV's DNN module, one after the other.
//
// Stages:
// 1.  **Face box**: YuNet finds face rectangles in the full frame. The most
//     confident one wins; the others are ignored.
// 2.  **Crop**: the box is grown by a margin on every side and squared, so the
//     whole jaw line and both ears fit, then clamped to the frame.
// 3.  **Mesh**: the crop is resized to 192x192, mapped to [-1, 1] and fed to the
//     Face Mesh network. Its first output is 468 (x, y, z) triples in crop pixels,
//     its second a face-presence logit.
// 4.  **Un-crop**: landmark coordinates are mapped back to the full frame and
//     normalized to [0, 1].

use std::path::Path;

use image::imageops;
use jewel_tryon::core_modules::landmarks::face_mesh::NUM_LANDMARKS;
use jewel_tryon::{Detection, DetectorConfig, Error, Frame, LandmarkDetector, LandmarkSet, Point2D, Result};
use log::{debug, info, trace};
use opencv::{
    core::{self, Mat, Ptr, Scalar, Size, Vector},
    dnn::{self, Net},
    objdetect::FaceDetectorYN,
    prelude::*,
};

use crate::mat;

/// Side length of the Face Mesh input.
const MESH_INPUT: i32 = 192;
/// YuNet rows are `x, y, w, h`, five landmark pairs, then the score.
const YUNET_ROW_LEN: usize = 15;
const YUNET_SCORE: usize = 14;
const YUNET_NMS_THRESHOLD: f32 = 0.3;
const YUNET_TOP_K: i32 = 5000;

fn unavailable(err: opencv::Error) -> Error {
    Error::DetectorUnavailable(err.to_string())
}

fn failed(err: opencv::Error) -> Error {
    Error::Detection(err.to_string())
}

/// A pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

pub struct FaceMeshDetector {
    face_detector: Ptr<FaceDetectorYN>,
    mesh: Net,
    mesh_outputs: Vector<String>,
    /// Frame size YuNet is currently configured for.
    input_size: (u32, u32),
    config: DetectorConfig,
}

impl FaceMeshDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let face_model = model_path(&config.face_model)?;
        let mesh_model = model_path(&config.mesh_model)?;

        let face_detector = FaceDetectorYN::create(
            face_model,
            "",
            Size::new(320, 320),
            config.score_threshold,
            YUNET_NMS_THRESHOLD,
            YUNET_TOP_K,
            dnn::DNN_BACKEND_DEFAULT,
            dnn::DNN_TARGET_CPU,
        )
        .map_err(unavailable)?;

        let mesh = dnn::read_net_from_onnx(mesh_model).map_err(unavailable)?;
        if mesh.empty().map_err(unavailable)? {
            return Err(Error::DetectorUnavailable(format!("{mesh_model} contains no layers")));
        }
        let mesh_outputs = mesh.get_unconnected_out_layers_names().map_err(unavailable)?;
        info!("loaded face detector {face_model} and landmark model {mesh_model}");

        Ok(Self {
            face_detector,
            mesh,
            mesh_outputs,
            input_size: (320, 320),
            config: config.clone(),
        })
    }

    /// Stage 1: the most confident face box as `[x, y, w, h]`.
    fn face_box(&mut self, frame: &Frame) -> Result<Option<[f32; 4]>> {
        let bgr = mat::frame_to_bgr(frame).map_err(failed)?;
        let size = frame.dimensions();
        if size != self.input_size {
            self.face_detector
                .set_input_size(Size::new(size.0 as i32, size.1 as i32))
                .map_err(failed)?;
            self.input_size = size;
        }

        let mut faces = Mat::default();
        self.face_detector.detect(&bgr, &mut faces).map_err(failed)?;

        let mut best: Option<(f32, [f32; 4])> = None;
        for row in 0..faces.rows() {
            let values = faces.at_row::<f32>(row).map_err(failed)?;
            if values.len() < YUNET_ROW_LEN {
                continue;
            }
            let score = values[YUNET_SCORE];
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, [values[0], values[1], values[2], values[3]]));
            }
        }
        Ok(best.map(|(score, rect)| {
            trace!("face box {rect:?} score {score:.2}");
            rect
        }))
    }

    /// Stage 3: runs the mesh network on a crop. Returns the raw landmark triples
    /// and the face-presence probability.
    fn mesh(&mut self, crop: &Frame) -> Result<(Vec<f32>, f32)> {
        let input = mat::rgb_mat(crop).map_err(failed)?;
        let blob = dnn::blob_from_image(
            &input,
            1.0 / 127.5,
            Size::new(MESH_INPUT, MESH_INPUT),
            Scalar::all(127.5),
            false,
            false,
            core::CV_32F,
        )
        .map_err(failed)?;
        self.mesh.set_input(&blob, "", 1.0, Scalar::default()).map_err(failed)?;

        let mut outputs: Vector<Mat> = Vector::new();
        self.mesh.forward(&mut outputs, &self.mesh_outputs).map_err(failed)?;

        let mut landmarks = None;
        let mut presence = None;
        for output in outputs.iter() {
            match output.total() {
                n if n == NUM_LANDMARKS * 3 => {
                    landmarks = Some(output.data_typed::<f32>().map_err(failed)?.to_vec());
                }
                1 => presence = Some(sigmoid(output.data_typed::<f32>().map_err(failed)?[0])),
                _ => {}
            }
        }
        match (landmarks, presence) {
            (Some(landmarks), Some(presence)) => Ok((landmarks, presence)),
            _ => Err(Error::Detection(format!(
                "landmark model produced {} output(s) without the expected shapes",
                outputs.len()
            ))),
        }
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        let Some(face) = self.face_box(frame)? else {
            return Ok(Detection::NoFace);
        };

        // Stage 2: Crop
        let Some(rect) = square_crop(face, self.config.crop_margin, frame.dimensions()) else {
            return Ok(Detection::NoFace);
        };
        let crop = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();

        let (raw, presence) = self.mesh(&crop)?;
        if presence < self.config.face_presence_threshold {
            debug!("face box rejected by landmark model (presence {presence:.2})");
            return Ok(Detection::NoFace);
        }

        // Stage 4: Un-crop
        Ok(Detection::Face(uncrop(&raw, rect, frame.dimensions())))
    }
}

fn model_path(path: &Path) -> Result<&str> {
    if !path.is_file() {
        return Err(Error::DetectorUnavailable(format!("model file {} not found", path.display())));
    }
    path.to_str()
        .ok_or_else(|| Error::DetectorUnavailable(format!("model path {} is not UTF-8", path.display())))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Grows `[x, y, w, h]` by `margin` of its longer side on every side, squares it
/// around its center and clamps it to the frame. `None` if less than 2px remain.
fn square_crop(face: [f32; 4], margin: f32, frame_size: (u32, u32)) -> Option<CropRect> {
    let [x, y, w, h] = face;
    if !(w > 0.0 && h > 0.0) {
        return None;
    }
    let side = w.max(h) * (1.0 + 2.0 * margin.max(0.0));
    let (cx, cy) = (x + w / 2.0, y + h / 2.0);

    let clamp = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;
    let x0 = clamp((cx - side / 2.0).floor(), frame_size.0);
    let y0 = clamp((cy - side / 2.0).floor(), frame_size.1);
    let x1 = clamp((cx + side / 2.0).ceil(), frame_size.0);
    let y1 = clamp((cy + side / 2.0).ceil(), frame_size.1);

    (x1 >= x0 + 2 && y1 >= y0 + 2).then(|| CropRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Maps mesh output triples (crop pixels at network resolution) to normalized
/// frame coordinates. The depth component is dropped.
fn uncrop(raw: &[f32], rect: CropRect, frame_size: (u32, u32)) -> LandmarkSet {
    let input = MESH_INPUT as f64;
    let (frame_w, frame_h) = (frame_size.0 as f64, frame_size.1 as f64);
    raw.chunks_exact(3)
        .map(|xyz| {
            let x = rect.x as f64 + xyz[0] as f64 / input * rect.width as f64;
            let y = rect.y as f64 + xyz[1] as f64 / input * rect.height as f64;
            Point2D::new(x / frame_w, y / frame_h)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_is_square_with_margin() {
        let rect = square_crop([100.0, 100.0, 80.0, 100.0], 0.25, (640, 480)).expect("crop");
        assert_eq!(rect, CropRect { x: 65, y: 75, width: 150, height: 150 });
    }

    #[test]
    fn crop_is_clamped_to_the_frame() {
        let rect = square_crop([600.0, -20.0, 60.0, 60.0], 0.5, (640, 480)).expect("crop");
        assert_eq!(rect.x, 570);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.x + rect.width, 640);
        assert_eq!(rect.height, 70);
    }

    #[test]
    fn degenerate_boxes_yield_no_crop() {
        assert_eq!(square_crop([10.0, 10.0, 0.0, 50.0], 0.25, (640, 480)), None);
        assert_eq!(square_crop([f32::NAN, 10.0, f32::NAN, 50.0], 0.25, (640, 480)), None);
        assert_eq!(square_crop([700.0, 500.0, 20.0, 20.0], 0.0, (640, 480)), None);
    }

    #[test]
    fn uncrop_maps_network_pixels_to_normalized_frame_coordinates() {
        let rect = CropRect { x: 100, y: 50, width: 384, height: 384 };
        let raw = [0.0, 0.0, 1.0, 96.0, 192.0, -3.0];

        let set = uncrop(&raw, rect, (800, 600));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0), Some(Point2D::new(100.0 / 800.0, 50.0 / 600.0)));
        assert_eq!(set.get(1), Some(Point2D::new(292.0 / 800.0, 434.0 / 600.0)));
    }

    #[test]
    fn presence_logit_is_squashed() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(6.0) > 0.99);
        assert!(sigmoid(-6.0) < 0.01);
    }

    #[test]
    fn missing_model_file_is_reported_before_loading() {
        let config = DetectorConfig {
            face_model: "no/such/yunet.onnx".into(),
            ..DetectorConfig::default()
        };
        assert!(matches!(FaceMeshDetector::new(&config), Err(Error::DetectorUnavailable(_))));
    }
}
