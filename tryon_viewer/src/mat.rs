// THEORY:
// The engine only sees RGB `image` buffers. OpenCV hands out and expects BGR
// `Mat`s. Every frame crosses this module twice: once after capture and once
// before display.

use jewel_tryon::Frame;
use opencv::{
    core::{self, Mat, Scalar, CV_8UC3},
    imgproc,
    prelude::*,
};

/// Wraps an RGB image in a freshly allocated 3-channel `Mat` without reordering channels.
pub fn rgb_mat(image: &Frame) -> opencv::Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}

pub fn frame_to_bgr(frame: &Frame) -> opencv::Result<Mat> {
    let rgb = rgb_mat(frame)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Converts a camera frame (BGR or grayscale) into an RGB frame.
pub fn bgr_to_frame(mat: &Mat) -> opencv::Result<Frame> {
    let code = match mat.channels() {
        1 => imgproc::COLOR_GRAY2RGB,
        4 => imgproc::COLOR_BGRA2RGB,
        _ => imgproc::COLOR_BGR2RGB,
    };
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, code, 0)?;

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    Frame::from_raw(width, height, rgb.data_bytes()?.to_vec()).ok_or_else(|| {
        opencv::Error::new(
            core::StsUnmatchedSizes,
            format!("{width}x{height} frame does not match its pixel buffer"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bgr_conversion_swaps_channels_both_ways() {
        let frame = Frame::from_fn(4, 3, |x, y| Rgb([10 * x as u8, 20 * y as u8, 200]));

        let bgr = frame_to_bgr(&frame).expect("to bgr");
        assert_eq!((bgr.cols(), bgr.rows()), (4, 3));
        let first = bgr.at_2d::<core::Vec3b>(1, 2).expect("pixel");
        assert_eq!(first.0, [200, 20, 20]);

        let back = bgr_to_frame(&bgr).expect("to rgb");
        assert_eq!(back, frame);
    }
}
