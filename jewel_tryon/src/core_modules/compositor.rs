// THEORY:
// The `compositor` is the only module that touches frame pixels. It takes the
// rectangles computed by `placement` and the overlay image, and blends one onto
// the other. It is deliberately ignorant of categories and anchors.
//
// Per instance:
// 1.  **Resample**: scale the overlay to the target width with a smoothing
//     (triangle / bilinear) filter, keeping its aspect ratio.
// 2.  **Mirror**: optionally flip the resampled overlay horizontally.
// 3.  **Clip**: intersect the destination rectangle with the frame. A rectangle
//     entirely outside the frame is a no-op, not an error. So is one that is
//     absurdly large for the frame; it is skipped before any resampling.
// 4.  **Blend**: straight per-channel linear alpha compositing,
//     `out = src * a + dst * (1 - a)` with `a = alpha / 255`, truncated to 8 bits.
//     `a = 0` leaves the frame bit-identical and `a = 1` writes the overlay color
//     exactly.

use image::imageops::{self, FilterType};
use image::{Rgb, Rgba, RgbaImage};
use log::debug;

use crate::core_modules::placement::{scaled_height, OverlayPlacement};
use crate::Frame;

const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Placements wider or taller than this many frames are not drawn.
const MAX_FRAME_MULTIPLE: u64 = 4;

/// Resamples `overlay` to `width` pixels wide, preserving its aspect ratio.
pub fn resample(overlay: &RgbaImage, width: u32) -> RgbaImage {
    let height = scaled_height(overlay.dimensions(), width);
    resize_to(overlay, width, height)
}

fn resize_to(overlay: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if overlay.dimensions() == (width, height) {
        return overlay.clone();
    }
    imageops::resize(overlay, width.max(1), height.max(1), RESAMPLE_FILTER)
}

/// Composites one overlay instance. Returns `false` if nothing was drawn.
pub fn composite(frame: &mut Frame, overlay: &RgbaImage, placement: &OverlayPlacement) -> bool {
    composite_all(frame, overlay, std::slice::from_ref(placement)) > 0
}

/// Composites every placement in order and returns how many touched the frame.
///
/// Placements of the same size share one resampled image; mirrored instances get a
/// flipped copy of it.
pub fn composite_all(frame: &mut Frame, overlay: &RgbaImage, placements: &[OverlayPlacement]) -> usize {
    let mut resampled: Option<RgbaImage> = None;
    let mut drawn = 0;

    for placement in placements {
        if !drawable(frame.dimensions(), placement) {
            debug!(
                "skipping {}x{} overlay at ({}, {})",
                placement.width, placement.height, placement.x, placement.y
            );
            continue;
        }
        let reuse = resampled
            .as_ref()
            .is_some_and(|img| img.dimensions() == (placement.width, placement.height));
        if !reuse {
            resampled = Some(resize_to(overlay, placement.width, placement.height));
        }
        let Some(scaled) = resampled.as_ref() else {
            continue;
        };

        let wrote = if placement.mirror {
            let flipped = imageops::flip_horizontal(scaled);
            blend_at(frame, &flipped, placement.x, placement.y)
        } else {
            blend_at(frame, scaled, placement.x, placement.y)
        };
        if wrote {
            drawn += 1;
        }
    }
    drawn
}

/// True if `placement` overlaps a frame of `frame_size` and is not oversized for it.
fn drawable(frame_size: (u32, u32), placement: &OverlayPlacement) -> bool {
    let (frame_width, frame_height) = (frame_size.0 as i64, frame_size.1 as i64);
    let (width, height) = (placement.width as i64, placement.height as i64);

    let oversized = placement.width as u64 > frame_size.0 as u64 * MAX_FRAME_MULTIPLE
        || placement.height as u64 > frame_size.1 as u64 * MAX_FRAME_MULTIPLE;
    let misses = placement.x >= frame_width
        || placement.y >= frame_height
        || placement.x.saturating_add(width) <= 0
        || placement.y.saturating_add(height) <= 0;
    !(oversized || misses)
}

/// Alpha-blends `overlay` onto `frame` with its top-left corner at (`x`, `y`),
/// clipped to the frame. Returns `false` if the rectangle misses the frame.
pub fn blend_at(frame: &mut Frame, overlay: &RgbaImage, x: i64, y: i64) -> bool {
    let (frame_width, frame_height) = frame.dimensions();
    let (overlay_width, overlay_height) = overlay.dimensions();

    let x1 = x.max(0);
    let y1 = y.max(0);
    let x2 = (x + overlay_width as i64).min(frame_width as i64);
    let y2 = (y + overlay_height as i64).min(frame_height as i64);
    if x2 <= x1 || y2 <= y1 {
        return false;
    }

    for frame_y in y1..y2 {
        for frame_x in x1..x2 {
            let src = overlay.get_pixel((frame_x - x) as u32, (frame_y - y) as u32);
            let dst = frame.get_pixel_mut(frame_x as u32, frame_y as u32);
            blend_pixel(dst, src);
        }
    }
    true
}

#[inline]
fn blend_pixel(dst: &mut Rgb<u8>, src: &Rgba<u8>) {
    let alpha = src[3];
    if alpha == 0 {
        return;
    }
    let a = alpha as f64 / 255.0;
    let inv = 1.0 - a;
    for channel in 0..3 {
        let mixed = src[channel] as f64 * a + dst[channel] as f64 * inv;
        dst[channel] = mixed.clamp(0.0, 255.0) as u8;
    }
}
