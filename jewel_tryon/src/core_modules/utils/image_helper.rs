pub mod image_helper {
    use image::{ImageEncoder, RgbImage};
    use std::io::Write;

    /// Encodes an RGB frame as PNG into `output`.
    pub fn save_png<W: Write>(output: W, frame: &RgbImage) -> Result<(), image::error::ImageError> {
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn save_white_frame() {
        let frame = RgbImage::from_pixel(50, 30, Rgb([255, 255, 255]));
        let mut bytes = Vec::new();

        save_png(&mut bytes, &frame).expect("Error encoding frame.");

        let decoded = image::load(Cursor::new(bytes), image::ImageFormat::Png)
            .expect("Error decoding frame.")
            .to_rgb8();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn save_non_square_gradient() {
        let width = 37u32;
        let height = 11u32;
        let frame = RgbImage::from_fn(width, height, |x, y| {
            let intensity = ((x * 7 + y * 13) % 255) as u8;
            Rgb([intensity, 255 - intensity, intensity / 2])
        });
        let mut bytes = Vec::new();

        save_png(&mut bytes, &frame).expect("Error encoding frame.");

        let decoded = image::load(Cursor::new(bytes), image::ImageFormat::Png)
            .expect("Error decoding frame.")
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (width, height));
        assert_eq!(decoded, frame);
    }
}
