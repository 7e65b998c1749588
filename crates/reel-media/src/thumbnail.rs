//! Poster thumbnail generation.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;

use crate::background::Background;
use crate::error::{MediaError, MediaResult};
use reel_models::encoding::THUMBNAIL_SCALE_WIDTH;

/// Write a JPEG poster of the first viewport of `background`.
///
/// The poster matches what the video shows at t=0, scaled to
/// [`THUMBNAIL_SCALE_WIDTH`] pixels wide.
pub fn generate_thumbnail(
    background: &Background,
    frame_height: u32,
    output_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let output_path = output_path.as_ref();
    let width = background.width();
    let height = frame_height.max(1);

    let viewport = RgbImage::from_raw(width, height, background.frame(0, height))
        .ok_or_else(|| MediaError::internal("thumbnail buffer size mismatch"))?;

    let poster = if width > THUMBNAIL_SCALE_WIDTH {
        let scaled_height = thumbnail_height(width, height);
        image::imageops::resize(&viewport, THUMBNAIL_SCALE_WIDTH, scaled_height, FilterType::Triangle)
    } else {
        viewport
    };

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    poster.save_with_format(output_path, image::ImageFormat::Jpeg)?;
    Ok(())
}

/// Height of a thumbnail for a `width` x `height` source, kept even.
fn thumbnail_height(width: u32, height: u32) -> u32 {
    let h = (height as f64 * THUMBNAIL_SCALE_WIDTH as f64 / width as f64).round() as u32;
    (h & !1).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    #[test]
    fn test_thumbnail_height() {
        assert_eq!(thumbnail_height(854, 480), 270);
        assert_eq!(thumbnail_height(1920, 1080), 270);
    }

    #[test]
    fn test_generate_thumbnail_writes_jpeg() {
        let dir = tempfile::TempDir::new().unwrap();
        let bg = Background::from_image(DynamicImage::ImageRgb8(RgbImage::new(854, 2000)), 854);
        let out = dir.path().join("apple").join("thumbnail.jpg");

        generate_thumbnail(&bg, 480, &out).unwrap();

        let written = image::open(&out).unwrap();
        assert_eq!(written.width(), THUMBNAIL_SCALE_WIDTH);
        assert_eq!(written.height(), 270);
    }
}
