//! Scrolling background frames cut from a page screenshot.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::error::MediaResult;

/// A full-page screenshot normalized to the output frame width.
///
/// Frames are produced as raw RGB24 rows, ready to be piped into FFmpeg.
#[derive(Debug, Clone)]
pub struct Background {
    image: RgbImage,
}

impl Background {
    /// Load a screenshot from disk and scale it to `frame_width`.
    pub fn load(path: impl AsRef<Path>, frame_width: u32) -> MediaResult<Self> {
        let image = image::open(path.as_ref())?;
        Ok(Self::from_image(image, frame_width))
    }

    /// Normalize an already decoded image.
    ///
    /// The aspect ratio is kept, so a wider capture becomes shorter.
    pub fn from_image(image: DynamicImage, frame_width: u32) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == frame_width || width == 0 || frame_width == 0 {
            return Self { image: rgb };
        }

        let scaled_height =
            ((height as f64 * frame_width as f64 / width as f64).round() as u32).max(1);
        let image = image::imageops::resize(&rgb, frame_width, scaled_height, FilterType::Triangle);
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGB24 bytes of the `frame_height` rows starting at `offset`.
    ///
    /// Rows past the bottom of the image are black.
    pub fn frame(&self, offset: u32, frame_height: u32) -> Vec<u8> {
        let stride = self.image.width() as usize * 3;
        let raw = self.image.as_raw();
        let start = (offset.min(self.image.height()) as usize) * stride;
        let wanted = frame_height as usize * stride;
        let end = (start + wanted).min(raw.len());

        let mut frame = Vec::with_capacity(wanted);
        frame.extend_from_slice(&raw[start..end]);
        frame.resize(wanted, 0);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn striped(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |_, y| Rgb([(y % 256) as u8, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_scales_to_frame_width() {
        let bg = Background::from_image(striped(1708, 4000), 854);
        assert_eq!(bg.width(), 854);
        assert_eq!(bg.height(), 2000);
    }

    #[test]
    fn test_frame_crops_at_offset() {
        let bg = Background::from_image(striped(4, 100), 4);
        let frame = bg.frame(10, 5);

        assert_eq!(frame.len(), 4 * 5 * 3);
        assert_eq!(frame[0], 10);
        assert_eq!(frame[4 * 3 * 4], 14);
    }

    #[test]
    fn test_frame_pads_short_image() {
        let bg = Background::from_image(striped(2, 3), 2);
        let frame = bg.frame(0, 6);

        assert_eq!(frame.len(), 2 * 6 * 3);
        assert_eq!(frame[2 * 3 * 2], 2);
        assert!(frame[2 * 3 * 3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        striped(10, 40).save(&path).unwrap();

        let bg = Background::load(&path, 5).unwrap();
        assert_eq!((bg.width(), bg.height()), (5, 20));
        assert!(Background::load(dir.path().join("missing.png"), 5).is_err());
    }
}
