//! Composition of the scrolling background and the presenter overlay.
//!
//! The compositor decides geometry and timing only. It produces a
//! [`Composition`] that the encoder turns into an FFmpeg filter graph and a
//! raw frame stream.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::background::Background;
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;
use crate::scroll::{ScrollPath, ScrollPathSynthesizer};

/// A pre-fetched overlay clip and its probed properties.
#[derive(Debug, Clone)]
pub struct OverlayClip {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

impl OverlayClip {
    pub fn from_probe(path: impl AsRef<Path>, info: &VideoInfo) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            duration_secs: info.duration,
            width: info.width,
            height: info.height,
            has_audio: info.has_audio,
        }
    }

    /// Height / width, or 1.0 for degenerate sizes.
    fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.height as f64 / self.width as f64
        }
    }
}

/// Frame corner the overlay is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

/// Overlay sizing and placement rules.
#[derive(Debug, Clone)]
pub struct OverlayLayout {
    /// Overlay width as a fraction of the frame width
    pub width_fraction: f64,
    /// Maximum relative size deviation (0.05 = +/-5%)
    pub size_jitter: f64,
    pub corner: Corner,
    /// Distance from the anchored frame edges in pixels
    pub margin_px: u32,
    /// Maximum position deviation in pixels
    pub position_jitter_px: u32,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            width_fraction: 0.25,
            size_jitter: 0.05,
            corner: Corner::BottomRight,
            margin_px: 12,
            position_jitter_px: 6,
        }
    }
}

/// Final overlay rectangle in output pixels. Always inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output geometry shared by every row of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            width: 854,
            height: 480,
            fps: 12,
        }
    }
}

/// Everything the encoder needs to render one row.
#[derive(Debug, Clone)]
pub struct Composition {
    pub frame: FrameSpec,
    pub background: Background,
    pub scroll: ScrollPath,
    pub overlay: OverlayClip,
    pub placement: OverlayPlacement,
    /// Bounded by the overlay duration
    pub duration_secs: f64,
}

impl Composition {
    pub fn frame_count(&self) -> u64 {
        self.scroll.frame_count()
    }

    /// Whether overlay audio is carried into the output.
    pub fn has_audio(&self) -> bool {
        self.overlay.has_audio
    }

    /// Filter graph: input 0 is the raw background stream, input 1 the
    /// overlay clip. The video result is labelled `[vout]`.
    pub fn filter_graph(&self) -> String {
        let p = &self.placement;
        format!(
            "[1:v]scale={}:{},setpts=PTS-STARTPTS[ov];[0:v][ov]overlay={}:{}:eof_action=pass[vout]",
            p.width, p.height, p.x, p.y
        )
    }

    /// Raw RGB24 frames following the scroll path.
    pub fn frames(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (0..self.frame_count()).map(move |f| {
            self.background
                .frame(self.scroll.offset_for_frame(f), self.frame.height)
        })
    }
}

/// Builds compositions for a fixed output geometry.
#[derive(Debug, Clone)]
pub struct Compositor {
    frame: FrameSpec,
    layout: OverlayLayout,
    scroll_jitter_px: u32,
}

impl Compositor {
    pub fn new(frame: FrameSpec) -> Self {
        Self {
            frame,
            layout: OverlayLayout::default(),
            scroll_jitter_px: 0,
        }
    }

    pub fn with_layout(mut self, layout: OverlayLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_scroll_jitter(mut self, amplitude_px: u32) -> Self {
        self.scroll_jitter_px = amplitude_px;
        self
    }

    pub fn frame(&self) -> FrameSpec {
        self.frame
    }

    /// Compose one row.
    ///
    /// `seed` drives every random choice (scroll wobble, overlay size and
    /// position), so the same seed reproduces the same video.
    pub fn compose(
        &self,
        background: Background,
        overlay: &OverlayClip,
        duration_secs: f64,
        seed: u64,
    ) -> MediaResult<Composition> {
        if self.frame.width < 2 || self.frame.height < 2 || self.frame.fps == 0 {
            return Err(MediaError::internal(format!(
                "invalid output geometry {}x{}@{}",
                self.frame.width, self.frame.height, self.frame.fps
            )));
        }
        if !(overlay.duration_secs.is_finite() && overlay.duration_secs > 0.0) {
            return Err(MediaError::InvalidVideo(format!(
                "overlay {} has no usable duration",
                overlay.path.display()
            )));
        }

        let duration_secs = if duration_secs.is_finite() && duration_secs > 0.0 {
            duration_secs.min(overlay.duration_secs)
        } else {
            overlay.duration_secs
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let placement = self.place_overlay(overlay, &mut rng);

        let scroll = ScrollPathSynthesizer::default()
            .with_jitter(self.scroll_jitter_px, seed)
            .synthesize(background.height(), self.frame.height, duration_secs, self.frame.fps);

        Ok(Composition {
            frame: self.frame,
            background,
            scroll,
            overlay: overlay.clone(),
            placement,
            duration_secs,
        })
    }

    fn place_overlay(&self, overlay: &OverlayClip, rng: &mut StdRng) -> OverlayPlacement {
        let layout = &self.layout;
        let frame_w = self.frame.width;
        let frame_h = self.frame.height;
        let margin = layout.margin_px.min(frame_w / 4).min(frame_h / 4);

        let size_jitter = layout.size_jitter.clamp(0.0, 0.5);
        let scale = if size_jitter > 0.0 {
            1.0 + rng.random_range(-size_jitter..=size_jitter)
        } else {
            1.0
        };

        let max_w = frame_w.saturating_sub(2 * margin).max(2);
        let max_h = frame_h.saturating_sub(2 * margin).max(2);

        let mut width = frame_w as f64 * layout.width_fraction.clamp(0.01, 1.0) * scale;
        let mut height = width * overlay.aspect_ratio();
        if height > max_h as f64 {
            width *= max_h as f64 / height;
            height = max_h as f64;
        }
        let width = even(width).min(max_w & !1).max(2);
        let height = even(height).min(max_h & !1).max(2);

        let (mut x, mut y) = match layout.corner {
            Corner::TopLeft => (margin as i64, margin as i64),
            Corner::TopRight => ((frame_w - width - margin) as i64, margin as i64),
            Corner::BottomLeft => (margin as i64, (frame_h - height - margin) as i64),
            Corner::BottomRight => (
                (frame_w - width - margin) as i64,
                (frame_h - height - margin) as i64,
            ),
        };

        let jitter = layout.position_jitter_px as i64;
        if jitter > 0 {
            x += rng.random_range(-jitter..=jitter);
            y += rng.random_range(-jitter..=jitter);
        }

        OverlayPlacement {
            x: x.clamp(0, (frame_w - width) as i64) as u32,
            y: y.clamp(0, (frame_h - height) as i64) as u32,
            width,
            height,
        }
    }
}

/// Round to the nearest even integer (H.264 needs even dimensions).
fn even(value: f64) -> u32 {
    let v = value.round().max(0.0) as u32;
    v & !1
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn background(height: u32) -> Background {
        Background::from_image(DynamicImage::ImageRgb8(RgbImage::new(854, height)), 854)
    }

    fn overlay(duration: f64) -> OverlayClip {
        OverlayClip {
            path: PathBuf::from("/tmp/tech.mp4"),
            duration_secs: duration,
            width: 720,
            height: 1280,
            has_audio: true,
        }
    }

    #[test]
    fn test_duration_bounded_by_overlay() {
        let compositor = Compositor::new(FrameSpec::default());
        let comp = compositor.compose(background(3000), &overlay(6.0), 30.0, 1).unwrap();
        assert!((comp.duration_secs - 6.0).abs() < 1e-9);
        assert_eq!(comp.frame_count(), 72);

        let comp = compositor.compose(background(3000), &overlay(6.0), 4.0, 1).unwrap();
        assert!((comp.duration_secs - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_placement_inside_frame_for_many_seeds() {
        let compositor = Compositor::new(FrameSpec::default());
        for seed in 0..200 {
            let comp = compositor.compose(background(600), &overlay(5.0), 5.0, seed).unwrap();
            let p = comp.placement;
            assert!(p.x + p.width <= 854, "seed {}", seed);
            assert!(p.y + p.height <= 480, "seed {}", seed);
            assert_eq!(p.width % 2, 0);
            assert_eq!(p.height % 2, 0);
        }
    }

    #[test]
    fn test_portrait_overlay_is_height_capped() {
        let compositor = Compositor::new(FrameSpec::default()).with_layout(OverlayLayout {
            width_fraction: 0.6,
            size_jitter: 0.0,
            position_jitter_px: 0,
            ..OverlayLayout::default()
        });
        let comp = compositor.compose(background(600), &overlay(5.0), 5.0, 3).unwrap();
        assert_eq!(comp.placement.height, 456);
        assert_eq!(comp.placement.y, 12);
    }

    #[test]
    fn test_fixed_layout_bottom_right() {
        let compositor = Compositor::new(FrameSpec::default()).with_layout(OverlayLayout {
            width_fraction: 0.25,
            size_jitter: 0.0,
            margin_px: 0,
            position_jitter_px: 0,
            corner: Corner::BottomRight,
        });
        let landscape = OverlayClip {
            width: 1920,
            height: 1080,
            ..overlay(5.0)
        };
        let comp = compositor.compose(background(600), &landscape, 5.0, 9).unwrap();
        let p = comp.placement;
        // 854 / 4 = 213.5 -> 214, 214 * 9/16 = 120.4 -> 120
        assert_eq!((p.width, p.height), (214, 120));
        assert_eq!((p.x, p.y), (640, 360));
        assert!(comp.filter_graph().contains("scale=214:120"));
        assert!(comp.filter_graph().contains("overlay=640:360"));
    }

    #[test]
    fn test_same_seed_same_composition() {
        let compositor = Compositor::new(FrameSpec::default()).with_scroll_jitter(8);
        let a = compositor.compose(background(2000), &overlay(5.0), 5.0, 77).unwrap();
        let b = compositor.compose(background(2000), &overlay(5.0), 5.0, 77).unwrap();
        assert_eq!(a.placement, b.placement);
        assert_eq!(a.scroll.offsets(), b.scroll.offsets());
    }

    #[test]
    fn test_rejects_overlay_without_duration() {
        let compositor = Compositor::new(FrameSpec::default());
        assert!(compositor.compose(background(600), &overlay(0.0), 5.0, 1).is_err());
    }

    #[test]
    fn test_frames_have_output_size() {
        let frame = FrameSpec {
            width: 8,
            height: 4,
            fps: 2,
        };
        let bg = Background::from_image(DynamicImage::ImageRgb8(RgbImage::new(8, 20)), 8);
        let comp = Compositor::new(frame).compose(bg, &overlay(3.0), 3.0, 1).unwrap();

        let frames: Vec<Vec<u8>> = comp.frames().collect();
        assert_eq!(frames.len(), 6);
        assert!(frames.iter().all(|f| f.len() == 8 * 4 * 3));
    }
}
