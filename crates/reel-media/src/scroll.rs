//! Scroll path synthesis.
//!
//! A scroll path maps time to the vertical crop offset into a tall page
//! screenshot. The motion is authored as a short "story" of keyframes at
//! absolute times in seconds, with positions as a fraction of the scrollable
//! height, and eased between keys. The story fits any page height; a clip
//! longer than the story holds the last position, so one fixed animation
//! covers overlays of any length.
//!
//! Optional jitter adds a small seeded wobble on top of the eased motion.
//! The wobble is low-pass filtered so it reads as a hand on a trackpad
//! rather than as shake. The final offset is always clamped to
//! `[0, max_offset]`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Weight of the previous jitter sample in the smoothing filter.
const JITTER_SMOOTHING: f64 = 0.75;

/// One authored key: at `at` seconds the view sits at `position`
/// (0.0 = top, 1.0 = bottom of the scrollable range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollKeyframe {
    pub at: f64,
    pub position: f64,
}

impl ScrollKeyframe {
    pub const fn new(at: f64, position: f64) -> Self {
        Self { at, position }
    }
}

/// Ordered keyframes describing the scroll motion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollStory {
    keys: Vec<ScrollKeyframe>,
}

impl Default for ScrollStory {
    /// Rest at the top, descend to the bottom, come back up part way and
    /// hold there for the rest of the clip.
    fn default() -> Self {
        Self::new(vec![
            ScrollKeyframe::new(0.0, 0.0),
            ScrollKeyframe::new(1.0, 0.0),
            ScrollKeyframe::new(6.5, 1.0),
            ScrollKeyframe::new(8.5, 0.3),
        ])
    }
}

impl ScrollStory {
    /// Build a story. Times are floored at 0, positions clamped to `[0, 1]`
    /// and keys sorted by time; an empty list holds at the top.
    pub fn new(keys: Vec<ScrollKeyframe>) -> Self {
        let mut keys: Vec<ScrollKeyframe> = keys
            .into_iter()
            .filter(|k| k.at.is_finite() && k.position.is_finite())
            .map(|k| ScrollKeyframe::new(k.at.max(0.0), k.position.clamp(0.0, 1.0)))
            .collect();
        keys.sort_by(|a, b| a.at.total_cmp(&b.at));
        if keys.is_empty() {
            keys.push(ScrollKeyframe::new(0.0, 0.0));
        }
        Self { keys }
    }

    /// Straight top-to-bottom scroll over `span_secs`.
    pub fn linear(span_secs: f64) -> Self {
        Self::new(vec![
            ScrollKeyframe::new(0.0, 0.0),
            ScrollKeyframe::new(span_secs, 1.0),
        ])
    }

    pub fn keys(&self) -> &[ScrollKeyframe] {
        &self.keys
    }

    /// Time of the last key; the position is constant after it.
    pub fn span_secs(&self) -> f64 {
        self.keys[self.keys.len() - 1].at
    }

    /// Eased normalized position at `t` seconds.
    ///
    /// Before the first key the first position holds; after the last key the
    /// last position holds.
    pub fn sample(&self, t: f64) -> f64 {
        let idx = self.keys.partition_point(|k| k.at <= t);
        if idx == 0 {
            return self.keys[0].position;
        }
        if idx >= self.keys.len() {
            return self.keys[self.keys.len() - 1].position;
        }

        let a = self.keys[idx - 1];
        let b = self.keys[idx];
        let span = b.at - a.at;
        if span <= 0.0 {
            return a.position;
        }
        let eased = smoothstep((t - a.at) / span);
        a.position + (b.position - a.position) * eased
    }
}

/// Cubic ease-in/ease-out on `[0, 1]`.
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Builds [`ScrollPath`]s from a story and jitter settings.
#[derive(Debug, Clone, Default)]
pub struct ScrollPathSynthesizer {
    story: ScrollStory,
    jitter_px: u32,
    seed: u64,
}

impl ScrollPathSynthesizer {
    pub fn new(story: ScrollStory) -> Self {
        Self {
            story,
            jitter_px: 0,
            seed: 0,
        }
    }

    /// Enable jitter with the given amplitude in pixels (0 disables it).
    pub fn with_jitter(mut self, amplitude_px: u32, seed: u64) -> Self {
        self.jitter_px = amplitude_px;
        self.seed = seed;
        self
    }

    /// Synthesize the path for one clip.
    pub fn synthesize(
        &self,
        image_height: u32,
        frame_height: u32,
        duration_secs: f64,
        fps: u32,
    ) -> ScrollPath {
        let max_offset = image_height.saturating_sub(frame_height);
        let duration_secs = if duration_secs.is_finite() {
            duration_secs.max(0.0)
        } else {
            0.0
        };
        let frame_count = (duration_secs * fps as f64).round() as u64;

        let jitter = if self.jitter_px > 0 && max_offset > 0 {
            smoothed_jitter(frame_count, self.jitter_px, self.seed)
        } else {
            Vec::new()
        };

        ScrollPath {
            story: self.story.clone(),
            max_offset,
            duration_secs,
            fps,
            frame_count,
            jitter,
        }
    }
}

/// Low-pass filtered uniform noise in `[-amplitude, amplitude]`.
fn smoothed_jitter(frame_count: u64, amplitude_px: u32, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let amplitude = amplitude_px as f64;
    let mut previous = 0.0;
    (0..frame_count)
        .map(|_| {
            let raw = rng.random_range(-amplitude..=amplitude);
            previous = previous * JITTER_SMOOTHING + raw * (1.0 - JITTER_SMOOTHING);
            previous
        })
        .collect()
}

/// Time-varying crop offset over a tall image.
#[derive(Debug, Clone)]
pub struct ScrollPath {
    story: ScrollStory,
    max_offset: u32,
    duration_secs: f64,
    fps: u32,
    frame_count: u64,
    jitter: Vec<f64>,
}

impl ScrollPath {
    /// Path following the default story without jitter.
    pub fn synthesize(image_height: u32, frame_height: u32, duration_secs: f64, fps: u32) -> Self {
        ScrollPathSynthesizer::default().synthesize(image_height, frame_height, duration_secs, fps)
    }

    /// Largest valid offset (`image_height - frame_height`, floored at 0).
    pub fn max_offset(&self) -> u32 {
        self.max_offset
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Number of frames covering the duration.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Crop offset at time `t` seconds, within `[0, max_offset]`.
    pub fn offset_at(&self, t: f64) -> u32 {
        if self.max_offset == 0 {
            return 0;
        }

        let t = if t.is_finite() { t } else { self.story.span_secs() };
        let base = self.story.sample(t) * self.max_offset as f64;

        // Past the authored span the path holds still, so no wobble there.
        let wobble = if t < self.story.span_secs() && t >= 0.0 && self.fps > 0 {
            let frame = (t * self.fps as f64).floor() as usize;
            self.jitter.get(frame).copied().unwrap_or(0.0)
        } else {
            0.0
        };

        (base + wobble).round().clamp(0.0, self.max_offset as f64) as u32
    }

    /// Offset for the frame with the given index.
    pub fn offset_for_frame(&self, frame: u64) -> u32 {
        if self.fps == 0 {
            return self.offset_at(0.0);
        }
        self.offset_at(frame as f64 / self.fps as f64)
    }

    /// Offsets for every frame of the clip.
    pub fn offsets(&self) -> Vec<u32> {
        (0..self.frame_count).map(|f| self.offset_for_frame(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_endpoints() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert!((smoothstep(0.5) - 0.5).abs() < 1e-12);
        assert_eq!(smoothstep(-3.0), 0.0);
        assert_eq!(smoothstep(7.0), 1.0);
    }

    #[test]
    fn test_short_image_never_scrolls() {
        let path = ScrollPath::synthesize(400, 480, 10.0, 12);
        assert_eq!(path.max_offset(), 0);
        assert!(path.offsets().iter().all(|&o| o == 0));

        let jittered = ScrollPathSynthesizer::default()
            .with_jitter(20, 7)
            .synthesize(480, 480, 10.0, 12);
        assert!(jittered.offsets().iter().all(|&o| o == 0));
    }

    #[test]
    fn test_offsets_within_bounds() {
        let path = ScrollPathSynthesizer::default()
            .with_jitter(40, 99)
            .synthesize(3000, 480, 9.0, 12);

        assert_eq!(path.frame_count(), 108);
        for offset in path.offsets() {
            assert!(offset <= 2520);
        }
        assert_eq!(path.offset_at(-1.0), 0);
    }

    #[test]
    fn test_default_story_shape() {
        let path = ScrollPath::synthesize(2480, 480, 10.0, 12);

        assert_eq!(path.offset_at(0.0), 0);
        assert_eq!(path.offset_at(0.5), 0);
        assert_eq!(path.offset_at(6.5), 2000);
        assert_eq!(path.offset_at(8.5), 600);
        assert_eq!(path.offset_at(10.0), 600);
    }

    #[test]
    fn test_long_clip_freezes_after_story() {
        let path = ScrollPathSynthesizer::default()
            .with_jitter(30, 12)
            .synthesize(3000, 480, 60.0, 12);
        let span = ScrollStory::default().span_secs();
        assert!(span < 60.0);

        let held = path.offset_at(span);
        assert_eq!(held, 756);
        for frame in ((span * 12.0).ceil() as u64)..path.frame_count() {
            assert_eq!(path.offset_for_frame(frame), held);
        }
        // The authored motion is not stretched over the longer clip.
        let short = ScrollPath::synthesize(3000, 480, 10.0, 12);
        let long = ScrollPath::synthesize(3000, 480, 60.0, 12);
        assert_eq!(long.offset_at(6.5), short.offset_at(6.5));
        assert_eq!(long.offset_at(6.5), 2520);
    }

    #[test]
    fn test_deterministic_without_jitter() {
        let a = ScrollPath::synthesize(5000, 480, 12.0, 24).offsets();
        let b = ScrollPath::synthesize(5000, 480, 12.0, 24).offsets();
        assert_eq!(a, b);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let synth = ScrollPathSynthesizer::default().with_jitter(12, 1234);
        let a = synth.synthesize(4000, 480, 8.0, 12).offsets();
        let b = synth.synthesize(4000, 480, 8.0, 12).offsets();
        assert_eq!(a, b);

        let other = ScrollPathSynthesizer::default()
            .with_jitter(12, 4321)
            .synthesize(4000, 480, 8.0, 12)
            .offsets();
        assert_ne!(a, other);
    }

    #[test]
    fn test_jitter_stays_near_base_path() {
        let plain = ScrollPath::synthesize(4000, 480, 8.0, 12).offsets();
        let jittered = ScrollPathSynthesizer::default()
            .with_jitter(10, 5)
            .synthesize(4000, 480, 8.0, 12)
            .offsets();

        for (p, j) in plain.iter().zip(&jittered) {
            assert!((*p as i64 - *j as i64).abs() <= 11);
        }
    }

    #[test]
    fn test_linear_story_monotonic() {
        let path =
            ScrollPathSynthesizer::new(ScrollStory::linear(5.0)).synthesize(1480, 480, 5.0, 10);
        let offsets = path.offsets();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(path.offset_at(5.0), 1000);
    }

    #[test]
    fn test_story_normalization() {
        let story = ScrollStory::new(vec![
            ScrollKeyframe::new(1.5, 2.0),
            ScrollKeyframe::new(-2.0, -1.0),
            ScrollKeyframe::new(f64::NAN, 0.5),
        ]);
        assert_eq!(
            story.keys(),
            &[ScrollKeyframe::new(0.0, 0.0), ScrollKeyframe::new(1.5, 1.0)]
        );
        assert_eq!(story.span_secs(), 1.5);
        assert_eq!(ScrollStory::new(Vec::new()).sample(0.7), 0.0);
    }

    #[test]
    fn test_zero_duration_has_no_frames() {
        let path = ScrollPath::synthesize(1480, 480, 0.0, 12);
        assert_eq!(path.frame_count(), 0);
        assert_eq!(path.offset_at(0.0), 0);
        assert_eq!(path.offset_at(f64::INFINITY), 300);
    }
}
