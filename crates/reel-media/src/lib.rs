#![deny(unreachable_patterns)]
//! Rendering side of the batch pipeline.
//!
//! This crate provides:
//! - Page capture through headless Chromium
//! - Scroll path synthesis over tall screenshots
//! - Composition of the background and the presenter overlay
//! - FFmpeg command building and an encoder with hardware probe,
//!   software fallback and atomic, no-clobber publishing
//! - FFprobe inspection of overlay clips and poster thumbnails

pub mod background;
pub mod capture;
pub mod command;
pub mod compositor;
pub mod encoder;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod scroll;
pub mod thumbnail;

pub use background::Background;
pub use capture::{CaptureConfig, ChromeCapture, PageCapture};
pub use command::{check_chromium, check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compositor::{
    Composition, Compositor, Corner, FrameSpec, OverlayClip, OverlayLayout, OverlayPlacement,
};
pub use encoder::{
    probe_hardware_encoder, EncodeBackend, EncodeReport, EncodeStage, Encoder,
    FfmpegEncodeBackend, DEFAULT_RENDER_TIMEOUT,
};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{alternate_path, publish_no_clobber, temp_path_for};
pub use probe::{probe_video, VideoInfo};
pub use scroll::{ScrollKeyframe, ScrollPath, ScrollPathSynthesizer, ScrollStory};
pub use thumbnail::generate_thumbnail;
