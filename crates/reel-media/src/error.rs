//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during capture, compositing and encoding.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Chromium binary not found: {0}")]
    ChromiumNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Capture failed for {url}: {message}")]
    CaptureFailed { url: String, message: String },

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a capture failure error.
    pub fn capture_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CaptureFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an encode failure error.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error came from the page capture stage.
    pub fn is_capture(&self) -> bool {
        matches!(self, Self::CaptureFailed { .. } | Self::ChromiumNotFound(_))
    }

    /// Last few lines of FFmpeg's stderr, if any were captured.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed {
                stderr: Some(s), ..
            }
            | Self::FfprobeFailed {
                stderr: Some(s), ..
            } => Some(s.as_str()),
            _ => None,
        }
    }
}
