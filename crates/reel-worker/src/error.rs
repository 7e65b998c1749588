//! Worker error types.

use reel_models::FailureKind;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Startup validation failed: {0}")]
    Validation(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("No overlay for category '{0}'")]
    MissingOverlay(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Model error: {0}")]
    Model(#[from] reel_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Whether this error stops the worker before any row is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::ConfigError(_) | WorkerError::Validation(_))
    }

    /// Per-row classification recorded in the outcome.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::CaptureFailed(_) => FailureKind::Capture,
            WorkerError::MissingOverlay(_) => FailureKind::MissingOverlay,
            WorkerError::EncodeFailed(_) => FailureKind::Encode,
            WorkerError::UploadFailed(_) | WorkerError::Storage(_) => FailureKind::Transport,
            WorkerError::Media(e) if e.is_capture() => FailureKind::Capture,
            WorkerError::Media(reel_media::MediaError::EncodeFailed(_)) => FailureKind::Encode,
            _ => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_media::MediaError;
    use reel_storage::StorageError;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            WorkerError::MissingOverlay("tech".into()).failure_kind(),
            FailureKind::MissingOverlay
        );
        assert_eq!(
            WorkerError::from(MediaError::capture_failed("a.com", "timeout")).failure_kind(),
            FailureKind::Capture
        );
        assert_eq!(
            WorkerError::from(MediaError::encode_failed("both failed")).failure_kind(),
            FailureKind::Encode
        );
        assert_eq!(
            WorkerError::from(StorageError::upload_failed("503")).failure_kind(),
            FailureKind::Transport
        );
        assert_eq!(
            WorkerError::from(std::io::Error::other("disk full")).failure_kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(WorkerError::config_error("TOTAL_WORKERS=0").is_fatal());
        assert!(WorkerError::validation("ffmpeg missing").is_fatal());
        assert!(!WorkerError::upload_failed("x").is_fatal());
    }
}
