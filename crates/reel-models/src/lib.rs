//! Shared data models for the PageReel batch renderer.
//!
//! This crate provides Serde-serializable types for:
//! - Input rows and stable row identities
//! - Per-row outcomes and the CSV result table
//! - Progress snapshots
//! - Encoding configuration
//! - The remote storage key layout

pub mod encoding;
pub mod error;
pub mod keys;
pub mod outcome;
pub mod progress;
pub mod row;

// Re-export common types
pub use encoding::{EncoderBackend, EncodingConfig};
pub use error::{ModelError, ModelResult};
pub use outcome::{
    read_records, write_records, FailureKind, Outcome, OutcomeRecord, OutcomeStatus, RecordStatus,
};
pub use progress::{ProgressCounts, ProgressSnapshot};
pub use row::{category_slug, parse_rows, InputRow, RejectedRow, RowIdentity, RowSet};
