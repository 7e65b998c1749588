//! Batch rendering worker.
//!
//! This crate provides:
//! - Environment configuration and stateless work partitioning
//! - The per-row pipeline (resume check, capture, compose, encode, upload)
//! - Progress snapshots and per-worker result files
//! - The merge step run by the highest worker
//! - Prometheus metrics and structured row logging

pub mod config;
pub mod error;
pub mod landing;
pub mod logging;
pub mod metrics;
pub mod overlays;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod results;
pub mod resume;
pub mod runner;

pub use config::{InputSource, MergeSettings, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::RowLogger;
pub use overlays::OverlaySet;
pub use partition::{derive_worker_index, partition, AssignedRow, WorkerSlot};
pub use pipeline::{RowPipeline, RowWorkspace};
pub use progress::ProgressTracker;
pub use results::{merge, MergeReport, ResultAggregator};
pub use resume::ResumeGuard;
pub use runner::{assign_rows, load_rows, ExitStatus, RunSummary, Worker};
