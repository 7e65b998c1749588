//! S3-compatible object storage for the batch renderer.
//!
//! This crate provides:
//! - The `ObjectStore` seam (get/put/head/list + public URLs)
//! - An R2 client backed by the AWS SDK
//! - An in-memory store for dry runs and tests
//! - Bounded exponential-backoff retry and a retrying store wrapper

pub mod client;
pub mod error;
pub mod retry;
pub mod store;
pub mod transport;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use retry::{retry_async, retry_async_if, RetryConfig};
pub use store::{get_file, get_json, put_file, put_json, MemoryStore, ObjectInfo, ObjectStore};
pub use transport::RetryingStore;
