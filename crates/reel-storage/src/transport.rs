//! Retrying transport over an [`ObjectStore`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::retry::{retry_async_if, RetryConfig};
use crate::store::{ObjectInfo, ObjectStore};

/// Wraps every remote call of an inner store with bounded exponential
/// backoff. `NotFound` answers pass through without retry.
#[derive(Clone)]
pub struct RetryingStore {
    inner: Arc<dyn ObjectStore>,
    retry: RetryConfig,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }
}

#[async_trait]
impl ObjectStore for RetryingStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let config = self.retry.named(format!("get {}", key));
        retry_async_if(&config, || self.inner.get(key), StorageError::is_retryable).await
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let config = self.retry.named(format!("put {}", key));
        retry_async_if(
            &config,
            || self.inner.put(key, data.clone(), content_type),
            StorageError::is_retryable,
        )
        .await
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        let config = self.retry.named(format!("head {}", key));
        retry_async_if(&config, || self.inner.head(key), StorageError::is_retryable).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let config = self.retry.named(format!("list {}", prefix));
        retry_async_if(&config, || self.inner.list(prefix), StorageError::is_retryable).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}
