//! R2 client implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectInfo, ObjectStore};

/// Configuration for R2 client.
#[derive(Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Base URL under which objects are publicly served (CDN or public bucket)
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required_env("R2_ENDPOINT_URL")?,
            access_key_id: required_env("R2_ACCESS_KEY_ID")?,
            secret_access_key: required_env("R2_SECRET_ACCESS_KEY")?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "video-generator".to_string()),
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Public URL of `key`.
    ///
    /// Uses `public_base_url` when configured, otherwise the path-style
    /// endpoint URL.
    pub fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "{}/{}/{}",
                self.endpoint_url.trim_end_matches('/'),
                self.bucket_name,
                key
            ),
        }
    }
}

fn required_env(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StorageError::config_error(format!("{} not set", name)))
}

/// Cloudflare R2 (S3-compatible) storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    config: R2Config,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name.clone(),
            config,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload bytes to R2.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// List objects with a prefix.
    pub async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(DisplayErrorContext(&e).to_string()))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|t| t.to_millis().ok())
                        .map(|ms| ms.max(0) as u64),
                });
            }

            continuation_token =
                next_page_token(response.is_truncated(), response.next_continuation_token());
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Ok(false)
                } else {
                    Err(StorageError::HeadFailed(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::AwsSdk(format!(
                    "R2 connectivity check failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.download_bytes(key).await
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.upload_bytes(data, key, content_type).await
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        self.exists(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        self.list_objects(prefix).await
    }

    fn public_url(&self, key: &str) -> String {
        self.config.public_url(key)
    }
}

/// Token for the next page of a listing, `None` when the listing is complete.
///
/// A truncated page without a token ends the listing; requesting again
/// without one would start over from the first page.
fn next_page_token(is_truncated: Option<bool>, token: Option<&str>) -> Option<String> {
    if is_truncated != Some(true) {
        return None;
    }
    token.filter(|t| !t.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_page_token() {
        assert_eq!(next_page_token(Some(true), Some("abc")), Some("abc".to_string()));
        assert_eq!(next_page_token(Some(false), Some("abc")), None);
        assert_eq!(next_page_token(None, Some("abc")), None);
        assert_eq!(next_page_token(Some(true), None), None);
        assert_eq!(next_page_token(Some(true), Some("")), None);
    }

    fn config(public: Option<&str>) -> R2Config {
        R2Config {
            endpoint_url: "https://acct.r2.cloudflarestorage.com/".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "videos".to_string(),
            region: "auto".to_string(),
            public_base_url: public.map(str::to_string),
        }
    }

    #[test]
    fn test_public_url_with_cdn() {
        let cfg = config(Some("https://cdn.example.com/"));
        assert_eq!(
            cfg.public_url("apple/video.mp4"),
            "https://cdn.example.com/apple/video.mp4"
        );
    }

    #[test]
    fn test_public_url_path_style_fallback() {
        let cfg = config(None);
        assert_eq!(
            cfg.public_url("apple/index.html"),
            "https://acct.r2.cloudflarestorage.com/videos/apple/index.html"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let dbg = format!("{:?}", config(None));
        assert!(!dbg.contains("secret\""));
        assert!(dbg.contains("<redacted>"));
    }
}
