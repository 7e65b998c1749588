//! Skip rows whose output is already published.

use std::sync::Arc;

use tracing::warn;

use reel_models::keys::video_key;
use reel_models::RowIdentity;
use reel_storage::ObjectStore;

/// Decides whether a row can be skipped.
///
/// The canonical video key is uploaded last, so its presence implies the
/// row finished in an earlier run.
#[derive(Clone)]
pub struct ResumeGuard {
    store: Arc<dyn ObjectStore>,
}

impl ResumeGuard {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Whether the row's video already exists.
    ///
    /// A failed probe counts as "not published": the row is re-rendered
    /// rather than silently dropped.
    pub async fn exists(&self, identity: &RowIdentity) -> bool {
        let key = video_key(identity);
        match self.store.head(&key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(identity = %identity, "Existence check for {} failed: {}", key, e);
                false
            }
        }
    }
}
