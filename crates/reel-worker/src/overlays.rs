//! Overlay clips, fetched once per category before any row runs.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use reel_media::{probe_video, OverlayClip};
use reel_models::category_slug;
use reel_models::keys::overlay_key;
use reel_storage::{get_file, ObjectStore};

/// Category -> local overlay clip.
#[derive(Debug, Clone, Default)]
pub struct OverlaySet {
    clips: BTreeMap<String, OverlayClip>,
    missing: Vec<String>,
}

impl OverlaySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download and probe the clip of every category.
    ///
    /// A category whose clip cannot be downloaded or probed is recorded as
    /// missing; rows in that category fail individually later.
    pub async fn fetch(
        store: &dyn ObjectStore,
        prefix: &str,
        categories: &[String],
        dir: &Path,
    ) -> Self {
        let mut set = Self::new();

        for category in categories {
            if category.is_empty() || category_slug(category) != *category {
                warn!(category = %category, "Refusing overlay for unsafe category name");
                set.missing.push(category.clone());
                continue;
            }

            let key = overlay_key(prefix, category);
            let local = dir.join(format!("{}.mp4", category));

            if let Err(e) = get_file(store, &key, &local).await {
                warn!(category = %category, "Overlay {} unavailable: {}", key, e);
                set.missing.push(category.clone());
                continue;
            }

            match probe_video(&local).await {
                Ok(info) => {
                    info!(
                        category = %category,
                        duration = info.duration,
                        width = info.width,
                        height = info.height,
                        audio = info.has_audio,
                        "Overlay ready"
                    );
                    set.insert(category.clone(), OverlayClip::from_probe(&local, &info));
                }
                Err(e) => {
                    warn!(category = %category, "Overlay {} is not a usable video: {}", key, e);
                    set.missing.push(category.clone());
                }
            }
        }

        set
    }

    pub fn insert(&mut self, category: impl Into<String>, clip: OverlayClip) {
        let category = category.into();
        self.missing.retain(|c| c != &category);
        self.clips.insert(category, clip);
    }

    pub fn get(&self, category: &str) -> Option<&OverlayClip> {
        self.clips.get(category)
    }

    /// Categories that could not be resolved.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
