//! Filesystem helpers for atomic output publishing.
//!
//! Renders are written to a temporary file next to the final path and only
//! become visible once complete. Publishing never overwrites an existing
//! file: an occupied name is disambiguated as `name_1.mp4`, `name_2.mp4`, ...

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Upper bound on alternate names tried before giving up.
const MAX_ALTERNATES: u32 = 1000;

/// Temporary path in the same directory as `final_path`.
///
/// Keeping the temp file on the same filesystem makes the publish a
/// metadata-only operation.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = final_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    let name = format!(".{}.{}.tmp.{}", stem, uuid::Uuid::new_v4().simple(), ext);
    final_path.with_file_name(name)
}

/// `n`-th alternate of `path`; `0` is the path itself.
pub fn alternate_path(path: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

/// Move a finished temp file to `final_path` without clobbering.
///
/// Uses a hard link (fails if the target exists) and removes the temp name
/// afterwards; filesystems without hard links fall back to an existence
/// check plus rename. Returns the path actually published.
pub async fn publish_no_clobber(temp: &Path, final_path: &Path) -> MediaResult<PathBuf> {
    if let Some(parent) = final_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    for n in 0..=MAX_ALTERNATES {
        let candidate = alternate_path(final_path, n);

        match fs::hard_link(temp, &candidate).await {
            Ok(()) => {
                if let Err(e) = fs::remove_file(temp).await {
                    tracing::warn!(
                        "Failed to remove temp file after publish: {}: {}",
                        temp.display(),
                        e
                    );
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MediaError::FileNotFound(temp.to_path_buf()));
            }
            Err(e) => {
                tracing::debug!(
                    "Hard link unavailable ({}), falling back to rename: {}",
                    e,
                    candidate.display()
                );
                if fs::try_exists(&candidate).await? {
                    continue;
                }
                fs::rename(temp, &candidate).await?;
                return Ok(candidate);
            }
        }
    }

    Err(MediaError::internal(format!(
        "no free output name for {} after {} attempts",
        final_path.display(),
        MAX_ALTERNATES
    )))
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MediaError::from(e)),
    }
}
