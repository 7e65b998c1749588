//! Remote storage key layout.
//!
//! Every key the pipeline reads or writes is built here so workers, the
//! resume probe and the merge step agree on one layout.

use crate::row::RowIdentity;

/// Prefix holding worker result files, completion markers and the master file.
pub const RESULTS_PREFIX: &str = "results/";
/// Prefix holding per-worker progress snapshots.
pub const PROGRESS_PREFIX: &str = "progress/";
/// Key of the merged result file.
pub const MASTER_RESULTS_KEY: &str = "results/master.csv";

/// Canonical output key of a row. Its existence marks the row as done.
pub fn video_key(identity: &RowIdentity) -> String {
    format!("{}/video.mp4", identity)
}

pub fn thumbnail_key(identity: &RowIdentity) -> String {
    format!("{}/thumbnail.jpg", identity)
}

pub fn landing_key(identity: &RowIdentity) -> String {
    format!("{}/index.html", identity)
}

/// Overlay clip for a category. `prefix` may be empty (bucket root).
pub fn overlay_key(prefix: &str, category: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}.mp4", category)
    } else {
        format!("{}/{}.mp4", prefix, category)
    }
}

pub fn worker_results_key(worker: u32) -> String {
    format!("{}worker_{}.csv", RESULTS_PREFIX, worker)
}

pub fn worker_done_key(worker: u32) -> String {
    format!("{}worker_{}.done", RESULTS_PREFIX, worker)
}

pub fn progress_key(worker: u32) -> String {
    format!("{}worker_{}.json", PROGRESS_PREFIX, worker)
}

/// Extract the worker index from a worker result key
/// (`results/worker_7.csv` -> `7`).
pub fn parse_worker_results_key(key: &str) -> Option<u32> {
    key.strip_prefix(RESULTS_PREFIX)?
        .strip_prefix("worker_")?
        .strip_suffix(".csv")?
        .parse()
        .ok()
}

/// Content type for an object, derived from its key extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp4") => "video/mp4",
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("done") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_keys() {
        let id = RowIdentity::parse("apple").unwrap();
        assert_eq!(video_key(&id), "apple/video.mp4");
        assert_eq!(thumbnail_key(&id), "apple/thumbnail.jpg");
        assert_eq!(landing_key(&id), "apple/index.html");
    }

    #[test]
    fn test_overlay_key_prefix() {
        assert_eq!(overlay_key("", "tech"), "tech.mp4");
        assert_eq!(overlay_key("overlays/", "tech"), "overlays/tech.mp4");
    }

    #[test]
    fn test_worker_result_keys_roundtrip() {
        assert_eq!(parse_worker_results_key(&worker_results_key(12)), Some(12));
        assert_eq!(parse_worker_results_key(MASTER_RESULTS_KEY), None);
        assert_eq!(parse_worker_results_key("results/worker_3.done"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for_key("a/video.mp4"), "video/mp4");
        assert_eq!(content_type_for_key("a/THUMB.JPG"), "image/jpeg");
        assert_eq!(content_type_for_key("results/master.csv"), "text/csv");
        assert_eq!(content_type_for_key("noext"), "application/octet-stream");
    }
}
