//! Per-row processing.
//!
//! One row goes through resume check, capture, composition, encode and
//! upload. Every error is converted into an [`Outcome`] at the row
//! boundary; nothing here aborts the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn, Instrument};

use reel_media::{generate_thumbnail, Background, Compositor, Encoder, PageCapture};
use reel_models::keys::{content_type_for_key, landing_key, thumbnail_key, video_key};
use reel_models::{InputRow, Outcome};
use reel_storage::{put_file, ObjectStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::landing::LandingPage;
use crate::logging::RowLogger;
use crate::metrics;
use crate::overlays::OverlaySet;
use crate::resume::ResumeGuard;

/// Scoped work directory of one row.
///
/// Created empty at row start and removed on drop, whichever way the row
/// ends.
#[derive(Debug)]
pub struct RowWorkspace {
    dir: PathBuf,
}

impl RowWorkspace {
    /// Create `dir`, clearing leftovers from an interrupted run.
    pub async fn create(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed stale row directory {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn screenshot_path(&self) -> PathBuf {
        self.dir.join("screenshot.png")
    }

    pub fn video_path(&self) -> PathBuf {
        self.dir.join("video.mp4")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.dir.join("thumbnail.jpg")
    }

    pub fn landing_path(&self) -> PathBuf {
        self.dir.join("index.html")
    }
}

impl Drop for RowWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove row directory {}: {}", self.dir.display(), e);
            }
        }
    }
}

/// Everything a row needs, shared across the worker's rows.
pub struct RowPipeline {
    store: Arc<dyn ObjectStore>,
    capture: Arc<dyn PageCapture>,
    encoder: Encoder,
    compositor: Compositor,
    overlays: Arc<OverlaySet>,
    resume: ResumeGuard,
    rows_dir: PathBuf,
    cta_url: String,
    max_duration_secs: f64,
}

impl RowPipeline {
    pub fn new(
        config: &WorkerConfig,
        store: Arc<dyn ObjectStore>,
        capture: Arc<dyn PageCapture>,
        encoder: Encoder,
        overlays: Arc<OverlaySet>,
    ) -> Self {
        Self {
            resume: ResumeGuard::new(store.clone()),
            store,
            capture,
            encoder,
            compositor: Compositor::new(config.frame).with_scroll_jitter(config.scroll_jitter_px),
            overlays,
            rows_dir: config.work_dir.join("rows"),
            cta_url: config.cta_url.clone(),
            max_duration_secs: config.max_duration_secs,
        }
    }

    pub fn capture(&self) -> &Arc<dyn PageCapture> {
        &self.capture
    }

    /// Process one row. Always yields exactly one outcome.
    pub async fn process(&self, row: &InputRow, logger: &RowLogger) -> Outcome {
        let span = logger.create_span();
        async {
            logger.log_start(&row.url);
            match self.try_process(row, logger).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    logger.log_error(&e.to_string());
                    Outcome::failed(row, e.failure_kind(), e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_process(&self, row: &InputRow, logger: &RowLogger) -> WorkerResult<Outcome> {
        if self.resume.exists(&row.identity).await {
            return Ok(Outcome::skipped(row));
        }

        let overlay = self
            .overlays
            .get(&row.category)
            .ok_or_else(|| WorkerError::MissingOverlay(row.category.clone()))?;

        let workspace = RowWorkspace::create(self.rows_dir.join(row.identity.as_str())).await?;

        let started = Instant::now();
        let screenshot = workspace.screenshot_path();
        self.capture.capture(&row.url, &screenshot).await?;
        metrics::record_capture(started.elapsed().as_secs_f64());
        logger.log_progress("page captured");

        let background = self
            .prepare_background(screenshot, workspace.thumbnail_path())
            .await?;

        let composition = self.compositor.compose(
            background,
            overlay,
            self.max_duration_secs,
            row.identity.seed(),
        )?;
        let report = self
            .encoder
            .render(&composition, &workspace.video_path())
            .await?;
        logger.log_progress(&format!(
            "encoded with {} in {:.1}s",
            report.backend,
            report.elapsed.as_secs_f64()
        ));

        self.publish(row, &workspace, &report.path).await
    }

    /// Decode the screenshot and write the poster thumbnail.
    async fn prepare_background(
        &self,
        screenshot: PathBuf,
        thumbnail: PathBuf,
    ) -> WorkerResult<Background> {
        let frame = self.compositor.frame();
        tokio::task::spawn_blocking(move || {
            let background = Background::load(&screenshot, frame.width).map_err(|e| {
                WorkerError::CaptureFailed(format!("unreadable screenshot: {}", e))
            })?;
            generate_thumbnail(&background, frame.height, &thumbnail)?;
            Ok::<_, WorkerError>(background)
        })
        .await
        .map_err(|e| WorkerError::processing_failed(format!("image task failed: {}", e)))?
    }

    /// Upload companions, then the video.
    ///
    /// Companions are attempted independently. The video key marks the row
    /// as done for later runs, so it is only uploaded once both companions
    /// are in place.
    async fn publish(
        &self,
        row: &InputRow,
        workspace: &RowWorkspace,
        video: &Path,
    ) -> WorkerResult<Outcome> {
        let video_key = video_key(&row.identity);
        let thumbnail_key = thumbnail_key(&row.identity);
        let landing_key = landing_key(&row.identity);

        let video_url = self.store.public_url(&video_key);
        let thumbnail_url = self.store.public_url(&thumbnail_key);
        let landing_url = self.store.public_url(&landing_key);

        let html = LandingPage {
            identity: &row.identity,
            video_url: &video_url,
            thumbnail_url: &thumbnail_url,
            cta_url: &self.cta_url,
        }
        .render();
        tokio::fs::write(workspace.landing_path(), html).await?;

        let mut failed = Vec::new();
        for (artifact, path, key) in [
            ("thumbnail", workspace.thumbnail_path(), &thumbnail_key),
            ("landing", workspace.landing_path(), &landing_key),
        ] {
            if let Err(e) = self.upload(artifact, &path, key).await {
                warn!(identity = %row.identity, "Upload of {} failed: {}", key, e);
                failed.push(format!("{} ({})", artifact, e));
            }
        }

        if !failed.is_empty() {
            return Err(WorkerError::upload_failed(format!(
                "{}; video withheld",
                failed.join(", ")
            )));
        }

        self.upload("video", video, &video_key)
            .await
            .map_err(|e| WorkerError::upload_failed(format!("video ({})", e)))?;

        Ok(Outcome::completed(row, video_url, landing_url))
    }

    async fn upload(&self, artifact: &'static str, path: &Path, key: &str) -> WorkerResult<()> {
        let started = Instant::now();
        put_file(self.store.as_ref(), path, key, content_type_for_key(key)).await?;
        metrics::record_upload(artifact, started.elapsed().as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use reel_media::{Composition, EncodeBackend, MediaError, MediaResult, OverlayClip};
    use reel_models::{EncoderBackend, FailureKind, OutcomeStatus};
    use reel_storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::partition::WorkerSlot;

    #[derive(Default)]
    struct FakeCapture {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PageCapture for FakeCapture {
        async fn capture(&self, url: &str, output: &Path) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MediaError::capture_failed(url, "navigation timeout"));
            }
            RgbImage::from_pixel(854, 1600, Rgb([200, 210, 220]))
                .save_with_format(output, image::ImageFormat::Png)
                .map_err(MediaError::from)
        }

        async fn recycle(&self) -> MediaResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeEncode {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EncodeBackend for FakeEncode {
        async fn hardware_available(&self) -> bool {
            false
        }

        async fn render(
            &self,
            composition: &Composition,
            backend: EncoderBackend,
            output: &Path,
        ) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = format!("{} frames via {}", composition.frame_count(), backend);
            tokio::fs::write(output, body).await?;
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        config: WorkerConfig,
        store: Arc<MemoryStore>,
        capture: Arc<FakeCapture>,
        encode: Arc<FakeEncode>,
    }

    impl Harness {
        fn new(fail_capture: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = WorkerConfig::new(WorkerSlot::new(0, 1).unwrap(), dir.path());
            config.max_duration_secs = 2.0;
            Self {
                _dir: dir,
                config,
                store: Arc::new(MemoryStore::new()),
                capture: Arc::new(FakeCapture {
                    fail: fail_capture,
                    ..FakeCapture::default()
                }),
                encode: Arc::new(FakeEncode::default()),
            }
        }

        fn pipeline(&self) -> RowPipeline {
            let mut overlays = OverlaySet::new();
            overlays.insert(
                "tech",
                OverlayClip {
                    path: PathBuf::from("/overlays/tech.mp4"),
                    duration_secs: 10.0,
                    width: 720,
                    height: 1280,
                    has_audio: true,
                },
            );
            RowPipeline::new(
                &self.config,
                self.store.clone(),
                self.capture.clone(),
                Encoder::new(self.encode.clone()),
                Arc::new(overlays),
            )
        }
    }

    fn row(category: &str) -> InputRow {
        InputRow::new("https://apple.com", Some("apple"), category).unwrap()
    }

    fn logger(row: &InputRow) -> RowLogger {
        RowLogger::new(0, 0, row)
    }

    #[tokio::test]
    async fn test_row_completes_and_uploads_everything() {
        let harness = Harness::new(false);
        let row = row("tech");

        let outcome = harness.pipeline().process(&row, &logger(&row)).await;
        match &outcome.status {
            OutcomeStatus::Completed {
                video_url,
                landing_url,
            } => {
                assert_eq!(video_url, "memory://apple/video.mp4");
                assert_eq!(landing_url, "memory://apple/index.html");
            }
            other => panic!("unexpected status {:?}", other),
        }

        assert_eq!(
            harness.store.keys(),
            vec!["apple/index.html", "apple/thumbnail.jpg", "apple/video.mp4"]
        );
        assert_eq!(harness.store.content_type("apple/video.mp4").unwrap(), "video/mp4");
        let html = String::from_utf8(harness.store.object("apple/index.html").unwrap()).unwrap();
        assert!(html.contains("memory://apple/video.mp4"));
        assert!(!harness.config.row_dir("apple").exists());
    }

    #[tokio::test]
    async fn test_published_row_is_skipped_without_work() {
        let harness = Harness::new(false);
        harness.store.insert("apple/video.mp4", b"old".to_vec());
        let row = row("tech");

        let outcome = harness.pipeline().process(&row, &logger(&row)).await;
        assert!(outcome.is_skipped());
        assert_eq!(harness.capture.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.encode.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_overlay_fails_row() {
        let harness = Harness::new(false);
        let row = row("fitness");

        let outcome = harness.pipeline().process(&row, &logger(&row)).await;
        match outcome.status {
            OutcomeStatus::Failed { kind, .. } => assert_eq!(kind, FailureKind::MissingOverlay),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(harness.capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_failure_cleans_up() {
        let harness = Harness::new(true);
        let row = row("tech");

        let outcome = harness.pipeline().process(&row, &logger(&row)).await;
        match outcome.status {
            OutcomeStatus::Failed { kind, .. } => assert_eq!(kind, FailureKind::Capture),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(harness.encode.calls.load(Ordering::SeqCst), 0);
        assert!(harness.store.keys().is_empty());
        assert!(!harness.config.row_dir("apple").exists());
    }

    #[tokio::test]
    async fn test_companion_failure_withholds_video() {
        let harness = Harness::new(false);
        harness.store.fail_key("apple/thumbnail.jpg");
        let row = row("tech");

        let outcome = harness.pipeline().process(&row, &logger(&row)).await;
        match outcome.status {
            OutcomeStatus::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Transport);
                assert!(reason.contains("thumbnail"));
                assert!(!reason.contains("landing ("));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(harness.store.keys(), vec!["apple/index.html"]);
    }

    #[tokio::test]
    async fn test_workspace_removes_directory_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows").join("apple");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("stale.png"), b"x").unwrap();

        let workspace = RowWorkspace::create(&path).await.unwrap();
        assert!(!workspace.screenshot_path().exists());
        assert!(!path.join("stale.png").exists());
        std::fs::write(workspace.video_path(), b"partial").unwrap();

        drop(workspace);
        assert!(!path.exists());
    }
}
