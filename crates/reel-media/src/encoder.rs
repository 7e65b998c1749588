//! Encoder with hardware probe, software fallback and atomic output.
//!
//! Rendering runs as a small state machine:
//!
//! ```text
//! ProbeHardware -> RenderHardware --fail--> RenderSoftware --fail--> Failed
//!       |                                        ^
//!       +------------- no hardware --------------+
//! ```
//!
//! Every attempt writes to a temporary file in the output directory. The
//! temp file is published only after the backend succeeded and produced a
//! non-empty file; on any failure it is deleted, so the final path is either
//! absent or complete.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use reel_models::encoding::{EncoderBackend, EncodingConfig, HARDWARE_VIDEO_CODEC};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::compositor::Composition;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{publish_no_clobber, remove_if_exists, temp_path_for};

/// Counter of hardware renders that fell back to software.
pub const ENCODE_FALLBACKS_TOTAL: &str = "pagereel_encode_fallbacks_total";
/// Histogram of successful render durations, labelled by backend.
pub const ENCODE_DURATION_SECONDS: &str = "pagereel_encode_duration_seconds";

/// Default bound on the hardware probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on one FFmpeg render.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(600);

/// Something that can turn a composition into a video file.
#[async_trait]
pub trait EncodeBackend: Send + Sync {
    /// Whether the hardware encoder can be attempted.
    async fn hardware_available(&self) -> bool;

    /// Render `composition` to `output` with the given encoder.
    async fn render(
        &self,
        composition: &Composition,
        backend: EncoderBackend,
        output: &Path,
    ) -> MediaResult<()>;
}

/// State of the encode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStage {
    ProbeHardware,
    RenderHardware,
    RenderSoftware,
    Failed,
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct EncodeReport {
    /// Where the video was published (may be an alternate name)
    pub path: PathBuf,
    /// Encoder that produced it
    pub backend: EncoderBackend,
    /// Whether a hardware attempt failed first
    pub fell_back: bool,
    pub elapsed: Duration,
}

/// Drives an [`EncodeBackend`] through probe, fallback and publish.
#[derive(Clone)]
pub struct Encoder {
    backend: Arc<dyn EncodeBackend>,
}

impl Encoder {
    pub fn new(backend: Arc<dyn EncodeBackend>) -> Self {
        Self { backend }
    }

    /// Encoder backed by the `ffmpeg` binary; each render attempt is killed
    /// after `render_timeout`.
    pub fn ffmpeg(encoding: EncodingConfig, render_timeout: Duration) -> Self {
        Self::new(Arc::new(
            FfmpegEncodeBackend::new(encoding).with_render_timeout(render_timeout),
        ))
    }

    /// Render `composition` and atomically publish it at `output_path`.
    pub async fn render(
        &self,
        composition: &Composition,
        output_path: &Path,
    ) -> MediaResult<EncodeReport> {
        let started = Instant::now();
        let mut stage = EncodeStage::ProbeHardware;
        let mut failures: Vec<String> = Vec::new();

        loop {
            stage = match stage {
                EncodeStage::ProbeHardware => {
                    if self.backend.hardware_available().await {
                        EncodeStage::RenderHardware
                    } else {
                        debug!("Hardware encoder unavailable, using software");
                        EncodeStage::RenderSoftware
                    }
                }
                EncodeStage::RenderHardware => {
                    match self
                        .attempt(composition, EncoderBackend::Hardware, output_path)
                        .await
                    {
                        Ok(path) => {
                            return Ok(self.finish(path, EncoderBackend::Hardware, false, started))
                        }
                        Err(e) => {
                            warn!(
                                output = %output_path.display(),
                                error = %e,
                                "Hardware render failed, falling back to software"
                            );
                            metrics::counter!(ENCODE_FALLBACKS_TOTAL).increment(1);
                            failures.push(format!("{}: {}", EncoderBackend::Hardware, e));
                            EncodeStage::RenderSoftware
                        }
                    }
                }
                EncodeStage::RenderSoftware => {
                    match self
                        .attempt(composition, EncoderBackend::Software, output_path)
                        .await
                    {
                        Ok(path) => {
                            let fell_back = !failures.is_empty();
                            return Ok(self.finish(path, EncoderBackend::Software, fell_back, started));
                        }
                        Err(e) => {
                            failures.push(format!("{}: {}", EncoderBackend::Software, e));
                            EncodeStage::Failed
                        }
                    }
                }
                EncodeStage::Failed => {
                    return Err(MediaError::encode_failed(failures.join("; ")));
                }
            };
        }
    }

    /// One render into a temp file, then publish.
    async fn attempt(
        &self,
        composition: &Composition,
        backend: EncoderBackend,
        output_path: &Path,
    ) -> MediaResult<PathBuf> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = temp_path_for(output_path);
        let result = self.render_and_publish(composition, backend, &temp, output_path).await;
        if result.is_err() {
            if let Err(e) = remove_if_exists(&temp).await {
                warn!("Failed to remove temp render {}: {}", temp.display(), e);
            }
        }
        result
    }

    async fn render_and_publish(
        &self,
        composition: &Composition,
        backend: EncoderBackend,
        temp: &Path,
        output_path: &Path,
    ) -> MediaResult<PathBuf> {
        self.backend.render(composition, backend, temp).await?;

        let size = tokio::fs::metadata(temp)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(MediaError::encode_failed(format!(
                "{} produced an empty file",
                backend
            )));
        }

        publish_no_clobber(temp, output_path).await
    }

    fn finish(
        &self,
        path: PathBuf,
        backend: EncoderBackend,
        fell_back: bool,
        started: Instant,
    ) -> EncodeReport {
        let elapsed = started.elapsed();
        metrics::histogram!(ENCODE_DURATION_SECONDS, "backend" => backend.codec_name())
            .record(elapsed.as_secs_f64());
        info!(
            output = %path.display(),
            backend = %backend,
            fell_back,
            elapsed_ms = elapsed.as_millis() as u64,
            "Video rendered"
        );
        EncodeReport {
            path,
            backend,
            fell_back,
            elapsed,
        }
    }
}

/// Renders with the `ffmpeg` binary: raw background frames on stdin, the
/// overlay clip as the second input.
pub struct FfmpegEncodeBackend {
    encoding: EncodingConfig,
    probe_timeout: Duration,
    render_timeout: Duration,
    hardware: OnceCell<bool>,
}

impl FfmpegEncodeBackend {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            hardware: OnceCell::new(),
        }
    }

    /// Wall-clock bound of one FFmpeg render, rounded up to whole seconds.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn render_timeout_secs(&self) -> u64 {
        let secs = self.render_timeout.as_secs();
        if self.render_timeout.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }

    /// FFmpeg invocation for one render.
    pub fn build_command(
        &self,
        composition: &Composition,
        backend: EncoderBackend,
        output: &Path,
    ) -> FfmpegCommand {
        let frame = composition.frame;
        let mut cmd = FfmpegCommand::new(output)
            .rawvideo_stdin(frame.width, frame.height, frame.fps)
            .input(&composition.overlay.path)
            .filter_complex(composition.filter_graph())
            .map("[vout]");

        cmd = if composition.has_audio() {
            cmd.map("1:a:0?").output_args(self.encoding.audio_args())
        } else {
            cmd.output_arg("-an")
        };

        cmd.output_args(self.encoding.video_args(backend))
            .duration(composition.duration_secs)
            .output_args(["-f", "mp4"])
    }
}

#[async_trait]
impl EncodeBackend for FfmpegEncodeBackend {
    async fn hardware_available(&self) -> bool {
        *self
            .hardware
            .get_or_init(|| probe_hardware_encoder(self.probe_timeout))
            .await
    }

    async fn render(
        &self,
        composition: &Composition,
        backend: EncoderBackend,
        output: &Path,
    ) -> MediaResult<()> {
        let cmd = self.build_command(composition, backend, output);
        let runner = FfmpegRunner::new().with_timeout(self.render_timeout_secs());

        let written = runner.run_with_frames(&cmd, composition.frames()).await?;
        debug!(frames = written, backend = %backend, "FFmpeg render finished");
        Ok(())
    }
}

/// Ask FFmpeg whether it was built with the hardware H.264 encoder.
///
/// Bounded by `timeout`; any failure counts as "not available".
pub async fn probe_hardware_encoder(timeout: Duration) -> bool {
    match check_ffmpeg() {
        Ok(ffmpeg) => probe_encoder_listing(&ffmpeg, timeout).await,
        Err(e) => {
            warn!("Encoder probe skipped: {}", e);
            false
        }
    }
}

async fn probe_encoder_listing(ffmpeg: &Path, timeout: Duration) -> bool {
    let probe = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(output)) if output.status.success() => {
            let found = encoders_list_has(&String::from_utf8_lossy(&output.stdout), HARDWARE_VIDEO_CODEC);
            info!(available = found, "Probed hardware encoder {}", HARDWARE_VIDEO_CODEC);
            found
        }
        Ok(Ok(output)) => {
            warn!(code = ?output.status.code(), "Encoder probe exited with failure");
            false
        }
        Ok(Err(e)) => {
            warn!("Encoder probe could not run: {}", e);
            false
        }
        Err(_) => {
            warn!("Encoder probe timed out after {:?}", timeout);
            false
        }
    }
}

/// Whether `ffmpeg -encoders` output lists `codec`.
fn encoders_list_has(listing: &str, codec: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(codec))
}
