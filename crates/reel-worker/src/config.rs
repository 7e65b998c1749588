//! Worker configuration.
//!
//! Built once in `main` from the environment and passed by reference to
//! every component.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_media::{CaptureConfig, FrameSpec, DEFAULT_RENDER_TIMEOUT};
use reel_models::EncodingConfig;
use reel_storage::{R2Config, RetryConfig};

use crate::error::{WorkerError, WorkerResult};
use crate::partition::WorkerSlot;

/// Default landing page call-to-action target.
pub const DEFAULT_CTA_URL: &str = "https://calendly.com/heedeestudios/seo-strategy-session";

/// Where the input row list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Object key in the bucket
    Remote(String),
    /// Local CSV file
    Local(PathBuf),
}

/// Merge rendezvous settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    /// Longest time the merger waits for other workers' completion markers
    pub grace: Duration,
    /// Interval between marker checks
    pub poll_interval: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(600),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// This worker's slot among `total_workers`
    pub slot: WorkerSlot,
    /// Optional cap on rows processed by this worker
    pub batch_size: Option<usize>,
    /// Work directory for per-row temporary files
    pub work_dir: PathBuf,
    pub input: InputSource,
    /// Key prefix of overlay clips (empty = bucket root)
    pub overlay_prefix: String,
    /// Landing page call-to-action link
    pub cta_url: String,
    pub frame: FrameSpec,
    pub encoding: EncodingConfig,
    pub capture: CaptureConfig,
    /// Upper bound on video length; the overlay clip may end sooner
    pub max_duration_secs: f64,
    /// Wall-clock bound of one encoder attempt
    pub render_timeout: Duration,
    /// Scroll wobble amplitude in pixels (0 disables it)
    pub scroll_jitter_px: u32,
    /// Recycle browser state every N rows
    pub recycle_every: usize,
    /// Persist progress every N row outcomes
    pub progress_every: u64,
    pub merge: MergeSettings,
    /// Policy for every remote storage call
    pub retry: RetryConfig,
    /// Object storage; `None` only in tests and dry runs
    pub storage: Option<R2Config>,
    /// Prometheus listener port
    pub metrics_port: Option<u16>,
}

impl WorkerConfig {
    /// Defaults for a given slot, with no remote storage configured.
    pub fn new(slot: WorkerSlot, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let frame = FrameSpec::default();
        Self {
            slot,
            batch_size: None,
            input: InputSource::Remote("master.csv".to_string()),
            overlay_prefix: "overlays".to_string(),
            cta_url: DEFAULT_CTA_URL.to_string(),
            frame,
            encoding: EncodingConfig::default(),
            capture: CaptureConfig {
                viewport_width: frame.width,
                profile_dir: work_dir.join("chromium-profile"),
                ..CaptureConfig::default()
            },
            max_duration_secs: 60.0,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            scroll_jitter_px: 6,
            recycle_every: 25,
            progress_every: 5,
            merge: MergeSettings::default(),
            retry: RetryConfig::new("storage"),
            storage: None,
            metrics_port: None,
            work_dir,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let total: u32 = env_parse("TOTAL_WORKERS", 1)?;
        let raw_id = std::env::var("WORKER_ID").unwrap_or_else(|_| "0".to_string());
        let slot = WorkerSlot::from_raw(&raw_id, total)?;

        let work_dir = PathBuf::from(
            std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/pagereel".to_string()),
        );
        let mut config = Self::new(slot, work_dir);

        config.batch_size = env_optional("BATCH_SIZE")?.filter(|n: &usize| *n > 0);
        config.input = match env_nonempty("INPUT_CSV_PATH") {
            Some(path) => InputSource::Local(PathBuf::from(path)),
            None => InputSource::Remote(
                env_nonempty("INPUT_CSV_KEY").unwrap_or_else(|| "master.csv".to_string()),
            ),
        };
        if let Ok(prefix) = std::env::var("OVERLAY_PREFIX") {
            config.overlay_prefix = prefix.trim().trim_matches('/').to_string();
        }
        if let Some(cta) = env_nonempty("CTA_URL").or_else(|| env_nonempty("CALENDLY_URL")) {
            config.cta_url = cta;
        }

        config.frame = FrameSpec {
            width: env_parse("VIDEO_WIDTH", config.frame.width)?,
            height: env_parse("VIDEO_HEIGHT", config.frame.height)?,
            fps: env_parse("VIDEO_FPS", config.frame.fps)?,
        };
        if config.frame.width < 16 || config.frame.height < 16 || config.frame.fps == 0 {
            return Err(WorkerError::config_error(format!(
                "invalid output geometry {}x{}@{}",
                config.frame.width, config.frame.height, config.frame.fps
            )));
        }
        // H.264 needs even dimensions.
        config.frame.width &= !1;
        config.frame.height &= !1;

        config.capture.viewport_width = config.frame.width;
        if let Some(bin) = env_nonempty("CHROMIUM_BIN") {
            config.capture.binary = bin;
        }
        config.capture.timeout =
            Duration::from_secs(env_parse("CAPTURE_TIMEOUT_SECS", 30u64)?.max(1));
        config.capture.capture_height =
            env_parse("CAPTURE_HEIGHT", config.capture.capture_height)?.max(config.frame.height);

        config.max_duration_secs = env_parse("MAX_DURATION_SECS", config.max_duration_secs)?;
        if !(config.max_duration_secs.is_finite() && config.max_duration_secs > 0.0) {
            return Err(WorkerError::config_error("MAX_DURATION_SECS must be positive"));
        }
        config.render_timeout = Duration::from_secs(
            env_parse("RENDER_TIMEOUT_SECS", config.render_timeout.as_secs())?.max(1),
        );
        config.scroll_jitter_px = env_parse("SCROLL_JITTER_PX", config.scroll_jitter_px)?;
        config.recycle_every = env_parse("RECYCLE_EVERY", config.recycle_every)?;
        config.progress_every = env_parse("PROGRESS_EVERY", config.progress_every)?.max(1);

        config.merge = MergeSettings {
            grace: Duration::from_secs(env_parse("MERGE_GRACE_SECS", 600u64)?),
            poll_interval: Duration::from_secs(env_parse("MERGE_POLL_SECS", 15u64)?.max(1)),
        };

        config.retry = RetryConfig::new("storage")
            .with_max_attempts(env_parse("RETRY_MAX_ATTEMPTS", 3u32)?)
            .with_base_delay(Duration::from_millis(env_parse("RETRY_BASE_DELAY_MS", 500u64)?));

        config.storage = Some(
            R2Config::from_env().map_err(|e| WorkerError::config_error(e.to_string()))?,
        );
        config.metrics_port = env_optional("METRICS_PORT")?;

        Ok(config)
    }

    /// Local directory for one row's temporary files.
    pub fn row_dir(&self, identity: &str) -> PathBuf {
        self.work_dir.join("rows").join(identity)
    }

    /// Local directory for downloaded overlay clips.
    pub fn overlay_dir(&self) -> PathBuf {
        self.work_dir.join("overlays")
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse an optional variable; unset or blank yields `default`.
fn env_parse<T: FromStr>(name: &str, default: T) -> WorkerResult<T> {
    Ok(env_optional(name)?.unwrap_or(default))
}

fn env_optional<T: FromStr>(name: &str) -> WorkerResult<Option<T>> {
    match env_nonempty(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::config_error(format!("{} has invalid value '{}'", name, raw))),
    }
}
