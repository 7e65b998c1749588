//! Page screenshots through a headless Chromium binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::check_chromium;
use crate::error::{MediaError, MediaResult};

/// Something that can screenshot a page into a file.
#[async_trait]
pub trait PageCapture: Send + Sync {
    /// Capture `url` into a PNG at `output`.
    async fn capture(&self, url: &str, output: &Path) -> MediaResult<()>;

    /// Release accumulated browser state. Called every few rows.
    async fn recycle(&self) -> MediaResult<()>;
}

/// Capture settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Chromium binary name or path
    pub binary: String,
    /// Viewport width in pixels (matches the output frame width)
    pub viewport_width: u32,
    /// Window height; the screenshot covers this much of the page
    pub capture_height: u32,
    /// Wall-clock limit per attempt
    pub timeout: Duration,
    /// Virtual time granted for the page to settle before the shot
    pub settle_budget: Duration,
    /// Browser profile directory, wiped on recycle
    pub profile_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            binary: "chromium".to_string(),
            viewport_width: 854,
            capture_height: 4000,
            timeout: Duration::from_secs(30),
            settle_budget: Duration::from_secs(5),
            profile_dir: std::env::temp_dir().join("pagereel-chromium"),
        }
    }
}

/// Headless Chromium driven as a child process per capture.
#[derive(Debug, Clone)]
pub struct ChromeCapture {
    config: CaptureConfig,
}

impl ChromeCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Command line for one attempt. `settle` adds the virtual time budget.
    pub fn build_args(&self, url: &str, output: &Path, settle: bool) -> Vec<String> {
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--hide-scrollbars".to_string(),
            "--mute-audio".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-data-dir={}", self.config.profile_dir.display()),
            format!(
                "--window-size={},{}",
                self.config.viewport_width, self.config.capture_height
            ),
            format!("--screenshot={}", output.display()),
        ];
        if settle {
            args.push(format!(
                "--virtual-time-budget={}",
                self.config.settle_budget.as_millis()
            ));
        }
        args.push(normalize_url(url));
        args
    }

    async fn attempt(&self, url: &str, output: &Path, settle: bool) -> MediaResult<()> {
        let binary = check_chromium(&self.config.binary)?;
        let args = self.build_args(url, output, settle);
        debug!("Running Chromium: {} {}", binary.display(), args.join(" "));

        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output_result = tokio::time::timeout(self.config.timeout, child)
            .await
            .map_err(|_| MediaError::Timeout(self.config.timeout.as_secs()))??;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            let last = stderr.lines().last().unwrap_or("").to_string();
            return Err(MediaError::capture_failed(
                url,
                format!("chromium exited with {:?}: {}", output_result.status.code(), last),
            ));
        }

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MediaError::capture_failed(url, "no screenshot written"));
        }
        Ok(())
    }
}

#[async_trait]
impl PageCapture for ChromeCapture {
    async fn capture(&self, url: &str, output: &Path) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.attempt(url, output, true).await {
            Ok(()) => Ok(()),
            Err(MediaError::Timeout(secs)) => {
                // Pages that never go idle still render; take what is there.
                warn!(url, timeout_secs = secs, "Capture timed out, retrying without settle budget");
                self.attempt(url, output, false).await.map_err(|e| match e {
                    MediaError::Timeout(secs) => {
                        MediaError::capture_failed(url, format!("timed out after {}s", secs))
                    }
                    MediaError::Io(io) => MediaError::capture_failed(url, io.to_string()),
                    other => other,
                })
            }
            Err(MediaError::Io(io)) => Err(MediaError::capture_failed(url, io.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn recycle(&self) -> MediaResult<()> {
        let dir = &self.config.profile_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(dir).await?;
        info!(profile = %dir.display(), "Recycled browser profile");
        Ok(())
    }
}

/// Add a scheme to bare hostnames.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
