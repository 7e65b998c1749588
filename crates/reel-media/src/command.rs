//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// How many trailing stderr lines are kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input with its own leading arguments.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands.
///
/// Supports several inputs, including raw frames piped on stdin.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a file input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().to_string_lossy().to_string();
        self.input_with_args(Vec::<String>::new(), source)
    }

    /// Add an input with arguments placed before its `-i`.
    pub fn input_with_args<I, S>(mut self, args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            source: source.into(),
        });
        self
    }

    /// Add a raw RGB24 frame stream read from stdin.
    pub fn rawvideo_stdin(self, width: u32, height: u32, fps: u32) -> Self {
        self.input_with_args(
            [
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pix_fmt".to_string(),
                "rgb24".to_string(),
                "-s".to_string(),
                format!("{}x{}", width, height),
                "-r".to_string(),
                fps.to_string(),
            ],
            "pipe:0",
        )
    }

    /// Add output arguments.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream into the output.
    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Whether any input reads from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.inputs.iter().any(|i| i.source == "pipe:0" || i.source == "-")
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a wall-clock timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run a command, streaming `frames` to its stdin.
    ///
    /// Returns the number of frames written. If FFmpeg exits early the
    /// remaining frames are dropped and the exit status decides the result.
    pub async fn run_with_frames<I>(&self, cmd: &FfmpegCommand, frames: I) -> MediaResult<u64>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let ffmpeg = check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let stdin = if cmd.reads_stdin() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let work = async {
            let written = feed_frames(&mut child, frames).await?;
            let status = child.wait().await?;
            Ok::<_, MediaError>((written, status))
        };

        let outcome = match self.timeout_secs {
            Some(secs) => {
                let timed = tokio::time::timeout(Duration::from_secs(secs), work).await;
                match timed {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", secs);
                        let _ = child.kill().await;
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => work.await,
        };

        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let (written, status) = outcome?;
        if status.success() {
            Ok(written)
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_tail(&stderr)),
                status.code(),
            ))
        }
    }
}

/// Write frames to the child's stdin, then close it so FFmpeg sees EOF.
async fn feed_frames<I>(child: &mut Child, frames: I) -> MediaResult<u64>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(0);
    };

    let mut written = 0u64;
    for frame in frames {
        match stdin.write_all(&frame).await {
            Ok(()) => written += 1,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(written, "FFmpeg closed stdin early");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Flush errors after an early exit are reported through the exit status.
    let _ = stdin.shutdown().await;
    drop(stdin);
    Ok(written)
}

/// Keep only the last lines of FFmpeg's stderr.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Resolve a Chromium binary by name or path.
pub fn check_chromium(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::ChromiumNotFound(binary.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("out.mp4")
            .rawvideo_stdin(854, 480, 12)
            .input("overlay.mp4")
            .filter_complex("[1:v]scale=212:-2[ov];[0:v][ov]overlay=10:10[v]")
            .map("[v]")
            .map("1:a?")
            .duration(7.5);

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert!(cmd.reads_stdin());

        let first_input = args.iter().position(|a| a == "pipe:0").unwrap();
        let second_input = args.iter().position(|a| a == "overlay.mp4").unwrap();
        assert!(first_input < second_input);
        assert!(args.contains(&"854x480".to_string()));
        assert!(args.contains(&"7.500".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_file_only_command_has_no_stdin() {
        let cmd = FfmpegCommand::new("copy.mp4")
            .input("overlay.mp4")
            .output_args(["-c", "copy"]);
        assert!(!cmd.reads_stdin());
        assert!(!cmd.build_args().contains(&"pipe:0".to_string()));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(text.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }
}
