//! Video encoding configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware H.264 encoder (NVIDIA NVENC)
pub const HARDWARE_VIDEO_CODEC: &str = "h264_nvenc";
/// Software H.264 encoder
pub const SOFTWARE_VIDEO_CODEC: &str = "libx264";
/// Default NVENC preset
pub const DEFAULT_HARDWARE_PRESET: &str = "p4";
/// Default libx264 preset
pub const DEFAULT_SOFTWARE_PRESET: &str = "fast";
/// Default quality (CRF for libx264, CQ for NVENC)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Output pixel format (broad player compatibility)
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Thumbnail generation settings
pub const THUMBNAIL_SCALE_WIDTH: u32 = 480;

/// Encoder backend selected by the encoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderBackend {
    Hardware,
    Software,
}

impl EncoderBackend {
    pub fn codec_name(&self) -> &'static str {
        match self {
            EncoderBackend::Hardware => HARDWARE_VIDEO_CODEC,
            EncoderBackend::Software => SOFTWARE_VIDEO_CODEC,
        }
    }
}

impl fmt::Display for EncoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec_name())
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Preset used with the hardware encoder (p1-p7)
    #[serde(default = "default_hardware_preset")]
    pub hardware_preset: String,

    /// Preset used with libx264 (ultrafast..veryslow)
    #[serde(default = "default_software_preset")]
    pub software_preset: String,

    /// Quality (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_hardware_preset() -> String {
    DEFAULT_HARDWARE_PRESET.to_string()
}
fn default_software_preset() -> String {
    DEFAULT_SOFTWARE_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            hardware_preset: default_hardware_preset(),
            software_preset: default_software_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            pixel_format: default_pixel_format(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Video output arguments for the given backend.
    pub fn video_args(&self, backend: EncoderBackend) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), backend.codec_name().to_string()];

        // CRF is not used with NVENC, use -cq instead
        match backend {
            EncoderBackend::Hardware => args.extend([
                "-preset".to_string(),
                self.hardware_preset.clone(),
                "-cq".to_string(),
                self.crf.to_string(),
            ]),
            EncoderBackend::Software => args.extend([
                "-preset".to_string(),
                self.software_preset.clone(),
                "-crf".to_string(),
                self.crf.to_string(),
            ]),
        }

        args.extend([
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
        args.extend(self.extra_args.clone());
        args
    }

    /// Audio output arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.crf, 23);
        assert_eq!(config.software_preset, "fast");
    }

    #[test]
    fn test_software_args() {
        let args = EncodingConfig::default().video_args(EncoderBackend::Software);
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
    }

    #[test]
    fn test_hardware_args() {
        let args = EncodingConfig::default().video_args(EncoderBackend::Hardware);
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string())); // NVENC uses -cq instead of -crf
        assert!(args.contains(&"p4".to_string()));
    }

    #[test]
    fn test_crf_clamped() {
        assert_eq!(EncodingConfig::default().with_crf(90).crf, 51);
    }
}
