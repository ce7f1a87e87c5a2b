use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CODEC, DEFAULT_CRF, DEFAULT_OUTPUT_PIX_FMT, DEFAULT_PREFETCH_DEPTH, DEFAULT_PRESET,
};
use crate::error::{DeflickerError, Result};
use crate::frame::{FrameRate, PixelFormat};

/// Largest CRF accepted by x264/x265.
const MAX_CRF: u32 = 51;

/// Upper bound on frames buffered per stream by the prefetch thread.
const MAX_PREFETCH_DEPTH: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeflickerConfig {
    /// Reprocessed (super-resolved) video to correct.
    pub target: PathBuf,
    /// Original video providing the per-frame brightness reference.
    pub reference: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    /// Per-frame image export, disabled when absent.
    #[serde(default)]
    pub export: Option<ExportConfig>,
}

impl Default for DeflickerConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::from("upscaled.mp4"),
            reference: PathBuf::from("original.mp4"),
            output: PathBuf::from("deflickered.mp4"),
            decode: DecodeConfig::default(),
            encoder: EncoderConfig::default(),
            export: None,
        }
    }
}

impl DeflickerConfig {
    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("target", &self.target),
            ("reference", &self.reference),
            ("output", &self.output),
        ] {
            if path.as_os_str().is_empty() {
                return Err(DeflickerError::Config(format!("{name} path is empty")));
            }
        }
        if self.output == self.target || self.output == self.reference {
            return Err(DeflickerError::Config(format!(
                "output {} would overwrite an input",
                self.output.display()
            )));
        }
        self.decode.validate()?;
        self.encoder.validate()?;
        if let Some(export) = &self.export {
            if export.dir.as_os_str().is_empty() {
                return Err(DeflickerError::Config("export dir is empty".into()));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Packed layout both streams are decoded into.
    pub pixel_format: PixelFormat,
    /// Frames decoded ahead on a background thread per stream (0 = off).
    pub prefetch: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Bgr24,
            prefetch: DEFAULT_PREFETCH_DEPTH,
        }
    }
}

impl DecodeConfig {
    fn validate(&self) -> Result<()> {
        if self.prefetch > MAX_PREFETCH_DEPTH {
            return Err(DeflickerError::Config(format!(
                "prefetch depth {} exceeds {MAX_PREFETCH_DEPTH}",
                self.prefetch
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub codec: String,
    pub crf: u32,
    pub preset: String,
    /// Pixel format of the encoded stream.
    pub output_pix_fmt: String,
    /// Output rate. Defaults to the target stream's rate.
    pub frame_rate: Option<FrameRate>,
    /// Passed to ffmpeg verbatim, after all generated arguments.
    pub extra_args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_CODEC.into(),
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.into(),
            output_pix_fmt: DEFAULT_OUTPUT_PIX_FMT.into(),
            frame_rate: None,
            extra_args: Vec::new(),
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.codec.trim().is_empty() {
            return Err(DeflickerError::Config("encoder codec is empty".into()));
        }
        if self.crf > MAX_CRF {
            return Err(DeflickerError::Config(format!(
                "crf {} out of range 0-{MAX_CRF}",
                self.crf
            )));
        }
        if let Some(rate) = self.frame_rate {
            FrameRate::new(rate.num, rate.den)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Root directory; `original/`, `target/` and `corrected/` are created inside.
    pub dir: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpg,
    Tiff,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Tiff => "tiff",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
