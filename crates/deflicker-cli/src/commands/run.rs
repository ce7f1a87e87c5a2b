use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use deflicker_core::frame::{FrameRate, PixelFormat};
use deflicker_core::pipeline::config::{DeflickerConfig, ExportConfig, ExportFormat};
use deflicker_core::pipeline::{run_deflicker, CancelToken};

use super::progress::BarReporter;
use crate::summary::{print_config_summary, print_run_result};

#[derive(Clone, Copy, ValueEnum)]
pub enum PixelFormatArg {
    Gray8,
    Rgb24,
    Bgr24,
}

impl From<PixelFormatArg> for PixelFormat {
    fn from(arg: PixelFormatArg) -> Self {
        match arg {
            PixelFormatArg::Gray8 => PixelFormat::Gray8,
            PixelFormatArg::Rgb24 => PixelFormat::Rgb24,
            PixelFormatArg::Bgr24 => PixelFormat::Bgr24,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormatArg {
    Png,
    Jpg,
    Tiff,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Png => ExportFormat::Png,
            ExportFormatArg::Jpg => ExportFormat::Jpg,
            ExportFormatArg::Tiff => ExportFormat::Tiff,
        }
    }
}

/// Inputs shared by `run` and `analyze`.
#[derive(Args)]
pub struct InputArgs {
    /// Reprocessed (super-resolved) video to correct
    #[arg(required_unless_present = "config")]
    pub target: Option<PathBuf>,

    /// Original video used as the brightness reference
    #[arg(required_unless_present = "config")]
    pub reference: Option<PathBuf>,

    /// Pipeline config file (TOML). Positional paths override its inputs.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Packed pixel layout frames are decoded into
    #[arg(long, value_enum)]
    pub pixel_format: Option<PixelFormatArg>,

    /// Frames decoded ahead per stream on a background thread (0 = off)
    #[arg(long)]
    pub prefetch: Option<usize>,

    /// Write original/target/corrected images for every frame into this directory
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Image format for --export-dir
    #[arg(long, value_enum, default_value = "png")]
    pub export_format: ExportFormatArg,
}

impl InputArgs {
    /// Load the config file if given, then apply command-line overrides.
    pub fn load_config(&self) -> Result<DeflickerConfig> {
        let mut config = if let Some(ref config_path) = self.config {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            toml::from_str(&contents).context("Invalid deflicker config")?
        } else {
            DeflickerConfig::default()
        };

        if let Some(ref target) = self.target {
            config.target = target.clone();
        }
        if let Some(ref reference) = self.reference {
            config.reference = reference.clone();
        }
        if let Some(format) = self.pixel_format {
            config.decode.pixel_format = format.into();
        }
        if let Some(depth) = self.prefetch {
            config.decode.prefetch = depth;
        }
        if let Some(ref dir) = self.export_dir {
            config.export = Some(ExportConfig {
                dir: dir.clone(),
                format: self.export_format.into(),
            });
        }
        Ok(config)
    }
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output video path (.ser writes an uncompressed SER file)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// ffmpeg video codec
    #[arg(long)]
    pub codec: Option<String>,

    /// Constant rate factor for x264/x265 (0-51)
    #[arg(long)]
    pub crf: Option<u32>,

    /// x264/x265 preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Output frame rate, `num/den` or whole number (default: target's rate)
    #[arg(long)]
    pub fps: Option<FrameRate>,

    /// Pixel format of the encoded stream
    #[arg(long)]
    pub output_pix_fmt: Option<String>,

    /// Skip the summary and progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    if config.output.exists() {
        tracing::warn!(path = %config.output.display(), "Overwriting existing output");
    }

    if !args.quiet {
        print_config_summary(&config);
    }

    let reporter = if args.quiet {
        BarReporter::hidden()
    } else {
        BarReporter::new()?
    };
    let reporter = Arc::new(reporter);

    let summary = run_deflicker(&config, reporter.clone(), CancelToken::new())
        .with_context(|| format!("Deflicker failed for {}", config.target.display()))?;
    reporter.finish();

    if !args.quiet {
        print_run_result(&summary, Some(&config.output));
    }
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<DeflickerConfig> {
    let mut config = args.input.load_config()?;

    if let Some(ref output) = args.output {
        config.output = output.clone();
    } else if args.input.config.is_none() {
        bail!("--output is required unless a config file names one");
    }
    if let Some(ref codec) = args.codec {
        config.encoder.codec = codec.clone();
    }
    if let Some(crf) = args.crf {
        config.encoder.crf = crf;
    }
    if let Some(ref preset) = args.preset {
        config.encoder.preset = preset.clone();
    }
    if let Some(fps) = args.fps {
        config.encoder.frame_rate = Some(fps);
    }
    if let Some(ref pix_fmt) = args.output_pix_fmt {
        config.encoder.output_pix_fmt = pix_fmt.clone();
    }

    config.validate().context("Invalid deflicker config")?;
    Ok(config)
}
