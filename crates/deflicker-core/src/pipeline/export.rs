use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::io::image_io::save_frame;

use super::config::{ExportConfig, ExportFormat};
use super::types::{PairObserver, PairReport};

/// Writes every pair as three still images for side-by-side inspection:
/// `original/original{n}`, `target/target{n}` and `corrected/corrected{n}`.
pub struct ImageExporter {
    original_dir: PathBuf,
    target_dir: PathBuf,
    corrected_dir: PathBuf,
    format: ExportFormat,
    written: u64,
}

impl ImageExporter {
    /// Create the three output directories under `config.dir`.
    pub fn create(config: &ExportConfig) -> Result<Self> {
        let original_dir = config.dir.join("original");
        let target_dir = config.dir.join("target");
        let corrected_dir = config.dir.join("corrected");
        for dir in [&original_dir, &target_dir, &corrected_dir] {
            fs::create_dir_all(dir)?;
        }
        info!(dir = %config.dir.display(), format = %config.format, "Exporting frames");
        Ok(Self {
            original_dir,
            target_dir,
            corrected_dir,
            format: config.format,
            written: 0,
        })
    }

    /// Pairs exported so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn file(&self, dir: &Path, stem: &str, sequence: u64) -> PathBuf {
        dir.join(format!("{stem}{sequence}.{}", self.format.extension()))
    }
}

impl PairObserver for ImageExporter {
    fn observe(&mut self, report: &PairReport<'_>) -> Result<()> {
        let n = report.index.sequence;
        save_frame(
            report.reference,
            report.reference_format,
            &self.file(&self.original_dir, "original", n),
        )?;
        save_frame(
            report.target,
            report.target_format,
            &self.file(&self.target_dir, "target", n),
        )?;
        save_frame(
            report.corrected,
            report.target_format,
            &self.file(&self.corrected_dir, "corrected", n),
        )?;
        self.written += 1;
        Ok(())
    }
}
