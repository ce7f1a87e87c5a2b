use std::time::Duration;

use anyhow::Result;
use deflicker_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an indicatif bar from pipeline progress.
///
/// Stages with a known pair count get a bar; the rest get a spinner.
pub struct BarReporter {
    bar: ProgressBar,
    bar_style: ProgressStyle,
    spinner_style: ProgressStyle,
}

impl BarReporter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bar: ProgressBar::new(0),
            bar_style: ProgressStyle::default_bar()
                .template("{msg:20} [{bar:40}] {pos}/{len} frames ({eta})")?
                .progress_chars("=> "),
            spinner_style: ProgressStyle::default_spinner()
                .template("{spinner} {msg:20} {pos} frames")?,
        })
    }

    /// Reporter that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            bar_style: ProgressStyle::default_bar(),
            spinner_style: ProgressStyle::default_spinner(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Done");
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<u64>) {
        match total_items {
            Some(total) => {
                self.bar.set_style(self.bar_style.clone());
                self.bar.set_length(total);
            }
            None => {
                self.bar.set_style(self.spinner_style.clone());
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
        }
        if stage != PipelineStage::Draining {
            self.bar.set_position(0);
        }
        self.bar.set_message(stage.to_string());
    }

    fn advance(&self, items_done: u64) {
        self.bar.set_position(items_done);
    }
}
