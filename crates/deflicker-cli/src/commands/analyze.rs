use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use deflicker_core::error::Result as CoreResult;
use deflicker_core::frame::ChannelVector;
use deflicker_core::pipeline::{analyze, CancelToken, NoOpReporter, PairObserver, PairReport};

use super::run::InputArgs;
use crate::summary::print_run_result;

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write per-frame rows as CSV to this file instead of a table on stdout
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

pub fn run(args: &AnalyzeArgs) -> Result<()> {
    let config = args.input.load_config()?;
    config.validate().context("Invalid deflicker config")?;

    let observer: Box<dyn PairObserver> = match &args.csv {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(RowWriter::new(BufWriter::new(file), RowStyle::Csv))
        }
        None => Box::new(RowWriter::new(io::stdout(), RowStyle::Table)),
    };

    let summary = analyze(&config, observer, Arc::new(NoOpReporter), CancelToken::new())
        .with_context(|| format!("Analysis failed for {}", config.target.display()))?;

    if let Some(ref path) = args.csv {
        println!("Wrote {} rows to {}", summary.pairs, path.display());
    }
    print_run_result(&summary, None);
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RowStyle {
    Table,
    Csv,
}

/// Prints one row per pair: channel means of both frames and the factors.
struct RowWriter<W: Write + Send> {
    out: W,
    style: RowStyle,
    header_written: bool,
}

impl<W: Write + Send> RowWriter<W> {
    fn new(out: W, style: RowStyle) -> Self {
        Self {
            out,
            style,
            header_written: false,
        }
    }

    fn write_header(&mut self, channels: usize) -> io::Result<()> {
        match self.style {
            RowStyle::Csv => {
                let mut cols = vec!["frame".to_string()];
                for prefix in ["reference", "target", "factor"] {
                    cols.extend((0..channels).map(|c| format!("{prefix}_{c}")));
                }
                cols.push("fallback".into());
                writeln!(self.out, "{}", cols.join(","))
            }
            RowStyle::Table => writeln!(
                self.out,
                "{:>7}  {:<28}  {:<28}  {}",
                "frame", "reference", "target", "factor"
            ),
        }
    }
}

fn csv_fields(v: &ChannelVector) -> String {
    v.iter()
        .map(|x| format!("{x:.6}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl<W: Write + Send> PairObserver for RowWriter<W> {
    fn observe(&mut self, report: &PairReport<'_>) -> CoreResult<()> {
        if !self.header_written {
            self.write_header(report.factors.len())?;
            self.header_written = true;
        }
        match self.style {
            RowStyle::Csv => writeln!(
                self.out,
                "{},{},{},{},{}",
                report.index.sequence,
                csv_fields(report.reference_means),
                csv_fields(report.target_means),
                csv_fields(report.factors),
                report.fallback_channels.len()
            )?,
            RowStyle::Table => writeln!(
                self.out,
                "{:>7}  {:<28}  {:<28}  {}",
                report.index.sequence,
                report.reference_means.to_string(),
                report.target_means.to_string(),
                report.factors
            )?,
        }
        self.out.flush()?;
        Ok(())
    }
}
