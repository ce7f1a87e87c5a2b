use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deflicker_core::io::ser::SerReader;
use deflicker_core::io::{is_ser, probe};

use super::run::PixelFormatArg;

#[derive(Args)]
pub struct InfoArgs {
    /// Input video or SER file
    pub file: PathBuf,

    /// Packed pixel layout the file would be decoded into
    #[arg(long, value_enum, default_value = "bgr24")]
    pub pixel_format: PixelFormatArg,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let info = probe(&args.file, args.pixel_format.into())
        .with_context(|| format!("Failed to probe {}", args.file.display()))?;

    println!("File:        {}", info.path.display());
    match info.frame_count {
        Some(n) => println!("Frames:      {n}"),
        None => println!("Frames:      unknown"),
    }
    println!("Dimensions:  {}x{}", info.width, info.height);
    println!("Decoded as:  {}", info.pixel_format);
    match info.frame_rate {
        Some(rate) => println!("Frame rate:  {} ({:.3} fps)", rate, rate.as_f64()),
        None => println!("Frame rate:  unknown"),
    }
    if let Some(ref codec) = info.codec {
        println!("Codec:       {codec}");
    }

    if is_ser(&args.file) {
        let reader = SerReader::open(&args.file)?;
        let header = &reader.header;
        if !header.observer.is_empty() {
            println!("Observer:    {}", header.observer);
        }
        if !header.telescope.is_empty() {
            println!("Telescope:   {}", header.telescope);
        }
        if !header.instrument.is_empty() {
            println!("Instrument:  {}", header.instrument);
        }
        let total_mb =
            (reader.frame_bytes() * reader.frame_count()) as f64 / (1024.0 * 1024.0);
        println!("Data size:   {:.1} MB", total_mb);
    }

    Ok(())
}
