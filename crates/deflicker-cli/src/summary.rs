use std::path::Path;

use console::Style;
use deflicker_core::pipeline::config::DeflickerConfig;
use deflicker_core::pipeline::{EndReason, RunSummary};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    disabled: Style,
    warn: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            disabled: Style::new().dim().yellow(),
            warn: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_config_summary(config: &DeflickerConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Deflicker"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(9)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Target"),
        s.path.apply_to(config.target.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reference"),
        s.path.apply_to(config.reference.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.display())
    );
    println!();

    println!("  {}", s.header.apply_to("Encoder"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Codec"),
        s.value.apply_to(&config.encoder.codec)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("CRF"),
        s.value.apply_to(config.encoder.crf)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Preset"),
        s.value.apply_to(&config.encoder.preset)
    );
    match config.encoder.frame_rate {
        Some(rate) => println!(
            "    {:<12}{}",
            s.label.apply_to("Rate"),
            s.value.apply_to(rate)
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Rate"),
            s.disabled.apply_to("from target")
        ),
    }
    println!();

    match &config.export {
        Some(export) => println!(
            "  {:<14}{} ({})",
            s.header.apply_to("Export"),
            s.path.apply_to(export.dir.display()),
            s.value.apply_to(export.format)
        ),
        None => println!(
            "  {:<14}{}",
            s.header.apply_to("Export"),
            s.disabled.apply_to("disabled")
        ),
    }
    println!();
}

pub fn print_run_result(summary: &RunSummary, output: Option<&Path>) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(summary.pairs)
    );
    let reason = summary.end_reason.to_string();
    let reason = match summary.end_reason {
        EndReason::TargetExhausted => s.value.apply_to(reason),
        EndReason::ReferenceExhausted => s.warn.apply_to(reason),
    };
    println!("  {:<14}{}", s.label.apply_to("Stopped"), reason);

    if summary.total_fallbacks() > 0 {
        let per_channel = summary
            .fallback_channels
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(c, n)| format!("ch{c}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<14}{}",
            s.label.apply_to("Uncorrected"),
            s.warn.apply_to(per_channel)
        );
    }

    if let Some(output) = output {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Saved to"),
            s.path.apply_to(output.display())
        );
    }
    println!();
}
