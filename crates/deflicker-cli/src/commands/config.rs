use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use deflicker_core::pipeline::config::{DeflickerConfig, ExportConfig, ExportFormat};

#[derive(Args)]
pub struct ConfigArgs {
    /// Validate this config file and print it with every default filled in
    #[arg(long, value_name = "FILE")]
    pub check: Option<PathBuf>,

    /// Include an [export] section so per-frame images are written
    #[arg(long)]
    pub with_export: bool,

    /// Save to this file instead of printing
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing file given with --output
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = build(args)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;

    match args.output {
        Some(ref path) => {
            if path.exists() && !args.force {
                bail!("{} already exists (pass --force to replace it)", path.display());
            }
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Config written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn build(args: &ConfigArgs) -> Result<DeflickerConfig> {
    let mut config = match args.check {
        Some(ref path) => load_checked(path)?,
        None => DeflickerConfig::default(),
    };
    if args.with_export && config.export.is_none() {
        config.export = Some(ExportConfig {
            dir: PathBuf::from("frames"),
            format: ExportFormat::default(),
        });
    }
    Ok(config)
}

fn load_checked(path: &Path) -> Result<DeflickerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: DeflickerConfig = toml::from_str(&contents)
        .with_context(|| format!("{} is not a valid deflicker config", path.display()))?;
    config
        .validate()
        .with_context(|| format!("{} failed validation", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConfigArgs {
        ConfigArgs {
            check: None,
            with_export: false,
            output: None,
            force: false,
        }
    }

    #[test]
    fn test_default_omits_export() {
        let config = build(&args()).unwrap();
        assert!(config.export.is_none());

        let with_export = build(&ConfigArgs {
            with_export: true,
            ..args()
        })
        .unwrap();
        assert!(with_export.export.is_some());
    }

    #[test]
    fn test_check_rejects_output_over_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "target = \"a.mp4\"\noutput = \"a.mp4\"\n").unwrap();

        let err = build(&ConfigArgs {
            check: Some(path),
            ..args()
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed validation"));
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deflicker.toml");
        std::fs::write(&path, "# keep me\n").unwrap();

        assert!(run(&ConfigArgs {
            output: Some(path.clone()),
            ..args()
        })
        .is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# keep me\n");

        run(&ConfigArgs {
            output: Some(path.clone()),
            force: true,
            ..args()
        })
        .unwrap();
        let written: DeflickerConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.output, DeflickerConfig::default().output);
    }
}
