//! Configuration view and validation commands — `trofos config`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use trofos::config::TrofosConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    effective: &TrofosConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No {} found, using defaults", config_path.display());
            }
            println!("# Effective values (with env overrides):");
            println!();

            let mut shown = effective.clone();
            if shown.admin.password.is_some() {
                shown.admin.password = Some("********".to_string());
            }
            let rendered =
                toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = effective.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            let rendered = toml::to_string_pretty(&TrofosConfig::default())
                .context("Failed to render default configuration")?;
            std::fs::write(config_path, rendered)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}
