//! Config command - show or create the configuration file.

use anyhow::Context;
use lumen_core::LumenConfig;
use std::path::Path;

/// Print the effective configuration.
pub fn show(config_path: &Path) -> anyhow::Result<()> {
    let config = LumenConfig::load_from(config_path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;

    if !config_path.exists() {
        eprintln!("# {} does not exist, showing defaults", config_path.display());
    }
    println!("# Data directory: {}", config.base_dir()?.display());
    print!("{}", rendered);
    Ok(())
}

/// Write a default configuration file.
pub fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }

    LumenConfig::default().save_to(config_path)?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Print the configuration file path.
pub fn path(config_path: &Path) -> anyhow::Result<()> {
    println!("{}", config_path.display());
    Ok(())
}
