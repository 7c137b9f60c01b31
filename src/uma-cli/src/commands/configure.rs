//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up uma CLI defaults.

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;
use uma::Region;

/// Values to store with `configure`
#[derive(Debug, Default)]
pub struct Settings {
    pub data: Option<PathBuf>,
    pub region: Option<Region>,
    pub cipher_lib: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Settings {
    fn is_empty(&self) -> bool {
        self.data.is_none()
            && self.region.is_none()
            && self.cipher_lib.is_none()
            && self.output.is_none()
    }
}

/// Handle the configure command
///
/// # Arguments
/// * `settings` - Values to store; unset fields keep their current value
/// * `show` - If true, show current configuration
pub fn handle(settings: Settings, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if settings.is_empty() {
        show_usage();
        return Ok(());
    }

    apply(&mut config, settings);
    let path = config.save()?;
    show_config(&config);
    println!("Config saved to: {}", path.display());

    Ok(())
}

/// Merge new settings into the configuration
fn apply(config: &mut Config, settings: Settings) {
    if let Some(data) = settings.data {
        config.data_path = Some(data);
    }
    if let Some(region) = settings.region {
        config.region = Some(region);
    }
    if let Some(lib) = settings.cipher_lib {
        config.cipher_library = Some(lib);
    }
    if let Some(output) = settings.output {
        config.output_dir = Some(output);
    }
}

fn describe(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(not set)".to_string())
}

/// Display current configuration
fn show_config(config: &Config) {
    println!(
        "Game data:      {}",
        describe(config.data_path.as_ref().map(|p| p.display().to_string()))
    );
    println!(
        "Region:         {}",
        describe(config.region.map(|r| r.display_name().to_string()))
    );
    println!(
        "Cipher library: {}",
        describe(config.cipher_library.as_ref().map(|p| p.display().to_string()))
    );
    println!(
        "Output folder:  {}",
        describe(config.output_dir.as_ref().map(|p| p.display().to_string()))
    );

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: uma configure --set-data <PATH> --set-region <jp|global>");
    println!("   or: uma configure --show");
    println!();
    println!("Note: The game data folder is the one containing `meta` and `dat`.");
    println!("      AppData installs are shared by Global and DMM, so set the region.");
}
