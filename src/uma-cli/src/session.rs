//! Resolves which game data folder and region a command works on
//!
//! Precedence: command-line flag or environment, then the config file, then
//! auto-detection.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use uma::{GameData, GameInstall, Manifest, OpenOptions, Region};

use crate::cli::GlobalArgs;
use crate::config::Config;

/// A resolved game data folder and region
#[derive(Debug)]
pub struct Session {
    pub data: GameData,
    pub region: Region,
    pub options: OpenOptions,
}

impl Session {
    pub fn resolve(args: &GlobalArgs, config: &Config) -> Result<Self> {
        Self::resolve_with(args, config, uma::detect_installs)
    }

    /// Resolve using `detect` for installations when no path was given
    pub fn resolve_with<F>(args: &GlobalArgs, config: &Config, detect: F) -> Result<Self>
    where
        F: FnOnce() -> Vec<GameInstall>,
    {
        let explicit_region = args.region.or(config.region);

        let (root, region) = match args.data.clone().or_else(|| config.data_path.clone()) {
            Some(root) => (root, explicit_region.unwrap_or_default()),
            None => {
                let install = pick_install(detect())?;
                let region = match (explicit_region, install.region) {
                    (Some(region), _) => region,
                    (None, Some(region)) => region,
                    (None, None) => bail!(
                        "{} is shared by Global (Steam) and Japan (DMM) installs; \
                         pass --region global or --region jp",
                        install.path.display()
                    ),
                };
                println!("Found: {}", install.label);
                (install.path, region)
            }
        };

        let data = GameData::open(&root).context("Please start the game first and try again")?;

        let mut options = OpenOptions::default();
        if let Some(lib) = args.cipher_lib.clone().or_else(|| config.cipher_library.clone()) {
            options = options.cipher_library(lib);
        }

        println!("Path: {}", data.root().display());
        println!("Region: {}", region.display_name());

        Ok(Self {
            data,
            region,
            options,
        })
    }

    pub fn open_manifest(&self) -> Result<Manifest> {
        let meta = self.data.meta_path();
        Manifest::open_with(&meta, self.region, &self.options)
            .with_context(|| format!("Failed to open manifest {}", meta.display()))
    }
}

fn pick_install(mut installs: Vec<GameInstall>) -> Result<GameInstall> {
    if installs.is_empty() {
        bail!("Game data folder not found; pass --data or run `uma configure --set-data <path>`");
    }

    if installs.len() > 1 {
        tracing::warn!(
            "Multiple installations found ({}); using {}. Pass --data to choose another.",
            installs
                .iter()
                .map(|i| i.label)
                .collect::<Vec<_>>()
                .join(", "),
            installs[0].label
        );
    }

    Ok(installs.swap_remove(0))
}

/// Output folder from the flag, the config file, or the default
pub fn output_dir(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(uma::paths::DEFAULT_OUTPUT_DIR))
}
