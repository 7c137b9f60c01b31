//! Core CLI definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uma::Region;

#[derive(Parser)]
#[command(name = "uma")]
#[command(about = "Umamusume Asset Extractor", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that reads the manifest
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Game data folder containing `meta` and `dat` (auto-detected if omitted)
    #[arg(long, global = true, env = "UMA_DATA")]
    pub data: Option<PathBuf>,

    /// Game region: jp or global
    #[arg(short, long, global = true, env = "UMA_REGION")]
    pub region: Option<Region>,

    /// Path to the SQLite3 Multiple Ciphers library
    #[arg(long, global = true, env = "UMA_SQLITE3MC")]
    pub cipher_lib: Option<PathBuf>,

    /// Show per-file logs
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy assets out of the content store
    #[command(visible_alias = "x")]
    Extract {
        /// Folder to extract, or text to match in file names with --file
        /// (extracts everything if omitted)
        target: Option<String>,

        /// Match TARGET anywhere in file names instead of as a folder
        #[arg(short, long)]
        file: bool,

        /// Output folder (default: configured folder or ./Contents)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write per-file encryption keys to JSON without copying assets
    #[command(visible_alias = "k")]
    ExportKeys {
        /// Output file
        #[arg(short, long, default_value = "keys.json")]
        output: PathBuf,
    },

    /// List asset folders in the manifest
    #[command(visible_alias = "ls")]
    List,

    /// Count assets that an extraction would copy
    Count {
        /// Folder, or text to match in file names with --file
        target: Option<String>,

        /// Match TARGET anywhere in file names instead of as a folder
        #[arg(short, long)]
        file: bool,
    },

    /// Show detected game installations
    Installs,

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set default game data folder
        #[arg(long = "set-data")]
        data: Option<PathBuf>,

        /// Set default region
        #[arg(long = "set-region")]
        region: Option<Region>,

        /// Set default cipher library path
        #[arg(long = "set-cipher-lib")]
        cipher_lib: Option<PathBuf>,

        /// Set default output folder
        #[arg(long = "set-output")]
        output: Option<PathBuf>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
