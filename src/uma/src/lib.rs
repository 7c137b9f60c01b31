//! # uma
//!
//! Umamusume asset manifest library - key derivation, encrypted manifest
//! access, and asset extraction.
//!
//! This library provides functionality to:
//! - Detect whether a `meta` manifest is page-encrypted
//! - Derive the region's manifest key
//! - Query the manifest through the bundled SQLite or SQLite3 Multiple Ciphers
//! - Copy selected assets out of the `dat` content store and export their keys
//!
//! ## Example
//!
//! ```no_run
//! use uma::{extract, ExtractContext, Filter, GameData, Manifest, Region};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = GameData::open("Persistent")?;
//! let manifest = Manifest::open(data.meta_path(), Region::Global)?;
//!
//! println!("{} sound files", manifest.count(&Filter::folder("sound"))?);
//!
//! let mut ctx = ExtractContext::new("Contents");
//! extract(&manifest, &data, &Filter::folder("sound"), &mut ctx, |_| {})?;
//! println!("Copied {}", ctx.stats.copied);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod extract;
pub mod manifest;
pub mod paths;
pub mod query;
pub mod region;

pub use crypto::{derive_key, is_encrypted};
pub use extract::{
    export_keys, extract, write_keys, CopyOutcome, ExtractContext, ExtractError, ExtractStats,
    KeyMap, Progress,
};
pub use manifest::{
    BackendKind, KeyEntry, Manifest, ManifestError, ManifestRow, OpenOptions, Query, Rows,
};
pub use paths::{detect_installs, GameData, GameDataError, GameInstall};
pub use query::{build_filter, DumpMode, Filter};
pub use region::{ParseRegionError, Region};
