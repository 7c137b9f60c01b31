//! Game data location detection
//!
//! The game keeps its asset store in a "Persistent" data folder containing the
//! `meta` manifest and the `dat` content store. Where that folder lives depends
//! on the storefront:
//!
//! - **Steam (Japan)**: `C:\Program Files (x86)\Steam\steamapps\common\UmamusumePrettyDerby_Jpn\UmamusumePrettyDerby_Jpn_Data\Persistent`
//! - **AppData**: `%USERPROFILE%\AppData\LocalLow\Cygames\umamusume`, shared by
//!   Global Steam and older DMM Japan installs, so the region must be chosen
//! - **DMM (Japan)**: `%USERPROFILE%\Umamusume\umamusume_Data\Persistent`

use std::path::{Path, PathBuf};

use crate::region::Region;

/// Manifest file name inside the data folder
pub const META_FILE: &str = "meta";
/// Content store directory inside the data folder
pub const DAT_DIR: &str = "dat";
/// Default extraction folder name
pub const DEFAULT_OUTPUT_DIR: &str = "Contents";

/// A detected game installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInstall {
    /// Data folder holding `meta` and `dat`
    pub path: PathBuf,
    /// Human readable storefront name
    pub label: &'static str,
    /// Region, if the location implies one
    pub region: Option<Region>,
}

impl GameInstall {
    /// Whether the region has to be chosen by the user
    pub fn needs_region(&self) -> bool {
        self.region.is_none()
    }
}

/// Known install locations, relative to the base folders they hang off
pub fn candidate_installs(
    program_files_x86: Option<&Path>,
    local_app_data: Option<&Path>,
    user_profile: Option<&Path>,
) -> Vec<GameInstall> {
    let mut candidates = Vec::new();

    if let Some(base) = program_files_x86 {
        candidates.push(GameInstall {
            path: base
                .join("Steam")
                .join("steamapps")
                .join("common")
                .join("UmamusumePrettyDerby_Jpn")
                .join("UmamusumePrettyDerby_Jpn_Data")
                .join("Persistent"),
            label: "Japan (Steam)",
            region: Some(Region::Jp),
        });
    }

    if let Some(base) = local_app_data {
        // LocalLow sits next to Local
        let local_low = match base.file_name() {
            Some(name) => base.with_file_name(format!("{}Low", name.to_string_lossy())),
            None => base.join("LocalLow"),
        };
        candidates.push(GameInstall {
            path: local_low.join("Cygames").join("umamusume"),
            label: "AppData (Global/DMM shared)",
            region: None,
        });
    }

    if let Some(base) = user_profile {
        candidates.push(GameInstall {
            path: base
                .join("Umamusume")
                .join("umamusume_Data")
                .join("Persistent"),
            label: "Japan (DMM)",
            region: Some(Region::Jp),
        });
    }

    candidates
}

/// Installations whose data folder exists on this machine
///
/// Returns an empty list on platforms the game does not run on.
pub fn detect_installs() -> Vec<GameInstall> {
    #[cfg(target_os = "windows")]
    {
        let program_files_x86 = std::env::var_os("ProgramFiles(x86)")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        let local_app_data = dirs::data_local_dir();
        let user_profile = dirs::home_dir();

        existing_installs(candidate_installs(
            Some(&program_files_x86),
            local_app_data.as_deref(),
            user_profile.as_deref(),
        ))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Vec::new()
    }
}

/// Keep only candidates whose folder exists
pub fn existing_installs(candidates: Vec<GameInstall>) -> Vec<GameInstall> {
    candidates
        .into_iter()
        .filter(|install| {
            let found = install.path.is_dir();
            tracing::debug!(
                "{}: {} ({})",
                install.label,
                install.path.display(),
                if found { "found" } else { "missing" }
            );
            found
        })
        .collect()
}

/// Problems with a game data folder
#[derive(Debug, thiserror::Error)]
pub enum GameDataError {
    #[error("Game data folder {0} not found")]
    NotFound(PathBuf),

    #[error("Manifest database {0} not found")]
    MissingManifest(PathBuf),
}

/// A game data folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameData {
    root: PathBuf,
}

impl GameData {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Open a data folder, checking that it holds a manifest
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Self, GameDataError> {
        let data = Self::new(root);
        data.validate()?;
        Ok(data)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    pub fn dat_path(&self) -> PathBuf {
        self.root.join(DAT_DIR)
    }

    /// Location of a hash in the content store: `dat/<first two chars>/<hash>`
    ///
    /// Returns `None` for hashes that cannot name a store file.
    pub fn source_path(&self, hash: &str) -> Option<PathBuf> {
        let prefix = hash.get(..2)?;
        if hash.contains(['/', '\\']) || hash.contains("..") {
            return None;
        }
        Some(self.dat_path().join(prefix).join(hash))
    }

    pub fn validate(&self) -> Result<(), GameDataError> {
        if !self.root.is_dir() {
            return Err(GameDataError::NotFound(self.root.clone()));
        }
        let meta = self.meta_path();
        if !meta.is_file() {
            return Err(GameDataError::MissingManifest(meta));
        }
        Ok(())
    }
}
