//! Game regions
//!
//! The region decides which static secret unlocks the manifest and which
//! columns are read from the asset table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{derive_key, GLOBAL_DB_KEY, JP_DB_KEY};

/// Game region of an installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Japanese client (Steam JP, DMM)
    #[default]
    Jp,
    /// Global client (Steam)
    Global,
}

impl Region {
    /// Static secret for this region's manifest
    pub fn secret(self) -> &'static [u8] {
        match self {
            Region::Jp => &JP_DB_KEY,
            Region::Global => &GLOBAL_DB_KEY,
        }
    }

    /// Cipher key for this region's manifest
    pub fn derived_key(self) -> Vec<u8> {
        derive_key(self.secret())
    }

    /// Whether rows carry a per-entry encryption key column
    pub fn has_entry_keys(self) -> bool {
        matches!(self, Region::Global)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Region::Jp => "Japan",
            Region::Global => "Global",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Region::Jp => "jp",
            Region::Global => "global",
        })
    }
}

/// Error returned when parsing an unknown region name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown region '{0}' (expected 'jp' or 'global')")]
pub struct ParseRegionError(String);

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jp" | "ja" | "japan" => Ok(Region::Jp),
            "global" | "gl" | "en" => Ok(Region::Global),
            _ => Err(ParseRegionError(s.to_string())),
        }
    }
}
