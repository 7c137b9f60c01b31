//! SQL construction for the manifest asset table
//!
//! The manifest stores every asset in a single table `a` with single-letter
//! column names. Filters are interpolated directly: dump targets come from the
//! local operator, never from untrusted input.

use crate::region::Region;

/// Asset table name
pub const TABLE: &str = "a";
/// Relative asset path (`sound/c/snd_bgm.acb`, `//sound` for folder manifests)
pub const COL_PATH: &str = "n";
/// Content hash, doubling as the file name in the `dat` store
pub const COL_HASH: &str = "h";
/// Downloaded flag
pub const COL_DOWNLOADED: &str = "s";
/// Entry type (`manifest`, `assetbundle`, `sound`, ...)
pub const COL_TYPE: &str = "m";
/// Per-entry encryption key, 0 when the entry is not encrypted
pub const COL_KEY: &str = "e";

/// Rows whose type contains this word describe folders, not assets
pub const MANIFEST_TYPE: &str = "manifest";

/// Statement used to confirm a key unlocked the database
pub const PROBE_SQL: &str = "SELECT name FROM sqlite_master LIMIT 1;";

/// How a dump target is matched against asset paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    /// Match the target anywhere in the path (`LIKE '%target%'`)
    File,
    /// Match entries under the target folder (`LIKE 'target/%'`)
    #[default]
    Folder,
}

/// Selection of assets to read from the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub target: String,
    pub mode: DumpMode,
}

impl Filter {
    /// Every downloaded asset
    pub fn all() -> Self {
        Self::default()
    }

    /// Assets under `folder`
    pub fn folder<S: Into<String>>(folder: S) -> Self {
        Self {
            target: folder.into(),
            mode: DumpMode::Folder,
        }
    }

    /// Assets whose path contains `text`
    pub fn file<S: Into<String>>(text: S) -> Self {
        Self {
            target: text.into(),
            mode: DumpMode::File,
        }
    }

    pub fn is_file_dump(&self) -> bool {
        self.mode == DumpMode::File
    }

    /// WHERE clause for this filter
    pub fn to_sql(&self) -> String {
        build_filter(&self.target, self.mode)
    }
}

/// Build the WHERE clause selecting downloaded, non-manifest assets
///
/// A non-empty `dump_target` narrows the selection. In [`DumpMode::File`] the
/// target may match any part of the path, folder names included.
pub fn build_filter(dump_target: &str, mode: DumpMode) -> String {
    let mut sql = format!(
        "WHERE {COL_DOWNLOADED} = 1 AND {COL_TYPE} NOT LIKE '%{MANIFEST_TYPE}%'"
    );

    if !dump_target.is_empty() {
        match mode {
            DumpMode::File => sql.push_str(&format!(" AND {COL_PATH} LIKE '%{dump_target}%'")),
            DumpMode::Folder => sql.push_str(&format!(" AND {COL_PATH} LIKE '{dump_target}/%'")),
        }
    }

    sql
}

/// Columns selected for asset entries in the given region
pub fn entry_columns(region: Region) -> &'static [&'static str] {
    match region {
        Region::Jp => &[COL_PATH, COL_HASH],
        Region::Global => &[COL_PATH, COL_HASH, COL_KEY],
    }
}

/// `SELECT count(*)` over the filtered assets
pub fn count_sql(filter: &Filter) -> String {
    format!("SELECT count(*) FROM {TABLE} {}", filter.to_sql())
}

/// Select path, hash and (for Global) key of the filtered assets
pub fn entries_sql(region: Region, filter: &Filter) -> String {
    format!(
        "SELECT {} FROM {TABLE} {}",
        entry_columns(region).join(", "),
        filter.to_sql()
    )
}

/// Select every entry carrying a non-zero encryption key
pub fn keys_sql() -> String {
    format!("SELECT {COL_PATH}, {COL_KEY} FROM {TABLE} WHERE {COL_KEY} != 0")
}

/// Select folder manifest entries
pub fn folders_sql() -> String {
    format!("SELECT {COL_PATH} FROM {TABLE} WHERE {COL_TYPE} = '{MANIFEST_TYPE}'")
}

/// Folder manifest paths are stored as `//name`
pub fn folder_display_name(path: &str) -> String {
    path.replace("//", "")
}
