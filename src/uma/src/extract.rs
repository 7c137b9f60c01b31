//! Asset extraction
//!
//! Copies assets selected from the manifest out of the content store into an
//! output tree that mirrors their manifest paths. Files already present with
//! identical contents are skipped; differing ones are replaced.
//!
//! Run state (counters and collected keys) lives on [`ExtractContext`], which
//! the caller owns and can inspect afterwards.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use crate::manifest::{Manifest, ManifestError, ManifestRow};
use crate::paths::GameData;
use crate::query::Filter;

/// File name of the key map written next to extracted assets
pub const KEYS_FILE: &str = "keys.json";

/// Sorted map of asset path to encryption key
pub type KeyMap = BTreeMap<String, i64>;

/// Errors raised during extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize keys: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid content hash '{0}'")]
    InvalidHash(String),

    #[error("Asset path escapes the output folder: {0}")]
    UnsafePath(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Counters for one extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Files still expected to be copied; starts at the matching row count
    /// and drops by one for every skip
    pub planned: usize,
    pub copied: usize,
    pub skipped: usize,
}

/// State carried through an extraction run
#[derive(Debug)]
pub struct ExtractContext {
    pub output_dir: PathBuf,
    pub stats: ExtractStats,
    pub keys: KeyMap,
}

impl ExtractContext {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            stats: ExtractStats::default(),
            keys: KeyMap::new(),
        }
    }
}

/// What happened to a single asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// An older copy with different contents was overwritten
    Replaced,
    /// The output already holds an identical file
    Identical,
    /// File dump whose target only matched a folder name
    NameMismatch,
}

impl CopyOutcome {
    pub fn is_skip(self) -> bool {
        matches!(self, CopyOutcome::Identical | CopyOutcome::NameMismatch)
    }
}

/// Per-asset progress report
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub path: &'a str,
    pub outcome: CopyOutcome,
    pub stats: ExtractStats,
}

/// Join a manifest path onto `root`, refusing anything but plain segments
fn output_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut segments = 0;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(segment) => {
                path.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            _ => return Err(ExtractError::UnsafePath(relative.to_string())),
        }
    }
    if segments == 0 {
        return Err(ExtractError::UnsafePath(relative.to_string()));
    }
    Ok(path)
}

/// Compare two files by size, then byte by byte
pub fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    if a == b {
        return Ok(true);
    }
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut left = BufReader::new(File::open(a)?);
    let mut right = BufReader::new(File::open(b)?);
    let mut left_buf = [0u8; 8192];
    let mut right_buf = [0u8; 8192];

    loop {
        let n = left.read(&mut left_buf)?;
        if n == 0 {
            // Sizes matched, so both are exhausted
            return Ok(true);
        }
        right.read_exact(&mut right_buf[..n])?;
        if left_buf[..n] != right_buf[..n] {
            return Ok(false);
        }
    }
}

/// Copy one asset from the content store into `output_dir`
pub fn copy_entry(
    data: &GameData,
    row: &ManifestRow,
    filter: &Filter,
    output_dir: &Path,
) -> Result<CopyOutcome> {
    if filter.is_file_dump() && !row.file_name().contains(filter.target.as_str()) {
        tracing::debug!(
            "{} does not contain \"{}\" in name, skipping",
            row.relative_path,
            filter.target
        );
        return Ok(CopyOutcome::NameMismatch);
    }

    let source = data
        .source_path(&row.source_file_name)
        .ok_or_else(|| ExtractError::InvalidHash(row.source_file_name.clone()))?;
    let dest = output_path(output_dir, &row.relative_path)?;

    let mut outcome = CopyOutcome::Copied;
    if dest.exists() {
        if files_identical(&source, &dest).at(&dest)? {
            tracing::debug!("{} already copied, skipping", row.relative_path);
            return Ok(CopyOutcome::Identical);
        }
        tracing::debug!("{} exists but differs, replacing", row.relative_path);
        fs::remove_file(&dest).at(&dest)?;
        outcome = CopyOutcome::Replaced;
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }

    tracing::debug!("{} -> {}", row.source_file_name, row.relative_path);
    fs::copy(&source, &dest).at(&source)?;
    Ok(outcome)
}

/// Extract every asset matching `filter`
///
/// Returns the path of the written key map, if one was written. Nothing is
/// created when no asset matches.
pub fn extract<F>(
    manifest: &Manifest,
    data: &GameData,
    filter: &Filter,
    ctx: &mut ExtractContext,
    mut progress: F,
) -> Result<Option<PathBuf>>
where
    F: FnMut(&Progress<'_>),
{
    ctx.stats = ExtractStats {
        planned: manifest.count(filter)?,
        ..ExtractStats::default()
    };
    ctx.keys.clear();

    if ctx.stats.planned == 0 {
        tracing::info!("No files match the selection");
        return Ok(None);
    }

    tracing::info!("Copying up to {} files to {}", ctx.stats.planned, ctx.output_dir.display());
    fs::create_dir_all(&ctx.output_dir).at(&ctx.output_dir)?;

    let mut query = manifest.entries(filter)?;
    for row in query.rows()? {
        let row = row?;
        let outcome = copy_entry(data, &row, filter, &ctx.output_dir)?;

        if outcome.is_skip() {
            ctx.stats.planned = ctx.stats.planned.saturating_sub(1);
            ctx.stats.skipped += 1;
        } else {
            ctx.stats.copied += 1;
        }

        if row.encryption_key != 0 {
            ctx.keys.insert(row.relative_path.clone(), row.encryption_key);
        }

        progress(&Progress {
            path: &row.relative_path,
            outcome,
            stats: ctx.stats,
        });
    }

    tracing::info!(
        "Completed: {} copied, {} skipped",
        ctx.stats.copied,
        ctx.stats.skipped
    );

    if manifest.region().has_entry_keys() && !ctx.keys.is_empty() {
        let path = ctx.output_dir.join(KEYS_FILE);
        write_keys(&path, &ctx.keys)?;
        return Ok(Some(path));
    }
    Ok(None)
}

/// Read every non-zero entry key without copying anything
pub fn export_keys(manifest: &Manifest) -> Result<KeyMap> {
    let mut keys = KeyMap::new();
    let mut query = manifest.encryption_keys()?;
    for entry in query.rows()? {
        let entry = entry?;
        keys.insert(entry.relative_path, entry.encryption_key);
    }
    tracing::debug!("Read {} encryption keys", keys.len());
    Ok(keys)
}

/// Write a key map as pretty-printed JSON
pub fn write_keys(path: &Path, keys: &KeyMap) -> Result<()> {
    let json = serde_json::to_string_pretty(keys)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).at(parent)?;
    }
    fs::write(path, json).at(path)?;
    tracing::info!("Exported {} encryption keys to {}", keys.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use rusqlite::Connection;

    struct Fixture {
        _dir: tempfile::TempDir,
        data: GameData,
        out: PathBuf,
    }

    fn store(data: &GameData, hash: &str, contents: &[u8]) {
        let path = data.source_path(hash).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let data = GameData::new(dir.path().join("Persistent"));
        fs::create_dir_all(data.root()).unwrap();

        let conn = Connection::open(data.meta_path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE a (n TEXT, h TEXT, s INTEGER, m TEXT, e INTEGER);
             INSERT INTO a VALUES ('a/b.bin', 'h1aaaa', 1, 'assetbundle', 0);
             INSERT INTO a VALUES ('sound/c.acb', 'h2bbbb', 1, 'sound', 11);
             INSERT INTO a VALUES ('chara/1001/body.bin', 'h3cccc', 1, 'assetbundle', 12);
             INSERT INTO a VALUES ('chara/face_1001.bin', 'h4dddd', 1, 'assetbundle', 0);
             INSERT INTO a VALUES ('//sound', 'h5eeee', 1, 'manifest', 0);",
        )
        .unwrap();

        store(&data, "h1aaaa", b"bundle");
        store(&data, "h2bbbb", b"sound bank");
        store(&data, "h3cccc", b"body");
        store(&data, "h4dddd", b"face");

        let out = dir.path().join("Contents");
        Fixture {
            _dir: dir,
            data,
            out,
        }
    }

    fn run(fx: &Fixture, region: Region, filter: &Filter) -> (ExtractContext, Option<PathBuf>) {
        let manifest = Manifest::open(fx.data.meta_path(), region).unwrap();
        let mut ctx = ExtractContext::new(&fx.out);
        let keys = extract(&manifest, &fx.data, filter, &mut ctx, |_| {}).unwrap();
        (ctx, keys)
    }

    #[test]
    fn test_extract_folder() {
        let fx = fixture();
        let (ctx, keys) = run(&fx, Region::Jp, &Filter::folder("sound"));

        assert_eq!(
            ctx.stats,
            ExtractStats {
                planned: 1,
                copied: 1,
                skipped: 0
            }
        );
        assert_eq!(fs::read(fx.out.join("sound/c.acb")).unwrap(), b"sound bank");
        assert!(!fx.out.join("a/b.bin").exists());
        // JP rows carry no keys
        assert!(keys.is_none());
        assert!(ctx.keys.is_empty());
    }

    #[test]
    fn test_extract_skips_identical_and_replaces_different() {
        let fx = fixture();
        run(&fx, Region::Jp, &Filter::all());
        fs::write(fx.out.join("a/b.bin"), b"stale").unwrap();

        let mut outcomes = Vec::new();
        let manifest = Manifest::open(fx.data.meta_path(), Region::Jp).unwrap();
        let mut ctx = ExtractContext::new(&fx.out);
        extract(&manifest, &fx.data, &Filter::all(), &mut ctx, |p| {
            outcomes.push((p.path.to_string(), p.outcome));
        })
        .unwrap();

        assert_eq!(outcomes[0], ("a/b.bin".to_string(), CopyOutcome::Replaced));
        assert!(outcomes[1..].iter().all(|(_, o)| *o == CopyOutcome::Identical));
        assert_eq!(ctx.stats.copied, 1);
        assert_eq!(ctx.stats.skipped, 3);
        assert_eq!(ctx.stats.planned, 1);
        assert_eq!(fs::read(fx.out.join("a/b.bin")).unwrap(), b"bundle");
    }

    #[test]
    fn test_file_dump_skips_folder_only_matches() {
        let fx = fixture();
        let (ctx, _) = run(&fx, Region::Jp, &Filter::file("1001"));

        // Both rows match in SQL; only the file name containing the target is copied
        assert_eq!(ctx.stats.copied, 1);
        assert_eq!(ctx.stats.skipped, 1);
        assert_eq!(ctx.stats.planned, 1);
        assert!(fx.out.join("chara/face_1001.bin").exists());
        assert!(!fx.out.join("chara/1001/body.bin").exists());
    }

    #[test]
    fn test_no_matches_creates_nothing() {
        let fx = fixture();
        let (ctx, keys) = run(&fx, Region::Jp, &Filter::folder("missing"));
        assert_eq!(ctx.stats, ExtractStats::default());
        assert!(keys.is_none());
        assert!(!fx.out.exists());
    }

    #[test]
    fn test_global_extract_writes_keys() {
        let fx = fixture();
        let (ctx, keys) = run(&fx, Region::Global, &Filter::all());

        let path = keys.unwrap();
        assert_eq!(path, fx.out.join(KEYS_FILE));
        let written: KeyMap = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, ctx.keys);
        assert_eq!(written.len(), 2);
        assert_eq!(written["sound/c.acb"], 11);
        assert_eq!(written["chara/1001/body.bin"], 12);
    }

    #[test]
    fn test_missing_source_fails() {
        let fx = fixture();
        fs::remove_file(fx.data.source_path("h2bbbb").unwrap()).unwrap();

        let manifest = Manifest::open(fx.data.meta_path(), Region::Jp).unwrap();
        let mut ctx = ExtractContext::new(&fx.out);
        let err = extract(&manifest, &fx.data, &Filter::folder("sound"), &mut ctx, |_| {}).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }), "{err:?}");
    }

    #[test]
    fn test_export_keys() {
        let fx = fixture();
        let manifest = Manifest::open(fx.data.meta_path(), Region::Global).unwrap();
        let keys = export_keys(&manifest).unwrap();
        assert_eq!(keys.len(), 2);

        let path = fx.out.join("nested").join(KEYS_FILE);
        write_keys(&path, &keys).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"chara/1001/body.bin\": 12"));
    }

    #[test]
    fn test_output_path_rejects_escapes() {
        let root = Path::new("/out");
        assert_eq!(output_path(root, "a/./b.bin").unwrap(), PathBuf::from("/out/a/b.bin"));
        assert!(matches!(output_path(root, "../x"), Err(ExtractError::UnsafePath(_))));
        assert!(matches!(output_path(root, "/etc/x"), Err(ExtractError::UnsafePath(_))));
        assert!(matches!(output_path(root, ""), Err(ExtractError::UnsafePath(_))));
    }

    #[test]
    fn test_invalid_hash() {
        let fx = fixture();
        let row = ManifestRow {
            relative_path: "x/y".to_string(),
            source_file_name: "h".to_string(),
            encryption_key: 0,
        };
        let err = copy_entry(&fx.data, &row, &Filter::all(), &fx.out).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidHash(_)));
    }

    #[test]
    fn test_files_identical() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, vec![7u8; 20_000]).unwrap();
        fs::write(&b, vec![7u8; 20_000]).unwrap();
        let mut different = vec![7u8; 20_000];
        different[19_999] = 8;
        fs::write(&c, different).unwrap();

        assert!(files_identical(&a, &b).unwrap());
        assert!(!files_identical(&a, &c).unwrap());
        assert!(files_identical(&a, &a).unwrap());
        fs::write(&c, b"short").unwrap();
        assert!(!files_identical(&a, &c).unwrap());
    }
}
