//! Manifest database access
//!
//! The game's `meta` file is a SQLite database listing every asset. JP
//! installs usually ship it unencrypted; Global installs page-encrypt it. Both
//! are read through [`ManifestBackend`], picked once when the manifest is
//! opened:
//!
//! - [`PlainBackend`]: bundled SQLite via rusqlite
//! - [`CipherBackend`]: SQLite3 Multiple Ciphers, keyed with the region's
//!   derived key
//!
//! [`Manifest`] wraps a backend with typed queries whose rows are read through
//! a standard iterator.

mod cipher;
mod error;
#[cfg(feature = "native")]
mod native;
mod plain;

pub use cipher::{CipherApi, CipherBackend, DbHandle, StmtHandle, CIPHER_CHACHA20};
pub use error::{ManifestError, Result};
#[cfg(feature = "native")]
pub use native::{default_library_names, Sqlite3Mc};
pub use plain::PlainBackend;

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::crypto;
use crate::query::{self, Filter};
use crate::region::Region;

/// Which driver a manifest is read through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Plain,
    Cipher,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Plain => write!(f, "plain"),
            BackendKind::Cipher => write!(f, "cipher"),
        }
    }
}

/// Column access on the current row, by ordinal
pub trait RowView {
    /// Text value, `None` for NULL
    fn text(&self, index: usize) -> Result<Option<String>>;

    /// 32-bit integer value, 0 for NULL
    fn int(&self, index: usize) -> Result<i32>;

    /// 64-bit integer value, 0 for NULL
    fn int64(&self, index: usize) -> Result<i64>;
}

/// Forward-only cursor over a statement's results
///
/// The returned row is only valid until the next call. After an error the
/// cursor is exhausted.
pub trait Cursor {
    fn next_row(&mut self) -> Result<Option<&dyn RowView>>;
}

/// A prepared statement, released when dropped
pub trait Statement {
    /// Start reading results. Can only be called once per statement.
    fn rows(&mut self) -> Result<Box<dyn Cursor + '_>>;
}

/// An open manifest session on one of the two drivers
pub trait ManifestBackend {
    fn kind(&self) -> BackendKind;

    /// Run a trivial catalog query to confirm the file can be read
    fn validate_readable(&self) -> Result<()>;

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>>;

    /// Release the session. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// One downloaded asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// Path inside the game's asset tree, e.g. `sound/c/snd_bgm.acb`
    pub relative_path: String,
    /// Content hash; the file's name in the `dat` store
    pub source_file_name: String,
    /// Per-entry key (Global only), 0 when none
    pub encryption_key: i64,
}

impl ManifestRow {
    fn decode(region: Region, row: &dyn RowView) -> Result<Option<Self>> {
        let (Some(relative_path), Some(source_file_name)) = (row.text(0)?, row.text(1)?) else {
            tracing::debug!("Skipping manifest row with NULL path or hash");
            return Ok(None);
        };

        let encryption_key = if region.has_entry_keys() {
            row.int64(2)?
        } else {
            0
        };

        Ok(Some(Self {
            relative_path,
            source_file_name,
            encryption_key,
        }))
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// An asset path and its non-zero encryption key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub relative_path: String,
    pub encryption_key: i64,
}

impl KeyEntry {
    fn decode(row: &dyn RowView) -> Result<Option<Self>> {
        let Some(relative_path) = row.text(0)? else {
            tracing::debug!("Skipping key row with NULL path");
            return Ok(None);
        };
        let encryption_key = row.int64(1)?;
        if encryption_key == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            relative_path,
            encryption_key,
        }))
    }
}

type Decoder<'m, T> = Box<dyn Fn(&dyn RowView) -> Result<Option<T>> + 'm>;

/// A prepared, typed query
///
/// Call [`Query::rows`] to iterate. The decoder returns `Ok(None)` for rows
/// that should be skipped.
pub struct Query<'m, T> {
    stmt: Box<dyn Statement + 'm>,
    decode: Decoder<'m, T>,
}

impl<'m, T> Query<'m, T> {
    /// Iterate the results. Fails with [`ManifestError::QueryConsumed`] on a
    /// second call.
    pub fn rows(&mut self) -> Result<Rows<'_, T>> {
        let cursor = self.stmt.rows()?;
        Ok(Rows {
            cursor,
            decode: self.decode.as_ref(),
            done: false,
        })
    }

    /// Collect every row, stopping at the first error
    pub fn collect_all(mut self) -> Result<Vec<T>> {
        self.rows()?.collect()
    }
}

/// Iterator over decoded rows; yields at most one error, then ends
pub struct Rows<'s, T> {
    cursor: Box<dyn Cursor + 's>,
    decode: &'s dyn Fn(&dyn RowView) -> Result<Option<T>>,
    done: bool,
}

impl<T> Iterator for Rows<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let decoded = match self.cursor.next_row() {
                Ok(Some(row)) => (self.decode)(row),
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => Err(e),
            };

            match decoded {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl<T> FusedIterator for Rows<'_, T> {}

/// How [`Manifest::open_with`] picks and builds the backend
#[derive(Default, Clone)]
pub struct OpenOptions {
    /// Force a driver instead of sniffing the header
    pub variant: Option<BackendKind>,
    /// Shared library providing the cipher engine
    pub cipher_library: Option<PathBuf>,
    /// Use this engine instead of loading one
    pub engine: Option<Rc<dyn CipherApi>>,
}

impl std::fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenOptions")
            .field("variant", &self.variant)
            .field("cipher_library", &self.cipher_library)
            .field("engine", &self.engine.as_ref().map(|_| "<engine>"))
            .finish()
    }
}

impl OpenOptions {
    pub fn variant(mut self, kind: BackendKind) -> Self {
        self.variant = Some(kind);
        self
    }

    pub fn cipher_library<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cipher_library = Some(path.into());
        self
    }

    pub fn engine(mut self, engine: Rc<dyn CipherApi>) -> Self {
        self.engine = Some(engine);
        self
    }

    fn load_engine(&self) -> Result<Rc<dyn CipherApi>> {
        if let Some(engine) = &self.engine {
            return Ok(Rc::clone(engine));
        }
        load_cipher_engine(self.cipher_library.as_deref())
    }
}

#[cfg(feature = "native")]
fn load_cipher_engine(library: Option<&Path>) -> Result<Rc<dyn CipherApi>> {
    let engine = match library {
        Some(path) => Sqlite3Mc::load(path)?,
        None => Sqlite3Mc::load_default()?,
    };
    Ok(Rc::new(engine))
}

#[cfg(not(feature = "native"))]
fn load_cipher_engine(_library: Option<&Path>) -> Result<Rc<dyn CipherApi>> {
    Err(ManifestError::Library(
        "built without the `native` feature".to_string(),
    ))
}

/// An open manifest database
pub struct Manifest {
    backend: Box<dyn ManifestBackend>,
    region: Region,
    path: PathBuf,
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("kind", &self.backend.kind())
            .field("region", &self.region)
            .field("path", &self.path)
            .finish()
    }
}

impl Manifest {
    /// Open a manifest, picking the driver from the file header
    pub fn open<P: AsRef<Path>>(path: P, region: Region) -> Result<Self> {
        Self::open_with(path, region, &OpenOptions::default())
    }

    /// Open a manifest with explicit options
    ///
    /// Encrypted manifests are keyed with `region`'s derived key and probed
    /// before any query can run.
    pub fn open_with<P: AsRef<Path>>(path: P, region: Region, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let kind = options.variant.unwrap_or_else(|| {
            if crypto::is_encrypted(path) {
                BackendKind::Cipher
            } else {
                BackendKind::Plain
            }
        });

        tracing::info!("Opening {} manifest {} ({})", kind, path.display(), region);

        let backend: Box<dyn ManifestBackend> = match kind {
            BackendKind::Plain => {
                let backend = PlainBackend::open(path)?;
                backend.validate_readable()?;
                Box::new(backend)
            }
            BackendKind::Cipher => {
                let engine = options.load_engine()?;
                Box::new(CipherBackend::unlock(engine, path, &region.derived_key())?)
            }
        };

        Ok(Self::from_backend(backend, region, path))
    }

    /// Wrap an already opened and validated backend
    pub fn from_backend<P: Into<PathBuf>>(backend: Box<dyn ManifestBackend>, region: Region, path: P) -> Self {
        Self {
            backend,
            region,
            path: path.into(),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepare `sql` and decode its rows with `decode`
    pub fn query<'m, T, F>(&'m self, sql: &str, decode: F) -> Result<Query<'m, T>>
    where
        F: Fn(&dyn RowView) -> Result<Option<T>> + 'm,
    {
        tracing::debug!("Query: {}", sql);
        let stmt = self.backend.prepare(sql)?;
        Ok(Query {
            stmt,
            decode: Box::new(decode),
        })
    }

    /// Number of assets matching `filter`
    pub fn count(&self, filter: &Filter) -> Result<usize> {
        let mut query = self.query(&query::count_sql(filter), |row| row.int64(0).map(Some))?;
        let count = query.rows()?.next().ok_or(ManifestError::NoRows)??;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Assets matching `filter`, with region-appropriate columns
    pub fn entries(&self, filter: &Filter) -> Result<Query<'_, ManifestRow>> {
        let region = self.region;
        self.query(&query::entries_sql(region, filter), move |row| {
            ManifestRow::decode(region, row)
        })
    }

    /// Every asset with a non-zero encryption key
    pub fn encryption_keys(&self) -> Result<Query<'_, KeyEntry>> {
        self.query(&query::keys_sql(), KeyEntry::decode)
    }

    /// Folder names, with the `//` marker removed
    pub fn folders(&self) -> Result<Query<'_, String>> {
        self.query(&query::folders_sql(), |row| {
            Ok(row.text(0)?.map(|path| query::folder_display_name(&path)))
        })
    }

    /// Close the session; also happens on drop
    pub fn close(mut self) -> Result<()> {
        self.backend.close()
    }
}
