//! Unencrypted manifest access using rusqlite

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use super::{BackendKind, Cursor, ManifestBackend, ManifestError, Result, RowView, Statement};
use crate::query::PROBE_SQL;

/// Manifest opened through the bundled SQLite driver
pub struct PlainBackend {
    conn: Option<Connection>,
    path: PathBuf,
}

/// Split a rusqlite error into the native result code and message
fn native_parts(e: &rusqlite::Error) -> (i32, String) {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) => (
            err.extended_code,
            msg.clone().unwrap_or_else(|| err.to_string()),
        ),
        other => (rusqlite::ffi::SQLITE_ERROR, other.to_string()),
    }
}

fn step_error(e: rusqlite::Error) -> ManifestError {
    let (code, message) = native_parts(&e);
    ManifestError::Step { code, message }
}

fn column_error(index: usize, e: rusqlite::Error) -> ManifestError {
    ManifestError::Column {
        index,
        message: e.to_string(),
    }
}

impl PlainBackend {
    /// Open a manifest read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            let (code, message) = native_parts(&e);
            ManifestError::Open {
                path: path.to_path_buf(),
                code,
                message,
            }
        })?;

        tracing::debug!("Opened plain manifest {}", path.display());
        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(ManifestError::Closed)
    }
}

impl ManifestBackend for PlainBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Plain
    }

    fn validate_readable(&self) -> Result<()> {
        self.conn()?
            .execute_batch(PROBE_SQL)
            .map_err(|e| ManifestError::Validation(native_parts(&e).1))
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        let stmt = self.conn()?.prepare(sql).map_err(|e| {
            let (code, message) = native_parts(&e);
            ManifestError::Prepare {
                code,
                message,
                sql: sql.to_string(),
            }
        })?;

        Ok(Box::new(PlainStatement {
            stmt,
            consumed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| {
                let (code, message) = native_parts(&e);
                ManifestError::Close { code, message }
            })?;
            tracing::debug!("Closed plain manifest {}", self.path.display());
        }
        Ok(())
    }
}

struct PlainStatement<'c> {
    stmt: rusqlite::Statement<'c>,
    consumed: bool,
}

impl Statement for PlainStatement<'_> {
    fn rows(&mut self) -> Result<Box<dyn Cursor + '_>> {
        if self.consumed {
            return Err(ManifestError::QueryConsumed);
        }
        self.consumed = true;

        let rows = self.stmt.query([]).map_err(step_error)?;
        Ok(Box::new(PlainCursor { rows }))
    }
}

struct PlainCursor<'s> {
    rows: rusqlite::Rows<'s>,
}

impl Cursor for PlainCursor<'_> {
    fn next_row(&mut self) -> Result<Option<&dyn RowView>> {
        match self.rows.next() {
            Ok(Some(row)) => Ok(Some(row as &dyn RowView)),
            Ok(None) => Ok(None),
            Err(e) => Err(step_error(e)),
        }
    }
}

/// Column access with SQLite's own type coercions (NULL reads as 0, numbers
/// read as text), matching the native column accessors
impl RowView for rusqlite::Row<'_> {
    fn text(&self, index: usize) -> Result<Option<String>> {
        let value = self.get_ref(index).map_err(|e| column_error(index, e))?;
        Ok(match value {
            ValueRef::Null => None,
            ValueRef::Integer(i) => Some(i.to_string()),
            ValueRef::Real(f) => Some(f.to_string()),
            ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
        })
    }

    fn int(&self, index: usize) -> Result<i32> {
        // sqlite3_column_int keeps the low 32 bits
        Ok(self.int64(index)? as i32)
    }

    fn int64(&self, index: usize) -> Result<i64> {
        let value = self.get_ref(index).map_err(|e| column_error(index, e))?;
        Ok(match value {
            ValueRef::Null => 0,
            ValueRef::Integer(i) => i,
            ValueRef::Real(f) => f as i64,
            ValueRef::Text(t) | ValueRef::Blob(t) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
        })
    }
}
