//! Encrypted manifest access through SQLite3 Multiple Ciphers
//!
//! The plain driver cannot read page-encrypted manifests, so these are opened
//! through a cipher-capable SQLite engine. The engine is reached through
//! [`CipherApi`], a thin mirror of the C entry points, which keeps handle
//! ownership and error mapping here and the `unsafe` calls in the binding.
//!
//! Opening sequence: `sqlite3_open_v2` (read-only), `sqlite3mc_config`
//! selecting the cipher, `sqlite3_key`, then a probe query. Queries may only
//! run after all four succeed.

use std::ffi::{c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{BackendKind, Cursor, ManifestBackend, ManifestError, Result, RowView, Statement};
use crate::query::PROBE_SQL;

pub const SQLITE_OK: c_int = 0;
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_ROW: c_int = 100;
pub const SQLITE_DONE: c_int = 101;
pub const SQLITE_OPEN_READONLY: c_int = 0x0000_0001;

/// `sqlite3mc_config` parameter selecting the cipher scheme
pub const CIPHER_PARAM: &CStr = c"cipher";
/// sqlite3mc cipher index for ChaCha20-Poly1305
pub const CIPHER_CHACHA20: c_int = 3;

/// Opaque `sqlite3*` handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHandle(pub *mut c_void);

/// Opaque `sqlite3_stmt*` handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtHandle(pub *mut c_void);

impl DbHandle {
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl StmtHandle {
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Primitive operations of a cipher-capable SQLite engine
///
/// Each method maps 1:1 to a C entry point and reports the raw result code.
/// Implementations must accept the handles they returned earlier and nothing
/// else.
pub trait CipherApi {
    /// `sqlite3_open_v2` without a VFS name
    fn open_v2(&self, filename: &CStr, flags: c_int) -> (c_int, DbHandle);

    /// `sqlite3_close`
    fn close(&self, db: DbHandle) -> c_int;

    /// `sqlite3_errmsg`
    fn errmsg(&self, db: DbHandle) -> Option<String>;

    /// `sqlite3_exec` without a callback; the error message is already freed
    fn exec(&self, db: DbHandle, sql: &CStr) -> (c_int, Option<String>);

    /// `sqlite3mc_config`; returns the new value, or -1 on failure
    fn config(&self, db: DbHandle, param: &CStr, value: c_int) -> c_int;

    /// `sqlite3_key` with raw key bytes
    fn key(&self, db: DbHandle, key: &[u8]) -> c_int;

    /// `sqlite3_prepare_v2` of a NUL-terminated statement
    fn prepare_v2(&self, db: DbHandle, sql: &CStr) -> (c_int, StmtHandle);

    /// `sqlite3_step`
    fn step(&self, stmt: StmtHandle) -> c_int;

    /// `sqlite3_finalize`
    fn finalize(&self, stmt: StmtHandle) -> c_int;

    /// `sqlite3_column_text`, decoded as UTF-8
    fn column_text(&self, stmt: StmtHandle, col: c_int) -> Option<String>;

    /// `sqlite3_column_int`
    fn column_int(&self, stmt: StmtHandle, col: c_int) -> c_int;

    /// `sqlite3_column_int64`
    fn column_int64(&self, stmt: StmtHandle, col: c_int) -> i64;
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let text = path
        .to_str()
        .ok_or_else(|| ManifestError::InvalidPath(path.display().to_string()))?;
    CString::new(text).map_err(|_| ManifestError::InvalidPath(path.display().to_string()))
}

fn column_index(index: usize) -> Result<c_int> {
    c_int::try_from(index).map_err(|_| ManifestError::Column {
        index,
        message: "index out of range".to_string(),
    })
}

/// Manifest session on a cipher engine handle
///
/// Owns the native database handle. It is closed by [`ManifestBackend::close`]
/// or on drop, whichever happens first.
pub struct CipherBackend {
    api: Rc<dyn CipherApi>,
    db: DbHandle,
    path: PathBuf,
}

impl CipherBackend {
    /// Open a manifest read-only without setting a key
    pub fn open<P: AsRef<Path>>(api: Rc<dyn CipherApi>, path: P) -> Result<Self> {
        let path = path.as_ref();
        let filename = path_to_cstring(path)?;
        let (rc, db) = api.open_v2(&filename, SQLITE_OPEN_READONLY);

        if rc != SQLITE_OK || db.is_null() {
            let message = if db.is_null() {
                "(no db handle)".to_string()
            } else {
                let message = api.errmsg(db).unwrap_or_default();
                // A handle is allocated even when the open fails
                api.close(db);
                message
            };
            return Err(ManifestError::Open {
                path: path.to_path_buf(),
                code: rc,
                message,
            });
        }

        tracing::debug!("Opened encrypted manifest {}", path.display());
        Ok(Self {
            api,
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open, key and validate a manifest in one step
    ///
    /// The handle is closed again if any step after the open fails.
    pub fn unlock<P: AsRef<Path>>(api: Rc<dyn CipherApi>, path: P, key: &[u8]) -> Result<Self> {
        let backend = Self::open(api, path)?;
        backend.set_key(key)?;
        backend.validate_readable()?;
        Ok(backend)
    }

    /// Select the cipher scheme and apply the key
    pub fn set_key(&self, key: &[u8]) -> Result<()> {
        let db = self.handle()?;

        if self.api.config(db, CIPHER_PARAM, CIPHER_CHACHA20) < 0 {
            return Err(ManifestError::CipherConfig {
                param: "cipher",
                value: CIPHER_CHACHA20,
            });
        }

        let rc = self.api.key(db, key);
        if rc != SQLITE_OK {
            return Err(ManifestError::Key {
                code: rc,
                message: self.errmsg(),
            });
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self) -> Result<DbHandle> {
        if self.db.is_null() {
            Err(ManifestError::Closed)
        } else {
            Ok(self.db)
        }
    }

    fn errmsg(&self) -> String {
        self.api
            .errmsg(self.db)
            .unwrap_or_else(|| format!("(null errmsg, db={:p})", self.db.0))
    }
}

impl ManifestBackend for CipherBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cipher
    }

    fn validate_readable(&self) -> Result<()> {
        let db = self.handle()?;
        let probe = CString::new(PROBE_SQL).map_err(|e| ManifestError::Validation(e.to_string()))?;
        let (rc, message) = self.api.exec(db, &probe);

        if rc != SQLITE_OK {
            return Err(ManifestError::Validation(
                message.unwrap_or_else(|| self.errmsg()),
            ));
        }
        Ok(())
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| ManifestError::Prepare {
            code: SQLITE_MISUSE,
            message: "statement contains a NUL byte".to_string(),
            sql: sql.to_string(),
        })?;

        let (rc, stmt) = self.api.prepare_v2(db, &c_sql);
        if rc != SQLITE_OK {
            return Err(ManifestError::Prepare {
                code: rc,
                message: self.errmsg(),
                sql: sql.to_string(),
            });
        }

        Ok(Box::new(CipherStatement {
            backend: self,
            stmt,
            consumed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if self.db.is_null() {
            return Ok(());
        }

        let rc = self.api.close(self.db);
        if rc != SQLITE_OK {
            return Err(ManifestError::Close {
                code: rc,
                message: self.errmsg(),
            });
        }

        self.db = DbHandle::null();
        tracing::debug!("Closed encrypted manifest {}", self.path.display());
        Ok(())
    }
}

impl Drop for CipherBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}

/// Prepared statement; finalized exactly once when dropped
struct CipherStatement<'a> {
    backend: &'a CipherBackend,
    stmt: StmtHandle,
    consumed: bool,
}

impl Statement for CipherStatement<'_> {
    fn rows(&mut self) -> Result<Box<dyn Cursor + '_>> {
        if self.consumed {
            return Err(ManifestError::QueryConsumed);
        }
        self.consumed = true;

        Ok(Box::new(CipherCursor {
            row: CipherRow {
                api: self.backend.api.as_ref(),
                stmt: self.stmt,
            },
            backend: self.backend,
            finished: false,
        }))
    }
}

impl Drop for CipherStatement<'_> {
    fn drop(&mut self) {
        self.backend.api.finalize(self.stmt);
    }
}

struct CipherCursor<'s> {
    row: CipherRow<'s>,
    backend: &'s CipherBackend,
    finished: bool,
}

impl Cursor for CipherCursor<'_> {
    fn next_row(&mut self) -> Result<Option<&dyn RowView>> {
        // Empty statements (only whitespace or comments) prepare to NULL
        if self.finished || self.row.stmt.is_null() {
            self.finished = true;
            return Ok(None);
        }

        match self.row.api.step(self.row.stmt) {
            SQLITE_ROW => Ok(Some(&self.row)),
            SQLITE_DONE => {
                self.finished = true;
                Ok(None)
            }
            rc => {
                self.finished = true;
                Err(ManifestError::Step {
                    code: rc,
                    message: self.backend.errmsg(),
                })
            }
        }
    }
}

/// Column view on the current row of a statement
struct CipherRow<'s> {
    api: &'s dyn CipherApi,
    stmt: StmtHandle,
}

impl RowView for CipherRow<'_> {
    fn text(&self, index: usize) -> Result<Option<String>> {
        Ok(self.api.column_text(self.stmt, column_index(index)?))
    }

    fn int(&self, index: usize) -> Result<i32> {
        Ok(self.api.column_int(self.stmt, column_index(index)?))
    }

    fn int64(&self, index: usize) -> Result<i64> {
        Ok(self.api.column_int64(self.stmt, column_index(index)?))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory engine with call accounting

    use super::*;
    use std::cell::{Cell, RefCell};

    /// Cell value held by the fake engine
    #[derive(Debug, Clone, PartialEq)]
    pub enum Value {
        Null,
        Int(i64),
        Text(String),
    }

    impl From<&str> for Value {
        fn from(s: &str) -> Self {
            Value::Text(s.to_string())
        }
    }

    impl From<i64> for Value {
        fn from(i: i64) -> Self {
            Value::Int(i)
        }
    }

    /// Result set returned for statements containing `pattern`
    pub struct Script {
        pub pattern: String,
        pub rows: Vec<Vec<Value>>,
        /// Fail the step that would produce this (1-based) row
        pub fail_at_row: Option<usize>,
    }

    #[derive(Default)]
    struct ScriptCursor {
        rows: Vec<Vec<Value>>,
        fail_at_row: Option<usize>,
        position: usize,
    }

    pub struct FakeEngine {
        pub expected_key: Vec<u8>,
        pub open_rc: c_int,
        pub key_rc: c_int,
        pub config_rc: c_int,
        pub scripts: Vec<Script>,

        pub calls: RefCell<Vec<&'static str>>,
        pub opens: Cell<usize>,
        pub closes: Cell<usize>,
        pub prepares: Cell<usize>,
        pub finalizes: Cell<usize>,
        pub steps: Cell<usize>,
        pub config_args: RefCell<Vec<(String, c_int)>>,

        applied_key: RefCell<Option<Vec<u8>>>,
        statements: RefCell<Vec<ScriptCursor>>,
        last_error: RefCell<String>,
        db_token: Box<u8>,
    }

    impl FakeEngine {
        pub fn new(expected_key: Vec<u8>) -> Self {
            Self {
                expected_key,
                open_rc: SQLITE_OK,
                key_rc: SQLITE_OK,
                config_rc: CIPHER_CHACHA20,
                scripts: Vec::new(),
                calls: RefCell::new(Vec::new()),
                opens: Cell::new(0),
                closes: Cell::new(0),
                prepares: Cell::new(0),
                finalizes: Cell::new(0),
                steps: Cell::new(0),
                config_args: RefCell::new(Vec::new()),
                applied_key: RefCell::new(None),
                statements: RefCell::new(Vec::new()),
                last_error: RefCell::new(String::new()),
                db_token: Box::new(0),
            }
        }

        pub fn with_script(mut self, pattern: &str, rows: Vec<Vec<Value>>) -> Self {
            self.scripts.push(Script {
                pattern: pattern.to_string(),
                rows,
                fail_at_row: None,
            });
            self
        }

        pub fn failing_at(mut self, row: usize) -> Self {
            if let Some(script) = self.scripts.last_mut() {
                script.fail_at_row = Some(row);
            }
            self
        }

        fn db(&self) -> DbHandle {
            DbHandle(&*self.db_token as *const u8 as *mut c_void)
        }

        fn unlocked(&self) -> bool {
            self.applied_key.borrow().as_deref() == Some(self.expected_key.as_slice())
        }

        fn record(&self, call: &'static str) {
            self.calls.borrow_mut().push(call);
        }

        /// Statement handles are 1-based indexes into `statements`
        fn cursor_index(stmt: StmtHandle) -> usize {
            stmt.0 as usize - 1
        }

        fn value(&self, stmt: StmtHandle, col: c_int) -> Value {
            let statements = self.statements.borrow();
            let cursor = &statements[Self::cursor_index(stmt)];
            cursor
                .position
                .checked_sub(1)
                .and_then(|row| cursor.rows.get(row))
                .and_then(|row| row.get(col as usize))
                .cloned()
                .unwrap_or(Value::Null)
        }
    }

    impl CipherApi for FakeEngine {
        fn open_v2(&self, _filename: &CStr, flags: c_int) -> (c_int, DbHandle) {
            self.record("open");
            assert_eq!(flags, SQLITE_OPEN_READONLY);
            self.opens.set(self.opens.get() + 1);
            if self.open_rc != SQLITE_OK {
                *self.last_error.borrow_mut() = "unable to open database file".to_string();
            }
            (self.open_rc, self.db())
        }

        fn close(&self, db: DbHandle) -> c_int {
            self.record("close");
            assert_eq!(db, self.db());
            self.closes.set(self.closes.get() + 1);
            SQLITE_OK
        }

        fn errmsg(&self, _db: DbHandle) -> Option<String> {
            Some(self.last_error.borrow().clone())
        }

        fn exec(&self, _db: DbHandle, _sql: &CStr) -> (c_int, Option<String>) {
            self.record("exec");
            if self.unlocked() {
                (SQLITE_OK, None)
            } else {
                (26, Some("file is not a database".to_string()))
            }
        }

        fn config(&self, _db: DbHandle, param: &CStr, value: c_int) -> c_int {
            self.record("config");
            self.config_args
                .borrow_mut()
                .push((param.to_string_lossy().into_owned(), value));
            self.config_rc
        }

        fn key(&self, _db: DbHandle, key: &[u8]) -> c_int {
            self.record("key");
            if self.key_rc == SQLITE_OK {
                *self.applied_key.borrow_mut() = Some(key.to_vec());
            } else {
                *self.last_error.borrow_mut() = "key rejected".to_string();
            }
            self.key_rc
        }

        fn prepare_v2(&self, _db: DbHandle, sql: &CStr) -> (c_int, StmtHandle) {
            self.record("prepare");
            let sql = sql.to_string_lossy();
            let Some(script) = self.scripts.iter().find(|s| sql.contains(&s.pattern)) else {
                *self.last_error.borrow_mut() = format!("no such table in: {sql}");
                return (1, StmtHandle::null());
            };

            self.prepares.set(self.prepares.get() + 1);
            let mut statements = self.statements.borrow_mut();
            statements.push(ScriptCursor {
                rows: script.rows.clone(),
                fail_at_row: script.fail_at_row,
                position: 0,
            });
            (SQLITE_OK, StmtHandle(statements.len() as *mut c_void))
        }

        fn step(&self, stmt: StmtHandle) -> c_int {
            self.steps.set(self.steps.get() + 1);
            let mut statements = self.statements.borrow_mut();
            let cursor = &mut statements[Self::cursor_index(stmt)];
            cursor.position += 1;

            if cursor.fail_at_row == Some(cursor.position) {
                *self.last_error.borrow_mut() = "database disk image is malformed".to_string();
                return 11;
            }
            if cursor.position <= cursor.rows.len() {
                SQLITE_ROW
            } else {
                SQLITE_DONE
            }
        }

        fn finalize(&self, _stmt: StmtHandle) -> c_int {
            self.record("finalize");
            self.finalizes.set(self.finalizes.get() + 1);
            SQLITE_OK
        }

        fn column_text(&self, stmt: StmtHandle, col: c_int) -> Option<String> {
            match self.value(stmt, col) {
                Value::Null => None,
                Value::Int(i) => Some(i.to_string()),
                Value::Text(t) => Some(t),
            }
        }

        fn column_int(&self, stmt: StmtHandle, col: c_int) -> c_int {
            self.column_int64(stmt, col) as c_int
        }

        fn column_int64(&self, stmt: StmtHandle, col: c_int) -> i64 {
            match self.value(stmt, col) {
                Value::Int(i) => i,
                Value::Text(t) => t.parse().unwrap_or(0),
                Value::Null => 0,
            }
        }
    }
}
