//! Runtime binding to the SQLite3 Multiple Ciphers shared library
//!
//! The game ships its manifest encrypted with sqlite3mc's ChaCha20 scheme,
//! which neither the bundled SQLite nor SQLCipher can read. The library is
//! loaded at runtime so the plain path keeps working without it.

use libloading::Library;
use std::ffi::{c_char, c_int, c_uchar, c_void, CStr, OsString};
use std::path::{Path, PathBuf};

use super::cipher::{CipherApi, DbHandle, StmtHandle};
use super::{ManifestError, Result};

type OpenV2Fn = unsafe extern "C" fn(*const c_char, *mut *mut c_void, c_int, *const c_char) -> c_int;
type CloseFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ErrmsgFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type ExecFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_char,
    *const c_void,
    *mut c_void,
    *mut *mut c_char,
) -> c_int;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type ConfigFn = unsafe extern "C" fn(*mut c_void, *const c_char, c_int) -> c_int;
type KeyFn = unsafe extern "C" fn(*mut c_void, *const c_void, c_int) -> c_int;
type PrepareFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_char,
    c_int,
    *mut *mut c_void,
    *mut *const c_char,
) -> c_int;
type StepFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type FinalizeFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ColumnTextFn = unsafe extern "C" fn(*mut c_void, c_int) -> *const c_uchar;
type ColumnIntFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type ColumnInt64Fn = unsafe extern "C" fn(*mut c_void, c_int) -> i64;

/// Resolved entry points. Only valid while the owning [`Library`] is loaded.
struct Symbols {
    open_v2: OpenV2Fn,
    close: CloseFn,
    errmsg: ErrmsgFn,
    exec: ExecFn,
    free: FreeFn,
    config: ConfigFn,
    key: KeyFn,
    prepare_v2: PrepareFn,
    step: StepFn,
    finalize: FinalizeFn,
    column_text: ColumnTextFn,
    column_int: ColumnIntFn,
    column_int64: ColumnInt64Fn,
}

/// Library file names tried by [`Sqlite3Mc::load_default`], in order
pub fn default_library_names() -> Vec<OsString> {
    if cfg!(target_os = "windows") {
        vec!["sqlite3mc_x64.dll".into(), "sqlite3mc.dll".into()]
    } else {
        vec![
            libloading::library_filename("sqlite3mc"),
            libloading::library_filename("sqlite3mc_x64"),
        ]
    }
}

/// sqlite3mc loaded from a shared library
pub struct Sqlite3Mc {
    symbols: Symbols,
    path: PathBuf,
    // Must outlive `symbols`
    _library: Library,
}

impl std::fmt::Debug for Sqlite3Mc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sqlite3Mc")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Resolve a symbol and copy the function pointer out of it
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T> {
    let symbol = library
        .get::<T>(name.as_bytes())
        .map_err(|e| ManifestError::Library(format!("missing symbol {name}: {e}")))?;
    Ok(*symbol)
}

impl Sqlite3Mc {
    /// Load the engine from a library path or file name
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading runs the library's initialisers; sqlite3mc has none
        // beyond SQLite's own static setup.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            ManifestError::Library(format!("failed to load {}: {}", path.display(), e))
        })?;

        // SAFETY: the aliases above mirror the sqlite3.h / sqlite3mc.h prototypes.
        let symbols = unsafe {
            Symbols {
                open_v2: resolve(&library, "sqlite3_open_v2")?,
                close: resolve(&library, "sqlite3_close")?,
                errmsg: resolve(&library, "sqlite3_errmsg")?,
                exec: resolve(&library, "sqlite3_exec")?,
                free: resolve(&library, "sqlite3_free")?,
                config: resolve(&library, "sqlite3mc_config")?,
                key: resolve(&library, "sqlite3_key")?,
                prepare_v2: resolve(&library, "sqlite3_prepare_v2")?,
                step: resolve(&library, "sqlite3_step")?,
                finalize: resolve(&library, "sqlite3_finalize")?,
                column_text: resolve(&library, "sqlite3_column_text")?,
                column_int: resolve(&library, "sqlite3_column_int")?,
                column_int64: resolve(&library, "sqlite3_column_int64")?,
            }
        };

        tracing::debug!("Loaded cipher engine from {}", path.display());
        Ok(Self {
            symbols,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Load the engine from the platform's default library names
    pub fn load_default() -> Result<Self> {
        let mut failures = Vec::new();
        for name in default_library_names() {
            match Self::load(Path::new(&name)) {
                Ok(engine) => return Ok(engine),
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(ManifestError::Library(failures.join("; ")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Copy a NUL-terminated UTF-8 string owned by SQLite
///
/// # Safety
/// `ptr` must be null or point to a valid C string.
unsafe fn copy_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

// SAFETY (all methods): handles passed in were produced by this engine, as
// required by the `CipherApi` contract, and strings are NUL-terminated `CStr`s.
impl CipherApi for Sqlite3Mc {
    fn open_v2(&self, filename: &CStr, flags: c_int) -> (c_int, DbHandle) {
        let mut db: *mut c_void = std::ptr::null_mut();
        let rc = unsafe { (self.symbols.open_v2)(filename.as_ptr(), &mut db, flags, std::ptr::null()) };
        (rc, DbHandle(db))
    }

    fn close(&self, db: DbHandle) -> c_int {
        unsafe { (self.symbols.close)(db.0) }
    }

    fn errmsg(&self, db: DbHandle) -> Option<String> {
        unsafe { copy_c_string((self.symbols.errmsg)(db.0)) }
    }

    fn exec(&self, db: DbHandle, sql: &CStr) -> (c_int, Option<String>) {
        let mut err: *mut c_char = std::ptr::null_mut();
        unsafe {
            let rc = (self.symbols.exec)(
                db.0,
                sql.as_ptr(),
                std::ptr::null(),
                std::ptr::null_mut(),
                &mut err,
            );
            let message = copy_c_string(err);
            if !err.is_null() {
                (self.symbols.free)(err.cast());
            }
            (rc, message)
        }
    }

    fn config(&self, db: DbHandle, param: &CStr, value: c_int) -> c_int {
        unsafe { (self.symbols.config)(db.0, param.as_ptr(), value) }
    }

    fn key(&self, db: DbHandle, key: &[u8]) -> c_int {
        let Ok(len) = c_int::try_from(key.len()) else {
            return super::cipher::SQLITE_MISUSE;
        };
        unsafe { (self.symbols.key)(db.0, key.as_ptr().cast(), len) }
    }

    fn prepare_v2(&self, db: DbHandle, sql: &CStr) -> (c_int, StmtHandle) {
        let mut stmt: *mut c_void = std::ptr::null_mut();
        let rc = unsafe {
            (self.symbols.prepare_v2)(db.0, sql.as_ptr(), -1, &mut stmt, std::ptr::null_mut())
        };
        (rc, StmtHandle(stmt))
    }

    fn step(&self, stmt: StmtHandle) -> c_int {
        unsafe { (self.symbols.step)(stmt.0) }
    }

    fn finalize(&self, stmt: StmtHandle) -> c_int {
        unsafe { (self.symbols.finalize)(stmt.0) }
    }

    fn column_text(&self, stmt: StmtHandle, col: c_int) -> Option<String> {
        unsafe { copy_c_string((self.symbols.column_text)(stmt.0, col).cast()) }
    }

    fn column_int(&self, stmt: StmtHandle, col: c_int) -> c_int {
        unsafe { (self.symbols.column_int)(stmt.0, col) }
    }

    fn column_int64(&self, stmt: StmtHandle, col: c_int) -> i64 {
        unsafe { (self.symbols.column_int64)(stmt.0, col) }
    }
}
