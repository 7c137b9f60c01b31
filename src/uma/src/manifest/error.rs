//! Error types for manifest access

use std::path::PathBuf;

/// Errors raised while opening or querying a manifest database
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to open {path}: rc={code} errmsg={message}")]
    Open {
        path: PathBuf,
        code: i32,
        message: String,
    },

    #[error("Failed to set cipher parameter '{param}' to {value}")]
    CipherConfig { param: &'static str, value: i32 },

    #[error("sqlite3_key failed: rc={code} errmsg={message}")]
    Key { code: i32, message: String },

    #[error("Database validation failed: {0}")]
    Validation(String),

    #[error("Prepare failed: rc={code} errmsg={message} sql={sql}")]
    Prepare {
        code: i32,
        message: String,
        sql: String,
    },

    #[error("Step failed: rc={code} errmsg={message}")]
    Step { code: i32, message: String },

    #[error("Close failed: rc={code} errmsg={message}")]
    Close { code: i32, message: String },

    #[error("Rows of this statement were already consumed")]
    QueryConsumed,

    #[error("Database handle is closed")]
    Closed,

    #[error("Column {index}: {message}")]
    Column { index: usize, message: String },

    #[error("Query returned no rows")]
    NoRows,

    #[error("Cipher engine unavailable: {0}")]
    Library(String),

    #[error("Path cannot be passed to the cipher engine: {0}")]
    InvalidPath(String),
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
