use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tensor computation error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("cannot read input directory {path}: {source}")]
    InputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("failed to read {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("rerank failed: {0}")]
    Rerank(String),
}

impl Error {
    /// Shorthand for a reader failure on `path`.
    pub fn file_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
