//! Error taxonomy for the unified memory store.

/// Errors a Store/BM25/Semantic/Analyzer operation can surface to its caller.
///
/// `CapacityWarning` is deliberately absent here: it is a non-fatal condition
/// (I3) and is returned alongside a successful value, never as an `Err`.
/// `IndexError` is likewise absent — FTS and semantic-index failures are
/// recovered locally (substring fallback, index rebuild) and only logged.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("migration conflict: {0}")]
    MigrationConflict(String),

    #[error("storage error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
