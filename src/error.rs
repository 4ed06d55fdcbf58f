//! Error types shared across the cache and thumbnail modules.

use thiserror::Error;

/// Everything that can go wrong inside the cache.
///
/// Callers are expected to treat `NotReady` as a signal to fall back to
/// direct filesystem access, not as a hard failure.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The metadata store was never initialized or failed to open.
    #[error("metadata cache is not ready")]
    NotReady,

    /// An underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An access level string was neither "public" nor "private".
    #[error("invalid access level: {0:?}")]
    InvalidAccessLevel(String),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

/// Result alias used throughout the crate.
pub type CacheResult<T> = Result<T, CacheError>;
