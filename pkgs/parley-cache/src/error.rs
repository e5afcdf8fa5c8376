use thiserror::Error;

/// Errors surfaced by the cache layer.
///
/// The cache is subordinate to the remote source of truth, so most failures
/// are absorbed close to where they happen: reads degrade to empty results
/// and only the immediate caller of a failed write sees `WriteFailed`. The
/// one fatal case is `StoreUnavailable`: the database could not be opened
/// or migrated, and every cache operation will fail until restart.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("write failed: {0}")]
    WriteFailed(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
