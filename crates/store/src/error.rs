use thiserror::Error;

/// Errors surfaced by store operations. SQL errors are never swallowed or
/// implicitly retried; callers decide what a failure means.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded into its domain type.
    #[error(transparent)]
    Decode(#[from] holocene_core::CoreError),

    /// A stored JSON blob was not valid JSON.
    #[error("invalid stored json: {0}")]
    Json(#[from] serde_json::Error),
}
