/// Errors that can occur within the storage layer.
///
/// The [`crate::MonitorData`] trait returns `anyhow::Result` at the seam so
/// remote implementations can surface their own error types; the SQLite
/// implementation produces these variants underneath.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (payload columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed back.
    #[error("Storage: invalid timestamp in column '{column}': {value}")]
    InvalidTimestamp { column: &'static str, value: String },

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
