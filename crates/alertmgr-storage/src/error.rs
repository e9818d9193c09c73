/// Errors that can occur within the storage layer.
///
/// Not-found is deliberately not an error: lookups return `Option` because a
/// missing row is an expected branch in the lifecycle handler, not a failure.
///
/// # Examples
///
/// ```rust
/// use alertmgr_storage::error::StorageError;
///
/// let err = StorageError::NotFound { entity: "alert", id: 42 };
/// assert!(err.to_string().contains("alert"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An update targeted a row that does not exist.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: i64 },

    /// An insert would violate a uniqueness constraint.
    #[error("Storage: duplicate {entity} (key={key})")]
    Duplicate { entity: &'static str, key: String },

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
