/// Errors surfaced by the lifecycle handler and suppression engine.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The underlying storage operation failed; the enclosing transaction
    /// must be rolled back.
    #[error("Handler: storage error: {0}")]
    Storage(#[from] alertmgr_storage::StorageError),

    /// The operation's precondition no longer holds (e.g. unsuppressing an
    /// alert that has meanwhile cleared or expired). Rejected, not retried.
    #[error("Handler: precondition violated: {0}")]
    Precondition(String),
}

/// Convenience `Result` alias for handler operations.
pub type Result<T> = std::result::Result<T, HandlerError>;
