//! Store error type.

use thiserror::Error;

/// Persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any database-level error, including constraint violations that are
    /// not absorbed by an idempotent repository operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
