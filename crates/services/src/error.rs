//! Shared error types for the services crate.

use thiserror::Error;

use breath_core::model::SessionValidationError;
use storage::repository::StorageError;

/// Errors emitted by `ProgressService`.
///
/// Validation failures are rejected before any record mutation; storage
/// conflicts are retried once internally and only surface here when the
/// retry budget is spent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Validation(#[from] SessionValidationError),

    #[error("no progress record for user")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
