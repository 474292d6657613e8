use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias for the sync module.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Field name to rejection messages, as returned by the API for
/// payload validation failures.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors surfaced by the entity cache.
///
/// The error is `Clone` so a single failed fetch can be fanned out to
/// every caller awaiting the same in-flight request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote call did not complete (offline, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// 401 after a failed token refresh. Never retried here; the
    /// presentation layer redirects to re-authentication.
    #[error("not authenticated")]
    Unauthenticated,

    /// The remote rejected the payload with per-field messages.
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// Remote state diverged from the optimistic assumption.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The entity no longer exists on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other server-side failure.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl SyncError {
    /// Builds a validation error for a single field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.into()]);
        SyncError::Validation(fields)
    }
}
