//! Gate error types.

use thiserror::Error;

/// Errors from the external terminal session.
///
/// `Clone` is required so one gate outcome can be fanned out to every
/// caller coalesced on the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    /// Invalid credentials. Fatal to the request; never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// External call failed for a transient reason (terminal busy,
    /// connection dropped, history not yet indexed). Retryable.
    #[error("Transient terminal error: {0}")]
    Transient(String),
}

impl GateError {
    /// Whether this error is an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result type alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;
