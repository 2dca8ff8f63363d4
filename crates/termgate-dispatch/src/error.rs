//! Dispatch error types.

use termgate_gate::GateError;
use thiserror::Error;

/// Errors surfaced to callers of the dispatcher.
///
/// `QueueTimeout` is deliberately distinct from `Gate`: clients use it to
/// tell "try again shortly" apart from "your login is wrong".
///
/// `Clone` is required because one outcome is fanned out to every caller
/// coalesced on the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The caller's wait for a queue turn exceeded the request timeout.
    #[error("Timed out waiting for queue turn")]
    QueueTimeout,

    /// The account work line is gone (dispatcher shutting down).
    #[error("Dispatch queue closed")]
    QueueClosed,

    /// No credentials are registered for the account (history path only;
    /// a closure event always implies a prior successful fetch).
    #[error("No credentials registered for account {0}")]
    UnknownAccount(String),

    /// The terminal call itself failed.
    #[error("Gate error: {0}")]
    Gate(#[from] GateError),
}

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
