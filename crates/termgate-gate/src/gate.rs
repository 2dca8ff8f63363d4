//! Session gate trait for terminal access.
//!
//! Provides a trait-based abstraction over the external terminal so that:
//! - the dispatcher and reconciler can be tested against fakes
//! - the vendor adapter stays outside the core
//! - transport details never leak into queueing or reconciliation logic
//!
//! Callers must uphold the exclusivity contract: never two concurrent
//! calls for the same account. The dispatcher's per-account work line is
//! the single enforcement point for that invariant.

use std::pin::Pin;
use std::sync::Arc;

use crate::error::GateResult;
use termgate_core::{Credentials, Deal, FetchResult, HistoryWindow};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Synchronous-per-account access to the external terminal.
///
/// Each method performs a full login / query / logout cycle against the
/// terminal session for the given credentials. Safe to call repeatedly,
/// not concurrently per account.
pub trait SessionGate: Send + Sync {
    /// Fetch the current open positions for an account.
    fn fetch_positions<'a>(
        &'a self,
        creds: &'a Credentials,
    ) -> BoxFuture<'a, GateResult<FetchResult>>;

    /// Fetch history deals inside a time window.
    ///
    /// The history log is eventually consistent and only reflects
    /// previously warmed data; callers that need a specific record issue
    /// a wide warm-up query first (see the reconciler).
    fn fetch_history_deals<'a>(
        &'a self,
        creds: &'a Credentials,
        window: HistoryWindow,
    ) -> BoxFuture<'a, GateResult<Vec<Deal>>>;
}

/// Shared trait object for dependency injection.
pub type DynSessionGate = Arc<dyn SessionGate>;
