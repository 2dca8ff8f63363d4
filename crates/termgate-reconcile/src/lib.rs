//! Accuracy-guaranteed history reconciliation for closed positions.
//!
//! The external history log lags live closure detection: querying it
//! immediately after a position disappears frequently misses the record.
//! The reconciler drives a warm-up + settle + retry protocol against the
//! history log and always produces exactly one trade record per closure,
//! graded exact when the authoritative deal was found and approximate when
//! retries were exhausted and the record was rebuilt from the last open
//! snapshot.

pub mod reconciler;
pub mod risk;

pub use reconciler::{spawn_reconciler, Reconciler, ReconcilerConfig};
pub use risk::apply_risk_metrics;
