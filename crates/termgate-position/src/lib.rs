//! Position snapshot tracking and closure detection.
//!
//! Consumes every fresh fetch result from the dispatcher, diffs the open
//! ticket set against the previous snapshot per account and emits one
//! `ClosureEvent` per ticket that disappeared.

pub mod tracker;

pub use tracker::{spawn_snapshot_tracker, SnapshotTrackerHandle, SnapshotTrackerTask, TrackerMsg};
