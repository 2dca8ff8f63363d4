//! Terminal gateway service.
//!
//! Orchestrates the full pipeline:
//! - Per-account request serialization and TTL caching (dispatcher)
//! - Position snapshot diffing into closure events (tracker)
//! - History reconciliation into graded trade records (reconciler)
//! - Daily JSONL trade record files (persistence)

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, UnconfiguredGate};
pub use config::{AccountConfig, AppConfig, PersistenceConfig};
pub use error::{AppError, AppResult};
