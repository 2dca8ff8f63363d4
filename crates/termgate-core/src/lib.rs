//! Core domain types for the terminal gateway.
//!
//! This crate provides the fundamental types shared across the gateway:
//! - `AccountKey`: Unique identifier for one external terminal account
//! - `OpenPosition`, `FetchResult`: Immutable open-position snapshots
//! - `Deal`: Authoritative history-log execution records
//! - `ClosureEvent`, `TradeRecord`: Closure detection and reconciliation output

pub mod account;
pub mod deal;
pub mod error;
pub mod position;
pub mod trade;

pub use account::{AccountKey, Credentials};
pub use deal::{Deal, DealEntry, HistoryWindow};
pub use error::{CoreError, Result};
pub use position::{FetchResult, FreshResult, OpenPosition, PositionSide, TicketId};
pub use trade::{AccuracyGrade, ClosureEvent, EventId, TradeRecord, TradeSink};
