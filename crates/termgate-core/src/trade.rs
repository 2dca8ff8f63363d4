//! Closure events and reconciled trade records.
//!
//! A `ClosureEvent` is produced once per ticket that disappears from an
//! account's open-position set. The reconciler consumes it exactly once and
//! always produces exactly one `TradeRecord`, graded by how the exit data
//! was obtained.

use crate::account::AccountKey;
use crate::position::{OpenPosition, PositionSide, TicketId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation id for one closure event.
///
/// Format: `tg_{timestamp_ms}_{uuid_short}`, carried through reconciliation
/// logs so one closure's attempts can be grepped together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("tg_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detected position closure, pending reconciliation.
///
/// Carries the last open snapshot of the position so the approximate
/// fallback can be built without any shared lookup.
#[derive(Debug, Clone)]
pub struct ClosureEvent {
    /// Correlation id.
    pub id: EventId,
    /// Account the position belonged to.
    pub account: AccountKey,
    /// Ticket that closed.
    pub ticket: TicketId,
    /// When the closure was detected (not when it happened).
    pub detected_at: DateTime<Utc>,
    /// Last open-position snapshot before the ticket disappeared.
    pub last_seen: OpenPosition,
}

impl ClosureEvent {
    pub fn new(account: AccountKey, last_seen: OpenPosition, detected_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            account,
            ticket: last_seen.ticket,
            detected_at,
            last_seen,
        }
    }
}

/// Confidence grade of a reconstructed trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyGrade {
    /// Exit data taken directly from matched history deals.
    Exact,
    /// Exit data reconstructed from the last open snapshot.
    Approximate,
}

impl fmt::Display for AccuracyGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Approximate => write!(f, "approximate"),
        }
    }
}

/// One fully reconciled closed trade.
///
/// Immutable once produced; handed to the persistence sink exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub account: AccountKey,
    pub ticket: TicketId,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: Decimal,

    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,

    /// Gross P&L reported by the terminal.
    pub gross_profit: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    /// gross + commission + swap (commission and swap are negative charges).
    pub net_profit: Decimal,

    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,

    pub accuracy: AccuracyGrade,

    /// Amount at risk implied by the stop distance, if a stop was set.
    pub risk_amount: Option<Decimal>,
    /// gross_profit / risk_amount.
    pub r_multiple: Option<Decimal>,
    /// Take-profit distance over stop distance.
    pub risk_reward: Option<Decimal>,

    pub recorded_at: DateTime<Utc>,
}

/// One-way handoff for completed trade records.
///
/// Implementations must be safe to call from concurrent reconciliation
/// tasks. Failures are the sink's problem; the reconciler never retries a
/// handoff.
pub trait TradeSink: Send + Sync {
    fn record(&self, record: &TradeRecord);
}
