//! History-log deal types and query windows.
//!
//! Deals are the authoritative execution records in the external terminal's
//! history log. The log is eventually consistent: records appear with a lag
//! after live closure, which is what the reconciler's warm-up and retry
//! protocol is designed around.

use crate::position::{PositionSide, TicketId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a deal relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealEntry {
    /// Deal opened (or added to) the position.
    In,
    /// Deal closed (or reduced) the position.
    Out,
}

/// One authoritative execution record from the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    /// Ticket of the position this deal belongs to.
    pub position: TicketId,
    /// Entry direction.
    pub entry: DealEntry,
    /// Instrument symbol.
    pub symbol: String,
    /// Deal side.
    pub side: PositionSide,
    /// Executed volume in lots.
    pub volume: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Execution time.
    pub executed_at: DateTime<Utc>,
    /// Realized profit on this deal.
    pub profit: Decimal,
    /// Commission charged on this deal.
    pub commission: Decimal,
    /// Swap charged on this deal.
    pub swap: Decimal,
}

impl Deal {
    /// Whether this deal closed out the given position.
    pub fn closes(&self, ticket: TicketId) -> bool {
        self.position == ticket && self.entry == DealEntry::Out
    }

    /// Whether this deal opened the given position.
    pub fn opens(&self, ticket: TicketId) -> bool {
        self.position == ticket && self.entry == DealEntry::In
    }
}

/// Half-open time window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl HistoryWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Window covering the last `days` days up to now.
    pub fn last_days(days: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::days(days),
            to,
        }
    }

    /// Window covering the last `minutes` minutes up to now.
    pub fn last_minutes(minutes: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::minutes(minutes),
            to,
        }
    }

    /// Window span.
    pub fn span(&self) -> Duration {
        self.to - self.from
    }

    /// Whether a timestamp falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_constructors() {
        let w = HistoryWindow::last_days(90);
        assert_eq!(w.span(), Duration::days(90));

        let w = HistoryWindow::last_minutes(30);
        assert_eq!(w.span(), Duration::minutes(30));
    }

    #[test]
    fn test_window_contains() {
        let to = Utc::now();
        let w = HistoryWindow::new(to - Duration::hours(1), to);
        assert!(w.contains(to - Duration::minutes(30)));
        assert!(!w.contains(to - Duration::hours(2)));
        assert!(!w.contains(to + Duration::minutes(1)));
    }
}
