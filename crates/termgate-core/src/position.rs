//! Open-position snapshot types.
//!
//! A `FetchResult` is the immutable outcome of one exclusive terminal call:
//! the full set of open positions plus the fetch timestamp. Results are
//! superseded by newer fetches, never mutated in place.

use crate::account::AccountKey;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Terminal position ticket id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl TicketId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position side: buy (long) or sell (short).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Buy,
    Sell,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// One open position as reported by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    /// Position ticket id.
    pub ticket: TicketId,
    /// Instrument symbol (e.g., "EURUSD").
    pub symbol: String,
    /// Position side.
    pub side: PositionSide,
    /// Volume in lots.
    pub volume: Decimal,
    /// Entry price.
    pub price_open: Decimal,
    /// Current market price at fetch time.
    pub price_current: Decimal,
    /// Stop-loss level, if set.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level, if set.
    pub take_profit: Option<Decimal>,
    /// Floating profit at fetch time.
    pub profit: Decimal,
    /// Accrued swap at fetch time.
    pub swap: Decimal,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
}

/// Immutable result of one positions fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Open positions at fetch time.
    pub positions: Vec<OpenPosition>,
    /// When the fetch was performed.
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn new(positions: Vec<OpenPosition>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            positions,
            fetched_at,
        }
    }

    /// Set of open ticket ids, used for closure diffing.
    pub fn ticket_set(&self) -> HashSet<TicketId> {
        self.positions.iter().map(|p| p.ticket).collect()
    }

    /// Look up a position by ticket.
    pub fn position(&self, ticket: TicketId) -> Option<&OpenPosition> {
        self.positions.iter().find(|p| p.ticket == ticket)
    }
}

/// A fresh fetch result tagged with its account, as handed from the
/// dispatcher to the snapshot tracker.
#[derive(Debug, Clone)]
pub struct FreshResult {
    pub account: AccountKey,
    pub result: Arc<FetchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position(ticket: u64) -> OpenPosition {
        OpenPosition {
            ticket: TicketId::new(ticket),
            symbol: "EURUSD".to_string(),
            side: PositionSide::Buy,
            volume: dec!(0.10),
            price_open: dec!(1.0850),
            price_current: dec!(1.0862),
            stop_loss: Some(dec!(1.0800)),
            take_profit: Some(dec!(1.0950)),
            profit: dec!(12.00),
            swap: dec!(-0.30),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_ticket_set() {
        let result = FetchResult::new(vec![sample_position(100), sample_position(200)], Utc::now());
        let tickets = result.ticket_set();
        assert_eq!(tickets.len(), 2);
        assert!(tickets.contains(&TicketId::new(100)));
        assert!(tickets.contains(&TicketId::new(200)));
    }

    #[test]
    fn test_position_lookup() {
        let result = FetchResult::new(vec![sample_position(100)], Utc::now());
        assert!(result.position(TicketId::new(100)).is_some());
        assert!(result.position(TicketId::new(999)).is_none());
    }
}
