//! Snapshot tracker actor for closure detection.
//!
//! Runs as a single tokio task owning the per-account snapshots, so the
//! diff is computed without any locking. The dispatcher hands fresh
//! results in through the handle (fire-and-forget); closure events go out
//! on an mpsc channel to the reconciler.
//!
//! Two invariants live here:
//! - closure = previous ticket set minus new ticket set. Plain set
//!   difference: newly opened tickets never produce events.
//! - monotonicity guard: a result whose `fetched_at` is not newer than the
//!   stored snapshot is dropped. The dispatcher's cache path can replay a
//!   result the tracker already processed; diffing it again against a
//!   newer snapshot would fabricate closures.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use termgate_core::{AccountKey, ClosureEvent, FreshResult, OpenPosition, TicketId};

// ============================================================================
// TrackedSnapshot
// ============================================================================

/// Last processed open-position snapshot for one account.
#[derive(Debug, Clone)]
struct TrackedSnapshot {
    /// Open positions by ticket as of `fetched_at`.
    positions: HashMap<TicketId, OpenPosition>,
    /// Fetch timestamp of the snapshot.
    fetched_at: DateTime<Utc>,
}

// ============================================================================
// TrackerMsg
// ============================================================================

/// Messages for the snapshot tracker actor.
#[derive(Debug)]
pub enum TrackerMsg {
    /// A fresh fetch result from the dispatcher.
    Fresh(FreshResult),

    /// Graceful shutdown.
    Shutdown,
}

// ============================================================================
// SnapshotTrackerTask
// ============================================================================

/// Snapshot tracker actor task.
///
/// Processes messages sequentially; owns the authoritative snapshot map.
pub struct SnapshotTrackerTask {
    /// Message receiver.
    rx: mpsc::Receiver<TrackerMsg>,

    /// Per-account snapshots.
    snapshots: HashMap<AccountKey, TrackedSnapshot>,

    /// Outgoing closure events to the reconciler.
    closure_tx: mpsc::Sender<ClosureEvent>,
}

impl SnapshotTrackerTask {
    /// Run the tracker actor until Shutdown or channel close.
    pub async fn run(mut self) {
        debug!("SnapshotTrackerTask started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                TrackerMsg::Shutdown => {
                    debug!("SnapshotTrackerTask shutting down");
                    break;
                }
                TrackerMsg::Fresh(fresh) => self.on_fresh(fresh).await,
            }
        }

        debug!("SnapshotTrackerTask terminated");
    }

    /// Diff a fresh result against the stored snapshot and emit closures.
    async fn on_fresh(&mut self, fresh: FreshResult) {
        let FreshResult { account, result } = fresh;

        // Monotonicity guard: drop stale or duplicate results.
        if let Some(prev) = self.snapshots.get(&account) {
            if result.fetched_at <= prev.fetched_at {
                debug!(
                    account = %account,
                    fetched_at = %result.fetched_at,
                    snapshot_at = %prev.fetched_at,
                    "Dropping stale fetch result"
                );
                return;
            }
        }

        let new_positions: HashMap<TicketId, OpenPosition> = result
            .positions
            .iter()
            .map(|p| (p.ticket, p.clone()))
            .collect();

        let detected_at = Utc::now();

        match self.snapshots.remove(&account) {
            None => {
                // First fetch for this account: initialize, nothing to diff.
                debug!(
                    account = %account,
                    open = new_positions.len(),
                    "Initialized snapshot"
                );
            }
            Some(mut prev) => {
                let closed: Vec<TicketId> = prev
                    .positions
                    .keys()
                    .filter(|t| !new_positions.contains_key(t))
                    .copied()
                    .collect();

                if !closed.is_empty() {
                    info!(
                        account = %account,
                        closed = closed.len(),
                        tickets = ?closed,
                        "Detected closed positions"
                    );
                }

                for ticket in closed {
                    let last_seen = prev
                        .positions
                        .remove(&ticket)
                        .expect("closed ticket came from prev snapshot keys");
                    let event = ClosureEvent::new(account.clone(), last_seen, detected_at);
                    if self.closure_tx.send(event).await.is_err() {
                        warn!(account = %account, %ticket, "Closure channel closed, event lost");
                    }
                }
            }
        }

        self.snapshots.insert(
            account,
            TrackedSnapshot {
                positions: new_positions,
                fetched_at: result.fetched_at,
            },
        );
    }
}

// ============================================================================
// SnapshotTrackerHandle
// ============================================================================

/// Handle for feeding the snapshot tracker.
#[derive(Clone)]
pub struct SnapshotTrackerHandle {
    tx: mpsc::Sender<TrackerMsg>,
}

impl SnapshotTrackerHandle {
    /// Hand a fresh result to the tracker (awaits channel capacity).
    pub async fn on_fresh_result(&self, fresh: FreshResult) {
        let _ = self.tx.send(TrackerMsg::Fresh(fresh)).await;
    }

    /// Non-blocking variant for the dispatcher's fire-and-forget forward.
    ///
    /// A full channel drops the result; the next fetch carries a superset
    /// of the same information, so nothing is permanently lost except
    /// detection latency.
    pub fn try_on_fresh_result(&self, fresh: FreshResult) {
        if let Err(e) = self.tx.try_send(TrackerMsg::Fresh(fresh)) {
            warn!(error = %e, "Snapshot tracker channel full, dropping fresh result");
        }
    }

    /// Request graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(TrackerMsg::Shutdown).await;
    }
}

// ============================================================================
// Spawn function
// ============================================================================

/// Spawn the snapshot tracker actor.
///
/// Closure events are emitted on `closure_tx`. Returns the feeding handle
/// and the task join handle.
#[must_use]
pub fn spawn_snapshot_tracker(
    capacity: usize,
    closure_tx: mpsc::Sender<ClosureEvent>,
) -> (SnapshotTrackerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);

    let task = SnapshotTrackerTask {
        rx,
        snapshots: HashMap::new(),
        closure_tx,
    };

    let handle = SnapshotTrackerHandle { tx };
    let join_handle = tokio::spawn(task.run());

    (handle, join_handle)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use termgate_core::{FetchResult, PositionSide};

    fn account() -> AccountKey {
        AccountKey::new(100, "Broker-Demo", "user-a")
    }

    fn position(ticket: u64) -> OpenPosition {
        OpenPosition {
            ticket: TicketId::new(ticket),
            symbol: "EURUSD".to_string(),
            side: PositionSide::Buy,
            volume: dec!(0.10),
            price_open: dec!(1.0850),
            price_current: dec!(1.0860),
            stop_loss: Some(dec!(1.0800)),
            take_profit: None,
            profit: dec!(10),
            swap: Decimal::ZERO,
            opened_at: Utc::now(),
        }
    }

    fn fresh(tickets: &[u64], fetched_at: DateTime<Utc>) -> FreshResult {
        let positions = tickets.iter().map(|t| position(*t)).collect();
        FreshResult {
            account: account(),
            result: Arc::new(FetchResult::new(positions, fetched_at)),
        }
    }

    #[tokio::test]
    async fn test_first_fetch_emits_no_events() {
        let (closure_tx, mut closure_rx) = mpsc::channel(16);
        let (handle, _join) = spawn_snapshot_tracker(16, closure_tx);

        handle.on_fresh_result(fresh(&[100, 200], Utc::now())).await;
        handle.shutdown().await;

        assert!(closure_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_diff_emits_only_disappeared_tickets() {
        let (closure_tx, mut closure_rx) = mpsc::channel(16);
        let (handle, join) = spawn_snapshot_tracker(16, closure_tx);

        let t0 = Utc::now();
        handle.on_fresh_result(fresh(&[1, 2], t0)).await;
        handle
            .on_fresh_result(fresh(&[2, 3], t0 + Duration::seconds(1)))
            .await;
        handle.shutdown().await;
        let _ = join.await;

        let event = closure_rx.recv().await.expect("one closure event");
        assert_eq!(event.ticket, TicketId::new(1));
        assert_eq!(event.account, account());
        // T3 opened, not closed: no second event.
        assert!(closure_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_close_emits_single_event_with_last_seen() {
        let (closure_tx, mut closure_rx) = mpsc::channel(16);
        let (handle, join) = spawn_snapshot_tracker(16, closure_tx);

        let t0 = Utc::now();
        handle.on_fresh_result(fresh(&[100], t0)).await;
        handle
            .on_fresh_result(fresh(&[], t0 + Duration::seconds(1)))
            .await;
        handle.shutdown().await;
        let _ = join.await;

        let event = closure_rx.recv().await.expect("closure event");
        assert_eq!(event.ticket, TicketId::new(100));
        assert_eq!(event.last_seen.symbol, "EURUSD");
        assert_eq!(event.last_seen.price_open, dec!(1.0850));
        assert!(closure_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_result_is_dropped() {
        let (closure_tx, mut closure_rx) = mpsc::channel(16);
        let (handle, join) = spawn_snapshot_tracker(16, closure_tx);

        let t0 = Utc::now();
        handle.on_fresh_result(fresh(&[1, 2], t0)).await;
        // Older than the stored snapshot: must not fabricate closures.
        handle
            .on_fresh_result(fresh(&[], t0 - Duration::seconds(5)))
            .await;
        // Equal timestamp counts as stale too.
        handle.on_fresh_result(fresh(&[], t0)).await;
        handle.shutdown().await;
        let _ = join.await;

        assert!(closure_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accounts_are_independent() {
        let (closure_tx, mut closure_rx) = mpsc::channel(16);
        let (handle, join) = spawn_snapshot_tracker(16, closure_tx);

        let other = AccountKey::new(200, "Broker-Demo", "user-b");
        let t0 = Utc::now();

        handle.on_fresh_result(fresh(&[1], t0)).await;
        // Same ticket id under another account initializes, never diffs.
        handle
            .on_fresh_result(FreshResult {
                account: other.clone(),
                result: Arc::new(FetchResult::new(vec![], t0)),
            })
            .await;
        handle
            .on_fresh_result(fresh(&[], t0 + Duration::seconds(1)))
            .await;
        handle.shutdown().await;
        let _ = join.await;

        let event = closure_rx.recv().await.expect("closure for user-a");
        assert_eq!(event.account, account());
        assert!(closure_rx.try_recv().is_err());
    }
}
