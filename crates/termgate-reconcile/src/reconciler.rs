//! The warm-up + retry reconciliation engine.
//!
//! One closure event is resolved by up to `max_retries` attempts. Each
//! attempt warms the terminal's history index with a wide query, lets it
//! settle, then runs a narrow ticket-scoped lookup. Terminal errors count
//! as a failed attempt and trigger the same progressive backoff as a
//! missing record. Exhaustion degrades to an approximate record built
//! from the last open snapshot; an event is never silently dropped.
//!
//! Every event runs in its own tokio task, so one account's backoff never
//! stalls another account's queue or the dispatcher's work lines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::risk::apply_risk_metrics;
use termgate_core::{
    AccountKey, AccuracyGrade, ClosureEvent, Deal, HistoryWindow, TradeRecord, TradeSink,
};
use termgate_dispatch::{DispatchResult, Dispatcher};

// ============================================================================
// ReconcilerConfig
// ============================================================================

/// Reconciliation protocol tuning.
///
/// Defaults mirror the observed behavior of the terminal's history log:
/// records usually materialize within a few seconds of closure once the
/// index has been warmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Lookup attempts per closure. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base (ms); attempt n waits n * base. Default: 3000 (3s/6s/9s).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Settle delay after a warm-up query (ms). Default: 300.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Warm-up query window (days). Default: 90.
    #[serde(default = "default_warmup_days")]
    pub warmup_days: i64,
    /// Minimum spacing between warm-ups per account (s). Default: 30.
    #[serde(default = "default_warmup_interval_secs")]
    pub warmup_interval_secs: u64,
    /// Narrow lookup window (minutes). Default: 30.
    #[serde(default = "default_lookup_minutes")]
    pub lookup_minutes: i64,
    /// Older-history window searched when the entry deal is missing from
    /// the narrow window (days). Default: 7.
    #[serde(default = "default_entry_search_days")]
    pub entry_search_days: i64,
    /// Closure event channel depth. Default: 64.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    3_000
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_warmup_days() -> i64 {
    90
}

fn default_warmup_interval_secs() -> u64 {
    30
}

fn default_lookup_minutes() -> i64 {
    30
}

fn default_entry_search_days() -> i64 {
    7
}

fn default_event_queue_depth() -> usize {
    64
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            warmup_days: default_warmup_days(),
            warmup_interval_secs: default_warmup_interval_secs(),
            lookup_minutes: default_lookup_minutes(),
            entry_search_days: default_entry_search_days(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl ReconcilerConfig {
    fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms * u64::from(attempt))
    }

    fn warmup_interval(&self) -> Duration {
        Duration::from_secs(self.warmup_interval_secs)
    }
}

// ============================================================================
// Reconciler
// ============================================================================

struct ReconcilerInner {
    config: ReconcilerConfig,
    dispatcher: Dispatcher,
    sink: Arc<dyn TradeSink>,
    /// Last successful warm-up per account, for throttling.
    last_warmup: DashMap<AccountKey, Instant>,
}

/// Resolves closure events into accuracy-graded trade records.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, dispatcher: Dispatcher, sink: Arc<dyn TradeSink>) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                config,
                dispatcher,
                sink,
                last_warmup: DashMap::new(),
            }),
        }
    }

    /// Resolve one closure event. Always returns a record.
    pub async fn resolve(&self, event: ClosureEvent) -> TradeRecord {
        let config = &self.inner.config;
        let attempts = config.max_retries.max(1);

        for attempt in 1..=attempts {
            debug!(
                event = %event.id,
                account = %event.account,
                ticket = %event.ticket,
                attempt,
                max = attempts,
                "Reconciliation attempt"
            );

            self.warm_up(&event.account).await;

            match self.lookup(&event).await {
                Ok(Some(record)) => {
                    info!(
                        event = %event.id,
                        ticket = %event.ticket,
                        attempt,
                        net_profit = %record.net_profit,
                        "Reconciled from history deals"
                    );
                    return record;
                }
                Ok(None) => {
                    debug!(event = %event.id, attempt, "Deal not yet in history");
                }
                Err(e) => {
                    warn!(event = %event.id, attempt, error = %e, "History lookup failed");
                }
            }

            if attempt < attempts {
                let backoff = config.backoff(attempt);
                debug!(
                    event = %event.id,
                    wait_ms = backoff.as_millis() as u64,
                    "Backing off before retry"
                );
                sleep(backoff).await;
            }
        }

        warn!(
            event = %event.id,
            ticket = %event.ticket,
            attempts,
            "Reconciliation exhausted, falling back to approximate record"
        );
        self.approximate_record(&event)
    }

    /// Resolve and hand the record to the sink.
    pub async fn resolve_and_record(&self, event: ClosureEvent) {
        let record = self.resolve(event).await;
        self.inner.sink.record(&record);
    }

    /// Wide history query that forces the terminal to materialize its deal
    /// index. The result is discarded; only the side effect matters.
    /// Throttled per account; a throttled attempt skips the settle delay
    /// too, since the index is already warm.
    async fn warm_up(&self, account: &AccountKey) {
        let config = &self.inner.config;

        if let Some(warmed_at) = self.inner.last_warmup.get(account) {
            if warmed_at.elapsed() < config.warmup_interval() {
                debug!(account = %account, "History index recently warmed, skipping");
                return;
            }
        }

        let window = HistoryWindow::last_days(config.warmup_days);
        match self.inner.dispatcher.run_history_query(account, window).await {
            Ok(deals) => {
                debug!(account = %account, deals = deals.len(), "History index warmed");
                self.inner.last_warmup.insert(account.clone(), Instant::now());
            }
            Err(e) => {
                warn!(account = %account, error = %e, "History warm-up failed");
                return;
            }
        }

        sleep(config.settle_delay()).await;
    }

    /// Ticket-scoped lookup in the narrow window.
    ///
    /// Requires the Out deal; a missing In deal triggers one search of the
    /// older entry window before falling back to snapshot entry data.
    async fn lookup(&self, event: &ClosureEvent) -> DispatchResult<Option<TradeRecord>> {
        let config = &self.inner.config;
        let deals = self
            .inner
            .dispatcher
            .run_history_query(&event.account, HistoryWindow::last_minutes(config.lookup_minutes))
            .await?;

        let Some(exit) = deals.iter().find(|d| d.closes(event.ticket)).cloned() else {
            return Ok(None);
        };

        let mut entry = deals.iter().find(|d| d.opens(event.ticket)).cloned();
        if entry.is_none() {
            // Position may have been open longer than the narrow window.
            let older = HistoryWindow::last_days(config.entry_search_days);
            entry = self
                .inner
                .dispatcher
                .run_history_query(&event.account, older)
                .await
                // An error here does not forfeit the exact exit data.
                .unwrap_or_default()
                .iter()
                .find(|d| d.opens(event.ticket))
                .cloned();
        }

        Ok(Some(self.exact_record(event, &exit, entry.as_ref())))
    }

    /// Build the exact record from matched deals, falling back to snapshot
    /// fields only where the entry deal is missing.
    fn exact_record(&self, event: &ClosureEvent, exit: &Deal, entry: Option<&Deal>) -> TradeRecord {
        let last_seen = &event.last_seen;

        let commission =
            exit.commission + entry.map(|d| d.commission).unwrap_or(Decimal::ZERO);
        let gross_profit = exit.profit;
        let net_profit = gross_profit + commission + exit.swap;

        let mut record = TradeRecord {
            account: event.account.clone(),
            ticket: event.ticket,
            symbol: exit.symbol.clone(),
            side: entry.map(|d| d.side).unwrap_or(last_seen.side),
            volume: exit.volume,
            entry_price: entry.map(|d| d.price).unwrap_or(last_seen.price_open),
            entry_time: entry.map(|d| d.executed_at).unwrap_or(last_seen.opened_at),
            exit_price: exit.price,
            exit_time: exit.executed_at,
            gross_profit,
            commission,
            swap: exit.swap,
            net_profit,
            stop_loss: last_seen.stop_loss,
            take_profit: last_seen.take_profit,
            accuracy: AccuracyGrade::Exact,
            risk_amount: None,
            r_multiple: None,
            risk_reward: None,
            recorded_at: Utc::now(),
        };
        apply_risk_metrics(&mut record);
        record
    }

    /// Degraded-but-available fallback: reconstruct the trade from the
    /// last open snapshot and the closure detection time.
    fn approximate_record(&self, event: &ClosureEvent) -> TradeRecord {
        let last_seen = &event.last_seen;
        let gross_profit = last_seen.profit;
        let net_profit = gross_profit + last_seen.swap;

        let mut record = TradeRecord {
            account: event.account.clone(),
            ticket: event.ticket,
            symbol: last_seen.symbol.clone(),
            side: last_seen.side,
            volume: last_seen.volume,
            entry_price: last_seen.price_open,
            entry_time: last_seen.opened_at,
            exit_price: last_seen.price_current,
            exit_time: event.detected_at,
            gross_profit,
            commission: Decimal::ZERO,
            swap: last_seen.swap,
            net_profit,
            stop_loss: last_seen.stop_loss,
            take_profit: last_seen.take_profit,
            accuracy: AccuracyGrade::Approximate,
            risk_amount: None,
            r_multiple: None,
            risk_reward: None,
            recorded_at: Utc::now(),
        };
        apply_risk_metrics(&mut record);
        record
    }
}

// ============================================================================
// Spawn function
// ============================================================================

/// Spawn the reconciler loop.
///
/// Each received closure event resolves in its own task; the loop only
/// dispatches. Exits when the event channel closes.
#[must_use]
pub fn spawn_reconciler(
    config: ReconcilerConfig,
    dispatcher: Dispatcher,
    sink: Arc<dyn TradeSink>,
    mut event_rx: mpsc::Receiver<ClosureEvent>,
) -> JoinHandle<()> {
    let reconciler = Reconciler::new(config, dispatcher, sink);
    tokio::spawn(async move {
        debug!("Reconciler started");
        while let Some(event) = event_rx.recv().await {
            let r = reconciler.clone();
            tokio::spawn(async move { r.resolve_and_record(event).await });
        }
        debug!("Reconciler terminated");
    })
}

// ============================================================================
// Tests
// ============================================================================
