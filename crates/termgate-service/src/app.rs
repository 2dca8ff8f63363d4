//! Main application orchestration.
//!
//! Wires the components together and drives the polling loop:
//! - Dispatcher with per-account work lines and the TTL cache
//! - Snapshot tracker diffing fetches into closure events
//! - Reconciler turning closure events into graded trade records
//! - JSONL trade writer as the record sink

use crate::config::AppConfig;
use crate::error::AppResult;
use std::sync::Arc;
use termgate_core::Credentials;
use termgate_dispatch::Dispatcher;
use termgate_gate::{BoxFuture, DynSessionGate, GateError, GateResult, SessionGate};
use termgate_persistence::JsonlTradeWriter;
use termgate_position::{spawn_snapshot_tracker, SnapshotTrackerHandle};
use termgate_reconcile::spawn_reconciler;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Placeholder gate used until a real terminal adapter is wired in.
///
/// Every call fails with a transient error, so the service starts, logs
/// and shuts down cleanly without a terminal attached.
pub struct UnconfiguredGate;

impl SessionGate for UnconfiguredGate {
    fn fetch_positions<'a>(
        &'a self,
        _creds: &'a Credentials,
    ) -> BoxFuture<'a, GateResult<termgate_core::FetchResult>> {
        Box::pin(async { Err(GateError::Transient("terminal adapter not configured".into())) })
    }

    fn fetch_history_deals<'a>(
        &'a self,
        _creds: &'a Credentials,
        _window: termgate_core::HistoryWindow,
    ) -> BoxFuture<'a, GateResult<Vec<termgate_core::Deal>>> {
        Box::pin(async { Err(GateError::Transient("terminal adapter not configured".into())) })
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    dispatcher: Dispatcher,
    tracker: SnapshotTrackerHandle,
    writer: Arc<JsonlTradeWriter>,
    tracker_join: JoinHandle<()>,
    reconciler_join: JoinHandle<()>,
}

impl Application {
    /// Create a new application and spawn its background tasks.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(config: AppConfig, gate: DynSessionGate) -> AppResult<Self> {
        let writer = Arc::new(JsonlTradeWriter::new(&config.persistence.data_dir));

        let (closure_tx, closure_rx) = mpsc::channel(config.reconciler.event_queue_depth);
        let (tracker, tracker_join) =
            spawn_snapshot_tracker(config.tracker_queue_depth, closure_tx);

        let dispatcher = Dispatcher::new(gate, config.dispatcher.clone(), Some(tracker.clone()));
        for account in &config.accounts {
            dispatcher.register_credentials(account.key(), account.credentials());
        }

        let reconciler_join = spawn_reconciler(
            config.reconciler.clone(),
            dispatcher.clone(),
            writer.clone(),
            closure_rx,
        );

        Ok(Self {
            config,
            dispatcher,
            tracker,
            writer,
            tracker_join,
            reconciler_join,
        })
    }

    /// Client-facing request surface, for embedding an API layer on top.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Fetch positions for every configured account once.
    ///
    /// Failures are logged per account and do not stop the sweep. Returns
    /// the number of accounts that produced a fresh or cached result.
    pub async fn poll_once(&self) -> usize {
        let mut ok = 0;
        for account in &self.config.accounts {
            let key = account.key();
            match self
                .dispatcher
                .request_positions(&key, &account.credentials())
                .await
            {
                Ok(result) => {
                    debug!(account = %key, positions = result.positions.len(), "Polled");
                    ok += 1;
                }
                Err(e) => {
                    warn!(account = %key, error = %e, "Poll failed");
                }
            }
        }
        ok
    }

    /// Run the polling loop until ctrl-c.
    pub async fn run(&mut self) -> AppResult<()> {
        if self.config.accounts.is_empty() {
            warn!("No accounts configured, nothing to poll");
        }

        info!(
            accounts = self.config.accounts.len(),
            poll_interval_ms = self.config.poll_interval_ms,
            "Application started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Graceful shutdown: stop the tracker, wait for background tasks and
    /// flush the writer.
    async fn shutdown(&mut self) {
        self.tracker.shutdown().await;
        if let Err(e) = (&mut self.tracker_join).await {
            warn!(error = %e, "Tracker task join failed");
        }
        // The tracker held the last closure sender; dropping it ends the
        // reconciler dispatch loop. In-flight resolutions are detached
        // tasks and may still be retrying; records they produce after this
        // point are lost, which matches the bounded-retry contract.
        if let Err(e) = (&mut self.reconciler_join).await {
            warn!(error = %e, "Reconciler task join failed");
        }
        self.writer.close();
        info!("Application stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use termgate_core::FetchResult;

    struct EmptyGate {
        calls: AtomicU64,
    }

    impl SessionGate for EmptyGate {
        fn fetch_positions<'a>(
            &'a self,
            _creds: &'a Credentials,
        ) -> BoxFuture<'a, GateResult<FetchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(FetchResult::new(Vec::new(), Utc::now())) })
        }

        fn fetch_history_deals<'a>(
            &'a self,
            _creds: &'a Credentials,
            _window: termgate_core::HistoryWindow,
        ) -> BoxFuture<'a, GateResult<Vec<termgate_core::Deal>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn test_config(data_dir: &str) -> AppConfig {
        AppConfig {
            accounts: vec![AccountConfig {
                user_id: "u1".to_string(),
                login: 1001,
                password: "pw".to_string(),
                server: "Demo".to_string(),
            }],
            persistence: crate::config::PersistenceConfig {
                data_dir: data_dir.to_string(),
            },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_poll_once_hits_gate_then_cache() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(EmptyGate {
            calls: AtomicU64::new(0),
        });
        let dyn_gate: DynSessionGate = gate.clone();
        let app = Application::new(test_config(dir.path().to_str().unwrap()), dyn_gate).unwrap();

        assert_eq!(app.poll_once().await, 1);
        // Second sweep inside the TTL is served from cache.
        assert_eq!(app.poll_once().await, 1);
        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_gate_polls_fail_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let gate: DynSessionGate = Arc::new(UnconfiguredGate);
        let app = Application::new(test_config(dir.path().to_str().unwrap()), gate).unwrap();

        assert_eq!(app.poll_once().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_joins_background_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let gate: DynSessionGate = Arc::new(UnconfiguredGate);
        let mut app = Application::new(test_config(dir.path().to_str().unwrap()), gate).unwrap();

        app.shutdown().await;
        assert!(app.tracker_join.is_finished());
        assert!(app.reconciler_join.is_finished());
    }
}
