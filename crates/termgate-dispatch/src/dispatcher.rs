//! Per-account serialized dispatcher with request coalescing.
//!
//! Every account key owns one work line: a small mpsc queue drained by a
//! dedicated tokio task. The line is the single place terminal calls are
//! issued from, which gives the at-most-one-in-flight-call-per-account
//! guarantee for free. Lines for distinct accounts run in parallel up to
//! a global semaphore cap protecting the terminal process.
//!
//! Request coalescing: while a fetch is in flight for an account, callers
//! attach to the in-flight outcome instead of enqueueing a second fetch.
//! The in-flight entry keeps the completed outcome until it is removed
//! from the map, so late attachers can never miss the result.
//!
//! A caller that times out waiting is simply abandoned: the underlying
//! call still completes and populates the cache for the next poll.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::cache::CacheStore;
use crate::error::{DispatchError, DispatchResult};
use termgate_core::{AccountKey, Credentials, Deal, FetchResult, FreshResult, HistoryWindow};
use termgate_gate::{DynSessionGate, GateResult};
use termgate_position::SnapshotTrackerHandle;

// ============================================================================
// DispatcherConfig
// ============================================================================

/// Dispatcher tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Cache validity window (ms). Default: 2000.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Overall per-request timeout (ms). Default: 10000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Global cap on accounts with an in-flight terminal call. Default: 4.
    #[serde(default = "default_max_parallel_accounts")]
    pub max_parallel_accounts: usize,
    /// Queue depth of one account work line. Default: 32.
    #[serde(default = "default_line_queue_depth")]
    pub line_queue_depth: usize,
    /// Cache capacity bound; `None` disables eviction.
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
}

fn default_cache_ttl_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_parallel_accounts() -> usize {
    4
}

fn default_line_queue_depth() -> usize {
    32
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_parallel_accounts: default_max_parallel_accounts(),
            line_queue_depth: default_line_queue_depth(),
            cache_max_entries: None,
        }
    }
}

impl DispatcherConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ============================================================================
// In-flight fetch state
// ============================================================================

/// Outcome fanned out to everyone waiting on one fetch.
type FetchOutcome = DispatchResult<Arc<FetchResult>>;

#[derive(Default)]
struct InflightState {
    /// Set exactly once, kept so late attachers see the result.
    done: Option<FetchOutcome>,
    waiters: Vec<oneshot::Sender<FetchOutcome>>,
}

/// Shared state of one in-flight fetch.
#[derive(Default)]
struct InflightFetch {
    state: Mutex<InflightState>,
}

enum Attach {
    Ready(FetchOutcome),
    Wait(oneshot::Receiver<FetchOutcome>),
}

impl InflightFetch {
    /// Attach one waiter, or return the outcome if already complete.
    fn attach(&self) -> Attach {
        let mut state = self.state.lock();
        if let Some(outcome) = &state.done {
            return Attach::Ready(outcome.clone());
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        Attach::Wait(rx)
    }

    /// Record the outcome and notify every waiter.
    fn complete(&self, outcome: FetchOutcome) {
        let waiters = {
            let mut state = self.state.lock();
            state.done = Some(outcome.clone());
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // Abandoned (timed-out) callers have dropped their receiver.
            let _ = waiter.send(outcome.clone());
        }
    }
}

// ============================================================================
// Work line jobs
// ============================================================================

enum LineJob {
    /// Fetch open positions; outcome goes to the in-flight entry.
    Fetch { creds: Credentials },
    /// History query on behalf of the reconciler.
    History {
        creds: Credentials,
        window: HistoryWindow,
        reply: oneshot::Sender<GateResult<Vec<Deal>>>,
    },
}

// ============================================================================
// Dispatcher
// ============================================================================

struct DispatcherInner {
    gate: DynSessionGate,
    config: DispatcherConfig,
    cache: CacheStore,
    /// Last known credentials per account, for the reconciler's history path.
    credentials: DashMap<AccountKey, Credentials>,
    /// Work line senders per account.
    lines: DashMap<AccountKey, mpsc::Sender<LineJob>>,
    /// In-flight fetch per account (coalescing point).
    inflight: DashMap<AccountKey, Arc<InflightFetch>>,
    /// Global cap on concurrent terminal calls.
    permits: Arc<Semaphore>,
    /// Fresh results are forwarded here, fire-and-forget.
    tracker: Option<SnapshotTrackerHandle>,
}

/// Serialized, cached access to the terminal, shared by clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(
        gate: DynSessionGate,
        config: DispatcherConfig,
        tracker: Option<SnapshotTrackerHandle>,
    ) -> Self {
        let cache = CacheStore::new(config.cache_max_entries);
        let permits = Arc::new(Semaphore::new(config.max_parallel_accounts));
        Self {
            inner: Arc::new(DispatcherInner {
                gate,
                config,
                cache,
                credentials: DashMap::new(),
                lines: DashMap::new(),
                inflight: DashMap::new(),
                permits,
                tracker,
            }),
        }
    }

    /// Pre-register credentials so the history path works before the first
    /// fetch (used by service wiring at startup).
    pub fn register_credentials(&self, key: AccountKey, creds: Credentials) {
        self.inner.credentials.insert(key, creds);
    }

    /// Current positions for an account: cache, then the account's queue.
    ///
    /// Identical concurrent requests coalesce onto one terminal call; all
    /// of them receive the same `Arc<FetchResult>`.
    pub async fn request_positions(
        &self,
        key: &AccountKey,
        creds: &Credentials,
    ) -> DispatchResult<Arc<FetchResult>> {
        // Fast path: fresh cache hit, no queueing, no terminal call.
        if let Some(hit) = self.inner.cache.get_fresh(key, self.inner.config.cache_ttl()) {
            trace!(account = %key, "Cache hit");
            return Ok(hit);
        }

        self.inner.credentials.insert(key.clone(), creds.clone());

        let (attach, initiated) = match self.inner.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => (occupied.get().attach(), false),
            Entry::Vacant(vacant) => {
                let inflight = Arc::new(InflightFetch::default());
                let attach = inflight.attach();
                vacant.insert(inflight);
                (attach, true)
            }
        };

        if initiated {
            let line = self.line_sender(key);
            let job = LineJob::Fetch {
                creds: creds.clone(),
            };
            if line.try_send(job).is_err() {
                // Line saturated: fail everyone attached to this slot so a
                // later request can start a clean fetch.
                warn!(account = %key, "Work line queue full, rejecting fetch");
                if let Some((_, inflight)) = self.inner.inflight.remove(key) {
                    inflight.complete(Err(DispatchError::QueueTimeout));
                }
                return Err(DispatchError::QueueTimeout);
            }
        }

        let rx = match attach {
            Attach::Ready(outcome) => return outcome,
            Attach::Wait(rx) => rx,
        };

        match timeout(self.inner.config.request_timeout(), rx).await {
            // Abandoned: the in-flight call keeps running and will still
            // populate the cache for the next poll.
            Err(_elapsed) => Err(DispatchError::QueueTimeout),
            Ok(Err(_recv)) => Err(DispatchError::QueueClosed),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Run a history query on the account's work line.
    ///
    /// Shares the line with position fetches, so gate exclusivity holds
    /// across both call kinds for one account while other accounts proceed
    /// in parallel.
    pub async fn run_history_query(
        &self,
        key: &AccountKey,
        window: HistoryWindow,
    ) -> DispatchResult<Vec<Deal>> {
        let creds = self
            .inner
            .credentials
            .get(key)
            .map(|c| c.clone())
            .ok_or_else(|| DispatchError::UnknownAccount(key.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let line = self.line_sender(key);
        line.send(LineJob::History {
            creds,
            window,
            reply: reply_tx,
        })
        .await
        .map_err(|_| DispatchError::QueueClosed)?;

        match timeout(self.inner.config.request_timeout(), reply_rx).await {
            Err(_elapsed) => Err(DispatchError::QueueTimeout),
            Ok(Err(_recv)) => Err(DispatchError::QueueClosed),
            Ok(Ok(result)) => result.map_err(DispatchError::Gate),
        }
    }

    /// Cache store, exposed for service metrics.
    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// Sender for the account's work line, spawning the line on first use.
    fn line_sender(&self, key: &AccountKey) -> mpsc::Sender<LineJob> {
        if let Some(line) = self.inner.lines.get(key) {
            return line.clone();
        }

        let (tx, rx) = mpsc::channel(self.inner.config.line_queue_depth);
        match self.inner.lines.entry(key.clone()) {
            // Lost the creation race; use the winner's line.
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                vacant.insert(tx.clone());
                tokio::spawn(run_line(Arc::clone(&self.inner), key.clone(), rx));
                tx
            }
        }
    }
}

/// One account's work line: drains jobs strictly in order, holding a
/// global permit across each terminal call.
async fn run_line(inner: Arc<DispatcherInner>, key: AccountKey, mut rx: mpsc::Receiver<LineJob>) {
    debug!(account = %key, "Account work line started");

    while let Some(job) = rx.recv().await {
        let permit = match Arc::clone(&inner.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        match job {
            LineJob::Fetch { creds } => {
                let started = Instant::now();
                let outcome = match inner.gate.fetch_positions(&creds).await {
                    Ok(result) => {
                        let result = Arc::new(result);
                        inner.cache.insert(key.clone(), Arc::clone(&result));
                        if let Some(tracker) = &inner.tracker {
                            tracker.try_on_fresh_result(FreshResult {
                                account: key.clone(),
                                result: Arc::clone(&result),
                            });
                        }
                        debug!(
                            account = %key,
                            positions = result.positions.len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Fetch complete"
                        );
                        Ok(result)
                    }
                    Err(e) => {
                        warn!(account = %key, error = %e, "Fetch failed");
                        Err(DispatchError::Gate(e))
                    }
                };

                if let Some((_, inflight)) = inner.inflight.remove(&key) {
                    inflight.complete(outcome);
                }
            }
            LineJob::History {
                creds,
                window,
                reply,
            } => {
                let result = inner.gate.fetch_history_deals(&creds, window).await;
                // Receiver may have timed out and gone away.
                let _ = reply.send(result);
            }
        }

        drop(permit);
    }

    debug!(account = %key, "Account work line terminated");
}

// ============================================================================
// Tests
// ============================================================================
