//! Financial data cache/mutator: the one stateful component of the engine.
//!
//! Owns the lifecycle of raw monthly inputs per `(franchise, month)` key:
//! fetch through the injected persistence boundary, optimistic local update
//! with snapshot rollback, and stale-while-revalidate reads. Constructed per
//! application context, never process-global.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::error::FinanceError;
use crate::health::{self, AlertSeverity, FinancialAlert};
use crate::report::{compute_report, FinancialReport};
use crate::trends::TrendPoint;
use crate::types::{
    InputStatus, MonthKey, MonthlyInput, PartialMonthlyInput, TariffConfig, TaxConfig,
};
use crate::FinanceResult;

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

/// Identity of one cached report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub franchise_id: String,
    pub month: MonthKey,
}

impl CacheKey {
    pub fn new(franchise_id: impl Into<String>, month: MonthKey) -> Self {
        CacheKey {
            franchise_id: franchise_id.into(),
            month,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.franchise_id, self.month)
    }
}

/// Injected storage boundary. Asynchronous and fallible; failures surface
/// as `FinanceError::Persistence` and are never swallowed.
#[async_trait]
pub trait PersistenceBoundary: Send + Sync {
    async fn get(
        &self,
        franchise_id: &str,
        month: MonthKey,
    ) -> FinanceResult<Option<MonthlyInput>>;

    async fn put(
        &self,
        franchise_id: &str,
        month: MonthKey,
        patch: &PartialMonthlyInput,
    ) -> FinanceResult<()>;
}

/// Injected notification boundary. Fire-and-forget: the engine never blocks
/// on it and ignores its outcome.
#[async_trait]
pub trait NotificationBoundary: Send + Sync {
    async fn locked_period_violation(&self, key: &CacheKey);
    async fn critical_alert(&self, key: &CacheKey, alert: &FinancialAlert);
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a cached report may be served without revalidation.
    pub staleness_window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            staleness_window: Duration::from_secs(10 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

type SubscriberFn = Arc<dyn Fn(&FinancialReport) + Send + Sync>;

/// Raw input and the report computed from it, taken at one instant.
struct Snapshot {
    input: MonthlyInput,
    report: FinancialReport,
}

/// Per-key cache slot. `committed` is the last known-good state; `pending`
/// exists only while a mutation is in flight and is never the only copy.
#[derive(Default)]
struct Entry {
    committed: Option<Snapshot>,
    pending: Option<Snapshot>,
    fetched_at: Option<Instant>,
    mutating: bool,
    refreshing: bool,
    /// Bumped every time a mutation settles. A refresh that started under
    /// an older generation fetched pre-settle data and must discard it.
    generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    /// Cached trend series per franchise, keyed by (end month, length).
    trends: HashMap<String, HashMap<(MonthKey, u32), Vec<TrendPoint>>>,
    subscribers: HashMap<CacheKey, Vec<(u64, SubscriberFn)>>,
    next_subscriber_id: u64,
}

struct CacheShared {
    persistence: Arc<dyn PersistenceBoundary>,
    notifier: Arc<dyn NotificationBoundary>,
    tariff: TariffConfig,
    tax: TaxConfig,
    config: CacheConfig,
    // std Mutex: never held across an await point.
    state: Mutex<CacheState>,
}

/// Drop guard returned by `subscribe`. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    key: CacheKey,
    shared: Weak<CacheShared>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.lock().expect("cache state poisoned");
            if let Some(subs) = state.subscribers.get_mut(&self.key) {
                subs.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FinanceCache
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FinanceCache {
    shared: Arc<CacheShared>,
}

impl FinanceCache {
    pub fn new(
        persistence: Arc<dyn PersistenceBoundary>,
        notifier: Arc<dyn NotificationBoundary>,
        tariff: TariffConfig,
        tax: TaxConfig,
        config: CacheConfig,
    ) -> Self {
        FinanceCache {
            shared: Arc::new(CacheShared {
                persistence,
                notifier,
                tariff,
                tax,
                config,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Current report for a key.
    ///
    /// Serves the cached value inside the staleness window. Past the window
    /// the stale value is returned immediately and a background refresh is
    /// spawned (stale-while-revalidate). While a mutation is in flight the
    /// optimistic pending report is served and no refetch happens.
    pub async fn read(&self, key: &CacheKey) -> FinanceResult<FinancialReport> {
        {
            let mut state = self.shared.state.lock().expect("cache state poisoned");
            if let Some(entry) = state.entries.get_mut(key) {
                if let Some(pending) = &entry.pending {
                    return Ok(pending.report.clone());
                }
                if let Some(committed) = &entry.committed {
                    let fresh = entry
                        .fetched_at
                        .map(|at| at.elapsed() <= self.shared.config.staleness_window)
                        .unwrap_or(false);
                    let report = committed.report.clone();
                    if fresh {
                        return Ok(report);
                    }
                    if !entry.refreshing {
                        entry.refreshing = true;
                        let cache = self.clone();
                        let refresh_key = key.clone();
                        tokio::spawn(async move { cache.background_refresh(refresh_key).await });
                    }
                    debug!(key = %key, "serving stale report while revalidating");
                    return Ok(report);
                }
            }
        }
        self.refresh_now(key).await
    }

    /// Optimistically apply a field-level patch to a key's input.
    ///
    /// The merged input is validated and its report made visible before the
    /// persistence write settles. On write failure the committed snapshot is
    /// restored exactly and the error is returned. At most one mutation per
    /// key may be in flight; a concurrent second mutation is rejected with
    /// `Conflict`. Mutations always run to completion.
    pub async fn mutate(
        &self,
        key: &CacheKey,
        patch: PartialMonthlyInput,
    ) -> FinanceResult<FinancialReport> {
        let have_committed = {
            let state = self.shared.state.lock().expect("cache state poisoned");
            state
                .entries
                .get(key)
                .map(|e| e.committed.is_some())
                .unwrap_or(false)
        };
        if !have_committed {
            self.refresh_now(key).await?;
        }

        // Stage the optimistic snapshot. No state changes on any rejection.
        let (optimistic, subscribers) = {
            let mut state = self.shared.state.lock().expect("cache state poisoned");
            let subscribers = subscriber_fns(&state, key);
            let entry = state.entries.entry(key.clone()).or_default();
            if entry.mutating {
                return Err(FinanceError::Conflict {
                    franchise_id: key.franchise_id.clone(),
                    month: key.month,
                });
            }
            let committed = entry.committed.as_ref().ok_or_else(|| {
                FinanceError::Persistence("cache entry lost between fetch and mutate".into())
            })?;
            if committed.input.is_locked() {
                let notifier = Arc::clone(&self.shared.notifier);
                let violated_key = key.clone();
                tokio::spawn(async move { notifier.locked_period_violation(&violated_key).await });
                return Err(FinanceError::LockedPeriod {
                    franchise_id: key.franchise_id.clone(),
                    month: key.month,
                });
            }

            let mut merged = committed.input.clone();
            patch.apply_to(&mut merged);
            merged.last_updated = Utc::now();
            merged.validate()?;
            let report = compute_report(&merged, &self.shared.tariff, &self.shared.tax)?;

            entry.mutating = true;
            entry.pending = Some(Snapshot {
                input: merged,
                report: report.clone(),
            });
            (report, subscribers)
        };
        for subscriber in &subscribers {
            subscriber(&optimistic);
        }
        debug!(key = %key, "optimistic update applied");

        // The write and settle run as their own task: an abandoned caller
        // cannot cancel a mutation halfway through.
        let cache = self.clone();
        let settle_key = key.clone();
        let settle = tokio::spawn(async move { cache.settle(settle_key, patch).await });
        settle
            .await
            .map_err(|e| FinanceError::Persistence(format!("mutation task aborted: {e}")))?
    }

    /// Write phase of a mutation: push the patch through the boundary, then
    /// commit or roll back the staged snapshot.
    async fn settle(
        &self,
        key: CacheKey,
        patch: PartialMonthlyInput,
    ) -> FinanceResult<FinancialReport> {
        let written = self
            .shared
            .persistence
            .put(&key.franchise_id, key.month, &patch)
            .await;

        // Success or failure, the key's entry and the franchise's trend
        // series are invalidated: the next read revalidates against storage.
        let settled = {
            let mut state = self.shared.state.lock().expect("cache state poisoned");
            state.trends.remove(&key.franchise_id);
            let subscribers = subscriber_fns(&state, &key);
            let entry = state.entries.entry(key.clone()).or_default();
            entry.mutating = false;
            entry.fetched_at = None;
            entry.generation += 1;
            match written {
                Ok(()) => {
                    let snapshot = entry.pending.take().ok_or_else(|| {
                        FinanceError::Persistence("pending snapshot lost during mutation".into())
                    })?;
                    let report = snapshot.report.clone();
                    entry.committed = Some(snapshot);
                    Ok(report)
                }
                Err(e) => {
                    entry.pending = None;
                    let restored = entry.committed.as_ref().map(|s| s.report.clone());
                    Err((e, restored, subscribers))
                }
            }
        };

        match settled {
            Ok(report) => {
                self.notify_critical(&key, &report);
                Ok(report)
            }
            Err((e, restored, subscribers)) => {
                error!(key = %key, error = %e, "mutation failed, rolled back");
                if let Some(report) = restored {
                    for subscriber in &subscribers {
                        subscriber(&report);
                    }
                }
                Err(e)
            }
        }
    }

    /// Register a change listener for a key. The callback fires whenever the
    /// visible report changes: on an optimistic update and again on rollback.
    /// Dropping the returned `Subscription` unsubscribes.
    pub fn subscribe(
        &self,
        key: &CacheKey,
        on_change: impl Fn(&FinancialReport) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = self.shared.state.lock().expect("cache state poisoned");
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state
            .subscribers
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(on_change)));
        Subscription {
            id,
            key: key.clone(),
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// The trailing monthly series a trend aggregation consumes. Gap and
    /// deleted months appear zero-filled. Cached per franchise until a
    /// mutation on that franchise settles.
    pub async fn trend_series(
        &self,
        franchise_id: &str,
        months_back: u32,
        end: MonthKey,
    ) -> FinanceResult<Vec<TrendPoint>> {
        {
            let state = self.shared.state.lock().expect("cache state poisoned");
            if let Some(cached) = state
                .trends
                .get(franchise_id)
                .and_then(|by_range| by_range.get(&(end, months_back)))
            {
                return Ok(cached.clone());
            }
        }

        let mut points = Vec::with_capacity(months_back as usize);
        for month in end.trailing_range(months_back) {
            let input = self.fetch_input(franchise_id, month).await?;
            let report = compute_report(&input, &self.shared.tariff, &self.shared.tax)?;
            points.push(TrendPoint {
                month,
                revenue: report.revenue,
                expenses: report.total_expenses,
                profit: report.net_profit,
            });
        }

        let mut state = self.shared.state.lock().expect("cache state poisoned");
        state
            .trends
            .entry(franchise_id.to_string())
            .or_default()
            .insert((end, months_back), points.clone());
        Ok(points)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Fetch a key's input, treating deleted records as never recorded.
    async fn fetch_input(&self, franchise_id: &str, month: MonthKey) -> FinanceResult<MonthlyInput> {
        let fetched = self.shared.persistence.get(franchise_id, month).await?;
        Ok(match fetched {
            Some(input) if input.status != InputStatus::Deleted => input,
            _ => MonthlyInput::empty(franchise_id, month),
        })
    }

    /// Foreground fetch + recompute + store.
    async fn refresh_now(&self, key: &CacheKey) -> FinanceResult<FinancialReport> {
        let seen_generation = {
            let state = self.shared.state.lock().expect("cache state poisoned");
            state.entries.get(key).map(|e| e.generation).unwrap_or(0)
        };
        let input = self.fetch_input(&key.franchise_id, key.month).await?;
        let report = compute_report(&input, &self.shared.tariff, &self.shared.tax)?;
        let stored = {
            let mut state = self.shared.state.lock().expect("cache state poisoned");
            let entry = state.entries.entry(key.clone()).or_default();
            // A mutation that started or settled while this fetch was in
            // flight owns newer state than the fetched payload; keep the
            // entry and throw the payload away.
            if entry.pending.is_none() && entry.generation == seen_generation {
                entry.committed = Some(Snapshot {
                    input,
                    report: report.clone(),
                });
                entry.fetched_at = Some(Instant::now());
                true
            } else {
                false
            }
        };
        if stored {
            self.notify_critical(key, &report);
        }
        Ok(report)
    }

    async fn background_refresh(self, key: CacheKey) {
        match self.refresh_now(&key).await {
            Ok(_) => debug!(key = %key, "background refresh complete"),
            Err(e) => warn!(key = %key, error = %e, "background refresh failed, keeping stale value"),
        }
        let mut state = self.shared.state.lock().expect("cache state poisoned");
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.refreshing = false;
        }
    }

    /// Fire-and-forget critical alert notifications.
    fn notify_critical(&self, key: &CacheKey, report: &FinancialReport) {
        let criticals: Vec<FinancialAlert> = health::analyze(report)
            .into_iter()
            .filter(|alert| alert.severity == AlertSeverity::Critical)
            .collect();
        if criticals.is_empty() {
            return;
        }
        let notifier = Arc::clone(&self.shared.notifier);
        let key = key.clone();
        tokio::spawn(async move {
            for alert in &criticals {
                notifier.critical_alert(&key, alert).await;
            }
        });
    }
}

fn subscriber_fns(state: &CacheState, key: &CacheKey) -> Vec<SubscriberFn> {
    state
        .subscribers
        .get(key)
        .map(|subs| subs.iter().map(|(_, f)| Arc::clone(f)).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
