//! Bounded fan-out of existence checks.
//!
//! [`BoundedDispatcher`] spawns one task per key and gates the remote call of
//! each task behind a permit from a fixed-size pool, so no more than `limit`
//! checks are ever in flight. The run returns only after every task has been
//! joined and its outcome folded into the run's [`ResultSet`].

use crate::error::KeyCheckError;
use crate::report::ResultSet;
use crate::types::{CheckOutcome, OutcomeKind, RunReport, RunSummary};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Smallest number of completions between two progress lines.
const PROGRESS_MIN_STEP: usize = 500;

/// Point-in-time view of the permit pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiting: usize,
}

#[derive(Debug, Default)]
struct Gauges {
    in_flight: AtomicUsize,
    waiting: AtomicUsize,
}

/// Permit held for the duration of one remote check.
struct CheckPermit {
    _permit: OwnedSemaphorePermit,
    gauges: Arc<Gauges>,
}

impl Drop for CheckPermit {
    fn drop(&mut self) {
        self.gauges.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard {
    gauges: Arc<Gauges>,
}

impl WaiterGuard {
    fn new(gauges: Arc<Gauges>) -> Self {
        gauges.waiting.fetch_add(1, Ordering::Relaxed);
        Self { gauges }
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.gauges.waiting.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn acquire_permit(
    permits: Arc<Semaphore>,
    gauges: Arc<Gauges>,
) -> Result<CheckPermit, KeyCheckError> {
    let waiter = WaiterGuard::new(Arc::clone(&gauges));
    let permit = permits
        .acquire_owned()
        .await
        .map_err(|_| KeyCheckError::internal("check permit pool closed"))?;
    drop(waiter);
    gauges.in_flight.fetch_add(1, Ordering::Relaxed);
    Ok(CheckPermit {
        _permit: permit,
        gauges,
    })
}

/// Runs checks for a key collection with a hard cap on concurrency.
///
/// The permit pool belongs to the dispatcher; every run gets a fresh
/// [`ResultSet`].
#[derive(Debug, Clone)]
pub struct BoundedDispatcher {
    limit: usize,
    permits: Arc<Semaphore>,
    gauges: Arc<Gauges>,
}

impl BoundedDispatcher {
    /// Create a dispatcher allowing `limit` simultaneous checks.
    ///
    /// # Errors
    ///
    /// Returns `KeyCheckError::ConfigError` if `limit` is zero or larger than
    /// the semaphore can represent.
    pub fn new(limit: usize) -> Result<Self, KeyCheckError> {
        if limit == 0 || limit > Semaphore::MAX_PERMITS {
            return Err(KeyCheckError::config(format!(
                "Concurrency limit must be between 1 and {}, got {}",
                Semaphore::MAX_PERMITS,
                limit
            )));
        }

        Ok(Self {
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            gauges: Arc::new(Gauges::default()),
        })
    }

    /// The configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current permit usage; also logged with run progress.
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            limit: self.limit,
            in_flight: self.gauges.in_flight.load(Ordering::Relaxed),
            waiting: self.gauges.waiting.load(Ordering::Relaxed),
        }
    }

    /// Check every key exactly once and collect the outcomes.
    ///
    /// `check` is invoked once per key while holding a permit; the permit is
    /// released as soon as it returns, before the outcome is recorded. A check
    /// task that panics is counted as errored and never affects other checks.
    pub async fn run<I, F, Fut>(&self, keys: I, check: F) -> RunReport
    where
        I: IntoIterator<Item = String>,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CheckOutcome> + Send + 'static,
    {
        let check = Arc::new(check);
        let results = Arc::new(ResultSet::new());
        let mut tasks = JoinSet::new();

        for key in keys {
            let check = Arc::clone(&check);
            let results = Arc::clone(&results);
            let permits = Arc::clone(&self.permits);
            let gauges = Arc::clone(&self.gauges);

            tasks.spawn(async move {
                let outcome = match acquire_permit(permits, gauges).await {
                    Ok(permit) => {
                        let outcome = (*check)(key).await;
                        drop(permit);
                        outcome
                    }
                    Err(error) => CheckOutcome::Error { key, error },
                };
                results.record(&outcome);
                outcome.kind()
            });
        }

        let mut summary = RunSummary {
            total: tasks.len(),
            ..Default::default()
        };
        if summary.total == 0 {
            tracing::debug!("no keys to check");
            return RunReport::default();
        }

        tracing::debug!(
            checks = summary.total,
            limit = self.limit,
            "dispatched existence checks"
        );

        let progress_every = (summary.total / 10).max(PROGRESS_MIN_STEP);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(kind) => summary.record(kind),
                Err(e) => {
                    tracing::error!(error = %e, "check task did not complete");
                    summary.record(OutcomeKind::Error);
                }
            }

            let completed = summary.completed();
            if completed % progress_every == 0 && completed < summary.total {
                let snapshot = self.snapshot();
                tracing::info!(
                    completed,
                    total = summary.total,
                    missing = summary.missing,
                    in_flight = snapshot.in_flight,
                    waiting = snapshot.waiting,
                    "check progress"
                );
            }
        }

        RunReport {
            entries: results.take_entries(),
            summary,
        }
    }
}
