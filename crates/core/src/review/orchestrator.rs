use crate::catalog::AssetCatalog;
use crate::domain::analysis::AssetAnalysis;
use crate::domain::catalog::Portfolio;
use crate::review::AssetReviewer;
use crate::storage::lock::ReviewLock;
use crate::time::schedule::ReviewSchedule;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Result of a batch run request.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Vec<AssetAnalysis>),
    /// Another batch run was in progress; nothing was started.
    AlreadyRunning,
    /// The run could not iterate the catalog at all.
    Aborted(String),
}

impl RunOutcome {
    pub fn into_analyses(self) -> Vec<AssetAnalysis> {
        match self {
            RunOutcome::Completed(analyses) => analyses,
            RunOutcome::AlreadyRunning | RunOutcome::Aborted(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_status: String,
    pub last_run_failures: usize,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            running: false,
            last_run_time: None,
            last_run_status: "never run".to_string(),
            last_run_failures: 0,
        }
    }
}

pub const CANCELLED_STATUS: &str = "error: run cancelled";

/// Releases the single-flight flag when dropped. A run dropped before `finish` (panic or
/// cancellation) is recorded as cancelled.
struct RunGuard<'a> {
    state: &'a Mutex<RunStatus>,
    recorded: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, status: String, failures: usize) {
        record(&mut lock_state(self.state), status, failures);
        self.recorded = true;
    }

    /// Releases the flag without touching the last-run fields; nothing was started.
    fn release_unstarted(mut self) {
        self.recorded = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock_state(self.state);
        if !self.recorded {
            tracing::warn!("review run dropped before completion");
            record(&mut state, CANCELLED_STATUS.to_string(), 0);
        }
        state.running = false;
    }
}

fn record(state: &mut RunStatus, status: String, failures: usize) {
    state.last_run_time = Some(Utc::now());
    state.last_run_status = status;
    state.last_run_failures = failures;
}

fn lock_state(state: &Mutex<RunStatus>) -> MutexGuard<'_, RunStatus> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs review cycles over the catalog, at most one batch at a time.
pub struct ReviewOrchestrator {
    catalog: Arc<dyn AssetCatalog>,
    reviewer: AssetReviewer,
    pacing: Duration,
    state: Mutex<RunStatus>,
    lock_pool: Option<sqlx::PgPool>,
}

impl ReviewOrchestrator {
    pub fn new(catalog: Arc<dyn AssetCatalog>, reviewer: AssetReviewer) -> Self {
        Self {
            catalog,
            reviewer,
            pacing: DEFAULT_PACING,
            state: Mutex::new(RunStatus::default()),
            lock_pool: None,
        }
    }

    /// Delay inserted between two asset reviews of the same run.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Also hold a Postgres advisory lock during batch runs, for exclusion across processes.
    pub fn with_distributed_lock(mut self, pool: sqlx::PgPool) -> Self {
        self.lock_pool = Some(pool);
        self
    }

    pub fn reviewer(&self) -> &AssetReviewer {
        &self.reviewer
    }

    pub fn status(&self) -> RunStatus {
        lock_state(&self.state).clone()
    }

    pub async fn trigger_scheduled(self: &Arc<Self>) {
        tracing::info!("scheduled review triggered");
        match self.run_detached(None).await {
            RunOutcome::Completed(analyses) => {
                tracing::info!(assets = analyses.len(), "scheduled review finished")
            }
            RunOutcome::AlreadyRunning => {
                tracing::warn!("scheduled review skipped; a run is already in progress")
            }
            RunOutcome::Aborted(error) => tracing::error!(%error, "scheduled review aborted"),
        }
    }

    pub async fn run_full(&self) -> RunOutcome {
        self.run_batch(None).await
    }

    pub async fn run_portfolio(&self, portfolio_name: &str) -> RunOutcome {
        self.run_batch(Some(portfolio_name)).await
    }

    /// Runs the batch (`scope` = one portfolio, or all) on its own task. Dropping the returned
    /// future leaves the run going, so a disconnected caller cannot cut it short.
    pub async fn run_detached(self: &Arc<Self>, scope: Option<String>) -> RunOutcome {
        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move { orchestrator.run_batch(scope.as_deref()).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "review task did not complete");
                RunOutcome::Aborted(format!("review task did not complete: {err}"))
            }
        }
    }

    /// Reviews one catalog asset. Deliberately not gated by the batch flag, so it may overlap
    /// a batch run; the last write for the ticker wins.
    pub async fn run_asset(&self, ticker: &str, portfolio_name: &str) -> Option<AssetAnalysis> {
        let portfolios = match self.catalog.list_portfolios().await {
            Ok(p) => p,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to enumerate portfolios");
                return None;
            }
        };

        let Some(asset) = portfolios
            .iter()
            .filter(|p| p.name == portfolio_name)
            .flat_map(|p| p.assets.iter())
            .find(|a| a.ticker.trim().eq_ignore_ascii_case(ticker.trim()))
        else {
            tracing::info!(ticker, portfolio = portfolio_name, "asset not found in catalog");
            return None;
        };

        if !asset.asset_type.is_reviewable() {
            tracing::info!(ticker, asset_type = asset.asset_type.as_str(), "asset type is not reviewed");
            return None;
        }

        match self.reviewer.review(portfolio_name, asset).await {
            Ok(analysis) => Some(analysis),
            Err(err) => {
                tracing::error!(ticker, error = %format!("{err:#}"), "asset review failed");
                None
            }
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut state = lock_state(&self.state);
        if state.running {
            return None;
        }
        state.running = true;
        Some(RunGuard {
            state: &self.state,
            recorded: false,
        })
    }

    async fn run_batch(&self, scope: Option<&str>) -> RunOutcome {
        let Some(guard) = self.try_begin() else {
            tracing::info!(scope, "review run already in progress");
            return RunOutcome::AlreadyRunning;
        };

        let lock = match &self.lock_pool {
            None => None,
            Some(pool) => match ReviewLock::try_acquire(pool).await {
                Ok(Some(lock)) => Some(lock),
                Ok(None) => {
                    tracing::info!(scope, "review lock held by another process");
                    guard.release_unstarted();
                    return RunOutcome::AlreadyRunning;
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::error!(%error, "review lock unavailable; aborting run");
                    guard.finish(format!("error: {error}"), 0);
                    return RunOutcome::Aborted(error);
                }
            },
        };

        let result = self.review_all(scope).await;

        if let Some(lock) = lock {
            if let Err(err) = lock.release().await {
                tracing::warn!(error = %format!("{err:#}"), "failed to release review lock");
            }
        }

        match result {
            Ok((analyses, failures)) => {
                guard.finish(format!("completed: {} assets", analyses.len()), failures);
                RunOutcome::Completed(analyses)
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(scope, %error, "review run aborted");
                guard.finish(format!("error: {error}"), 0);
                RunOutcome::Aborted(error)
            }
        }
    }

    async fn review_all(&self, scope: Option<&str>) -> anyhow::Result<(Vec<AssetAnalysis>, usize)> {
        let portfolios: Vec<Portfolio> = self
            .catalog
            .list_portfolios()
            .await
            .context("failed to enumerate portfolios")?
            .into_iter()
            .filter(|p| scope.map_or(true, |name| p.name == name))
            .collect();

        if let Some(name) = scope {
            if portfolios.is_empty() {
                tracing::warn!(portfolio = name, "portfolio not found in catalog");
            }
        }

        let total: usize = portfolios
            .iter()
            .map(|p| p.assets.iter().filter(|a| a.asset_type.is_reviewable()).count())
            .sum();
        tracing::info!(scope, portfolios = portfolios.len(), total, "review run started");

        let mut out = Vec::with_capacity(total);
        let mut failures: usize = 0;
        let mut idx: usize = 0;

        for portfolio in &portfolios {
            for asset in portfolio.assets.iter().filter(|a| a.asset_type.is_reviewable()) {
                if idx != 0 {
                    tokio::time::sleep(self.pacing).await;
                }
                idx += 1;

                match self.reviewer.review(&portfolio.name, asset).await {
                    Ok(analysis) => out.push(analysis),
                    Err(err) => {
                        failures += 1;
                        tracing::error!(
                            idx,
                            ticker = %asset.ticker,
                            portfolio = %portfolio.name,
                            failure_count = failures,
                            error = %format!("{err:#}"),
                            "asset review failed; skipping asset"
                        );
                    }
                }
            }
        }

        tracing::info!(scope, total, reviewed = out.len(), failures, "review run finished");
        Ok((out, failures))
    }
}

/// Fires `trigger_scheduled` on every slot of `schedule`, forever.
pub fn spawn_review_timer(
    orchestrator: Arc<ReviewOrchestrator>,
    schedule: ReviewSchedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_fire_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(next_run = %next, "next scheduled review");
            tokio::time::sleep(wait).await;
            orchestrator.trigger_scheduled().await;
        }
    })
}
