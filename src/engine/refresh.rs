//! Refresh coordination.
//!
//! One pipeline run at a time, guarded by a compare-and-swap on an
//! atomic flag. Callers either start the run, observe that one is in
//! flight, or wait on it with a bounded poll loop; exhausting the loop
//! is a timeout, which is not a pipeline failure.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::catalog;
use crate::config::EngineConfig;
use crate::db::Db;
use crate::marketdata::MarketDataProvider;
use crate::models::{Market, TriggerRefreshRequest};
use crate::store;
use crate::strategies::{StockFeatures, StrategyRegistry};

use super::{
    candidates, constraints, dedupe, factors, features as feature_builder, outcomes, regime,
    weights,
};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh is already running")]
    AlreadyRunning,
    #[error("timed out waiting for the refresh to finish")]
    Timeout,
    #[error("refresh failed: {0}")]
    Failed(String),
}

/// Externally visible run state.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_snapshot_date: Option<NaiveDate>,
}

/// Everything a pipeline run needs.
pub struct RefreshContext {
    pub db: Db,
    pub provider: Arc<dyn MarketDataProvider>,
    pub registry: StrategyRegistry,
    pub engine: EngineConfig,
}

pub struct RefreshCoordinator {
    running: AtomicBool,
    status: RwLock<RefreshStatus>,
    wait_poll_interval: Duration,
    wait_max_attempts: u32,
}

impl RefreshCoordinator {
    pub fn new(wait_poll_interval_ms: u64, wait_max_attempts: u32) -> Self {
        Self {
            running: AtomicBool::new(false),
            status: RwLock::new(RefreshStatus::default()),
            wait_poll_interval: Duration::from_millis(wait_poll_interval_ms),
            wait_max_attempts,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    /// Win the flag or report a run in flight.
    async fn try_begin(&self) -> Result<(), RefreshError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RefreshError::AlreadyRunning);
        }
        let mut status = self.status.write().await;
        status.running = true;
        status.started_at = Some(Utc::now());
        status.finished_at = None;
        status.last_error = None;
        Ok(())
    }

    async fn finish(&self, result: Result<NaiveDate, String>) {
        {
            let mut status = self.status.write().await;
            status.running = false;
            status.finished_at = Some(Utc::now());
            match result {
                Ok(date) => {
                    status.last_snapshot_date = Some(date);
                    status.last_error = None;
                }
                Err(e) => status.last_error = Some(e),
            }
        }
        // Status is settled before the flag opens the next run.
        self.running.store(false, Ordering::Release);
    }

    /// Start a background run. Returns immediately; `AlreadyRunning`
    /// when another caller holds the flag.
    pub async fn start(
        self: &Arc<Self>,
        ctx: Arc<RefreshContext>,
        params: TriggerRefreshRequest,
    ) -> Result<(), RefreshError> {
        self.try_begin().await?;
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let result = run_pipeline(&ctx, &params).await;
            match &result {
                Ok(date) => info!("refresh finished for {}", date),
                Err(e) => error!("refresh failed: {:#}", e),
            }
            coordinator
                .finish(result.map_err(|e| format!("{:#}", e)))
                .await;
        });
        Ok(())
    }

    /// Bounded poll until the in-flight run settles. Exhaustion means
    /// timeout, never failure.
    pub async fn wait_until_idle(&self) -> Result<RefreshStatus, RefreshError> {
        for _ in 0..self.wait_max_attempts {
            if !self.is_running() {
                return Ok(self.status().await);
            }
            tokio::time::sleep(self.wait_poll_interval).await;
        }
        warn!("gave up waiting on refresh after {} polls", self.wait_max_attempts);
        Err(RefreshError::Timeout)
    }
}

/// Full pipeline: every requested market, then the optional outcome and
/// rebalance passes. Stages already persisted survive a later failure.
pub async fn run_pipeline(
    ctx: &RefreshContext,
    params: &TriggerRefreshRequest,
) -> anyhow::Result<NaiveDate> {
    let snapshot_date = Utc::now().date_naive();
    let markets = params
        .markets
        .clone()
        .unwrap_or_else(|| Market::all().to_vec());

    catalog::ensure_catalog(&ctx.db).await?;

    for &market in &markets {
        refresh_market(ctx, market, snapshot_date).await?;
        if params.evaluate_outcomes {
            evaluate_market(ctx, market, &ctx.engine.outcomes, snapshot_date).await?;
        }
    }

    if params.rebalance {
        rebalance_weights(ctx, &ctx.engine.rebalance, snapshot_date).await?;
    }

    Ok(snapshot_date)
}

async fn refresh_market(
    ctx: &RefreshContext,
    market: Market,
    snapshot_date: NaiveDate,
) -> anyhow::Result<()> {
    info!("refreshing {} for {}", market.as_str(), snapshot_date);

    let snapshots = ctx.provider.snapshots(market).await?;
    let news = ctx.provider.news(market).await?;
    let holdings = ctx.provider.holdings(market).await?;
    let watchlist = ctx.provider.watchlist(market).await?;

    let features =
        feature_builder::build_features(snapshots, &news, &holdings, &watchlist, Utc::now());
    let mut drafts = super::build_drafts(&features, &ctx.registry, snapshot_date);
    info!(
        "{}: {} stocks produced {} raw signals",
        market.as_str(),
        features.len(),
        drafts.len()
    );

    let changes: Vec<f64> = features.iter().map(|f| f.snapshot.change_pct).collect();
    let reading = regime::assess(&changes, super::active_ratio(&drafts), &ctx.engine.regime);
    store::upsert_regime_snapshot(&ctx.db, market, snapshot_date, &reading).await?;

    // Weight snapshot is taken once per market per run; a concurrent
    // catalog edit affects the next run, not this one.
    let weight_map =
        catalog::effective_weight_map(&ctx.db, market, catalog::DEFAULT_REGIME).await?;
    let by_symbol: HashMap<String, &StockFeatures> = features
        .iter()
        .map(|f| (f.snapshot.symbol.clone(), f))
        .collect();
    factors::apply(
        &mut drafts,
        &by_symbol,
        &weight_map,
        &reading,
        &ctx.engine.factors,
    );

    let risk = constraints::apply(&mut drafts, market, &ctx.engine.constraints);
    store::upsert_risk_snapshot(&ctx.db, market, snapshot_date, &risk).await?;

    store::upsert_signals(&ctx.db, &mut drafts).await?;
    store::upsert_factors(&ctx.db, &drafts).await?;
    let keep: Vec<_> = drafts.iter().map(|d| d.id).collect();
    let purged = store::purge_stale_signals(&ctx.db, market, snapshot_date, &keep).await?;
    if purged > 0 {
        info!("{}: purged {} stale signals", market.as_str(), purged);
    }

    let groups = dedupe::group(&drafts, ctx.engine.dedup.score_epsilon);
    let cands: Vec<_> = groups
        .iter()
        .map(|g| {
            candidates::from_group(
                g,
                &drafts,
                by_symbol.get(&g.symbol).copied(),
                &ctx.engine.candidates,
            )
        })
        .collect();
    let ids = store::upsert_candidates(&ctx.db, &cands).await?;
    store::purge_stale_candidates(&ctx.db, market, snapshot_date, &ids).await?;
    info!(
        "{}: {} candidates ({} active)",
        market.as_str(),
        cands.len(),
        cands
            .iter()
            .filter(|c| c.status == crate::models::CandidateStatus::Active)
            .count()
    );

    Ok(())
}

/// Grade matured signals for one market. Callable outside a pipeline
/// run with its own config, so the evaluation trigger can widen the
/// lookback per request. Returns the number of outcomes written.
pub async fn evaluate_market(
    ctx: &RefreshContext,
    market: Market,
    cfg: &crate::config::OutcomeConfig,
    today: NaiveDate,
) -> anyhow::Result<u64> {
    let inputs = store::load_outcome_inputs(&ctx.db, market, today).await?;
    if inputs.is_empty() {
        return Ok(0);
    }
    let existing = store::existing_outcome_pairs(&ctx.db, market).await?;
    let horizons = &cfg.horizons;

    let mut inserted = 0;
    for input in inputs {
        // Every horizon already graded: skip the feed call entirely.
        if horizons
            .iter()
            .all(|&h| existing.contains(&(input.signal_id, h)))
        {
            continue;
        }
        // Signals older than the lookback have left the window.
        if (today - input.snapshot_date).num_days() > cfg.lookback_days as i64 {
            continue;
        }
        let bars = ctx
            .provider
            .daily_bars(market, &input.symbol, input.snapshot_date)
            .await?;
        let mut drafts = outcomes::evaluate(&input, &bars, horizons);
        outcomes::retain_new(&mut drafts, &existing);
        inserted += store::insert_outcomes(&ctx.db, &drafts).await?;
    }
    if inserted > 0 {
        info!("{}: graded {} new outcomes", market.as_str(), inserted);
    }
    Ok(inserted)
}

/// Rebalance every (strategy, market, regime) target from recent
/// outcomes. Callable outside a pipeline run with per-request
/// tunables; returns the applied updates.
pub async fn rebalance_weights(
    ctx: &RefreshContext,
    cfg: &crate::config::RebalanceConfig,
    today: NaiveDate,
) -> anyhow::Result<Vec<weights::WeightUpdate>> {
    let returns = store::recent_outcome_returns(&ctx.db, cfg.window_days, today).await?;
    let aggregates = weights::aggregate(&returns, cfg);
    let defaults = catalog::default_weight_map(&ctx.db).await?;
    let current = store::effective_weight_rows(&ctx.db, catalog::DEFAULT_REGIME).await?;

    let updates = weights::rebalance(&defaults, &current, &aggregates, catalog::DEFAULT_REGIME, cfg);
    for u in &updates {
        info!(
            "rebalance {} [{}/{}]: {:.4} -> {:.4} ({})",
            u.strategy_code, u.market, u.regime, u.old_weight, u.new_weight, u.reason
        );
        store::apply_weight_update(&ctx.db, u).await?;
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn coordinator() -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(5, 3))
    }

    #[tokio::test]
    async fn second_begin_loses_the_flag() {
        let c = coordinator();
        assert_ok!(c.try_begin().await);
        assert!(matches!(
            c.try_begin().await,
            Err(RefreshError::AlreadyRunning)
        ));
        c.finish(Ok(Utc::now().date_naive())).await;
        // flag released, next begin wins again
        assert_ok!(c.try_begin().await);
    }

    #[tokio::test]
    async fn finish_records_snapshot_date_and_clears_error() {
        let c = coordinator();
        c.try_begin().await.unwrap();
        let date = Utc::now().date_naive();
        c.finish(Ok(date)).await;

        let status = c.status().await;
        assert!(!status.running);
        assert_eq!(status.last_snapshot_date, Some(date));
        assert!(status.last_error.is_none());
        assert!(status.finished_at.is_some());
    }

    #[tokio::test]
    async fn failure_keeps_previous_snapshot_date() {
        let c = coordinator();
        let date = Utc::now().date_naive();
        c.try_begin().await.unwrap();
        c.finish(Ok(date)).await;

        c.try_begin().await.unwrap();
        c.finish(Err("feed unavailable".into())).await;

        let status = c.status().await;
        assert_eq!(status.last_error.as_deref(), Some("feed unavailable"));
        assert_eq!(status.last_snapshot_date, Some(date));
        assert!(!c.is_running());
    }

    #[tokio::test]
    async fn wait_times_out_while_flag_is_held() {
        let c = coordinator();
        c.try_begin().await.unwrap();
        assert!(matches!(
            c.wait_until_idle().await,
            Err(RefreshError::Timeout)
        ));
    }

    #[tokio::test]
    async fn wait_returns_once_idle() {
        let c = coordinator();
        c.try_begin().await.unwrap();

        let waiter = Arc::clone(&c);
        let handle = tokio::spawn(async move { waiter.wait_until_idle().await });
        tokio::time::sleep(Duration::from_millis(2)).await;
        c.finish(Ok(Utc::now().date_naive())).await;

        let status = handle.await.unwrap().unwrap();
        assert!(!status.running);
        assert!(status.last_snapshot_date.is_some());
    }

    #[tokio::test]
    async fn concurrent_begins_admit_exactly_one() {
        let c = coordinator();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&c);
            handles.push(tokio::spawn(async move { c.try_begin().await.is_ok() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
