//! Aggregate statistics handler

use axum::{extract::State, http::StatusCode, Json};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

/// GET /stats - one-call overview of the latest snapshot: totals,
/// factor averages, regimes, risk posture, and per-strategy buckets.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StrategyStatsResponse>, (StatusCode, String)> {
    let snapshot_date: Option<NaiveDate> =
        sqlx::query_scalar("SELECT MAX(snapshot_date) FROM strategy_signals")
            .fetch_one(&state.db)
            .await
            .map_err(internal)?;

    let Some(date) = snapshot_date else {
        return Ok(Json(StrategyStatsResponse {
            snapshot_date: None,
            signal_total: 0,
            candidate_total: 0,
            active_candidates: 0,
            constrained_signals: 0,
            factor_averages: FactorAverages::default(),
            regimes: vec![],
            portfolio_risk: vec![],
            by_strategy: vec![],
            by_market: vec![],
            recent_weight_updates: vec![],
        }));
    };

    let (signal_total, constrained_signals): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE constrained)
         FROM strategy_signals WHERE snapshot_date = $1",
    )
    .bind(date)
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    let (candidate_total, active_candidates): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'active')
         FROM entry_candidates WHERE snapshot_date = $1",
    )
    .bind(date)
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    let averages: (
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
    ) = sqlx::query_as(
        "SELECT AVG(f.alpha_score), AVG(f.catalyst_score), AVG(f.quality_score),
                AVG(f.risk_penalty), AVG(f.crowding_penalty), AVG(f.weighted_score)
         FROM factor_breakdowns f
         JOIN strategy_signals s ON s.id = f.signal_id
         WHERE s.snapshot_date = $1",
    )
    .bind(date)
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;
    let factor_averages = FactorAverages {
        alpha: averages.0.unwrap_or(0.0),
        catalyst: averages.1.unwrap_or(0.0),
        quality: averages.2.unwrap_or(0.0),
        risk_penalty: averages.3.unwrap_or(0.0),
        crowding_penalty: averages.4.unwrap_or(0.0),
        weighted_score: averages.5.unwrap_or(0.0),
    };

    let regimes = sqlx::query_as::<_, RegimeSnapshot>(
        "SELECT DISTINCT ON (market) * FROM regime_snapshots
         ORDER BY market, snapshot_date DESC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let portfolio_risk = sqlx::query_as::<_, PortfolioRiskSnapshot>(
        "SELECT DISTINCT ON (market) * FROM portfolio_risk_snapshots
         ORDER BY market, snapshot_date DESC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let by_strategy = sqlx::query_as::<_, StrategyBucket>(
        "SELECT strategy_code,
                COUNT(*) AS signal_count,
                AVG(rank_score) AS avg_rank_score,
                COUNT(*) FILTER (WHERE status = 'active') AS active_count
         FROM strategy_signals
         WHERE snapshot_date = $1
         GROUP BY strategy_code
         ORDER BY signal_count DESC, strategy_code",
    )
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let by_market = sqlx::query_as::<_, MarketBucket>(
        "SELECT s.market,
                COUNT(*) AS signal_count,
                (SELECT COUNT(*) FROM entry_candidates c
                 WHERE c.market = s.market AND c.snapshot_date = $1) AS candidate_count
         FROM strategy_signals s
         WHERE s.snapshot_date = $1
         GROUP BY s.market
         ORDER BY s.market",
    )
    .bind(date)
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let recent_weight_updates = sqlx::query_as::<_, WeightHistoryEntry>(
        "SELECT * FROM weight_history ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    Ok(Json(StrategyStatsResponse {
        snapshot_date: Some(date),
        signal_total,
        candidate_total,
        active_candidates,
        constrained_signals,
        factor_averages,
        regimes,
        portfolio_risk,
        by_strategy,
        by_market,
        recent_weight_updates,
    }))
}

fn internal(e: sqlx::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
