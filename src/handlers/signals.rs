//! Strategy signal and snapshot read handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::*;
use crate::AppState;

/// GET /signals - raw per-strategy signals, newest snapshot by default.
pub async fn list_signals(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SignalListQuery>,
) -> Result<Json<ListSignalsResponse>, (StatusCode, String)> {
    let limit = q.limit.unwrap_or(500).clamp(1, 2000);
    let mut signals = sqlx::query_as::<_, StrategySignal>(
        "SELECT * FROM strategy_signals
         WHERE snapshot_date = COALESCE($1, (SELECT MAX(snapshot_date) FROM strategy_signals))
           AND ($2 IS NULL OR market = $2)
           AND ($3 IS NULL OR status = $3)
           AND ($4 IS NULL OR score >= $4)
           AND ($5 IS NULL OR holding = $5)
           AND ($6 IS NULL OR source_pool = $6)
           AND ($7 IS NULL OR strategy_code = $7)
           AND ($8 IS NULL OR risk_level = $8)
         ORDER BY rank_score DESC
         LIMIT $9",
    )
    .bind(q.date)
    .bind(q.market)
    .bind(q.status)
    .bind(q.min_score)
    .bind(q.holding)
    .bind(q.source_pool)
    .bind(q.strategy_code)
    .bind(q.risk_level)
    .bind(limit)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Holding-aware action view; the stored action stays canonical.
    for s in &mut signals {
        s.action = s.action.display_for_holding(s.holding);
    }

    let total = signals.len() as i64;
    Ok(Json(ListSignalsResponse { signals, total }))
}

/// GET /signals/{signal_id}/factors - the stored score decomposition.
pub async fn get_factor_breakdown(
    State(state): State<Arc<AppState>>,
    Path(signal_id): Path<Uuid>,
) -> Result<Json<FactorBreakdown>, (StatusCode, String)> {
    let breakdown = sqlx::query_as::<_, FactorBreakdown>(
        "SELECT * FROM factor_breakdowns WHERE signal_id = $1",
    )
    .bind(signal_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .ok_or((
        StatusCode::NOT_FOUND,
        format!("no factor breakdown for signal {}", signal_id),
    ))?;

    Ok(Json(breakdown))
}

/// GET /regimes - recent regime snapshots, newest first.
pub async fn list_regimes(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SnapshotListQuery>,
) -> Result<Json<ListRegimesResponse>, (StatusCode, String)> {
    let days = q.days.unwrap_or(14).clamp(1, 365);
    let regimes = sqlx::query_as::<_, RegimeSnapshot>(
        "SELECT * FROM regime_snapshots
         WHERE snapshot_date > CURRENT_DATE - $1::int
           AND ($2 IS NULL OR market = $2)
         ORDER BY snapshot_date DESC, market",
    )
    .bind(days as i32)
    .bind(q.market)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListRegimesResponse { regimes }))
}

/// GET /risk - recent portfolio risk snapshots, newest first.
pub async fn list_risk_snapshots(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SnapshotListQuery>,
) -> Result<Json<ListRiskSnapshotsResponse>, (StatusCode, String)> {
    let days = q.days.unwrap_or(14).clamp(1, 365);
    let snapshots = sqlx::query_as::<_, PortfolioRiskSnapshot>(
        "SELECT * FROM portfolio_risk_snapshots
         WHERE snapshot_date > CURRENT_DATE - $1::int
           AND ($2 IS NULL OR market = $2)
         ORDER BY snapshot_date DESC, market",
    )
    .bind(days as i32)
    .bind(q.market)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListRiskSnapshotsResponse { snapshots }))
}
