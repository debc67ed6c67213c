//! Strategy catalog handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::models::*;
use crate::AppState;

/// GET /strategies - the catalog of judges and their default weights.
pub async fn list_strategies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListStrategiesResponse>, (StatusCode, String)> {
    let strategies = sqlx::query_as::<_, StrategyDefinition>(
        "SELECT * FROM strategy_definitions ORDER BY code",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let total = strategies.len() as i64;
    Ok(Json(ListStrategiesResponse { strategies, total }))
}

/// PATCH /strategies/{code} - adjust the default weight or enabled
/// flag. Effective per-(market, regime) weights are written by the
/// rebalancer, not this endpoint.
pub async fn update_strategy(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<UpdateStrategyRequest>,
) -> Result<Json<StrategyDefinition>, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, errors.to_string()));
    }
    if req.weight.is_none() && req.enabled.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "nothing to update: provide weight and/or enabled".to_string(),
        ));
    }

    let strategy = sqlx::query_as::<_, StrategyDefinition>(
        "UPDATE strategy_definitions SET
             weight = COALESCE($1, weight),
             enabled = COALESCE($2, enabled),
             updated_at = NOW()
         WHERE code = $3
         RETURNING *",
    )
    .bind(req.weight)
    .bind(req.enabled)
    .bind(&code)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .ok_or((StatusCode::NOT_FOUND, format!("unknown strategy {}", code)))?;

    Ok(Json(strategy))
}

/// GET /strategies/weight-history - rebalancer audit trail, newest first.
pub async fn list_weight_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WeightHistoryQuery>,
) -> Result<Json<ListWeightHistoryResponse>, (StatusCode, String)> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let entries = sqlx::query_as::<_, WeightHistoryEntry>(
        "SELECT * FROM weight_history
         WHERE ($1 IS NULL OR strategy_code = $1)
           AND ($2 IS NULL OR market = $2)
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(q.strategy_code)
    .bind(q.market)
    .bind(limit)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListWeightHistoryResponse { entries }))
}
