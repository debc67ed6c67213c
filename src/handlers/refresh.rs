//! Pipeline trigger and status handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::engine::refresh::{self, RefreshError, RefreshStatus};
use crate::engine::weights::WeightUpdate;
use crate::models::{EvaluateOutcomesRequest, Market, RebalanceRequest, TriggerRefreshRequest};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TriggerRefreshResponse {
    pub started: bool,
    pub timed_out: bool,
    pub status: RefreshStatus,
}

/// POST /refresh - kick off a pipeline run.
///
/// With `wait=false` this returns as soon as the run is spawned. A run
/// already in flight is not an error; the response reports
/// `started: false` and the live status. With `wait=true` the handler
/// joins the bounded poll loop and reports `timed_out` when the run
/// outlives it.
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRefreshRequest>,
) -> Result<Json<TriggerRefreshResponse>, (StatusCode, String)> {
    let wait = req.wait;
    let started = match state
        .coordinator
        .start(state.refresh_ctx.clone(), req)
        .await
    {
        Ok(()) => true,
        Err(RefreshError::AlreadyRunning) => false,
        Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let (status, timed_out) = if wait {
        match state.coordinator.wait_until_idle().await {
            Ok(status) => (status, false),
            Err(RefreshError::Timeout) => (state.coordinator.status().await, true),
            Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        }
    } else {
        (state.coordinator.status().await, false)
    };

    Ok(Json(TriggerRefreshResponse {
        started,
        timed_out,
        status,
    }))
}

#[derive(Debug, Serialize)]
pub struct EvaluateOutcomesResponse {
    pub markets: Vec<Market>,
    pub evaluated: u64,
}

/// POST /outcomes/evaluate - grade matured signals outside a pipeline
/// run, optionally widening the lookback window.
pub async fn evaluate_outcomes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateOutcomesRequest>,
) -> Result<Json<EvaluateOutcomesResponse>, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, errors.to_string()));
    }

    let cfg = req.merged(&state.refresh_ctx.engine.outcomes);
    let markets = req.markets.unwrap_or_else(|| Market::all().to_vec());
    let today = Utc::now().date_naive();

    let mut evaluated = 0;
    for &market in &markets {
        evaluated += refresh::evaluate_market(&state.refresh_ctx, market, &cfg, today)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;
    }

    Ok(Json(EvaluateOutcomesResponse { markets, evaluated }))
}

#[derive(Debug, Serialize)]
pub struct RebalanceResponse {
    pub updates: Vec<WeightUpdate>,
    pub total: i64,
}

/// POST /weights/rebalance - rebalance strategy weights from recent
/// outcomes with per-request window/min-samples/alpha overrides.
pub async fn rebalance_weights(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RebalanceRequest>,
) -> Result<Json<RebalanceResponse>, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, errors.to_string()));
    }

    let cfg = req.merged(&state.refresh_ctx.engine.rebalance);
    let today = Utc::now().date_naive();
    let updates = refresh::rebalance_weights(&state.refresh_ctx, &cfg, today)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;

    let total = updates.len() as i64;
    Ok(Json(RebalanceResponse { updates, total }))
}

/// GET /refresh/status
pub async fn refresh_status(
    State(state): State<Arc<AppState>>,
) -> Json<RefreshStatus> {
    Json(state.coordinator.status().await)
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
