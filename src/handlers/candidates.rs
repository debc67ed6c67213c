//! Entry candidate handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use validator::Validate;

use crate::engine::refresh::RefreshError;
use crate::models::*;
use crate::AppState;

/// GET /candidates - deduplicated per-stock candidates.
///
/// `refresh=true` triggers a pipeline run and waits for it with the
/// bounded poll loop; a wait timeout still answers, flagged degraded.
pub async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CandidateListQuery>,
) -> Result<Json<ListCandidatesResponse>, (StatusCode, String)> {
    let mut degraded = false;

    if q.refresh {
        let params = TriggerRefreshRequest::default();
        match state
            .coordinator
            .start(state.refresh_ctx.clone(), params)
            .await
        {
            Ok(()) | Err(RefreshError::AlreadyRunning) => {}
            Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        }
        if let Err(RefreshError::Timeout) = state.coordinator.wait_until_idle().await {
            warn!("candidate read proceeding with stale snapshot");
            degraded = true;
        }
    }

    let limit = q.limit.unwrap_or(200).clamp(1, 1000);
    let mut candidates = sqlx::query_as::<_, EntryCandidate>(
        "SELECT c.*,
                (SELECT COUNT(*) FROM candidate_feedback f
                  WHERE f.market = c.market AND f.symbol = c.symbol
                    AND f.snapshot_date = c.snapshot_date
                    AND f.verdict = 'accepted') AS useful_count,
                (SELECT COUNT(*) FROM candidate_feedback f
                  WHERE f.market = c.market AND f.symbol = c.symbol
                    AND f.snapshot_date = c.snapshot_date
                    AND f.verdict = 'rejected') AS useless_count
         FROM entry_candidates c
         WHERE c.snapshot_date = COALESCE($1, (SELECT MAX(snapshot_date) FROM entry_candidates))
           AND ($2 IS NULL OR c.market = $2)
           AND ($3 IS NULL OR c.status = $3)
           AND ($4 IS NULL OR c.score >= $4)
           AND ($5 IS NULL OR c.holding = $5)
           AND ($6 IS NULL OR c.source_pool = $6)
         ORDER BY CASE c.source_pool
                    WHEN 'market_scan' THEN 0
                    WHEN 'mixed' THEN 1
                    ELSE 2
                  END,
                  c.rank_score DESC
         LIMIT $7",
    )
    .bind(q.date)
    .bind(q.market)
    .bind(q.status)
    .bind(q.min_score)
    .bind(q.holding)
    .bind(q.source_pool)
    .bind(limit)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Holding-aware action view; the stored action stays canonical.
    for c in &mut candidates {
        c.action = c.action.display_for_holding(c.holding);
    }

    let snapshot_date = candidates.first().map(|c| c.snapshot_date);
    let total = candidates.len() as i64;

    Ok(Json(ListCandidatesResponse {
        candidates,
        total,
        snapshot_date,
        degraded,
    }))
}

/// POST /candidates/feedback - record an operator verdict.
///
/// Append-only; one verdict per (market, symbol, snapshot_date, source).
/// A repeat submission from the same source is a no-op.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<Json<CandidateFeedback>, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, errors.to_string()));
    }

    let snapshot_date = match req.snapshot_date {
        Some(d) => d,
        None => latest_candidate_date(&state)
            .await?
            .ok_or((StatusCode::NOT_FOUND, "no candidate snapshots yet".to_string()))?,
    };

    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM entry_candidates
         WHERE market = $1 AND symbol = $2 AND snapshot_date = $3",
    )
    .bind(req.market)
    .bind(&req.symbol)
    .bind(snapshot_date)
    .fetch_one(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if exists == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no candidate for {} {} on {}", req.market.as_str(), req.symbol, snapshot_date),
        ));
    }

    let feedback = sqlx::query_as::<_, CandidateFeedback>(
        "INSERT INTO candidate_feedback (id, market, symbol, snapshot_date, source, verdict, note)
         VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6)
         ON CONFLICT (market, symbol, snapshot_date, source) DO UPDATE SET
             verdict = candidate_feedback.verdict
         RETURNING *",
    )
    .bind(req.market)
    .bind(&req.symbol)
    .bind(snapshot_date)
    .bind(&req.source)
    .bind(req.verdict)
    .bind(&req.note)
    .fetch_one(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(feedback))
}

/// GET /candidates/feedback/stats - verdict rates plus day-over-day
/// candidate coverage.
pub async fn feedback_stats(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SnapshotListQuery>,
) -> Result<Json<FeedbackStatsResponse>, (StatusCode, String)> {
    let Some(latest) = latest_candidate_date(&state).await? else {
        return Ok(Json(FeedbackStatsResponse {
            snapshot_date: None,
            total: 0,
            accepted: 0,
            rejected: 0,
            deferred: 0,
            accept_rate: 0.0,
            new_symbols: vec![],
            dropped_symbols: vec![],
        }));
    };

    let counts: Vec<(FeedbackVerdict, i64)> = sqlx::query_as(
        "SELECT verdict, COUNT(*) FROM candidate_feedback
         WHERE snapshot_date = $1 AND ($2 IS NULL OR market = $2)
         GROUP BY verdict",
    )
    .bind(latest)
    .bind(q.market)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut accepted = 0;
    let mut rejected = 0;
    let mut deferred = 0;
    for (verdict, n) in counts {
        match verdict {
            FeedbackVerdict::Accepted => accepted = n,
            FeedbackVerdict::Rejected => rejected = n,
            FeedbackVerdict::Deferred => deferred = n,
        }
    }
    let total = accepted + rejected + deferred;
    let accept_rate = if total > 0 {
        accepted as f64 / total as f64
    } else {
        0.0
    };

    let today = candidate_symbols(&state, latest, q.market).await?;
    let previous_date: Option<NaiveDate> = sqlx::query_scalar(
        "SELECT MAX(snapshot_date) FROM entry_candidates WHERE snapshot_date < $1",
    )
    .bind(latest)
    .fetch_one(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let (new_symbols, dropped_symbols) = match previous_date {
        Some(prev) => {
            let yesterday = candidate_symbols(&state, prev, q.market).await?;
            let mut new: Vec<String> = today.difference(&yesterday).cloned().collect();
            let mut dropped: Vec<String> = yesterday.difference(&today).cloned().collect();
            new.sort();
            dropped.sort();
            (new, dropped)
        }
        None => {
            let mut new: Vec<String> = today.into_iter().collect();
            new.sort();
            (new, vec![])
        }
    };

    Ok(Json(FeedbackStatsResponse {
        snapshot_date: Some(latest),
        total,
        accepted,
        rejected,
        deferred,
        accept_rate,
        new_symbols,
        dropped_symbols,
    }))
}

async fn latest_candidate_date(
    state: &AppState,
) -> Result<Option<NaiveDate>, (StatusCode, String)> {
    sqlx::query_scalar("SELECT MAX(snapshot_date) FROM entry_candidates")
        .fetch_one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn candidate_symbols(
    state: &AppState,
    date: NaiveDate,
    market: Option<Market>,
) -> Result<HashSet<String>, (StatusCode, String)> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT symbol FROM entry_candidates
         WHERE snapshot_date = $1 AND ($2 IS NULL OR market = $2)",
    )
    .bind(date)
    .bind(market)
    .fetch_all(&state.db)
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}
