//! Pipeline persistence.
//!
//! Write paths for the refresh pipeline plus the bulk loads the
//! evaluator and rebalancer need. Read queries serving the API live in
//! the handlers.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::Db;
use crate::engine::candidates::CandidateDraft;
use crate::engine::constraints::RiskReading;
use crate::engine::outcomes::{OutcomeDraft, OutcomeInput};
use crate::engine::regime::RegimeReading;
use crate::engine::weights::WeightUpdate;
use crate::engine::SignalDraft;
use crate::models::Market;

/// Upsert drafts keyed by (strategy_code, market, symbol, snapshot_date).
/// Existing rows keep their id; the persisted id and updated_at are
/// written back into each draft.
pub async fn upsert_signals(db: &Db, drafts: &mut [SignalDraft]) -> anyhow::Result<()> {
    for d in drafts.iter_mut() {
        let (id, updated_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO strategy_signals
                (id, strategy_code, market, symbol, stock_name, snapshot_date, action, status,
                 score, rank_score, confidence, source_pool, risk_level, holding,
                 entry_low, entry_high, stop_loss, target, invalidation, snapshot_price,
                 evidence, constrained, constraint_reasons)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                     $15, $16, $17, $18, $19, $20, $21, $22, $23)
             ON CONFLICT (strategy_code, market, symbol, snapshot_date) DO UPDATE SET
                 stock_name = EXCLUDED.stock_name,
                 action = EXCLUDED.action,
                 status = EXCLUDED.status,
                 score = EXCLUDED.score,
                 rank_score = EXCLUDED.rank_score,
                 confidence = EXCLUDED.confidence,
                 source_pool = EXCLUDED.source_pool,
                 risk_level = EXCLUDED.risk_level,
                 holding = EXCLUDED.holding,
                 entry_low = EXCLUDED.entry_low,
                 entry_high = EXCLUDED.entry_high,
                 stop_loss = EXCLUDED.stop_loss,
                 target = EXCLUDED.target,
                 invalidation = EXCLUDED.invalidation,
                 snapshot_price = EXCLUDED.snapshot_price,
                 evidence = EXCLUDED.evidence,
                 constrained = EXCLUDED.constrained,
                 constraint_reasons = EXCLUDED.constraint_reasons,
                 updated_at = now()
             RETURNING id, updated_at",
        )
        .bind(d.id)
        .bind(&d.strategy_code)
        .bind(d.market)
        .bind(&d.symbol)
        .bind(&d.stock_name)
        .bind(d.snapshot_date)
        .bind(d.action)
        .bind(d.status)
        .bind(d.score)
        .bind(d.rank_score)
        .bind(d.confidence)
        .bind(d.source_pool)
        .bind(d.risk_level)
        .bind(d.holding)
        .bind(d.entry_low)
        .bind(d.entry_high)
        .bind(d.stop_loss)
        .bind(d.target)
        .bind(&d.invalidation)
        .bind(d.snapshot_price)
        .bind(json!(d.evidence))
        .bind(d.constrained)
        .bind(json!(d.constraint_reasons))
        .fetch_one(db)
        .await?;

        d.id = id;
        d.updated_at = updated_at;
    }
    Ok(())
}

/// Delete same-day signal rows this refresh did not produce.
pub async fn purge_stale_signals(
    db: &Db,
    market: Market,
    snapshot_date: NaiveDate,
    keep: &[Uuid],
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM strategy_signals
         WHERE market = $1 AND snapshot_date = $2 AND NOT (id = ANY($3))",
    )
    .bind(market)
    .bind(snapshot_date)
    .bind(keep)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// One factor breakdown per signal; a re-run replaces the row.
pub async fn upsert_factors(db: &Db, drafts: &[SignalDraft]) -> anyhow::Result<()> {
    for d in drafts {
        let Some(f) = &d.factors else { continue };
        sqlx::query(
            "INSERT INTO factor_breakdowns
                (id, signal_id, snapshot_date, alpha_score, catalyst_score, quality_score,
                 risk_penalty, crowding_penalty, source_bonus, raw_score, strategy_weight,
                 regime, regime_multiplier, relative_strength, crowding, news_heat,
                 news_event_score, weighted_score)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16, $17)
             ON CONFLICT (signal_id) DO UPDATE SET
                 snapshot_date = EXCLUDED.snapshot_date,
                 alpha_score = EXCLUDED.alpha_score,
                 catalyst_score = EXCLUDED.catalyst_score,
                 quality_score = EXCLUDED.quality_score,
                 risk_penalty = EXCLUDED.risk_penalty,
                 crowding_penalty = EXCLUDED.crowding_penalty,
                 source_bonus = EXCLUDED.source_bonus,
                 raw_score = EXCLUDED.raw_score,
                 strategy_weight = EXCLUDED.strategy_weight,
                 regime = EXCLUDED.regime,
                 regime_multiplier = EXCLUDED.regime_multiplier,
                 relative_strength = EXCLUDED.relative_strength,
                 crowding = EXCLUDED.crowding,
                 news_heat = EXCLUDED.news_heat,
                 news_event_score = EXCLUDED.news_event_score,
                 weighted_score = EXCLUDED.weighted_score",
        )
        .bind(d.id)
        .bind(d.snapshot_date)
        .bind(f.alpha_score)
        .bind(f.catalyst_score)
        .bind(f.quality_score)
        .bind(f.risk_penalty)
        .bind(f.crowding_penalty)
        .bind(f.source_bonus)
        .bind(f.raw_score)
        .bind(f.strategy_weight)
        .bind(f.regime)
        .bind(f.regime_multiplier)
        .bind(f.relative_strength)
        .bind(f.crowding)
        .bind(f.news_heat)
        .bind(f.news_event_score)
        .bind(f.weighted_score)
        .execute(db)
        .await?;
    }
    Ok(())
}

pub async fn upsert_regime_snapshot(
    db: &Db,
    market: Market,
    snapshot_date: NaiveDate,
    r: &RegimeReading,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO regime_snapshots
            (id, market, snapshot_date, regime, score, breadth_ratio, avg_change_pct,
             active_ratio, confidence, multiplier, sample_size)
         VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (market, snapshot_date) DO UPDATE SET
             regime = EXCLUDED.regime,
             score = EXCLUDED.score,
             breadth_ratio = EXCLUDED.breadth_ratio,
             avg_change_pct = EXCLUDED.avg_change_pct,
             active_ratio = EXCLUDED.active_ratio,
             confidence = EXCLUDED.confidence,
             multiplier = EXCLUDED.multiplier,
             sample_size = EXCLUDED.sample_size",
    )
    .bind(market)
    .bind(snapshot_date)
    .bind(r.regime)
    .bind(r.score)
    .bind(r.breadth_ratio)
    .bind(r.avg_change_pct)
    .bind(r.active_ratio)
    .bind(r.confidence)
    .bind(r.multiplier)
    .bind(r.sample_size)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn upsert_risk_snapshot(
    db: &Db,
    market: Market,
    snapshot_date: NaiveDate,
    r: &RiskReading,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO portfolio_risk_snapshots
            (id, market, snapshot_date, active_total, active_unheld, high_risk_ratio,
             top5_concentration, max_strategy_share, risk_level)
         VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (market, snapshot_date) DO UPDATE SET
             active_total = EXCLUDED.active_total,
             active_unheld = EXCLUDED.active_unheld,
             high_risk_ratio = EXCLUDED.high_risk_ratio,
             top5_concentration = EXCLUDED.top5_concentration,
             max_strategy_share = EXCLUDED.max_strategy_share,
             risk_level = EXCLUDED.risk_level",
    )
    .bind(market)
    .bind(snapshot_date)
    .bind(r.active_total)
    .bind(r.active_unheld)
    .bind(r.high_risk_ratio)
    .bind(r.top5_concentration)
    .bind(r.max_strategy_share)
    .bind(r.risk_level)
    .execute(db)
    .await?;
    Ok(())
}

/// Upsert candidates keyed by (market, symbol, snapshot_date); returns
/// the surviving ids for the stale purge.
pub async fn upsert_candidates(db: &Db, cands: &[CandidateDraft]) -> anyhow::Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(cands.len());
    for c in cands {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO entry_candidates
                (id, market, symbol, stock_name, snapshot_date, action, status, score,
                 rank_score, confidence, source_pool, risk_level, holding,
                 entry_low, entry_high, stop_loss, target, invalidation, plan_quality,
                 primary_signal_id, member_signals, from_market_scan)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16, $17, $18, $19, $20, $21)
             ON CONFLICT (market, symbol, snapshot_date) DO UPDATE SET
                 stock_name = EXCLUDED.stock_name,
                 action = EXCLUDED.action,
                 status = EXCLUDED.status,
                 score = EXCLUDED.score,
                 rank_score = EXCLUDED.rank_score,
                 confidence = EXCLUDED.confidence,
                 source_pool = EXCLUDED.source_pool,
                 risk_level = EXCLUDED.risk_level,
                 holding = EXCLUDED.holding,
                 entry_low = EXCLUDED.entry_low,
                 entry_high = EXCLUDED.entry_high,
                 stop_loss = EXCLUDED.stop_loss,
                 target = EXCLUDED.target,
                 invalidation = EXCLUDED.invalidation,
                 plan_quality = EXCLUDED.plan_quality,
                 primary_signal_id = EXCLUDED.primary_signal_id,
                 member_signals = EXCLUDED.member_signals,
                 from_market_scan = EXCLUDED.from_market_scan,
                 updated_at = now()
             RETURNING id",
        )
        .bind(c.market)
        .bind(&c.symbol)
        .bind(&c.stock_name)
        .bind(c.snapshot_date)
        .bind(c.action)
        .bind(c.status)
        .bind(c.score)
        .bind(c.rank_score)
        .bind(c.confidence)
        .bind(c.source_pool)
        .bind(c.risk_level)
        .bind(c.holding)
        .bind(c.entry_low)
        .bind(c.entry_high)
        .bind(c.stop_loss)
        .bind(c.target)
        .bind(&c.invalidation)
        .bind(c.plan_quality)
        .bind(c.primary_signal_id)
        .bind(&c.member_signals)
        .bind(c.from_market_scan)
        .fetch_one(db)
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

pub async fn purge_stale_candidates(
    db: &Db,
    market: Market,
    snapshot_date: NaiveDate,
    keep: &[Uuid],
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM entry_candidates
         WHERE market = $1 AND snapshot_date = $2 AND NOT (id = ANY($3))",
    )
    .bind(market)
    .bind(snapshot_date)
    .bind(keep)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Signals old enough to have at least one evaluable horizon.
pub async fn load_outcome_inputs(
    db: &Db,
    market: Market,
    before: NaiveDate,
) -> anyhow::Result<Vec<OutcomeInput>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        strategy_code: String,
        market: Market,
        symbol: String,
        snapshot_date: NaiveDate,
        entry_low: Option<f64>,
        entry_high: Option<f64>,
        stop_loss: Option<f64>,
        target: Option<f64>,
        snapshot_price: Option<f64>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT id, strategy_code, market, symbol, snapshot_date,
                entry_low, entry_high, stop_loss, target, snapshot_price
         FROM strategy_signals
         WHERE market = $1 AND snapshot_date < $2",
    )
    .bind(market)
    .bind(before)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OutcomeInput {
            signal_id: r.id,
            strategy_code: r.strategy_code,
            market: r.market,
            symbol: r.symbol,
            snapshot_date: r.snapshot_date,
            entry_low: r.entry_low,
            entry_high: r.entry_high,
            stop_loss: r.stop_loss,
            target: r.target,
            snapshot_price: r.snapshot_price,
        })
        .collect())
}

pub async fn existing_outcome_pairs(
    db: &Db,
    market: Market,
) -> anyhow::Result<HashSet<(Uuid, i32)>> {
    let rows: Vec<(Uuid, i32)> = sqlx::query_as(
        "SELECT signal_id, horizon_days FROM signal_outcomes WHERE market = $1",
    )
    .bind(market)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn insert_outcomes(db: &Db, outcomes: &[OutcomeDraft]) -> anyhow::Result<u64> {
    let mut inserted = 0;
    for o in outcomes {
        let result = sqlx::query(
            "INSERT INTO signal_outcomes
                (id, signal_id, strategy_code, market, symbol, snapshot_date, horizon_days,
                 base_price, close_price, return_pct, status)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (signal_id, horizon_days) DO NOTHING",
        )
        .bind(o.signal_id)
        .bind(&o.strategy_code)
        .bind(o.market)
        .bind(&o.symbol)
        .bind(o.snapshot_date)
        .bind(o.horizon_days)
        .bind(o.base_price)
        .bind(o.close_price)
        .bind(o.return_pct)
        .bind(o.status)
        .execute(db)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Recent graded outcomes as (strategy_code, market, return_pct) rows.
pub async fn recent_outcome_returns(
    db: &Db,
    window_days: i32,
    today: NaiveDate,
) -> anyhow::Result<Vec<(String, Market, f64)>> {
    let since = today - chrono::Duration::days(window_days as i64);
    let rows: Vec<(String, Market, f64)> = sqlx::query_as(
        "SELECT strategy_code, market, return_pct FROM signal_outcomes
         WHERE snapshot_date >= $1 AND return_pct IS NOT NULL",
    )
    .bind(since)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Effective weights already written under one regime, keyed by
/// (strategy_code, market scope).
pub async fn effective_weight_rows(
    db: &Db,
    regime: &str,
) -> anyhow::Result<std::collections::HashMap<(String, String), f64>> {
    let rows: Vec<(String, String, f64)> = sqlx::query_as(
        "SELECT strategy_code, market, weight FROM strategy_weights WHERE regime = $1",
    )
    .bind(regime)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(c, m, w)| ((c, m), w)).collect())
}

/// Upsert one (strategy_code, market, regime) effective weight and
/// append the audit entry.
pub async fn apply_weight_update(db: &Db, u: &WeightUpdate) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO strategy_weights (id, strategy_code, market, regime, weight)
         VALUES (gen_random_uuid(), $1, $2, $3, $4)
         ON CONFLICT (strategy_code, market, regime) DO UPDATE SET
             weight = EXCLUDED.weight,
             updated_at = now()",
    )
    .bind(&u.strategy_code)
    .bind(&u.market)
    .bind(&u.regime)
    .bind(u.new_weight)
    .execute(db)
    .await?;

    sqlx::query(
        "INSERT INTO weight_history
            (id, strategy_code, market, regime, old_weight, new_weight, win_rate,
             sample_size, window_days, reason)
         VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&u.strategy_code)
    .bind(&u.market)
    .bind(&u.regime)
    .bind(u.old_weight)
    .bind(u.new_weight)
    .bind(u.win_rate)
    .bind(u.sample_size)
    .bind(u.window_days)
    .bind(&u.reason)
    .execute(db)
    .await?;
    Ok(())
}
