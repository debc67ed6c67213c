//! Entry candidate assembly.
//!
//! Takes the deduplicated groups and turns each into a persistable
//! candidate: fills in a default entry plan when the primary signal
//! lacks one, grades plan quality, and decides active vs watch status.

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use crate::config::CandidateConfig;
use crate::models::{Action, CandidateStatus, Market, RiskLevel, SourcePool};
use crate::strategies::StockFeatures;

use super::dedupe::CandidateGroup;
use super::SignalDraft;

/// A candidate before it reaches the database.
#[derive(Debug, Clone)]
pub struct CandidateDraft {
    pub market: Market,
    pub symbol: String,
    pub stock_name: Option<String>,
    pub snapshot_date: NaiveDate,
    pub action: Action,
    pub status: CandidateStatus,
    pub score: f64,
    pub rank_score: f64,
    pub confidence: f64,
    pub source_pool: SourcePool,
    pub risk_level: RiskLevel,
    pub holding: bool,
    pub entry_low: Option<f64>,
    pub entry_high: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub invalidation: Option<String>,
    pub plan_quality: i32,
    pub primary_signal_id: Uuid,
    pub member_signals: serde_json::Value,
    pub from_market_scan: bool,
}

/// Default plan anchored on the day's price and pivot levels.
pub fn build_plan(
    price: f64,
    support: Option<f64>,
    resistance: Option<f64>,
) -> (f64, f64, f64, f64, String) {
    let entry_low = price * 0.99;
    let entry_high = price * 1.01;
    let stop = support.map(|s| s * 0.985).unwrap_or(price * 0.95);
    let target = resistance.map(|r| r * 0.99).unwrap_or(price * 1.06);
    let invalidation = format!("daily close below {:.2}", stop);
    (entry_low, entry_high, stop, target, invalidation)
}

/// 30 points each for entry band, stop and target, 10 for an
/// invalidation rule.
pub fn plan_quality(
    entry_low: Option<f64>,
    entry_high: Option<f64>,
    stop_loss: Option<f64>,
    target: Option<f64>,
    invalidation: Option<&str>,
) -> i32 {
    let mut quality = 0;
    if entry_low.is_some() && entry_high.is_some() {
        quality += 30;
    }
    if stop_loss.is_some() {
        quality += 30;
    }
    if target.is_some() {
        quality += 30;
    }
    if invalidation.map(|s| !s.is_empty()).unwrap_or(false) {
        quality += 10;
    }
    quality
}

fn activation_threshold(pool: SourcePool, cfg: &CandidateConfig) -> f64 {
    match pool {
        SourcePool::MarketScan => cfg.scan_score_threshold,
        SourcePool::Watchlist | SourcePool::Mixed => cfg.watchlist_score_threshold,
    }
}

/// Build one candidate from a deduplicated group.
pub fn from_group(
    group: &CandidateGroup,
    drafts: &[SignalDraft],
    features: Option<&StockFeatures>,
    cfg: &CandidateConfig,
) -> CandidateDraft {
    let primary = &drafts[group.primary];
    let source_pool = group.source_pool(drafts);

    let (entry_low, entry_high, stop_loss, target, invalidation) = if primary.has_entry_plan() {
        (
            primary.entry_low,
            primary.entry_high,
            primary.stop_loss,
            primary.target,
            primary.invalidation.clone(),
        )
    } else if let Some(f) = features {
        let (lo, hi, stop, tgt, inv) =
            build_plan(f.snapshot.price, f.snapshot.support, f.snapshot.resistance);
        (Some(lo), Some(hi), Some(stop), Some(tgt), Some(inv))
    } else {
        // No price available; carry whatever partial plan exists.
        (
            primary.entry_low,
            primary.entry_high,
            primary.stop_loss,
            primary.target,
            primary.invalidation.clone(),
        )
    };

    let quality = plan_quality(
        entry_low,
        entry_high,
        stop_loss,
        target,
        invalidation.as_deref(),
    );

    let actionable = matches!(primary.action, Action::Buy | Action::Add);
    let status = if actionable
        && quality >= cfg.min_plan_quality
        && primary.score >= activation_threshold(source_pool, cfg)
    {
        CandidateStatus::Active
    } else {
        CandidateStatus::Watch
    };

    let member_signals = json!(group
        .members
        .iter()
        .map(|&i| {
            json!({
                "signal_id": drafts[i].id,
                "strategy_code": drafts[i].strategy_code,
                "source_pool": drafts[i].source_pool,
            })
        })
        .collect::<Vec<_>>());

    CandidateDraft {
        market: group.market,
        symbol: group.symbol.clone(),
        stock_name: primary.stock_name.clone(),
        snapshot_date: primary.snapshot_date,
        action: primary.action,
        status,
        score: primary.score,
        rank_score: primary.rank_score,
        confidence: primary.confidence,
        source_pool,
        risk_level: primary.risk_level,
        holding: primary.holding,
        entry_low,
        entry_high,
        stop_loss,
        target,
        invalidation,
        plan_quality: quality,
        primary_signal_id: primary.id,
        member_signals,
        from_market_scan: group.from_market_scan(drafts),
    }
}
