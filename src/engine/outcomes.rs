//! Outcome evaluation.
//!
//! Grades past signals against realized prices at fixed trading-day
//! horizons. Evaluation is idempotent: a (signal, horizon) pair is
//! written at most once, so re-runs only fill in horizons that have
//! since become evaluable.

use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

use crate::marketdata::DailyBar;
use crate::models::{Market, OutcomeStatus};

/// Plan fields of a signal due for evaluation.
#[derive(Debug, Clone)]
pub struct OutcomeInput {
    pub signal_id: Uuid,
    pub strategy_code: String,
    pub market: Market,
    pub symbol: String,
    pub snapshot_date: NaiveDate,
    pub entry_low: Option<f64>,
    pub entry_high: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    /// Day-of-signal price, last fallback for the base.
    pub snapshot_price: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OutcomeDraft {
    pub signal_id: Uuid,
    pub strategy_code: String,
    pub market: Market,
    pub symbol: String,
    pub snapshot_date: NaiveDate,
    pub horizon_days: i32,
    pub base_price: Option<f64>,
    pub close_price: Option<f64>,
    pub return_pct: Option<f64>,
    pub status: OutcomeStatus,
}

/// Entry band midpoint, then either band edge, then the snapshot price.
pub fn base_price(input: &OutcomeInput) -> Option<f64> {
    match (input.entry_low, input.entry_high) {
        (Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
        (Some(lo), None) => Some(lo),
        (None, Some(hi)) => Some(hi),
        (None, None) => input.snapshot_price,
    }
    .filter(|p| *p > 0.0)
}

/// Evaluate one signal over `bars` (trading days strictly after the
/// snapshot date, ascending). Horizons with too few bars are skipped.
pub fn evaluate(input: &OutcomeInput, bars: &[DailyBar], horizons: &[i32]) -> Vec<OutcomeDraft> {
    let mut out = Vec::new();

    let Some(base) = base_price(input) else {
        for &h in horizons {
            out.push(OutcomeDraft {
                signal_id: input.signal_id,
                strategy_code: input.strategy_code.clone(),
                market: input.market,
                symbol: input.symbol.clone(),
                snapshot_date: input.snapshot_date,
                horizon_days: h,
                base_price: None,
                close_price: None,
                return_pct: None,
                status: OutcomeStatus::NoBasePrice,
            });
        }
        return out;
    };

    for &h in horizons {
        let h_usize = h as usize;
        if h <= 0 || bars.len() < h_usize {
            continue;
        }
        let window = &bars[..h_usize];

        // Walk the window chronologically; on a bar touching both
        // levels the stop wins.
        let mut status = OutcomeStatus::Evaluated;
        for bar in window {
            if input.stop_loss.map(|s| bar.low <= s).unwrap_or(false) {
                status = OutcomeStatus::HitStop;
                break;
            }
            if input.target.map(|t| bar.high >= t).unwrap_or(false) {
                status = OutcomeStatus::HitTarget;
                break;
            }
        }

        let close = window[h_usize - 1].close;
        out.push(OutcomeDraft {
            signal_id: input.signal_id,
            strategy_code: input.strategy_code.clone(),
            market: input.market,
            symbol: input.symbol.clone(),
            snapshot_date: input.snapshot_date,
            horizon_days: h,
            base_price: Some(base),
            close_price: Some(close),
            return_pct: Some(close / base - 1.0),
            status,
        });
    }

    out
}

/// Drop outcomes whose (signal_id, horizon) already exists.
pub fn retain_new(drafts: &mut Vec<OutcomeDraft>, existing: &HashSet<(Uuid, i32)>) {
    drafts.retain(|d| !existing.contains(&(d.signal_id, d.horizon_days)));
}
