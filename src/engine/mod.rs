//! Scoring engine.
//!
//! The whole pipeline from features to persisted candidates works on
//! in-memory [`SignalDraft`] rows; persistence happens at the edges so
//! every stage here is testable without a database.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{Action, Market, RiskLevel, SignalStatus, SourcePool};
use crate::strategies::{StockFeatures, StrategyRegistry};

pub mod candidates;
pub mod constraints;
pub mod dedupe;
pub mod factors;
pub mod features;
pub mod outcomes;
pub mod refresh;
pub mod regime;
pub mod weights;

pub use factors::FactorParts;

/// A signal before it reaches the database. `id` and `updated_at` are
/// provisional until the upsert confirms them; for rows that already
/// existed the store writes the persisted values back.
#[derive(Debug, Clone)]
pub struct SignalDraft {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub strategy_code: String,
    pub market: Market,
    pub symbol: String,
    pub stock_name: Option<String>,
    pub snapshot_date: NaiveDate,
    pub action: Action,
    pub status: SignalStatus,
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
    /// Closing price on the snapshot day, persisted for outcome grading.
    pub snapshot_price: Option<f64>,
    pub evidence: Vec<String>,
    pub constrained: bool,
    pub constraint_reasons: Vec<String>,
    pub factors: Option<FactorParts>,
}

impl SignalDraft {
    pub fn has_entry_plan(&self) -> bool {
        self.entry_low.is_some()
            && self.entry_high.is_some()
            && self.stop_loss.is_some()
            && self.target.is_some()
    }
}

fn source_pool_for(code: &str, in_watchlist: bool) -> SourcePool {
    match code {
        "watchlist_agent" => SourcePool::Watchlist,
        "market_scan" => SourcePool::MarketScan,
        _ if in_watchlist => SourcePool::Mixed,
        _ => SourcePool::MarketScan,
    }
}

/// Run every registered judge over every stock and collect drafts.
pub fn build_drafts(
    features: &[StockFeatures],
    registry: &StrategyRegistry,
    snapshot_date: NaiveDate,
) -> Vec<SignalDraft> {
    let mut drafts = Vec::new();

    for f in features {
        for judge in registry.iter() {
            let Some(judgment) = judge.judge(f) else {
                continue;
            };
            // The judge's action is stored verbatim; holding-aware
            // remapping happens at read time.
            let action = judgment.action;
            let status = if matches!(action, Action::Buy | Action::Add) {
                SignalStatus::Active
            } else {
                SignalStatus::Inactive
            };

            drafts.push(SignalDraft {
                id: Uuid::new_v4(),
                updated_at: Utc::now(),
                strategy_code: judge.code().to_string(),
                market: f.snapshot.market,
                symbol: f.snapshot.symbol.clone(),
                stock_name: f.snapshot.name.clone(),
                snapshot_date,
                action,
                status,
                score: judgment.score,
                rank_score: judgment.score,
                confidence: judgment.confidence,
                source_pool: source_pool_for(judge.code(), f.in_watchlist),
                risk_level: judgment.risk_level,
                holding: f.holding,
                entry_low: judgment.entry_low,
                entry_high: judgment.entry_high,
                stop_loss: judgment.stop_loss,
                target: judgment.target,
                invalidation: judgment.invalidation,
                snapshot_price: Some(f.snapshot.price).filter(|p| *p > 0.0),
                evidence: judgment.evidence,
                constrained: false,
                constraint_reasons: Vec::new(),
                factors: None,
            });
        }
    }

    drafts
}

/// Share of drafts that are active, used by the regime detector.
pub fn active_ratio(drafts: &[SignalDraft]) -> f64 {
    if drafts.is_empty() {
        return 0.0;
    }
    let active = drafts
        .iter()
        .filter(|d| d.status == SignalStatus::Active)
        .count();
    active as f64 / drafts.len() as f64
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;

    /// Bare active buy draft for pipeline-stage tests.
    pub fn draft(symbol: &str, code: &str, rank_score: f64) -> SignalDraft {
        SignalDraft {
            id: Uuid::new_v4(),
            updated_at: Utc::now(),
            strategy_code: code.to_string(),
            market: Market::Cn,
            symbol: symbol.to_string(),
            stock_name: None,
            snapshot_date: NaiveDate::from_ymd_opt(2026, 8, 28).unwrap(),
            action: Action::Buy,
            status: SignalStatus::Active,
            score: rank_score,
            rank_score,
            confidence: 0.6,
            source_pool: SourcePool::MarketScan,
            risk_level: RiskLevel::Medium,
            holding: false,
            entry_low: None,
            entry_high: None,
            stop_loss: None,
            target: None,
            invalidation: None,
            snapshot_price: None,
            evidence: Vec::new(),
            constrained: false,
            constraint_reasons: Vec::new(),
            factors: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testkit as strat_testkit;

    #[test]
    fn drafts_keep_the_judged_action_even_when_holding() {
        let mut f = strat_testkit::features("600000");
        f.holding = true;
        // strong uptrend, trend_follow votes buy
        f.snapshot.price = 106.0;
        f.snapshot.ma5 = Some(104.0);
        f.snapshot.ma20 = Some(101.0);
        f.snapshot.ma60 = Some(97.0);
        f.snapshot.change_5d_pct = 4.0;

        let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let drafts = build_drafts(&[f], &StrategyRegistry::builtin(), date);
        let trend = drafts
            .iter()
            .find(|d| d.strategy_code == "trend_follow")
            .unwrap();
        // canonical action untouched; the holding view is a read concern
        assert_eq!(trend.action, Action::Buy);
        assert_eq!(trend.action.display_for_holding(trend.holding), Action::Add);
        assert_eq!(trend.status, SignalStatus::Active);
    }

    #[test]
    fn drafts_record_the_snapshot_price() {
        let mut f = strat_testkit::features("600000");
        f.snapshot.price = 106.0;
        f.snapshot.ma5 = Some(104.0);
        f.snapshot.ma20 = Some(101.0);
        f.snapshot.ma60 = Some(97.0);
        f.snapshot.change_5d_pct = 4.0;

        let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let drafts = build_drafts(&[f], &StrategyRegistry::builtin(), date);
        assert!(!drafts.is_empty());
        assert!(drafts.iter().all(|d| d.snapshot_price == Some(106.0)));
    }

    #[test]
    fn drafts_carry_source_pools() {
        let mut f = strat_testkit::features("600000");
        f.in_watchlist = true;
        // strong uptrend so trend_follow fires alongside watchlist_agent
        f.snapshot.price = 106.0;
        f.snapshot.ma5 = Some(104.0);
        f.snapshot.ma20 = Some(101.0);
        f.snapshot.ma60 = Some(97.0);
        f.snapshot.change_5d_pct = 4.0;

        let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let drafts = build_drafts(&[f], &StrategyRegistry::builtin(), date);

        let trend = drafts.iter().find(|d| d.strategy_code == "trend_follow");
        let watch = drafts
            .iter()
            .find(|d| d.strategy_code == "watchlist_agent");
        assert_eq!(trend.unwrap().source_pool, SourcePool::Mixed);
        assert_eq!(watch.unwrap().source_pool, SourcePool::Watchlist);
    }

    #[test]
    fn active_ratio_counts_buy_and_add_only() {
        let mut a = testkit::draft("A", "trend_follow", 70.0);
        a.action = Action::Watch;
        a.status = SignalStatus::Inactive;
        let b = testkit::draft("B", "trend_follow", 70.0);
        assert!((active_ratio(&[a, b]) - 0.5).abs() < 1e-9);
        assert_eq!(active_ratio(&[]), 0.0);
    }
}
