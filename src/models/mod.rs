use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Trading enums defined locally

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type, Serialize, Deserialize,
)]
#[sqlx(type_name = "market", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Cn,
    Hk,
    Us,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Cn => "CN",
            Market::Hk => "HK",
            Market::Us => "US",
        }
    }

    pub fn all() -> [Market; 3] {
        [Market::Cn, Market::Hk, Market::Us]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "signal_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Add,
    Hold,
    Watch,
    Exit,
}

impl Action {
    /// Map the stored action against the current book for display.
    /// Buying a held position reads as an add, adding an unheld one as
    /// a buy, and holding nothing is just watching. The stored action
    /// stays exactly what the judge emitted.
    pub fn display_for_holding(self, holding: bool) -> Action {
        match (self, holding) {
            (Action::Buy, true) => Action::Add,
            (Action::Add, false) => Action::Buy,
            (Action::Hold, false) => Action::Watch,
            (other, _) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "signal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "candidate_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Active,
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "source_pool", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourcePool {
    MarketScan,
    Watchlist,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "market_regime", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Bullish,
    Neutral,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "risk_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "outcome_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Evaluated,
    HitTarget,
    HitStop,
    NoBasePrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "feedback_verdict", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVerdict {
    Accepted,
    Rejected,
    Deferred,
}

/// Strategy catalog row, one per code. `weight` is the default the
/// rebalancer starts from; effective per-market weights live in
/// `strategy_weights`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StrategyDefinition {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub weight: f64,
    pub risk_appetite: RiskLevel,
    pub default_horizon_days: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One strategy's opinion on one stock for one snapshot date.
/// Unique on (strategy_code, market, symbol, snapshot_date).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StrategySignal {
    pub id: Uuid,
    pub strategy_code: String,
    pub market: Market,
    pub symbol: String,
    pub stock_name: Option<String>,
    pub snapshot_date: NaiveDate,
    pub action: Action,
    pub status: SignalStatus,
    /// Raw judgment score, 0-100. Never mutated after scoring.
    pub score: f64,
    /// Ranking score; starts at the factor-weighted score and is the
    /// only field constraint demotion touches.
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
    /// Closing price on the snapshot day, the last base-price fallback
    /// for outcome grading.
    pub snapshot_price: Option<f64>,
    pub evidence: Option<serde_json::Value>,
    pub constrained: bool,
    pub constraint_reasons: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StrategySignal {
    pub fn has_entry_plan(&self) -> bool {
        self.entry_low.is_some()
            && self.entry_high.is_some()
            && self.stop_loss.is_some()
            && self.target.is_some()
    }
}

/// Per-signal factor decomposition, 1:1 with a signal row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FactorBreakdown {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub alpha_score: f64,
    pub catalyst_score: f64,
    pub quality_score: f64,
    pub risk_penalty: f64,
    pub crowding_penalty: f64,
    pub source_bonus: f64,
    pub raw_score: f64,
    pub strategy_weight: f64,
    /// Regime context captured at scoring time.
    pub regime: Regime,
    pub regime_multiplier: f64,
    /// Cross-sectional and news inputs the sub-scores were built from.
    pub relative_strength: f64,
    pub crowding: f64,
    pub news_heat: f64,
    pub news_event_score: f64,
    pub weighted_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Market regime snapshot, one per (market, snapshot_date).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RegimeSnapshot {
    pub id: Uuid,
    pub market: Market,
    pub snapshot_date: NaiveDate,
    pub regime: Regime,
    pub score: f64,
    pub breadth_ratio: f64,
    pub avg_change_pct: f64,
    pub active_ratio: f64,
    pub confidence: f64,
    pub multiplier: f64,
    pub sample_size: i32,
    pub created_at: DateTime<Utc>,
}

/// Portfolio-level risk snapshot, one per (market, snapshot_date).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PortfolioRiskSnapshot {
    pub id: Uuid,
    pub market: Market,
    pub snapshot_date: NaiveDate,
    pub active_total: i32,
    pub active_unheld: i32,
    pub high_risk_ratio: f64,
    pub top5_concentration: f64,
    pub max_strategy_share: f64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

/// Deduplicated per-stock candidate, one per (market, symbol, snapshot_date).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EntryCandidate {
    pub id: Uuid,
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
    /// `[{"signal_id", "strategy_code", "source_pool"}, ...]`
    pub member_signals: serde_json::Value,
    pub from_market_scan: bool,
    /// Feedback tallies joined at read time: accepted verdicts count as
    /// useful, rejected as useless; deferred counts toward neither.
    #[sqlx(default)]
    pub useful_count: i64,
    #[sqlx(default)]
    pub useless_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator feedback on a candidate. Append-only, unique per
/// (market, symbol, snapshot_date, source).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidateFeedback {
    pub id: Uuid,
    pub market: Market,
    pub symbol: String,
    pub snapshot_date: NaiveDate,
    pub source: String,
    pub verdict: FeedbackVerdict,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Realized outcome of a signal at one horizon. Unique per
/// (signal_id, horizon_days).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SignalOutcome {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
}

/// Audit trail of automatic weight adjustments, one row per
/// (strategy_code, market, regime) the rebalancer touched.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WeightHistoryEntry {
    pub id: Uuid,
    pub strategy_code: String,
    /// "ALL" for the cross-market row or a market code.
    pub market: String,
    pub regime: String,
    pub old_weight: f64,
    pub new_weight: f64,
    pub win_rate: f64,
    pub sample_size: i32,
    pub window_days: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// Response types for API

#[derive(Debug, Serialize)]
pub struct ListCandidatesResponse {
    pub candidates: Vec<EntryCandidate>,
    pub total: i64,
    pub snapshot_date: Option<NaiveDate>,
    /// True when a wait-for-refresh timed out and this is the last
    /// completed snapshot instead of a fresh one.
    pub degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct ListSignalsResponse {
    pub signals: Vec<StrategySignal>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ListStrategiesResponse {
    pub strategies: Vec<StrategyDefinition>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct ListRegimesResponse {
    pub regimes: Vec<RegimeSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ListRiskSnapshotsResponse {
    pub snapshots: Vec<PortfolioRiskSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ListWeightHistoryResponse {
    pub entries: Vec<WeightHistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct StrategyStatsResponse {
    pub snapshot_date: Option<NaiveDate>,
    pub signal_total: i64,
    pub candidate_total: i64,
    pub active_candidates: i64,
    pub constrained_signals: i64,
    pub factor_averages: FactorAverages,
    pub regimes: Vec<RegimeSnapshot>,
    pub portfolio_risk: Vec<PortfolioRiskSnapshot>,
    pub by_strategy: Vec<StrategyBucket>,
    pub by_market: Vec<MarketBucket>,
    pub recent_weight_updates: Vec<WeightHistoryEntry>,
}

#[derive(Debug, Default, Serialize)]
pub struct FactorAverages {
    pub alpha: f64,
    pub catalyst: f64,
    pub quality: f64,
    pub risk_penalty: f64,
    pub crowding_penalty: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StrategyBucket {
    pub strategy_code: String,
    pub signal_count: i64,
    pub avg_rank_score: Option<f64>,
    pub active_count: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MarketBucket {
    pub market: Market,
    pub signal_count: i64,
    pub candidate_count: i64,
}

#[derive(Debug, Serialize)]
pub struct FeedbackStatsResponse {
    pub snapshot_date: Option<NaiveDate>,
    pub total: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub deferred: i64,
    pub accept_rate: f64,
    pub new_symbols: Vec<String>,
    pub dropped_symbols: Vec<String>,
}

// Request types for API

#[derive(Debug, Clone, Deserialize, validator::Validate)]
pub struct TriggerRefreshRequest {
    pub markets: Option<Vec<Market>>,
    #[serde(default)]
    pub wait: bool,
    #[serde(default = "default_true")]
    pub evaluate_outcomes: bool,
    #[serde(default = "default_true")]
    pub rebalance: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TriggerRefreshRequest {
    fn default() -> Self {
        Self {
            markets: None,
            wait: false,
            evaluate_outcomes: true,
            rebalance: true,
        }
    }
}

#[derive(Debug, Deserialize, validator::Validate)]
pub struct SubmitFeedbackRequest {
    pub market: Market,
    #[validate(length(min = 1, max = 32))]
    pub symbol: String,
    pub snapshot_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 64))]
    pub source: String,
    pub verdict: FeedbackVerdict,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, validator::Validate)]
pub struct UpdateStrategyRequest {
    #[validate(range(min = 0.01, max = 10.0))]
    pub weight: Option<f64>,
    pub enabled: Option<bool>,
}

/// Standalone outcome-evaluation trigger.
#[derive(Debug, Default, Deserialize, validator::Validate)]
pub struct EvaluateOutcomesRequest {
    pub markets: Option<Vec<Market>>,
    #[validate(range(min = 7, max = 365))]
    pub lookback_days: Option<i32>,
}

impl EvaluateOutcomesRequest {
    pub fn merged(&self, base: &crate::config::OutcomeConfig) -> crate::config::OutcomeConfig {
        let mut cfg = base.clone();
        if let Some(days) = self.lookback_days {
            cfg.lookback_days = days;
        }
        cfg
    }
}

/// Standalone weight-rebalance trigger with per-request tunables.
#[derive(Debug, Default, Deserialize, validator::Validate)]
pub struct RebalanceRequest {
    #[validate(range(min = 7, max = 365))]
    pub window_days: Option<i32>,
    #[validate(range(min = 3, max = 500))]
    pub min_samples: Option<i32>,
    #[validate(range(min = 0.05, max = 0.95))]
    pub alpha: Option<f64>,
}

impl RebalanceRequest {
    pub fn merged(&self, base: &crate::config::RebalanceConfig) -> crate::config::RebalanceConfig {
        let mut cfg = base.clone();
        if let Some(days) = self.window_days {
            cfg.window_days = days;
        }
        if let Some(n) = self.min_samples {
            cfg.min_samples = n;
        }
        if let Some(a) = self.alpha {
            cfg.alpha = a;
        }
        cfg
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CandidateListQuery {
    pub market: Option<Market>,
    pub status: Option<CandidateStatus>,
    pub min_score: Option<f64>,
    pub holding: Option<bool>,
    pub source_pool: Option<SourcePool>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SignalListQuery {
    pub market: Option<Market>,
    pub status: Option<SignalStatus>,
    pub min_score: Option<f64>,
    pub holding: Option<bool>,
    pub source_pool: Option<SourcePool>,
    pub strategy_code: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotListQuery {
    pub market: Option<Market>,
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeightHistoryQuery {
    pub strategy_code: Option<String>,
    pub market: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn markets_order_for_grouping_keys() {
        assert!(Market::Cn < Market::Hk);
        assert!(Market::Hk < Market::Us);
        let mut sorted = vec![Market::Us, Market::Cn, Market::Hk];
        sorted.sort();
        assert_eq!(sorted, vec![Market::Cn, Market::Hk, Market::Us]);
    }

    #[test]
    fn display_action_follows_the_book() {
        assert_eq!(Action::Buy.display_for_holding(true), Action::Add);
        assert_eq!(Action::Add.display_for_holding(false), Action::Buy);
        assert_eq!(Action::Hold.display_for_holding(false), Action::Watch);
        assert_eq!(Action::Hold.display_for_holding(true), Action::Hold);
        assert_eq!(Action::Buy.display_for_holding(false), Action::Buy);
        assert_eq!(Action::Exit.display_for_holding(true), Action::Exit);
    }

    #[test]
    fn verdict_wire_names_match_feedback_count_filters() {
        // The candidate listing counts verdicts by these literals.
        let accepted = serde_json::to_value(FeedbackVerdict::Accepted).unwrap();
        let rejected = serde_json::to_value(FeedbackVerdict::Rejected).unwrap();
        assert_eq!(accepted, "accepted");
        assert_eq!(rejected, "rejected");
    }

    #[test]
    fn rebalance_request_overrides_only_what_it_names() {
        let base = crate::config::RebalanceConfig::default();
        let req = RebalanceRequest {
            window_days: Some(30),
            min_samples: None,
            alpha: Some(0.5),
        };
        let cfg = req.merged(&base);
        assert_eq!(cfg.window_days, 30);
        assert_eq!(cfg.min_samples, base.min_samples);
        assert!((cfg.alpha - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rebalance_request_rejects_out_of_range_tunables() {
        let req = RebalanceRequest {
            window_days: Some(3),
            min_samples: None,
            alpha: Some(0.01),
        };
        assert!(req.validate().is_err());
        assert!(RebalanceRequest::default().validate().is_ok());
    }

    #[test]
    fn evaluate_request_overrides_lookback() {
        let base = crate::config::OutcomeConfig::default();
        let cfg = EvaluateOutcomesRequest {
            markets: None,
            lookback_days: Some(120),
        }
        .merged(&base);
        assert_eq!(cfg.lookback_days, 120);
        assert_eq!(cfg.horizons, base.horizons);
    }
}
