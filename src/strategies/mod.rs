//! Strategy judgment system.
//!
//! Each strategy is a small, stateless judge that looks at one stock's
//! features and either abstains or emits a [`Judgment`]. Judges are
//! registered in a lookup table keyed by strategy code so new strategies
//! plug in without touching the pipeline.

use std::collections::HashMap;

use crate::models::{Action, RiskLevel};
use crate::marketdata::StockSnapshot;

pub mod macd_golden;
pub mod market_scan;
pub mod pullback;
pub mod rebound;
pub mod trend_follow;
pub mod volume_breakout;
pub mod watchlist_agent;

pub use macd_golden::MacdGoldenJudge;
pub use market_scan::MarketScanJudge;
pub use pullback::PullbackJudge;
pub use rebound::ReboundJudge;
pub use trend_follow::TrendFollowJudge;
pub use volume_breakout::VolumeBreakoutJudge;
pub use watchlist_agent::WatchlistAgentJudge;

/// Core judgment trait - all strategies implement this
pub trait StrategyJudge: Send + Sync {
    /// Catalog code this judge produces signals under
    fn code(&self) -> &'static str;

    /// Judge one stock. `None` means the strategy abstains.
    fn judge(&self, features: &StockFeatures) -> Option<Judgment>;
}

/// Everything a judge may look at for one stock.
#[derive(Debug, Clone)]
pub struct StockFeatures {
    pub snapshot: StockSnapshot,
    pub news: NewsScore,
    pub cross: CrossSection,
    pub holding: bool,
    pub in_watchlist: bool,
}

/// Aggregated news signal for one symbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewsScore {
    /// Recency-weighted sentiment heat
    pub heat: f64,
    /// Keyword-driven event score, clamped to [-6, 12]
    pub event_score: f64,
    pub count: i64,
}

impl NewsScore {
    pub fn tier(&self) -> NewsTier {
        if self.event_score >= 6.5 {
            NewsTier::High
        } else if self.event_score >= 3.0 {
            NewsTier::Medium
        } else {
            NewsTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsTier {
    Low,
    Medium,
    High,
}

/// Cross-sectional standing within the market's snapshot, all
/// percentiles in [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossSection {
    pub score_pct: f64,
    pub change_pct: f64,
    pub turnover_pct: f64,
    pub volume_pct: f64,
    /// 0.45*score + 0.25*change + 0.20*turnover + 0.10*volume
    pub relative_strength: f64,
    /// Crowding pressure from stretched turnover/volume ranks
    pub crowding: f64,
}

/// One strategy's opinion on one stock.
#[derive(Debug, Clone)]
pub struct Judgment {
    pub action: Action,
    /// 0-100
    pub score: f64,
    /// 0-1
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub evidence: Vec<String>,
    pub entry_low: Option<f64>,
    pub entry_high: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub invalidation: Option<String>,
}

impl Judgment {
    pub fn new(action: Action, score: f64, confidence: f64) -> Self {
        Self {
            action,
            score: score.clamp(0.0, 100.0),
            confidence: confidence.clamp(0.0, 1.0),
            risk_level: RiskLevel::Medium,
            evidence: Vec::new(),
            entry_low: None,
            entry_high: None,
            stop_loss: None,
            target: None,
            invalidation: None,
        }
    }

    pub fn buy(score: f64, confidence: f64) -> Self {
        Self::new(Action::Buy, score, confidence)
    }

    pub fn watch(score: f64, confidence: f64) -> Self {
        Self::new(Action::Watch, score, confidence)
    }

    pub fn hold(score: f64, confidence: f64) -> Self {
        Self::new(Action::Hold, score, confidence)
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    pub fn with_plan(
        mut self,
        entry_low: f64,
        entry_high: f64,
        stop_loss: f64,
        target: f64,
        invalidation: impl Into<String>,
    ) -> Self {
        self.entry_low = Some(entry_low);
        self.entry_high = Some(entry_high);
        self.stop_loss = Some(stop_loss);
        self.target = Some(target);
        self.invalidation = Some(invalidation.into());
        self
    }

    pub fn has_plan(&self) -> bool {
        self.entry_low.is_some()
            && self.entry_high.is_some()
            && self.stop_loss.is_some()
            && self.target.is_some()
    }
}

/// Lookup table of judges keyed by strategy code. Iteration order is
/// registration order so refresh runs are deterministic.
pub struct StrategyRegistry {
    judges: Vec<Box<dyn StrategyJudge>>,
    by_code: HashMap<&'static str, usize>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            judges: Vec::new(),
            by_code: HashMap::new(),
        }
    }

    /// All built-in judges in catalog order.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(TrendFollowJudge));
        reg.register(Box::new(MacdGoldenJudge));
        reg.register(Box::new(VolumeBreakoutJudge));
        reg.register(Box::new(PullbackJudge));
        reg.register(Box::new(ReboundJudge));
        reg.register(Box::new(WatchlistAgentJudge));
        reg.register(Box::new(MarketScanJudge));
        reg
    }

    /// Register a judge. A judge re-using an existing code replaces it.
    pub fn register(&mut self, judge: Box<dyn StrategyJudge>) {
        let code = judge.code();
        if let Some(&idx) = self.by_code.get(code) {
            self.judges[idx] = judge;
        } else {
            self.by_code.insert(code, self.judges.len());
            self.judges.push(judge);
        }
    }

    pub fn get(&self, code: &str) -> Option<&dyn StrategyJudge> {
        self.by_code.get(code).map(|&idx| self.judges[idx].as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn StrategyJudge> {
        self.judges.iter().map(|j| j.as_ref())
    }

    pub fn len(&self) -> usize {
        self.judges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.judges.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use crate::models::Market;

    /// Neutral fixture: flat stock, no news, mid-pack cross section.
    pub fn features(symbol: &str) -> StockFeatures {
        StockFeatures {
            snapshot: StockSnapshot {
                market: Market::Cn,
                symbol: symbol.to_string(),
                name: Some(format!("{} Co", symbol)),
                price: 100.0,
                change_pct: 0.0,
                change_5d_pct: 0.0,
                volume: 1_000_000.0,
                avg_volume_20d: 1_000_000.0,
                turnover_rate: 1.0,
                ma5: Some(100.0),
                ma20: Some(100.0),
                ma60: Some(100.0),
                macd_dif: Some(0.0),
                macd_dea: Some(0.0),
                macd_dif_prev: Some(0.0),
                macd_dea_prev: Some(0.0),
                rsi14: Some(50.0),
                support: Some(95.0),
                resistance: Some(108.0),
            },
            news: NewsScore::default(),
            cross: CrossSection {
                score_pct: 0.5,
                change_pct: 0.5,
                turnover_pct: 0.5,
                volume_pct: 0.5,
                relative_strength: 0.5,
                crowding: 0.0,
            },
            holding: false,
            in_watchlist: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedJudge(&'static str);

    impl StrategyJudge for FixedJudge {
        fn code(&self) -> &'static str {
            self.0
        }

        fn judge(&self, _features: &StockFeatures) -> Option<Judgment> {
            Some(Judgment::buy(60.0, 0.5))
        }
    }

    #[test]
    fn builtin_registry_covers_catalog() {
        let reg = StrategyRegistry::builtin();
        for code in [
            "trend_follow",
            "macd_golden",
            "volume_breakout",
            "pullback",
            "rebound",
            "watchlist_agent",
            "market_scan",
        ] {
            assert!(reg.get(code).is_some(), "missing {}", code);
        }
        assert_eq!(reg.len(), 7);
    }

    #[test]
    fn register_replaces_same_code() {
        let mut reg = StrategyRegistry::new();
        reg.register(Box::new(FixedJudge("x")));
        reg.register(Box::new(FixedJudge("x")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn judgment_clamps_score_and_confidence() {
        let j = Judgment::buy(140.0, 1.7);
        assert_eq!(j.score, 100.0);
        assert_eq!(j.confidence, 1.0);
        assert!(!j.has_plan());
    }

    #[test]
    fn plan_builder_completes_plan() {
        let j = Judgment::buy(70.0, 0.6).with_plan(99.0, 101.0, 95.0, 106.0, "close below 95");
        assert!(j.has_plan());
        assert_eq!(j.invalidation.as_deref(), Some("close below 95"));
    }
}
