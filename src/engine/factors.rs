//! Factor aggregation.
//!
//! Decomposes every signal into additive sub-scores, then applies the
//! strategy weight and the market's regime multiplier:
//!
//! ```text
//! raw_score      = alpha + catalyst + quality - risk_penalty - crowding_penalty + source_bonus
//! weighted_score = clamp(raw_score, 0, 100) * strategy_weight * regime_multiplier
//! ```
//!
//! The weighted score is never capped after the multiplication; ranking
//! adjustments belong to the constraint engine and touch `rank_score`
//! only.

use std::collections::HashMap;

use crate::config::FactorConfig;
use crate::models::{Regime, RiskLevel, SourcePool};
use crate::strategies::StockFeatures;

use super::regime::RegimeReading;
use super::SignalDraft;

/// Full decomposition of one signal's score, plus the regime and
/// cross-sectional context it was computed under.
#[derive(Debug, Clone, Copy)]
pub struct FactorParts {
    pub alpha_score: f64,
    pub catalyst_score: f64,
    pub quality_score: f64,
    pub risk_penalty: f64,
    pub crowding_penalty: f64,
    pub source_bonus: f64,
    pub raw_score: f64,
    pub strategy_weight: f64,
    pub regime: Regime,
    pub regime_multiplier: f64,
    pub relative_strength: f64,
    pub crowding: f64,
    pub news_heat: f64,
    pub news_event_score: f64,
    pub weighted_score: f64,
}

/// Combine sub-scores into the final weighted score. The context
/// fields are neutral here; [`compute`] fills them from the features.
pub fn combine(
    alpha_score: f64,
    catalyst_score: f64,
    quality_score: f64,
    risk_penalty: f64,
    crowding_penalty: f64,
    source_bonus: f64,
    strategy_weight: f64,
    regime_multiplier: f64,
) -> FactorParts {
    let raw_score = alpha_score + catalyst_score + quality_score - risk_penalty
        - crowding_penalty
        + source_bonus;
    let weighted_score = raw_score.clamp(0.0, 100.0) * strategy_weight * regime_multiplier;
    FactorParts {
        alpha_score,
        catalyst_score,
        quality_score,
        risk_penalty,
        crowding_penalty,
        source_bonus,
        raw_score,
        strategy_weight,
        regime: Regime::Neutral,
        regime_multiplier,
        relative_strength: 0.0,
        crowding: 0.0,
        news_heat: 0.0,
        news_event_score: 0.0,
        weighted_score,
    }
}

/// Score one draft against its stock's features.
pub fn compute(
    draft: &SignalDraft,
    features: &StockFeatures,
    strategy_weight: f64,
    reading: &RegimeReading,
    cfg: &FactorConfig,
) -> FactorParts {
    let alpha_score = draft.score * 0.5 + features.cross.relative_strength * 15.0;

    let catalyst_score =
        (features.news.heat.max(0.0) * 1.5 + features.news.event_score.max(0.0)).min(18.0);

    let plan_fields = [
        draft.entry_low.is_some() && draft.entry_high.is_some(),
        draft.stop_loss.is_some(),
        draft.target.is_some(),
    ]
    .iter()
    .filter(|&&b| b)
    .count() as f64;
    let quality_score = plan_fields * 4.0 + draft.confidence * 8.0;

    let mut risk_penalty = match draft.risk_level {
        RiskLevel::High => 8.0,
        RiskLevel::Medium => 3.0,
        RiskLevel::Low => 0.0,
    };
    if features.snapshot.rsi14.map(|r| r > 80.0).unwrap_or(false) {
        risk_penalty += 3.0;
    }

    let crowding_penalty = features.cross.crowding * 10.0;

    let source_bonus = match draft.source_pool {
        SourcePool::MarketScan => cfg.scan_source_bonus,
        SourcePool::Mixed => cfg.mixed_source_bonus,
        SourcePool::Watchlist => 0.0,
    };

    let mut parts = combine(
        alpha_score,
        catalyst_score,
        quality_score,
        risk_penalty,
        crowding_penalty,
        source_bonus,
        strategy_weight,
        reading.multiplier,
    );
    parts.regime = reading.regime;
    parts.relative_strength = features.cross.relative_strength;
    parts.crowding = features.cross.crowding;
    parts.news_heat = features.news.heat;
    parts.news_event_score = features.news.event_score;
    parts
}

/// Score a batch of drafts in place: attaches the breakdown and seeds
/// `rank_score` with the weighted score. Unknown strategy codes fall
/// back to weight 1.0.
pub fn apply(
    drafts: &mut [SignalDraft],
    features_by_symbol: &HashMap<String, &StockFeatures>,
    weights: &HashMap<String, f64>,
    reading: &RegimeReading,
    cfg: &FactorConfig,
) {
    for draft in drafts.iter_mut() {
        let Some(features) = features_by_symbol.get(&draft.symbol) else {
            continue;
        };
        let weight = weights.get(&draft.strategy_code).copied().unwrap_or(1.0);
        let parts = compute(draft, features, weight, reading, cfg);
        draft.rank_score = parts.weighted_score;
        draft.factors = Some(parts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit;
    use crate::strategies::testkit as strat_testkit;

    fn reading(multiplier: f64) -> RegimeReading {
        RegimeReading {
            regime: Regime::Neutral,
            score: 0.0,
            breadth_ratio: 0.5,
            avg_change_pct: 0.0,
            active_ratio: 0.5,
            confidence: 0.5,
            multiplier,
            sample_size: 50,
        }
    }

    #[test]
    fn weighted_score_is_exactly_clamped_raw_times_weight_times_multiplier() {
        // raw 70, weight 1.0, multiplier 1.15 -> 80.5 exactly
        let parts = combine(50.0, 10.0, 13.0, 3.0, 2.0, 2.0, 1.0, 1.15);
        assert!((parts.raw_score - 70.0).abs() < 1e-9);
        assert!((parts.weighted_score - 80.5).abs() < 1e-9);
    }

    #[test]
    fn raw_score_clamps_before_weighting() {
        let over = combine(90.0, 18.0, 20.0, 0.0, 0.0, 3.0, 1.2, 1.1);
        assert!(over.raw_score > 100.0);
        assert!((over.weighted_score - 100.0 * 1.2 * 1.1).abs() < 1e-9);

        let under = combine(5.0, 0.0, 0.0, 8.0, 10.0, 0.0, 1.2, 0.9);
        assert!(under.raw_score < 0.0);
        assert_eq!(under.weighted_score, 0.0);
    }

    #[test]
    fn weighted_score_is_not_post_capped() {
        let parts = combine(60.0, 18.0, 20.0, 0.0, 0.0, 3.0, 1.18, 1.2);
        assert!(parts.weighted_score > 100.0);
    }

    #[test]
    fn riskier_signals_pay_a_penalty() {
        let features = strat_testkit::features("600000");
        let mut low = testkit::draft("600000", "pullback", 60.0);
        low.risk_level = RiskLevel::Low;
        let mut high = low.clone();
        high.risk_level = RiskLevel::High;

        let cfg = FactorConfig::default();
        let pl = compute(&low, &features, 1.0, &reading(1.0), &cfg);
        let ph = compute(&high, &features, 1.0, &reading(1.0), &cfg);
        assert!(ph.weighted_score < pl.weighted_score);
        assert_eq!(ph.risk_penalty - pl.risk_penalty, 8.0);
    }

    #[test]
    fn apply_seeds_rank_score_with_weighted_score() {
        let features = strat_testkit::features("600000");
        let mut drafts = vec![testkit::draft("600000", "trend_follow", 70.0)];
        let by_symbol = HashMap::from([("600000".to_string(), &features)]);
        let weights = HashMap::from([("trend_follow".to_string(), 1.15)]);

        apply(
            &mut drafts,
            &by_symbol,
            &weights,
            &reading(1.0),
            &FactorConfig::default(),
        );

        let parts = drafts[0].factors.unwrap();
        assert!((parts.strategy_weight - 1.15).abs() < 1e-9);
        assert!((drafts[0].rank_score - parts.weighted_score).abs() < 1e-9);
    }

    #[test]
    fn compute_captures_regime_and_cross_context() {
        let features = strat_testkit::features("600000");
        let draft = testkit::draft("600000", "trend_follow", 70.0);
        let mut r = reading(1.12);
        r.regime = Regime::Bullish;

        let parts = compute(&draft, &features, 1.0, &r, &FactorConfig::default());
        assert_eq!(parts.regime, Regime::Bullish);
        assert!((parts.regime_multiplier - 1.12).abs() < 1e-9);
        assert!((parts.relative_strength - features.cross.relative_strength).abs() < 1e-9);
        assert!((parts.crowding - features.cross.crowding).abs() < 1e-9);
        assert!((parts.news_heat - features.news.heat).abs() < 1e-9);
        assert!((parts.news_event_score - features.news.event_score).abs() < 1e-9);
    }

    #[test]
    fn unknown_strategy_code_defaults_to_unit_weight() {
        let features = strat_testkit::features("600000");
        let mut drafts = vec![testkit::draft("600000", "experimental", 70.0)];
        let by_symbol = HashMap::from([("600000".to_string(), &features)]);

        apply(
            &mut drafts,
            &by_symbol,
            &HashMap::new(),
            &reading(1.0),
            &FactorConfig::default(),
        );
        assert!((drafts[0].factors.unwrap().strategy_weight - 1.0).abs() < 1e-9);
    }
}
