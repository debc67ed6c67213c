//! Strategy weight rebalancing.
//!
//! Nudges each strategy's effective weight toward its realized win
//! rate, independently per (strategy_code, market, regime):
//!
//! ```text
//! new = clamp(old + alpha * (win_rate - baseline) * old, weight_min, weight_max)
//! ```
//!
//! Outcomes are aggregated once per market and once more into the
//! cross-market `ALL` rollup, so a strategy can drift differently in
//! CN than in HK while the rollup tracks its overall record. Targets
//! without enough recent outcomes are skipped entirely, with no
//! history entry, so thin samples never move weights.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::ALL_MARKETS;
use crate::config::RebalanceConfig;
use crate::models::Market;

/// A proposed weight change, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightUpdate {
    pub strategy_code: String,
    /// "ALL" for the cross-market rollup or a market code.
    pub market: String,
    pub regime: String,
    pub old_weight: f64,
    pub new_weight: f64,
    pub win_rate: f64,
    pub sample_size: i32,
    pub window_days: i32,
    pub reason: String,
}

/// The market scopes a rebalance touches, rollup first.
fn scopes() -> impl Iterator<Item = &'static str> {
    std::iter::once(ALL_MARKETS).chain(Market::all().into_iter().map(|m| m.as_str()))
}

/// Count samples and wins per (strategy_code, market scope) from
/// (code, market, return_pct) outcome rows. Every row also counts
/// toward its code's `ALL` rollup.
pub fn aggregate(
    outcomes: &[(String, Market, f64)],
    cfg: &RebalanceConfig,
) -> HashMap<(String, String), (i32, i32)> {
    let mut map: HashMap<(String, String), (i32, i32)> = HashMap::new();
    for (code, market, ret) in outcomes {
        let win = i32::from(*ret > cfg.win_threshold);
        for scope in [ALL_MARKETS, market.as_str()] {
            let entry = map
                .entry((code.clone(), scope.to_string()))
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += win;
        }
    }
    map
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Compute the update for one (strategy, market, regime) target, or
/// `None` when the sample is too thin.
pub fn propose(
    strategy_code: &str,
    market: &str,
    regime: &str,
    old_weight: f64,
    sample_size: i32,
    wins: i32,
    cfg: &RebalanceConfig,
) -> Option<WeightUpdate> {
    if sample_size < cfg.min_samples {
        return None;
    }

    let win_rate = wins as f64 / sample_size as f64;
    let raw = old_weight + cfg.alpha * (win_rate - cfg.baseline_win_rate) * old_weight;
    let new_weight = round4(raw.clamp(cfg.weight_min, cfg.weight_max));

    Some(WeightUpdate {
        strategy_code: strategy_code.to_string(),
        market: market.to_string(),
        regime: regime.to_string(),
        old_weight,
        new_weight,
        win_rate: round4(win_rate),
        sample_size,
        window_days: cfg.window_days,
        reason: format!(
            "win_rate {:.2} over {} samples, window={}d",
            win_rate, sample_size, cfg.window_days
        ),
    })
}

/// Rebalance every (code, scope) target under one regime. `defaults`
/// maps codes to their catalog default weight; `current` holds the
/// effective rows already written for this regime, which take
/// precedence as the old weight.
pub fn rebalance(
    defaults: &HashMap<String, f64>,
    current: &HashMap<(String, String), f64>,
    aggregates: &HashMap<(String, String), (i32, i32)>,
    regime: &str,
    cfg: &RebalanceConfig,
) -> Vec<WeightUpdate> {
    let mut codes: Vec<&String> = defaults.keys().collect();
    codes.sort();

    let mut updates = Vec::new();
    for code in codes {
        for scope in scopes() {
            let key = (code.clone(), scope.to_string());
            let Some(&(samples, wins)) = aggregates.get(&key) else {
                continue;
            };
            let old = current.get(&key).copied().unwrap_or(defaults[code]);
            if let Some(u) = propose(code, scope, regime, old, samples, wins, cfg) {
                updates.push(u);
            }
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEFAULT_REGIME;

    fn cfg() -> RebalanceConfig {
        RebalanceConfig::default()
    }

    fn propose_all(code: &str, old: f64, samples: i32, wins: i32) -> Option<WeightUpdate> {
        propose(code, ALL_MARKETS, DEFAULT_REGIME, old, samples, wins, &cfg())
    }

    #[test]
    fn reference_vector_eight_samples_five_wins() {
        // 8 samples, 5 wins, alpha 0.35, old 1.0 -> 1.0 + 0.35*0.125 = 1.04375
        let u = propose_all("trend_follow", 1.0, 8, 5).unwrap();
        assert!((u.new_weight - 1.0438).abs() < 1e-9);
        assert!((u.win_rate - 0.625).abs() < 1e-9);
        assert_eq!(u.reason, "win_rate 0.62 over 8 samples, window=45d");
        assert_eq!(u.market, "ALL");
        assert_eq!(u.regime, "default");
    }

    #[test]
    fn thin_sample_is_skipped_entirely() {
        assert!(propose_all("rebound", 1.0, 7, 7).is_none());
    }

    #[test]
    fn losing_strategy_shrinks() {
        let u = propose_all("rebound", 0.95, 10, 2).unwrap();
        assert!(u.new_weight < 0.95);
    }

    #[test]
    fn baseline_win_rate_leaves_weight_unchanged() {
        let u = propose_all("pullback", 1.05, 10, 5).unwrap();
        assert!((u.new_weight - 1.05).abs() < 1e-9);
    }

    #[test]
    fn weights_clamp_to_bounds() {
        let mut c = cfg();
        c.alpha = 10.0;
        let hi = propose("a", "CN", DEFAULT_REGIME, 2.0, 10, 10, &c).unwrap();
        assert!((hi.new_weight - c.weight_max).abs() < 1e-9);
        let lo = propose("b", "CN", DEFAULT_REGIME, 0.2, 10, 0, &c).unwrap();
        assert!((lo.new_weight - c.weight_min).abs() < 1e-9);
    }

    #[test]
    fn aggregate_counts_per_market_and_rolls_up() {
        let outcomes = vec![
            ("a".to_string(), Market::Cn, 0.05),
            ("a".to_string(), Market::Cn, -0.02),
            ("a".to_string(), Market::Hk, 0.03),
        ];
        let agg = aggregate(&outcomes, &cfg());
        assert_eq!(agg[&("a".to_string(), "CN".to_string())], (2, 1));
        assert_eq!(agg[&("a".to_string(), "HK".to_string())], (1, 1));
        assert_eq!(agg[&("a".to_string(), "ALL".to_string())], (3, 2));
        assert!(!agg.contains_key(&("a".to_string(), "US".to_string())));
    }

    #[test]
    fn aggregate_respects_win_threshold() {
        let outcomes = vec![
            ("a".to_string(), Market::Cn, 0.05),
            ("a".to_string(), Market::Cn, 0.0),
            ("a".to_string(), Market::Cn, -0.02),
        ];
        let agg = aggregate(&outcomes, &cfg());
        // zero return is not a win at threshold 0.0
        assert_eq!(agg[&("a".to_string(), "CN".to_string())], (3, 1));
    }

    #[test]
    fn rebalance_emits_one_update_per_sampled_scope() {
        // 8 CN wins out of 10, plus 2 HK samples below min_samples
        let mut outcomes: Vec<(String, Market, f64)> = (0..10)
            .map(|i| {
                (
                    "trend_follow".to_string(),
                    Market::Cn,
                    if i < 8 { 0.02 } else { -0.01 },
                )
            })
            .collect();
        outcomes.push(("trend_follow".to_string(), Market::Hk, 0.01));
        outcomes.push(("trend_follow".to_string(), Market::Hk, 0.02));

        let defaults = HashMap::from([("trend_follow".to_string(), 1.15)]);
        let aggregates = aggregate(&outcomes, &cfg());
        let updates = rebalance(&defaults, &HashMap::new(), &aggregates, DEFAULT_REGIME, &cfg());

        // the rollup sees all 12 samples, CN its own 10; HK is too thin
        let markets: Vec<&str> = updates.iter().map(|u| u.market.as_str()).collect();
        assert_eq!(markets, vec!["ALL", "CN"]);
        assert!(updates.iter().all(|u| u.new_weight > 1.15));
        assert_eq!(updates[0].sample_size, 12);
        assert_eq!(updates[1].sample_size, 10);
    }

    #[test]
    fn existing_effective_weight_takes_precedence_over_default() {
        let defaults = HashMap::from([("rebound".to_string(), 0.95)]);
        let current = HashMap::from([(("rebound".to_string(), "CN".to_string()), 1.40)]);
        let aggregates = HashMap::from([(("rebound".to_string(), "CN".to_string()), (10, 7))]);

        let updates = rebalance(&defaults, &current, &aggregates, DEFAULT_REGIME, &cfg());
        assert_eq!(updates.len(), 1);
        assert!((updates[0].old_weight - 1.40).abs() < 1e-9);
    }

    #[test]
    fn rebalance_only_touches_sampled_strategies() {
        let defaults = HashMap::from([
            ("trend_follow".to_string(), 1.15),
            ("rebound".to_string(), 0.95),
        ]);
        let aggregates =
            HashMap::from([(("trend_follow".to_string(), "ALL".to_string()), (10, 7))]);
        let updates = rebalance(&defaults, &HashMap::new(), &aggregates, DEFAULT_REGIME, &cfg());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].strategy_code, "trend_follow");
        assert!(updates[0].new_weight > 1.15);
    }
}
