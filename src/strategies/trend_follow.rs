//! Trend Following Strategy
//!
//! Buys stocks in an established uptrend: stacked moving averages
//! (MA5 > MA20 > MA60), price holding above the fast average, and
//! positive week-over-week momentum.

use super::{Judgment, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

pub struct TrendFollowJudge;

impl StrategyJudge for TrendFollowJudge {
    fn code(&self) -> &'static str {
        "trend_follow"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let (ma5, ma20, ma60) = (s.ma5?, s.ma20?, s.ma60?);

        // Stacked averages define the uptrend; abstain otherwise.
        if !(ma5 > ma20 && ma20 > ma60 && s.price > ma5) {
            return None;
        }
        if s.change_5d_pct <= 0.0 {
            return None;
        }

        let mut score = 55.0;
        score += (s.change_5d_pct * 1.2).min(12.0);
        score += f.cross.relative_strength * 15.0;
        if s.volume_ratio() > 1.2 {
            score += 4.0;
        }

        let rsi = s.rsi14.unwrap_or(50.0);
        let overheated = rsi >= 72.0;
        let mut confidence = 0.45 + f.cross.relative_strength * 0.35;
        if overheated {
            confidence -= 0.15;
        }

        let risk = if s.volume_ratio() > 3.0 || rsi >= 80.0 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };

        let judgment = if overheated {
            Judgment::watch(score, confidence)
                .with_evidence(format!("uptrend intact but RSI {:.0} overheated", rsi))
        } else {
            Judgment::buy(score, confidence)
        };

        Some(
            judgment
                .with_risk(risk)
                .with_evidence(format!(
                    "MA stack {:.2} > {:.2} > {:.2}, 5d change {:+.1}%",
                    ma5, ma20, ma60, s.change_5d_pct
                )),
        )
    }
}
