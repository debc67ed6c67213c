//! Trend Pullback Strategy
//!
//! Low-risk entries into an intact uptrend after a shallow retrace to
//! the 20-day average.

use super::{Judgment, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

pub struct PullbackJudge;

impl StrategyJudge for PullbackJudge {
    fn code(&self) -> &'static str {
        "pullback"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let ma20 = s.ma20?;
        let ma60 = s.ma60?;

        // Larger trend must still point up.
        if !(ma20 > ma60 && s.price > ma60) {
            return None;
        }
        // And the week must actually be a retrace, not strength.
        if s.change_5d_pct >= 0.0 || s.change_5d_pct < -12.0 {
            return None;
        }

        let gap_to_ma20 = (s.price - ma20) / ma20;
        if gap_to_ma20.abs() > 0.02 {
            return None;
        }

        let rsi = s.rsi14.unwrap_or(50.0);
        if !(35.0..=55.0).contains(&rsi) {
            return None;
        }

        let mut score = 56.0;
        score += (2.0 - gap_to_ma20.abs() * 100.0).max(0.0) * 2.0;
        score += f.cross.relative_strength * 8.0;

        let confidence = 0.55 + (50.0 - (rsi - 45.0).abs()) * 0.002;

        Some(
            Judgment::buy(score, confidence)
                .with_risk(RiskLevel::Low)
                .with_evidence(format!(
                    "pullback to MA20 ({:.2}), 5d {:+.1}%, RSI {:.0}",
                    ma20, s.change_5d_pct, rsi
                )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::strategies::testkit;

    fn pullback_setup() -> StockFeatures {
        let mut f = testkit::features("600519");
        f.snapshot.price = 101.0;
        f.snapshot.ma20 = Some(100.5);
        f.snapshot.ma60 = Some(96.0);
        f.snapshot.change_5d_pct = -3.0;
        f.snapshot.rsi14 = Some(44.0);
        f
    }

    #[test]
    fn buys_shallow_retrace_low_risk() {
        let j = PullbackJudge.judge(&pullback_setup()).unwrap();
        assert_eq!(j.action, Action::Buy);
        assert_eq!(j.risk_level, RiskLevel::Low);
    }

    #[test]
    fn abstains_when_far_from_ma20() {
        let mut f = pullback_setup();
        f.snapshot.price = 108.0;
        assert!(PullbackJudge.judge(&f).is_none());
    }

    #[test]
    fn abstains_on_deep_selloff() {
        let mut f = pullback_setup();
        f.snapshot.change_5d_pct = -15.0;
        assert!(PullbackJudge.judge(&f).is_none());
    }
}
