//! Oversold Rebound Strategy
//!
//! Counter-trend bounces off washed-out levels: deep weekly loss,
//! oversold RSI, and a green candle today confirming the turn. High
//! risk, short horizon.

use super::{Judgment, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

pub struct ReboundJudge;

impl StrategyJudge for ReboundJudge {
    fn code(&self) -> &'static str {
        "rebound"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let rsi = s.rsi14?;

        if rsi >= 32.0 || s.change_5d_pct > -8.0 {
            return None;
        }
        // Wait for the turn itself, never catch the falling knife.
        if s.change_pct <= 0.5 {
            return None;
        }

        let near_support = s
            .support
            .map(|sup| (s.price - sup) / sup < 0.03)
            .unwrap_or(false);

        let mut score = 52.0;
        score += (32.0 - rsi) * 0.6;
        if near_support {
            score += 6.0;
        }
        score += (s.change_pct - 0.5).min(4.0) * 1.5;

        let confidence = if near_support { 0.55 } else { 0.4 };

        Some(
            Judgment::buy(score, confidence)
                .with_risk(RiskLevel::High)
                .with_evidence(format!(
                    "oversold bounce: RSI {:.0}, 5d {:+.1}%, today {:+.1}%",
                    rsi, s.change_5d_pct, s.change_pct
                )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::strategies::testkit;

    #[test]
    fn abstains_while_still_falling() {
        let mut f = testkit::features("00700");
        f.snapshot.rsi14 = Some(25.0);
        f.snapshot.change_5d_pct = -12.0;
        f.snapshot.change_pct = -2.0;
        assert!(ReboundJudge.judge(&f).is_none());
    }

    #[test]
    fn buys_confirmed_bounce() {
        let mut f = testkit::features("00700");
        f.snapshot.price = 96.0;
        f.snapshot.rsi14 = Some(24.0);
        f.snapshot.change_5d_pct = -11.0;
        f.snapshot.change_pct = 2.5;
        f.snapshot.support = Some(95.0);

        let j = ReboundJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Buy);
        assert_eq!(j.risk_level, RiskLevel::High);
        assert!(j.confidence >= 0.55);
    }

    #[test]
    fn abstains_when_not_oversold() {
        let mut f = testkit::features("00700");
        f.snapshot.rsi14 = Some(45.0);
        f.snapshot.change_5d_pct = -9.0;
        f.snapshot.change_pct = 1.0;
        assert!(ReboundJudge.judge(&f).is_none());
    }
}
