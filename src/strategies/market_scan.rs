//! Market Scan Strategy
//!
//! Cross-sectional screen over the whole universe. Only stocks near the
//! top of the relative-strength ranking (or with a high-tier news
//! event) make it through, which keeps scan output small enough to act
//! on.

use super::{Judgment, NewsTier, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

/// Relative-strength percentile floor for scan hits.
const STRENGTH_FLOOR: f64 = 0.70;

pub struct MarketScanJudge;

impl StrategyJudge for MarketScanJudge {
    fn code(&self) -> &'static str {
        "market_scan"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let strong = f.cross.relative_strength >= STRENGTH_FLOOR;
        let event = f.news.tier() == NewsTier::High;
        if !strong && !event {
            return None;
        }

        let mut score = 50.0;
        score += f.cross.relative_strength * 30.0;
        score += f.news.event_score.max(0.0);
        score -= f.cross.crowding * 8.0;

        let trend_ok = s.ma20.map(|ma20| s.price > ma20).unwrap_or(false);

        let risk = if f.cross.crowding > 0.5 || s.volume_ratio() > 4.0 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };

        let judgment = if score >= 65.0 && trend_ok {
            Judgment::buy(score, 0.5 + f.cross.relative_strength * 0.3)
        } else {
            Judgment::watch(score, 0.45)
        };

        Some(
            judgment.with_risk(risk).with_evidence(format!(
                "scan rank: strength {:.2} (score pct {:.2}), crowding {:.2}",
                f.cross.relative_strength, f.cross.score_pct, f.cross.crowding
            )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::strategies::{testkit, NewsScore};

    #[test]
    fn abstains_mid_pack() {
        let f = testkit::features("601318");
        assert!(MarketScanJudge.judge(&f).is_none());
    }

    #[test]
    fn top_rank_with_trend_buys() {
        let mut f = testkit::features("601318");
        f.cross.relative_strength = 0.9;
        f.snapshot.price = 103.0;
        f.snapshot.ma20 = Some(100.0);

        let j = MarketScanJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Buy);
        assert!(j.score >= 65.0);
    }

    #[test]
    fn event_without_strength_still_surfaces_as_watch() {
        let mut f = testkit::features("601318");
        f.news = NewsScore {
            heat: 2.0,
            event_score: 7.5,
            count: 4,
        };
        f.cross.relative_strength = 0.3;

        let j = MarketScanJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Watch);
    }

    #[test]
    fn crowding_raises_risk_and_drags_score() {
        let mut calm = testkit::features("601318");
        calm.cross.relative_strength = 0.85;
        calm.snapshot.price = 103.0;
        calm.snapshot.ma20 = Some(100.0);

        let mut crowded = calm.clone();
        crowded.cross.crowding = 0.8;

        let jc = MarketScanJudge.judge(&calm).unwrap();
        let jx = MarketScanJudge.judge(&crowded).unwrap();
        assert!(jx.score < jc.score);
        assert_eq!(jx.risk_level, RiskLevel::High);
    }
}
