//! MACD Golden Cross Strategy
//!
//! Fires when DIF crosses above DEA from below, preferably below the
//! zero line where the bounce has room to run.

use super::{Judgment, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

pub struct MacdGoldenJudge;

impl StrategyJudge for MacdGoldenJudge {
    fn code(&self) -> &'static str {
        "macd_golden"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let dif = s.macd_dif?;
        let dea = s.macd_dea?;
        let dif_prev = s.macd_dif_prev?;
        let dea_prev = s.macd_dea_prev?;

        // Golden cross: DIF crosses DEA from below.
        if !(dif > dea && dif_prev <= dea_prev) {
            return None;
        }

        let mut score = 58.0;
        // A cross below zero tends to mark a reversal rather than a
        // continuation blip.
        if dif < 0.0 {
            score += 6.0;
        }
        score += f.cross.relative_strength * 10.0;
        if s.change_pct > 0.0 {
            score += 3.0;
        }

        let confidence = (0.5 + (dif - dea).abs().min(0.5) * 0.4).min(0.9);

        Some(
            Judgment::buy(score, confidence)
                .with_risk(RiskLevel::Medium)
                .with_evidence(format!(
                    "MACD golden cross, DIF {:.3} DEA {:.3}",
                    dif, dea
                )),
        )
    }
}
