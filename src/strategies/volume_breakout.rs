//! Volume Breakout Strategy
//!
//! Chases confirmed breakouts: heavy volume relative to the 20-day
//! average plus a push through resistance. Aggressive by nature, so
//! every judgment ships with a tight plan anchored on the breakout
//! level.

use super::{Judgment, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

/// Minimum volume multiple over the 20-day average.
const VOLUME_THRESHOLD: f64 = 2.0;

pub struct VolumeBreakoutJudge;

impl StrategyJudge for VolumeBreakoutJudge {
    fn code(&self) -> &'static str {
        "volume_breakout"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        let s = &f.snapshot;
        let ratio = s.volume_ratio();
        if ratio < VOLUME_THRESHOLD {
            return None;
        }

        let broke_resistance = s.resistance.map(|r| s.price > r).unwrap_or(false);
        if !broke_resistance && s.change_pct < 4.0 {
            return None;
        }

        let mut score = 60.0;
        score += (ratio - VOLUME_THRESHOLD).min(3.0) * 4.0;
        if broke_resistance {
            score += 8.0;
        }
        score += f.cross.relative_strength * 10.0;

        let rsi = s.rsi14.unwrap_or(50.0);
        if rsi >= 85.0 {
            // Blow-off territory.
            return Some(
                Judgment::watch(score - 10.0, 0.4)
                    .with_risk(RiskLevel::High)
                    .with_evidence(format!("breakout extended, RSI {:.0}", rsi)),
            );
        }

        let confidence = (0.5 + (ratio - VOLUME_THRESHOLD) * 0.08).min(0.85);
        let entry_anchor = s.resistance.unwrap_or(s.price);
        let stop = s.support.map(|v| v * 0.985).unwrap_or(s.price * 0.95);

        Some(
            Judgment::buy(score, confidence)
                .with_risk(RiskLevel::High)
                .with_plan(
                    entry_anchor,
                    s.price * 1.01,
                    stop,
                    s.price * 1.06,
                    format!("close back below {:.2} on fading volume", entry_anchor),
                )
                .with_evidence(format!(
                    "volume {:.1}x 20d avg, change {:+.1}%",
                    ratio, s.change_pct
                )),
        )
    }
}
