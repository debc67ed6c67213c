//! Market regime detection.
//!
//! Classifies each market's day as bullish, neutral or bearish from
//! breadth, average change and the share of active signals, then
//! derives a single bounded multiplier applied uniformly to every
//! weighted score in that market.

use crate::config::RegimeConfig;
use crate::models::Regime;

/// One market's regime reading for a snapshot date.
#[derive(Debug, Clone, Copy)]
pub struct RegimeReading {
    pub regime: Regime,
    pub score: f64,
    pub breadth_ratio: f64,
    pub avg_change_pct: f64,
    pub active_ratio: f64,
    pub confidence: f64,
    pub multiplier: f64,
    pub sample_size: i32,
}

impl RegimeReading {
    pub fn neutral(sample_size: i32) -> Self {
        Self {
            regime: Regime::Neutral,
            score: 0.0,
            breadth_ratio: 0.0,
            avg_change_pct: 0.0,
            active_ratio: 0.0,
            confidence: 0.0,
            multiplier: 1.0,
            sample_size,
        }
    }
}

/// Classify a market from its daily change distribution and the share
/// of signals that came out active.
pub fn assess(changes: &[f64], active_ratio: f64, cfg: &RegimeConfig) -> RegimeReading {
    let sample_size = changes.len() as i32;
    if sample_size < cfg.min_sample_size {
        // Too thin to read anything into.
        return RegimeReading::neutral(sample_size);
    }

    let advancers = changes.iter().filter(|&&c| c > 0.0).count() as f64;
    let breadth_ratio = advancers / changes.len() as f64;
    let avg_change_pct = changes.iter().sum::<f64>() / changes.len() as f64;

    let breadth_norm = ((breadth_ratio - 0.5) * 2.0).clamp(-1.0, 1.0);
    let change_norm = (avg_change_pct / 2.0).clamp(-1.0, 1.0);
    let active_norm = ((active_ratio - 0.5) * 2.0).clamp(-1.0, 1.0);

    let score = 0.45 * breadth_norm + 0.30 * change_norm + 0.25 * active_norm;

    let regime = if score >= cfg.score_threshold {
        Regime::Bullish
    } else if score <= -cfg.score_threshold {
        Regime::Bearish
    } else {
        Regime::Neutral
    };

    let confidence = (score.abs() * 1.45 + 0.15).clamp(0.0, 1.0);

    let multiplier = match regime {
        Regime::Neutral => 1.0,
        _ => 1.0 + (score * cfg.multiplier_band).clamp(-cfg.multiplier_band, cfg.multiplier_band),
    };

    RegimeReading {
        regime,
        score,
        breadth_ratio,
        avg_change_pct,
        active_ratio,
        confidence,
        multiplier,
        sample_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RegimeConfig {
        RegimeConfig::default()
    }

    #[test]
    fn broad_rally_reads_bullish_with_multiplier_above_one() {
        let changes = vec![2.0, 1.5, 3.0, 0.8, 1.2, -0.3, 2.4, 1.1];
        let r = assess(&changes, 0.7, &cfg());
        assert_eq!(r.regime, Regime::Bullish);
        assert!(r.multiplier > 1.0);
        assert!(r.multiplier <= 1.0 + cfg().multiplier_band);
        assert!(r.confidence > 0.0);
    }

    #[test]
    fn broad_selloff_reads_bearish_with_multiplier_below_one() {
        let changes = vec![-2.0, -1.5, -3.0, -0.8, 0.2, -2.4, -1.1, -0.9];
        let r = assess(&changes, 0.1, &cfg());
        assert_eq!(r.regime, Regime::Bearish);
        assert!(r.multiplier < 1.0);
        assert!(r.multiplier >= 1.0 - cfg().multiplier_band);
    }

    #[test]
    fn neutral_multiplier_is_exactly_one() {
        let changes = vec![0.1, -0.2, 0.3, -0.1, 0.0, 0.2];
        let r = assess(&changes, 0.5, &cfg());
        assert_eq!(r.regime, Regime::Neutral);
        assert_eq!(r.multiplier, 1.0);
    }

    #[test]
    fn undersampled_market_forces_neutral_zero_confidence() {
        let changes = vec![5.0, 6.0];
        let r = assess(&changes, 1.0, &cfg());
        assert_eq!(r.regime, Regime::Neutral);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.multiplier, 1.0);
        assert_eq!(r.sample_size, 2);
    }

    #[test]
    fn multiplier_saturates_at_band_edge() {
        let changes = vec![9.0; 50];
        let r = assess(&changes, 1.0, &cfg());
        assert!(r.multiplier <= 1.0 + cfg().multiplier_band + 1e-12);
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let changes = vec![9.0; 50];
        let r = assess(&changes, 1.0, &cfg());
        assert!(r.confidence <= 1.0);
    }
}
