//! Watchlist Agent Strategy
//!
//! Covers operator watchlist symbols only. Blends news heat with
//! momentum into a standing opinion, so every watched stock gets at
//! least a watch-grade signal each day.

use super::{Judgment, NewsTier, StockFeatures, StrategyJudge};
use crate::models::RiskLevel;

pub struct WatchlistAgentJudge;

impl StrategyJudge for WatchlistAgentJudge {
    fn code(&self) -> &'static str {
        "watchlist_agent"
    }

    fn judge(&self, f: &StockFeatures) -> Option<Judgment> {
        if !f.in_watchlist {
            return None;
        }
        let s = &f.snapshot;

        let mut score = 45.0;
        score += f.news.heat.clamp(-5.0, 5.0) * 2.0;
        score += f.news.event_score;
        score += f.cross.relative_strength * 12.0;
        score += (s.change_5d_pct * 0.8).clamp(-8.0, 8.0);

        let momentum_ok = s
            .ma20
            .map(|ma20| s.price > ma20 && s.change_5d_pct > 0.0)
            .unwrap_or(false);

        let judgment = if f.news.tier() == NewsTier::High && momentum_ok {
            Judgment::buy(score, 0.6)
                .with_evidence(format!("event score {:.1} with momentum", f.news.event_score))
        } else if f.holding {
            Judgment::hold(score, 0.5)
        } else {
            Judgment::watch(score, 0.5)
        };

        Some(
            judgment
                .with_risk(RiskLevel::Medium)
                .with_evidence(format!(
                    "watchlist: news heat {:.1}, rel strength {:.2}",
                    f.news.heat, f.cross.relative_strength
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
    fn abstains_off_watchlist() {
        let f = testkit::features("AAPL");
        assert!(WatchlistAgentJudge.judge(&f).is_none());
    }

    #[test]
    fn watched_stock_gets_watch_signal() {
        let mut f = testkit::features("AAPL");
        f.in_watchlist = true;
        let j = WatchlistAgentJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Watch);
    }

    #[test]
    fn held_stock_gets_hold_signal() {
        let mut f = testkit::features("AAPL");
        f.in_watchlist = true;
        f.holding = true;
        let j = WatchlistAgentJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Hold);
    }

    #[test]
    fn strong_event_with_momentum_upgrades_to_buy() {
        let mut f = testkit::features("AAPL");
        f.in_watchlist = true;
        f.news = NewsScore {
            heat: 3.0,
            event_score: 8.0,
            count: 6,
        };
        f.snapshot.price = 104.0;
        f.snapshot.ma20 = Some(100.0);
        f.snapshot.change_5d_pct = 3.0;

        let j = WatchlistAgentJudge.judge(&f).unwrap();
        assert_eq!(j.action, Action::Buy);
    }
}
