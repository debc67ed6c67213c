//! Candidate deduplication.
//!
//! Same-day signals for one (market, symbol) collapse into a single
//! candidate. Primary selection is a strict total order evaluated as
//! successive filters, so the winner never depends on input order:
//!
//! 1. active beats inactive
//! 2. action priority: buy > add > hold-while-holding > hold/watch > other
//! 3. complete entry plan beats none
//! 4. higher rank_score, with scores within epsilon treated as tied
//! 5. most recent update, then smallest id

use std::collections::BTreeMap;

use crate::models::{Action, Market, SignalStatus, SourcePool};

use super::SignalDraft;

/// One symbol's grouped signals; indices point into the draft slice.
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    pub market: Market,
    pub symbol: String,
    pub primary: usize,
    pub members: Vec<usize>,
}

impl CandidateGroup {
    /// Mixed when members span pools, otherwise the shared pool.
    pub fn source_pool(&self, drafts: &[SignalDraft]) -> SourcePool {
        let first = drafts[self.members[0]].source_pool;
        if self
            .members
            .iter()
            .all(|&i| drafts[i].source_pool == first)
        {
            first
        } else {
            SourcePool::Mixed
        }
    }

    pub fn from_market_scan(&self, drafts: &[SignalDraft]) -> bool {
        self.members
            .iter()
            .any(|&i| drafts[i].source_pool == SourcePool::MarketScan)
    }
}

pub fn action_priority(action: Action, holding: bool) -> i32 {
    match (action, holding) {
        (Action::Buy, _) => 4,
        (Action::Add, _) => 3,
        (Action::Hold, true) => 2,
        (Action::Hold, false) | (Action::Watch, _) => 1,
        (Action::Exit, _) => 0,
    }
}

/// Pick the primary among a group of signal indices.
fn select_primary(drafts: &[SignalDraft], mut pool: Vec<usize>, epsilon: f64) -> usize {
    debug_assert!(!pool.is_empty());

    // 1. active status
    if pool
        .iter()
        .any(|&i| drafts[i].status == SignalStatus::Active)
    {
        pool.retain(|&i| drafts[i].status == SignalStatus::Active);
    }

    // 2. action priority
    let top_priority = pool
        .iter()
        .map(|&i| action_priority(drafts[i].action, drafts[i].holding))
        .max()
        .unwrap_or(0);
    pool.retain(|&i| action_priority(drafts[i].action, drafts[i].holding) == top_priority);

    // 3. complete entry plan
    if pool.iter().any(|&i| drafts[i].has_entry_plan()) {
        pool.retain(|&i| drafts[i].has_entry_plan());
    }

    // 4. rank_score with epsilon tie band below the group's best
    let top_rank = pool
        .iter()
        .map(|&i| drafts[i].rank_score)
        .fold(f64::NEG_INFINITY, f64::max);
    pool.retain(|&i| drafts[i].rank_score >= top_rank - epsilon);

    // 5. recency, then id
    pool.into_iter()
        .min_by(|&a, &b| {
            drafts[b]
                .updated_at
                .cmp(&drafts[a].updated_at)
                .then_with(|| drafts[a].id.cmp(&drafts[b].id))
        })
        .unwrap_or(0)
}

/// Group drafts by (market, symbol) and pick each group's primary.
/// BTreeMap keeps candidate output ordered by key for determinism.
pub fn group(drafts: &[SignalDraft], epsilon: f64) -> Vec<CandidateGroup> {
    let mut by_key: BTreeMap<(Market, String), Vec<usize>> = BTreeMap::new();
    for (i, d) in drafts.iter().enumerate() {
        by_key
            .entry((d.market, d.symbol.clone()))
            .or_default()
            .push(i);
    }

    by_key
        .into_iter()
        .map(|((market, symbol), members)| {
            let primary = select_primary(drafts, members.clone(), epsilon);
            CandidateGroup {
                market,
                symbol,
                primary,
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit::draft;
    use chrono::{Duration, Utc};

    #[test]
    fn active_beats_inactive_regardless_of_score() {
        let mut a = draft("X", "trend_follow", 95.0);
        a.action = Action::Watch;
        a.status = SignalStatus::Inactive;
        let b = draft("X", "macd_golden", 60.0);

        let groups = group(&[a, b], 0.001);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary, 1);
    }

    #[test]
    fn buy_with_plan_beats_higher_scored_hold() {
        // strategy A: score 80, buy, complete plan; strategy B: 60, hold
        let mut a = draft("X", "strategy_a", 80.0);
        a.entry_low = Some(99.0);
        a.entry_high = Some(101.0);
        a.stop_loss = Some(95.0);
        a.target = Some(106.0);
        let mut b = draft("X", "strategy_b", 60.0);
        b.action = Action::Hold;
        b.status = SignalStatus::Inactive;

        let groups = group(&[b.clone(), a.clone()], 0.001);
        assert_eq!(groups[0].primary, 1);
        // and order-independent
        let groups = group(&[a, b], 0.001);
        assert_eq!(groups[0].primary, 0);
    }

    #[test]
    fn plan_breaks_equal_action_tie() {
        let a = draft("X", "a", 70.0);
        let mut b = draft("X", "b", 70.0);
        b.entry_low = Some(99.0);
        b.entry_high = Some(101.0);
        b.stop_loss = Some(95.0);
        b.target = Some(106.0);

        let groups = group(&[a, b], 0.001);
        assert_eq!(groups[0].primary, 1);
    }

    #[test]
    fn rank_score_decides_above_epsilon() {
        let a = draft("X", "a", 70.0);
        let b = draft("X", "b", 70.5);
        let groups = group(&[a, b], 0.001);
        assert_eq!(groups[0].primary, 1);
    }

    #[test]
    fn within_epsilon_recency_decides() {
        let mut a = draft("X", "a", 70.0);
        let mut b = draft("X", "b", 70.0005);
        let now = Utc::now();
        a.updated_at = now;
        b.updated_at = now - Duration::hours(1);

        let groups = group(&[a.clone(), b.clone()], 0.001);
        assert_eq!(groups[0].primary, 0);
        let groups = group(&[b, a], 0.001);
        assert_eq!(groups[0].primary, 1);
    }

    #[test]
    fn identical_signals_tie_break_on_id_deterministically() {
        let now = Utc::now();
        let mut a = draft("X", "a", 70.0);
        let mut b = draft("X", "b", 70.0);
        a.updated_at = now;
        b.updated_at = now;

        let forward = group(&[a.clone(), b.clone()], 0.001);
        let reverse = group(&[b.clone(), a.clone()], 0.001);
        let winner_fwd = if forward[0].primary == 0 { a.id } else { b.id };
        let winner_rev = if reverse[0].primary == 0 { b.id } else { a.id };
        assert_eq!(winner_fwd, winner_rev);
    }

    #[test]
    fn hold_while_holding_outranks_watch() {
        let mut a = draft("X", "a", 70.0);
        a.action = Action::Hold;
        a.status = SignalStatus::Inactive;
        a.holding = true;
        let mut b = draft("X", "b", 75.0);
        b.action = Action::Watch;
        b.status = SignalStatus::Inactive;

        let groups = group(&[a, b], 0.001);
        assert_eq!(groups[0].primary, 0);
    }

    #[test]
    fn groups_split_by_market_and_symbol() {
        let mut hk = draft("X", "a", 70.0);
        hk.market = Market::Hk;
        let cn = draft("X", "a", 70.0);
        let other = draft("Y", "a", 70.0);

        let groups = group(&[hk, cn, other], 0.001);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn mixed_pool_detection() {
        let mut a = draft("X", "a", 70.0);
        a.source_pool = SourcePool::Watchlist;
        let b = draft("X", "b", 60.0);

        let drafts = vec![a, b];
        let groups = group(&drafts, 0.001);
        assert_eq!(groups[0].source_pool(&drafts), SourcePool::Mixed);
        assert!(groups[0].from_market_scan(&drafts));
    }
}
