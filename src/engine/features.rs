//! Per-stock feature assembly.
//!
//! Turns raw feed snapshots into the [`StockFeatures`] the judges
//! consume: recency-weighted news metrics plus cross-sectional
//! percentile ranks within the market's snapshot.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::marketdata::{NewsItem, StockSnapshot};
use crate::strategies::{CrossSection, NewsScore, StockFeatures};

/// News older than this contributes nothing.
const NEWS_WINDOW_DAYS: f64 = 7.0;

const POSITIVE_EVENTS: &[(&str, f64)] = &[
    ("earnings beat", 4.0),
    ("guidance raise", 4.0),
    ("buyback", 3.0),
    ("upgrade", 2.5),
    ("contract win", 2.5),
    ("merger", 2.0),
    ("dividend increase", 1.5),
];

const NEGATIVE_EVENTS: &[(&str, f64)] = &[
    ("investigation", -4.0),
    ("lawsuit", -3.0),
    ("downgrade", -2.5),
    ("guidance cut", -4.0),
    ("default", -5.0),
    ("resignation", -1.5),
];

/// Aggregate news per symbol: sentiment heat decays linearly over the
/// window, keyword hits add a bounded event score.
pub fn news_scores(items: &[NewsItem], now: DateTime<Utc>) -> HashMap<String, NewsScore> {
    let mut map: HashMap<String, NewsScore> = HashMap::new();

    for item in items {
        let age_days = (now - item.published_at).num_seconds() as f64 / 86_400.0;
        if !(0.0..NEWS_WINDOW_DAYS).contains(&age_days) {
            continue;
        }
        let recency = 1.0 - age_days / NEWS_WINDOW_DAYS;

        let entry = map.entry(item.symbol.clone()).or_default();
        entry.heat += item.sentiment * recency;
        entry.count += 1;

        let headline = item.headline.to_lowercase();
        for (kw, pts) in POSITIVE_EVENTS.iter().chain(NEGATIVE_EVENTS) {
            if headline.contains(kw) {
                entry.event_score += pts * recency;
            }
        }
    }

    for score in map.values_mut() {
        score.event_score = score.event_score.clamp(-6.0, 12.0);
    }
    map
}

/// Percentile rank of each value within the slice, in [0, 1].
/// Ties share the rank of the lowest equal value.
fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n <= 1 {
        return vec![0.5; n];
    }
    values
        .iter()
        .map(|&v| {
            let less = values.iter().filter(|&&o| o < v).count();
            less as f64 / (n - 1) as f64
        })
        .collect()
}

/// Preliminary momentum score used for the cross-sectional score rank.
fn momentum_score(s: &StockSnapshot) -> f64 {
    let mut score = 50.0;
    score += (s.change_5d_pct * 1.5).clamp(-20.0, 20.0);
    if let Some(ma20) = s.ma20 {
        if s.price > ma20 {
            score += 8.0;
        }
    }
    score += (s.volume_ratio() - 1.0).clamp(-1.0, 2.0) * 4.0;
    score.clamp(0.0, 100.0)
}

/// Assemble features for a whole market snapshot.
pub fn build_features(
    snapshots: Vec<StockSnapshot>,
    news: &[NewsItem],
    holdings: &[String],
    watchlist: &[String],
    now: DateTime<Utc>,
) -> Vec<StockFeatures> {
    let news_map = news_scores(news, now);
    let held: HashSet<&str> = holdings.iter().map(|s| s.as_str()).collect();
    let watched: HashSet<&str> = watchlist.iter().map(|s| s.as_str()).collect();

    let scores: Vec<f64> = snapshots.iter().map(momentum_score).collect();
    let changes: Vec<f64> = snapshots.iter().map(|s| s.change_pct).collect();
    let turnovers: Vec<f64> = snapshots.iter().map(|s| s.turnover_rate).collect();
    let volumes: Vec<f64> = snapshots.iter().map(|s| s.volume_ratio()).collect();

    let score_pcts = percentile_ranks(&scores);
    let change_pcts = percentile_ranks(&changes);
    let turnover_pcts = percentile_ranks(&turnovers);
    let volume_pcts = percentile_ranks(&volumes);

    snapshots
        .into_iter()
        .enumerate()
        .map(|(i, snapshot)| {
            let cross = CrossSection {
                score_pct: score_pcts[i],
                change_pct: change_pcts[i],
                turnover_pct: turnover_pcts[i],
                volume_pct: volume_pcts[i],
                relative_strength: 0.45 * score_pcts[i]
                    + 0.25 * change_pcts[i]
                    + 0.20 * turnover_pcts[i]
                    + 0.10 * volume_pcts[i],
                crowding: ((turnover_pcts[i].max(volume_pcts[i]) - 0.85) / 0.15)
                    .clamp(0.0, 1.0),
            };
            let news = news_map.get(&snapshot.symbol).copied().unwrap_or_default();
            let holding = held.contains(snapshot.symbol.as_str());
            let in_watchlist = watched.contains(snapshot.symbol.as_str());
            StockFeatures {
                snapshot,
                news,
                cross,
                holding,
                in_watchlist,
            }
        })
        .collect()
}
