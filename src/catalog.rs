//! Strategy catalog.
//!
//! Built-in strategy definitions are seeded once and never clobber
//! operator edits. Effective weights are a separate layer: the
//! rebalancer writes per-(code, market, regime) rows into
//! `strategy_weights`, and the merged view resolves a market-specific
//! row over the `ALL` rollup row over the catalog default.

use std::collections::HashMap;

use crate::db::Db;
use crate::models::{Market, RiskLevel};

pub const ALL_MARKETS: &str = "ALL";
/// Regime label the pipeline reads and writes weights under.
pub const DEFAULT_REGIME: &str = "default";

/// A built-in strategy definition.
pub struct BuiltinStrategy {
    pub code: &'static str,
    pub name: &'static str,
    pub weight: f64,
    pub risk_appetite: RiskLevel,
    pub default_horizon_days: i32,
}

pub const BUILTIN_STRATEGIES: &[BuiltinStrategy] = &[
    BuiltinStrategy {
        code: "trend_follow",
        name: "Trend Following",
        weight: 1.15,
        risk_appetite: RiskLevel::Medium,
        default_horizon_days: 5,
    },
    BuiltinStrategy {
        code: "macd_golden",
        name: "MACD Golden Cross",
        weight: 1.10,
        risk_appetite: RiskLevel::Medium,
        default_horizon_days: 3,
    },
    BuiltinStrategy {
        code: "volume_breakout",
        name: "Volume Breakout",
        weight: 1.18,
        risk_appetite: RiskLevel::High,
        default_horizon_days: 3,
    },
    BuiltinStrategy {
        code: "pullback",
        name: "Trend Pullback",
        weight: 1.05,
        risk_appetite: RiskLevel::Low,
        default_horizon_days: 5,
    },
    BuiltinStrategy {
        code: "rebound",
        name: "Oversold Rebound",
        weight: 0.95,
        risk_appetite: RiskLevel::High,
        default_horizon_days: 3,
    },
    BuiltinStrategy {
        code: "watchlist_agent",
        name: "Watchlist Agent",
        weight: 1.00,
        risk_appetite: RiskLevel::Medium,
        default_horizon_days: 5,
    },
    BuiltinStrategy {
        code: "market_scan",
        name: "Market Scan",
        weight: 1.08,
        risk_appetite: RiskLevel::Medium,
        default_horizon_days: 3,
    },
];

/// Seed built-ins. Existing rows keep whatever weight/enabled the
/// operator set.
pub async fn ensure_catalog(db: &Db) -> anyhow::Result<()> {
    for s in BUILTIN_STRATEGIES {
        sqlx::query(
            "INSERT INTO strategy_definitions (id, code, name, weight, risk_appetite, default_horizon_days, enabled)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, true)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(s.code)
        .bind(s.name)
        .bind(s.weight)
        .bind(s.risk_appetite)
        .bind(s.default_horizon_days)
        .execute(db)
        .await?;
    }
    Ok(())
}

/// Catalog default weights for enabled strategies, the floor the
/// rebalancer starts each target from.
pub async fn default_weight_map(db: &Db) -> anyhow::Result<HashMap<String, f64>> {
    let rows: Vec<(String, f64)> = sqlx::query_as(
        "SELECT code, weight FROM strategy_definitions WHERE enabled = true",
    )
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Merged weight map for one market under one regime: an effective row
/// scoped to that market shadows the `ALL` row with the same code, and
/// both shadow the catalog default. Disabled strategies are absent.
pub async fn effective_weight_map(
    db: &Db,
    market: Market,
    regime: &str,
) -> anyhow::Result<HashMap<String, f64>> {
    let defaults = default_weight_map(db).await?;
    let rows: Vec<(String, String, f64)> = sqlx::query_as(
        "SELECT strategy_code, market, weight FROM strategy_weights
         WHERE regime = $1 AND market IN ($2, $3)",
    )
    .bind(regime)
    .bind(ALL_MARKETS)
    .bind(market.as_str())
    .fetch_all(db)
    .await?;

    Ok(merge_weight_rows(defaults, rows, market))
}

fn merge_weight_rows(
    defaults: HashMap<String, f64>,
    rows: Vec<(String, String, f64)>,
    market: Market,
) -> HashMap<String, f64> {
    let mut map = defaults;
    for (code, row_market, weight) in &rows {
        if row_market == ALL_MARKETS && map.contains_key(code) {
            map.insert(code.clone(), *weight);
        }
    }
    for (code, row_market, weight) in rows {
        if row_market == market.as_str() && map.contains_key(&code) {
            map.insert(code, weight);
        }
    }
    map
}
