//! Service and engine configuration.
//!
//! Every tuning threshold the scoring pipeline uses lives here so
//! operators can adjust behavior without a rebuild. Values load from
//! `config/default.toml` (optional) with `SIGNAL_PLANE__`-prefixed
//! environment overrides on top.

use crate::models::Market;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Base URL of the market data feed
    pub market_data_url: String,
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            market_data_url: "http://localhost:8890".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl Settings {
    /// Layered load: defaults, then `config/default.toml` if present,
    /// then `SIGNAL_PLANE__SECTION__KEY` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("SIGNAL_PLANE").separator("__"))
            .build()?;
        let settings = cfg.try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

/// Complete engine tuning surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub regime: RegimeConfig,
    pub factors: FactorConfig,
    pub constraints: ConstraintConfig,
    pub candidates: CandidateConfig,
    pub dedup: DedupConfig,
    pub outcomes: OutcomeConfig,
    pub rebalance: RebalanceConfig,
    pub refresh: RefreshConfig,
}

/// A per-market value with the CN/HK/US split the caps use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketValues<T: Default + Copy> {
    pub cn: T,
    pub hk: T,
    pub us: T,
}

impl<T: Default + Copy> Default for MarketValues<T> {
    fn default() -> Self {
        Self {
            cn: T::default(),
            hk: T::default(),
            us: T::default(),
        }
    }
}

impl<T: Default + Copy> MarketValues<T> {
    pub fn get(&self, market: Market) -> T {
        match market {
            Market::Cn => self.cn,
            Market::Hk => self.hk,
            Market::Us => self.us,
        }
    }
}

/// Market regime detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Composite score above this is bullish, below the negative is bearish
    pub score_threshold: f64,
    /// Regime multiplier band around 1.0 (0.20 = at most +-20%)
    pub multiplier_band: f64,
    /// Fewer observed stocks than this forces neutral with zero confidence
    pub min_sample_size: i32,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.20,
            multiplier_band: 0.20,
            min_sample_size: 5,
        }
    }
}

/// Factor aggregation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorConfig {
    /// Bonus for market-scan sourced signals
    pub scan_source_bonus: f64,
    /// Bonus for mixed-pool signals
    pub mixed_source_bonus: f64,
}

impl Default for FactorConfig {
    fn default() -> Self {
        Self {
            scan_source_bonus: 3.0,
            mixed_source_bonus: 1.5,
        }
    }
}

/// Portfolio-level caps applied after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Max active signals for stocks not already held, per market
    pub max_unheld_active: MarketValues<i64>,
    /// Max share of active signals that may be high risk, per market
    pub max_high_risk_ratio: MarketValues<f64>,
    /// Max share of active signals any single strategy may contribute
    pub max_single_strategy_share: f64,
    /// rank_score cap applied on a strategy-share breach
    pub strategy_share_cap: f64,
    /// rank_score cap applied on a count or risk breach
    pub risk_cap: f64,
    /// High-risk share at or above this classifies the book as high risk
    pub risk_ratio_high_band: f64,
    /// High-risk share at or above this classifies the book as medium risk
    pub risk_ratio_medium_band: f64,
    /// Top-5 concentration at or above this classifies the book as high risk
    pub concentration_high_band: f64,
    /// Top-5 concentration at or above this classifies the book as medium risk
    pub concentration_medium_band: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            max_unheld_active: MarketValues {
                cn: 30,
                hk: 20,
                us: 20,
            },
            max_high_risk_ratio: MarketValues {
                cn: 0.35,
                hk: 0.32,
                us: 0.30,
            },
            max_single_strategy_share: 0.42,
            strategy_share_cap: 69.0,
            risk_cap: 65.0,
            risk_ratio_high_band: 0.45,
            risk_ratio_medium_band: 0.28,
            concentration_high_band: 0.65,
            concentration_medium_band: 0.48,
        }
    }
}

/// Entry candidate activation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Minimum plan quality for an active candidate
    pub min_plan_quality: i32,
    /// Score floor for market-scan sourced candidates
    pub scan_score_threshold: f64,
    /// Score floor for watchlist sourced candidates
    pub watchlist_score_threshold: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            min_plan_quality: 90,
            scan_score_threshold: 62.0,
            watchlist_score_threshold: 55.0,
        }
    }
}

/// Primary-selection tie handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// rank_score gap below this is a tie and falls through to recency
    pub score_epsilon: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            score_epsilon: 0.001,
        }
    }
}

/// Outcome evaluation horizons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Trading-day horizons to evaluate
    pub horizons: Vec<i32>,
    /// Signals whose snapshot is older than this are no longer evaluated
    pub lookback_days: i32,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1, 3, 5, 10],
            lookback_days: 60,
        }
    }
}

/// Automatic weight rebalancing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Win-rate sensitivity
    pub alpha: f64,
    /// Win rate that leaves the weight unchanged
    pub baseline_win_rate: f64,
    /// Lower clamp on any strategy weight
    pub weight_min: f64,
    /// Upper clamp on any strategy weight
    pub weight_max: f64,
    /// Strategies with fewer outcomes than this are skipped entirely
    pub min_samples: i32,
    /// Lookback window over outcomes, in days
    pub window_days: i32,
    /// Return above this counts as a win
    pub win_threshold: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            alpha: 0.35,
            baseline_win_rate: 0.5,
            weight_min: 0.1,
            weight_max: 3.0,
            min_samples: 8,
            window_days: 45,
            win_threshold: 0.0,
        }
    }
}

/// Refresh coordinator wait behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Poll interval while waiting on an in-flight run, in milliseconds
    pub wait_poll_interval_ms: u64,
    /// Maximum polls before a wait is declared timed out
    pub wait_max_attempts: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wait_poll_interval_ms: 500,
            wait_max_attempts: 120,
        }
    }
}
