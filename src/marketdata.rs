//! Market data feed client.
//!
//! The engine only ever talks to the feed through [`MarketDataProvider`],
//! so the HTTP transport stays swappable in tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::models::Market;

/// Per-stock technical snapshot for one trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub market: Market,
    pub symbol: String,
    pub name: Option<String>,
    pub price: f64,
    pub change_pct: f64,
    pub change_5d_pct: f64,
    pub volume: f64,
    pub avg_volume_20d: f64,
    pub turnover_rate: f64,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub macd_dif: Option<f64>,
    pub macd_dea: Option<f64>,
    pub macd_dif_prev: Option<f64>,
    pub macd_dea_prev: Option<f64>,
    pub rsi14: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

impl StockSnapshot {
    pub fn volume_ratio(&self) -> f64 {
        if self.avg_volume_20d > 0.0 {
            self.volume / self.avg_volume_20d
        } else {
            0.0
        }
    }
}

/// One news item for a symbol, scored by the feed's sentiment model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub symbol: String,
    pub headline: String,
    pub published_at: DateTime<Utc>,
    /// -1.0 (very negative) .. 1.0 (very positive)
    pub sentiment: f64,
}

/// Daily OHLC bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Full scan universe for a market with today's technicals.
    async fn snapshots(&self, market: Market) -> anyhow::Result<Vec<StockSnapshot>>;

    /// Recent news for the market's symbols.
    async fn news(&self, market: Market) -> anyhow::Result<Vec<NewsItem>>;

    /// Symbols currently held in the portfolio.
    async fn holdings(&self, market: Market) -> anyhow::Result<Vec<String>>;

    /// Operator watchlist symbols.
    async fn watchlist(&self, market: Market) -> anyhow::Result<Vec<String>>;

    /// Daily bars strictly after `since`, ascending by date.
    async fn daily_bars(
        &self,
        market: Market,
        symbol: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<DailyBar>>;
}

/// HTTP client for the market data feed.
pub struct HttpMarketData {
    client: Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> anyhow::Result<T> {
        debug!("fetching {}", url);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("feed request failed: {} - {}", status, text))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
}

#[async_trait]
impl MarketDataProvider for HttpMarketData {
    async fn snapshots(&self, market: Market) -> anyhow::Result<Vec<StockSnapshot>> {
        let url = format!("{}/v1/markets/{}/snapshots", self.base_url, market.as_str());
        self.get_json(url).await
    }

    async fn news(&self, market: Market) -> anyhow::Result<Vec<NewsItem>> {
        let url = format!("{}/v1/markets/{}/news", self.base_url, market.as_str());
        self.get_json(url).await
    }

    async fn holdings(&self, market: Market) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/v1/markets/{}/holdings", self.base_url, market.as_str());
        let resp: SymbolsResponse = self.get_json(url).await?;
        Ok(resp.symbols)
    }

    async fn watchlist(&self, market: Market) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/v1/markets/{}/watchlist", self.base_url, market.as_str());
        let resp: SymbolsResponse = self.get_json(url).await?;
        Ok(resp.symbols)
    }

    async fn daily_bars(
        &self,
        market: Market,
        symbol: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<DailyBar>> {
        let url = format!(
            "{}/v1/markets/{}/bars/{}?since={}",
            self.base_url,
            market.as_str(),
            symbol,
            since
        );
        self.get_json(url).await
    }
}
