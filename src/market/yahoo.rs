//! Yahoo Finance market data integration.
//!
//! Uses the public query endpoints:
//! - `/v7/finance/options/{symbol}` — live quote, expiration dates, and
//!   per-expiration option chains.
//! - `/v8/finance/chart/{symbol}` — daily close history, also the price
//!   fallback when no live quote is present.
//!
//! No auth is required for reads. Index symbols carry a `^` prefix
//! (`^GSPC`, `^NDX`) and are percent-encoded into the path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{MarketDataSource, OptionChain};
use crate::types::OptionRow;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://query2.finance.yahoo.com";
const SOURCE_NAME: &str = "yahoo";

// ---------------------------------------------------------------------------
// API response types (Yahoo JSON → Rust)
// ---------------------------------------------------------------------------

/// Envelope of `/v7/finance/options/{symbol}`. We only deserialize the
/// fields we need.
#[derive(Debug, Deserialize)]
struct OptionsEnvelope {
    #[serde(rename = "optionChain")]
    option_chain: ResultList<OptionsResult>,
}

#[derive(Debug, Deserialize)]
struct ResultList<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct OptionsResult {
    #[serde(default)]
    quote: Option<YahooQuote>,
    /// Expiration dates as unix timestamps (midnight UTC), ascending.
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    /// Chain blocks; when a `date` query param is given there is one,
    /// for that expiration.
    #[serde(default)]
    options: Vec<ChainBlock>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChainBlock {
    #[serde(default)]
    calls: Vec<YahooContract>,
    #[serde(default)]
    puts: Vec<YahooContract>,
}

/// One contract row. Yahoo omits volume/openInterest on strikes that
/// never traded, and we keep that absence visible downstream.
#[derive(Debug, Deserialize)]
struct YahooContract {
    #[serde(default)]
    strike: Option<f64>,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(rename = "openInterest", default)]
    open_interest: Option<u64>,
}

/// Envelope of `/v8/finance/chart/{symbol}`.
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ResultList<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize, Default)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    /// Daily closes, oldest first; nulls for non-trading days.
    #[serde(default)]
    close: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// A Yahoo expiration timestamp (seconds, midnight UTC) as a calendar date.
fn ts_to_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

/// A calendar date as the Yahoo expiration timestamp (midnight UTC).
fn date_to_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Map a Yahoo contract to an `OptionRow`. A missing strike becomes NaN
/// so the row reads as malformed instead of silently impersonating a
/// real strike.
fn contract_to_row(c: YahooContract) -> OptionRow {
    OptionRow {
        strike: c.strike.unwrap_or(f64::NAN),
        volume: c.volume,
        open_interest: c.open_interest,
    }
}

/// Flatten a chart result into its non-null closes, oldest first.
fn closes_from_chart(result: &ChartResult) -> Vec<f64> {
    result
        .indicators
        .quote
        .first()
        .map(|q| q.close.iter().filter_map(|c| *c).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Yahoo Finance market data client.
pub struct YahooFinanceClient {
    http: Client,
}

impl YahooFinanceClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("SENTINEL/0.1.0 (options-activity-scanner)")
            .build()
            .context("Failed to build HTTP client for Yahoo Finance")?;

        Ok(Self { http })
    }

    // -- Internal helpers ------------------------------------------------

    async fn fetch_options(&self, symbol: &str, date: Option<i64>) -> Result<OptionsResult> {
        let mut url = format!(
            "{BASE_URL}/v7/finance/options/{}",
            urlencoding::encode(symbol),
        );
        if let Some(ts) = date {
            url.push_str(&format!("?date={ts}"));
        }

        debug!(url = %url, "Fetching Yahoo options data");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Yahoo options request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo options API error {status}: {body}");
        }

        let envelope: OptionsEnvelope = resp
            .json()
            .await
            .context("Failed to parse Yahoo options response")?;

        envelope
            .option_chain
            .result
            .into_iter()
            .next()
            .context(format!("Yahoo returned no option data for {symbol}"))
    }

    async fn fetch_chart(&self, symbol: &str, range_days: u32) -> Result<ChartResult> {
        let url = format!(
            "{BASE_URL}/v8/finance/chart/{}?range={}d&interval=1d",
            urlencoding::encode(symbol),
            range_days,
        );

        debug!(url = %url, "Fetching Yahoo chart data");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Yahoo chart request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo chart API error {status}: {body}");
        }

        let envelope: ChartEnvelope = resp
            .json()
            .await
            .context("Failed to parse Yahoo chart response")?;

        envelope
            .chart
            .result
            .into_iter()
            .next()
            .context(format!("Yahoo returned no chart data for {symbol}"))
    }
}

// ---------------------------------------------------------------------------
// MarketDataSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataSource for YahooFinanceClient {
    /// Live price, falling back to the most recent daily close.
    async fn current_price(&self, symbol: &str) -> Result<Option<f64>> {
        let result = self.fetch_options(symbol, None).await?;
        if let Some(price) = result.quote.and_then(|q| q.regular_market_price) {
            return Ok(Some(price));
        }

        debug!(symbol, "No live quote, falling back to last close");
        let chart = self.fetch_chart(symbol, 1).await?;
        Ok(closes_from_chart(&chart).last().copied())
    }

    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let result = self.fetch_options(symbol, None).await?;
        Ok(result
            .expiration_dates
            .into_iter()
            .filter_map(ts_to_date)
            .collect())
    }

    async fn option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let result = self
            .fetch_options(symbol, Some(date_to_ts(expiration)))
            .await?;

        let block = match result.options.into_iter().next() {
            Some(b) => b,
            None => return Ok(OptionChain::default()),
        };

        Ok(OptionChain {
            calls: block.calls.into_iter().map(contract_to_row).collect(),
            puts: block.puts.into_iter().map(contract_to_row).collect(),
        })
    }

    async fn daily_closes(&self, symbol: &str, lookback_days: u32) -> Result<Vec<f64>> {
        let chart = self.fetch_chart(symbol, lookback_days).await?;
        Ok(closes_from_chart(&chart))
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
