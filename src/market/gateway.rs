//! Read-through market data gateway.
//!
//! Every scan-path fetch goes through here: the gateway checks the
//! time-bounded cache first, asks the underlying `MarketDataSource` on a
//! miss, and overwrites the cache entry with whatever comes back. Any
//! provider failure degrades to "absent" — logged, never fatal, so one
//! bad instrument can't take down a scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::MarketDataSource;
use crate::cache::TimedCache;
use crate::types::{ContractType, IndexSnapshot, MarketIndicators, OptionRow, Quote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Broad market indices reported alongside alerts.
const SPX_SYMBOL: &str = "^GSPC";
const NDX_SYMBOL: &str = "^NDX";

/// Days of close history fetched per index; only the last two closes are
/// used, the margin covers weekends and holidays.
const INDICATOR_LOOKBACK_DAYS: u32 = 5;

/// Cache key for an option-chain side.
type ChainKey = (String, NaiveDate, ContractType);

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Cache-checked access to quotes, option chains, and market indicators.
///
/// One instance is created at startup and shared for the process
/// lifetime; the caches inside are never torn down mid-run.
pub struct MarketGateway {
    source: Arc<dyn MarketDataSource>,
    quotes: TimedCache<String, Quote>,
    chains: TimedCache<ChainKey, Vec<OptionRow>>,
    indicators: TimedCache<(), MarketIndicators>,
}

impl MarketGateway {
    /// Build a gateway over a data source, with one freshness window
    /// applied uniformly to every cached entry.
    pub fn new(source: Arc<dyn MarketDataSource>, cache_ttl: Duration) -> Self {
        MarketGateway {
            source,
            quotes: TimedCache::new(cache_ttl),
            chains: TimedCache::new(cache_ttl),
            indicators: TimedCache::new(cache_ttl),
        }
    }

    /// Current price and expirations for an underlying.
    ///
    /// `None` means no price could be determined — the caller should skip
    /// this instrument for the rest of the scan.
    pub async fn fetch_quote(&self, symbol: &str) -> Option<Quote> {
        if let Some(quote) = self.quotes.get(&symbol.to_string()) {
            debug!(symbol, "Quote served from cache");
            return Some(quote);
        }

        let price = match self.source.current_price(symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(symbol, "No price available, skipping");
                return None;
            }
            Err(e) => {
                warn!(symbol, error = %e, "Price fetch failed, skipping");
                return None;
            }
        };

        let expirations = match self.source.expirations(symbol).await {
            Ok(exps) => exps,
            Err(e) => {
                warn!(symbol, error = %e, "Expiration fetch failed, skipping");
                return None;
            }
        };

        let quote = Quote { price, expirations };
        self.quotes.put(symbol.to_string(), quote.clone());
        Some(quote)
    }

    /// One side of the option chain for (underlying, expiration).
    /// `None` on any fetch error — logged, not retried within the scan.
    pub async fn fetch_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        contract_type: ContractType,
    ) -> Option<Vec<OptionRow>> {
        let key = (symbol.to_string(), expiration, contract_type);
        if let Some(rows) = self.chains.get(&key) {
            debug!(symbol, %expiration, "Chain served from cache");
            return Some(rows);
        }

        match self.source.option_chain(symbol, expiration).await {
            Ok(chain) => {
                let rows = chain.side(contract_type).to_vec();
                self.chains.put(key, rows.clone());
                Some(rows)
            }
            Err(e) => {
                warn!(symbol, %expiration, error = %e, "Chain fetch failed, skipping expiration");
                None
            }
        }
    }

    /// Latest SPX/NDX levels with day-over-day change. `None` only when
    /// neither index produced data; a single absent index is tolerated
    /// and simply omitted from rendered output.
    pub async fn fetch_market_indicators(&self) -> Option<MarketIndicators> {
        if let Some(indicators) = self.indicators.get(&()) {
            debug!("Market indicators served from cache");
            return Some(indicators);
        }

        let indicators = MarketIndicators {
            spx: self.index_snapshot(SPX_SYMBOL).await,
            ndx: self.index_snapshot(NDX_SYMBOL).await,
        };

        if indicators.is_empty() {
            warn!("No market indicator data available");
            return None;
        }

        self.indicators.put((), indicators);
        Some(indicators)
    }

    async fn index_snapshot(&self, symbol: &str) -> Option<IndexSnapshot> {
        let closes = match self.source.daily_closes(symbol, INDICATOR_LOOKBACK_DAYS).await {
            Ok(closes) => closes,
            Err(e) => {
                warn!(symbol, error = %e, "Index history fetch failed");
                return None;
            }
        };

        let latest = *closes.last()?;
        let prior = if closes.len() > 1 {
            closes[closes.len() - 2]
        } else {
            latest
        };
        Some(IndexSnapshot::from_closes(latest, prior))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
