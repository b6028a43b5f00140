//! Market data integrations.
//!
//! Defines the `MarketDataSource` trait — the seam to the external quote
//! and option-chain provider — and the read-through `MarketGateway` that
//! every scan goes through. The concrete provider is Yahoo Finance.

pub mod gateway;
pub mod yahoo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{ContractType, OptionRow};

/// Both sides of an option chain for one (underlying, expiration).
#[derive(Debug, Clone, Default)]
pub struct OptionChain {
    pub calls: Vec<OptionRow>,
    pub puts: Vec<OptionRow>,
}

impl OptionChain {
    /// The rows for one contract side, in chain order.
    pub fn side(&self, contract_type: ContractType) -> &[OptionRow] {
        match contract_type {
            ContractType::Call => &self.calls,
            ContractType::Put => &self.puts,
        }
    }
}

/// Abstraction over the external market data provider.
///
/// Every method is a network call. "No data" is `Ok(None)` / an empty
/// sequence; `Err` is reserved for transport and decode failures. The
/// gateway degrades both to "skip this instrument this scan".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current price for an underlying, falling back to the most recent
    /// daily close when no live quote is available. `None` if neither
    /// can be determined.
    async fn current_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Available expiration dates for an underlying, ascending.
    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>>;

    /// Full option chain (both sides) for one expiration.
    async fn option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain>;

    /// Recent daily closes for an index or underlying, oldest first.
    async fn daily_closes(&self, symbol: &str, lookback_days: u32) -> Result<Vec<f64>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
