//! Shared types for the SENTINEL scanner.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, ledger, notify,
//! and scan modules can depend on them without circular references.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Option contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractType::Call => write!(f, "CALL"),
            ContractType::Put => write!(f, "PUT"),
        }
    }
}

/// Attempt to parse a string into a ContractType (case-insensitive).
impl std::str::FromStr for ContractType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "calls" => Ok(ContractType::Call),
            "put" | "puts" => Ok(ContractType::Put),
            _ => Err(anyhow::anyhow!("Unknown contract type: {s}")),
        }
    }
}

/// Expiration selection policy: which expiry dates a scan examines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// The nearest expirations, whatever weekday they fall on.
    Daily,
    /// Only the canonical weekly (Friday) expirations.
    Weekly,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Daily => write!(f, "daily"),
            Cadence::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for Cadence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            _ => Err(anyhow::anyhow!("Unknown cadence: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Current price and available expirations for an underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    /// Available expiration dates, ascending.
    pub expirations: Vec<NaiveDate>,
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${:.2} ({} expirations)",
            self.price,
            self.expirations.len(),
        )
    }
}

/// A single row of an option chain, scoped to
/// (underlying, expiration, contract type).
///
/// Volume and open interest are optional because the data source can omit
/// either on thinly traded strikes; a row missing them (or carrying a
/// non-finite strike) is malformed and never a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRow {
    pub strike: f64,
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
}

impl OptionRow {
    /// Whether every field is present and numerically usable.
    pub fn is_well_formed(&self) -> bool {
        self.strike.is_finite() && self.volume.is_some() && self.open_interest.is_some()
    }

    /// Volume / open-interest ratio. None for malformed rows or zero OI.
    pub fn volume_oi_ratio(&self) -> Option<f64> {
        let volume = self.volume?;
        let oi = self.open_interest?;
        if !self.strike.is_finite() || oi == 0 {
            return None;
        }
        Some(volume as f64 / oi as f64)
    }

    /// Normalized gap between this strike and the underlying price.
    pub fn strike_distance(&self, price: f64) -> Option<f64> {
        if !self.strike.is_finite() || !price.is_finite() || price == 0.0 {
            return None;
        }
        Some((self.strike - price).abs() / price)
    }
}

/// Latest level and day-over-day change for a broad market index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
}

impl IndexSnapshot {
    /// Build a snapshot from the latest and prior daily closes.
    pub fn from_closes(latest: f64, prior: f64) -> Self {
        let change = latest - prior;
        let change_pct = if prior != 0.0 {
            change / prior * 100.0
        } else {
            0.0
        };
        IndexSnapshot {
            price: latest,
            change,
            change_pct,
        }
    }
}

impl fmt::Display for IndexSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.change >= 0.0 { "+" } else { "" };
        write!(
            f,
            "{:.2} ({sign}{:.2} / {sign}{:.2}%)",
            self.price, self.change, self.change_pct,
        )
    }
}

/// Broad-market context attached to alerts. Either index may be absent
/// when no historical data was available for it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MarketIndicators {
    pub spx: Option<IndexSnapshot>,
    pub ndx: Option<IndexSnapshot>,
}

impl MarketIndicators {
    /// Whether neither index produced a snapshot.
    pub fn is_empty(&self) -> bool {
        self.spx.is_none() && self.ndx.is_none()
    }
}

// ---------------------------------------------------------------------------
// Scan criteria & session
// ---------------------------------------------------------------------------

/// Thresholds a chain row must clear to qualify as an alert candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanCriteria {
    pub min_volume: u64,
    pub min_volume_oi_ratio: f64,
    /// Maximum |strike - price| / price for a row to count as "near the money".
    pub max_strike_distance: f64,
}

impl Default for ScanCriteria {
    fn default() -> Self {
        ScanCriteria {
            min_volume: 10_000,
            min_volume_oi_ratio: 1.5,
            max_strike_distance: 0.10,
        }
    }
}

impl fmt::Display for ScanCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vol>{} ratio>{} dist<{:.0}%",
            self.min_volume,
            self.min_volume_oi_ratio,
            self.max_strike_distance * 100.0,
        )
    }
}

/// Preset volume tiers a user can pick instead of custom thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTier {
    /// 20000+ contracts.
    High,
    /// 10000–20000 contracts.
    Medium,
    /// 5000–10000 contracts.
    Low,
}

impl VolumeTier {
    /// The scan criteria this tier maps to. Strike-distance stays at the
    /// default — tiers only trade off volume floor against ratio.
    pub fn criteria(&self) -> ScanCriteria {
        let (min_volume, min_volume_oi_ratio) = match self {
            VolumeTier::High => (20_000, 2.0),
            VolumeTier::Medium => (10_000, 1.5),
            VolumeTier::Low => (5_000, 1.2),
        };
        ScanCriteria {
            min_volume,
            min_volume_oi_ratio,
            ..ScanCriteria::default()
        }
    }
}

/// Per-user scan preferences, owned by the front end and passed into
/// `run_scan` as a parameter. The core never mutates global user state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserSession {
    pub contract_type: ContractType,
    pub cadence: Cadence,
    pub criteria: ScanCriteria,
}

impl UserSession {
    pub fn new(contract_type: ContractType, cadence: Cadence, criteria: ScanCriteria) -> Self {
        UserSession {
            contract_type,
            cadence,
            criteria,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan output
// ---------------------------------------------------------------------------

/// A chain row that cleared every detection threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub symbol: String,
    pub contract_type: ContractType,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub underlying_price: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub ratio: f64,
    pub strike_distance: f64,
}

impl fmt::Display for AlertCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:.2} exp {} | vol={} oi={} ratio={:.2} dist={:.1}%",
            self.symbol,
            self.contract_type,
            self.strike,
            self.expiration,
            self.volume,
            self.open_interest,
            self.ratio,
            self.strike_distance * 100.0,
        )
    }
}

/// Summary of a single scan over the instrument set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Instruments that produced a quote and were examined.
    pub symbols_scanned: u32,
    /// Instruments skipped for lack of price or expirations.
    pub symbols_skipped: u32,
    /// Alerts newly delivered and recorded this scan.
    pub alerts_sent: u32,
    /// Qualifying candidates suppressed by the dedup ledger.
    pub duplicates_skipped: u32,
}

impl ScanSummary {
    /// The externally visible scan result: was at least one alert sent?
    pub fn any_sent(&self) -> bool {
        self.alerts_sent > 0
    }
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} skipped={} sent={} duplicates={}",
            self.symbols_scanned, self.symbols_skipped, self.alerts_sent, self.duplicates_skipped,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
