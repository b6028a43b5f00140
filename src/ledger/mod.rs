//! Sent-alert ledger.
//!
//! A small CSV file records every alert delivered today so restarts and
//! overlapping scans never notify the same contract twice. Rows carry the
//! calendar day they were sent on; a day-rollover prune drops everything
//! older before each scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::ContractType;

const LEDGER_HEADER: [&str; 4] = ["symbol", "strike", "date", "contract_type"];

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One delivered alert. `strike` is stored in canonical text form so
/// 103.5 and 103.50 compare equal across process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub symbol: String,
    pub strike: String,
    pub date: NaiveDate,
    pub contract_type: ContractType,
}

/// Canonical text form of a strike: two decimal places, trailing zeros
/// stripped. `None` for non-finite inputs, which never reach the ledger.
pub fn canonical_strike(strike: f64) -> Option<String> {
    Decimal::from_f64(strike).map(|d| d.round_dp(2).normalize().to_string())
}

fn strike_matches(stored: &str, canonical: &str) -> bool {
    match (Decimal::from_str(stored), Decimal::from_str(canonical)) {
        (Ok(a), Ok(b)) => a == b,
        _ => stored == canonical,
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// File-backed dedup store for delivered alerts.
pub struct AlertLedger {
    path: PathBuf,
}

impl AlertLedger {
    /// Open the ledger, creating the file with a header row if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create ledger directory {}", parent.display())
                    })?;
                }
            }
            Self::write_all(&path, &[])?;
            debug!(path = %path.display(), "Created alert ledger");
        }
        Ok(AlertLedger { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All parseable rows. Malformed rows are logged and skipped rather
    /// than failing the whole read.
    pub fn records(&self) -> Result<Vec<AlertRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open alert ledger {}", self.path.display()))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping malformed ledger row"),
            }
        }
        Ok(records)
    }

    /// Whether an alert for this contract was already sent on `day`.
    pub fn already_sent_on(
        &self,
        symbol: &str,
        strike: f64,
        contract_type: ContractType,
        day: NaiveDate,
    ) -> Result<bool> {
        let canonical = match canonical_strike(strike) {
            Some(c) => c,
            None => return Ok(false),
        };
        Ok(self.records()?.iter().any(|r| {
            r.symbol == symbol
                && r.date == day
                && r.contract_type == contract_type
                && strike_matches(&r.strike, &canonical)
        }))
    }

    pub fn already_sent(
        &self,
        symbol: &str,
        strike: f64,
        contract_type: ContractType,
    ) -> Result<bool> {
        self.already_sent_on(symbol, strike, contract_type, Local::now().date_naive())
    }

    /// Append a delivered alert dated `day`. Idempotent: a row that is
    /// already present for that day is not written again.
    pub fn record_on(
        &self,
        symbol: &str,
        strike: f64,
        contract_type: ContractType,
        day: NaiveDate,
    ) -> Result<()> {
        if self.already_sent_on(symbol, strike, contract_type, day)? {
            debug!(symbol, strike, "Alert already recorded, not rewriting");
            return Ok(());
        }
        let canonical = canonical_strike(strike)
            .with_context(|| format!("Non-finite strike {strike} for {symbol}"))?;

        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open alert ledger {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(AlertRecord {
                symbol: symbol.to_string(),
                strike: canonical,
                date: day,
                contract_type,
            })
            .context("Failed to append ledger row")?;
        writer.flush().context("Failed to flush alert ledger")?;
        Ok(())
    }

    pub fn record(&self, symbol: &str, strike: f64, contract_type: ContractType) -> Result<()> {
        self.record_on(symbol, strike, contract_type, Local::now().date_naive())
    }

    /// Drop every row not dated `day`. Called at the start of each scan
    /// so yesterday's alerts become eligible again.
    pub fn prune_to(&self, day: NaiveDate) -> Result<()> {
        let kept: Vec<AlertRecord> = self
            .records()?
            .into_iter()
            .filter(|r| r.date == day)
            .collect();
        Self::write_all(&self.path, &kept)
    }

    pub fn prune(&self) -> Result<()> {
        self.prune_to(Local::now().date_naive())
    }

    fn write_all(path: &Path, records: &[AlertRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to write alert ledger {}", path.display()))?;
        writer
            .write_record(LEDGER_HEADER)
            .context("Failed to write ledger header")?;
        for record in records {
            writer.serialize(record).context("Failed to write ledger row")?;
        }
        writer.flush().context("Failed to flush alert ledger")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
