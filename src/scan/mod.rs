//! Scan orchestration.
//!
//! One scan pass walks the configured universe, pulls quotes and option
//! chains through the cached gateway, filters rows against the session's
//! criteria, and pushes an alert per qualifying contract. Per-instrument
//! failures are logged and skipped; a pass always runs to completion.

pub mod message;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate, Weekday};
use futures::future::join_all;
use tracing::{info, warn};

use crate::ledger::AlertLedger;
use crate::market::gateway::MarketGateway;
use crate::notify::Notifier;
use crate::types::{
    AlertCandidate, Cadence, ContractType, OptionRow, ScanCriteria, ScanSummary, UserSession,
};

use message::{format_alert, format_indicators_block, format_indicators_overview};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Caps and pacing for one scan pass.
#[derive(Debug, Clone)]
pub struct ScanLimits {
    /// Expirations examined per underlying.
    pub max_expirations: usize,
    /// Delivered alerts per underlying per pass.
    pub max_alerts_per_symbol: usize,
    /// Pause after each delivered alert.
    pub inter_alert_delay: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits {
            max_expirations: 2,
            max_alerts_per_symbol: 5,
            inter_alert_delay: Duration::from_millis(500),
        }
    }
}

// ---------------------------------------------------------------------------
// Pure filters
// ---------------------------------------------------------------------------

/// Expirations to examine: the nearest `max` dates for daily cadence, the
/// nearest `max` Friday expiries for weekly. Input order is preserved
/// (providers return expirations nearest first).
pub fn select_expirations(
    expirations: &[NaiveDate],
    cadence: Cadence,
    max: usize,
) -> Vec<NaiveDate> {
    match cadence {
        Cadence::Daily => expirations.iter().copied().take(max).collect(),
        Cadence::Weekly => expirations
            .iter()
            .copied()
            .filter(|d| d.weekday() == Weekday::Fri)
            .take(max)
            .collect(),
    }
}

/// Test one chain row against the criteria. `None` for rows that are
/// malformed or fail any threshold.
pub fn candidate_from_row(
    symbol: &str,
    contract_type: ContractType,
    expiration: NaiveDate,
    underlying_price: f64,
    row: &OptionRow,
    criteria: &ScanCriteria,
) -> Option<AlertCandidate> {
    if !row.is_well_formed() {
        return None;
    }
    let volume = row.volume?;
    let open_interest = row.open_interest?;
    if volume <= criteria.min_volume || open_interest == 0 {
        return None;
    }

    let ratio = row.volume_oi_ratio()?;
    let strike_distance = row.strike_distance(underlying_price)?;
    if ratio <= criteria.min_volume_oi_ratio || strike_distance >= criteria.max_strike_distance {
        return None;
    }

    Some(AlertCandidate {
        symbol: symbol.to_string(),
        contract_type,
        expiration,
        strike: row.strike,
        underlying_price,
        volume,
        open_interest,
        ratio,
        strike_distance,
    })
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner {
    gateway: Arc<MarketGateway>,
    ledger: Arc<AlertLedger>,
    notifier: Arc<Notifier>,
    limits: ScanLimits,
}

impl Scanner {
    pub fn new(
        gateway: Arc<MarketGateway>,
        ledger: Arc<AlertLedger>,
        notifier: Arc<Notifier>,
        limits: ScanLimits,
    ) -> Self {
        Scanner {
            gateway,
            ledger,
            notifier,
            limits,
        }
    }

    /// Run one scan pass over `symbols` with the session's contract side,
    /// cadence, and criteria.
    pub async fn run_scan(&self, symbols: &[String], session: &UserSession) -> Result<ScanSummary> {
        info!(
            symbols = symbols.len(),
            contract_type = %session.contract_type,
            "Starting unusual-activity scan"
        );

        if let Err(e) = self.ledger.prune() {
            warn!(error = %e, "Ledger prune failed, continuing with existing rows");
        }

        let indicators = self.gateway.fetch_market_indicators().await;
        let indicators_block = format_indicators_block(&indicators);

        let quotes = join_all(symbols.iter().map(|s| self.gateway.fetch_quote(s))).await;

        let mut summary = ScanSummary::default();
        for (symbol, quote) in symbols.iter().zip(quotes) {
            let quote = match quote {
                Some(q) if !q.expirations.is_empty() => q,
                _ => {
                    warn!(symbol, "Skipping, insufficient market data");
                    summary.symbols_skipped += 1;
                    continue;
                }
            };
            summary.symbols_scanned += 1;

            let expirations = select_expirations(
                &quote.expirations,
                session.cadence,
                self.limits.max_expirations,
            );

            let chains = join_all(expirations.iter().map(|&exp| {
                self.gateway
                    .fetch_chain(symbol, exp, session.contract_type)
            }))
            .await;

            let mut alerts_for_symbol = 0usize;
            'expirations: for (expiration, rows) in expirations.iter().zip(chains) {
                let rows = match rows {
                    Some(rows) => rows,
                    None => continue,
                };

                for row in &rows {
                    if alerts_for_symbol >= self.limits.max_alerts_per_symbol {
                        break 'expirations;
                    }

                    let candidate = match candidate_from_row(
                        symbol,
                        session.contract_type,
                        *expiration,
                        quote.price,
                        row,
                        &session.criteria,
                    ) {
                        Some(c) => c,
                        None => continue,
                    };

                    let already_sent = self
                        .ledger
                        .already_sent(symbol, candidate.strike, session.contract_type)
                        .unwrap_or_else(|e| {
                            warn!(symbol, error = %e, "Ledger read failed, treating as unsent");
                            false
                        });
                    if already_sent {
                        summary.duplicates_skipped += 1;
                        continue;
                    }

                    let text = format_alert(
                        &candidate,
                        &indicators_block,
                        &session.criteria,
                        Local::now().naive_local(),
                    );
                    if !self.notifier.send(&text).await {
                        continue;
                    }

                    // Counts and dedup advance only for recorded alerts,
                    // so a ledger write failure lets the next pass retry.
                    match self
                        .ledger
                        .record(symbol, candidate.strike, session.contract_type)
                    {
                        Ok(()) => {
                            info!(%candidate, "Alert delivered");
                            alerts_for_symbol += 1;
                            summary.alerts_sent += 1;
                            tokio::time::sleep(self.limits.inter_alert_delay).await;
                        }
                        Err(e) => {
                            warn!(symbol, error = %e, "Failed to record delivered alert");
                        }
                    }
                }
            }
        }

        info!(
            scanned = summary.symbols_scanned,
            skipped = summary.symbols_skipped,
            sent = summary.alerts_sent,
            duplicates = summary.duplicates_skipped,
            "Scan pass complete"
        );
        Ok(summary)
    }

    /// Current SPX/NDX overview, rendered for delivery. `None` when no
    /// indicator data is available.
    pub async fn indicators_report(&self) -> Option<String> {
        let indicators = self.gateway.fetch_market_indicators().await?;
        Some(format_indicators_overview(
            &indicators,
            Local::now().naive_local(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
