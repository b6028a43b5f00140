//! End-to-end scan tests over stubbed market data and a recording
//! notification channel. No network, no real Telegram.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use sentinel::ledger::AlertLedger;
use sentinel::market::gateway::MarketGateway;
use sentinel::market::{MarketDataSource, OptionChain};
use sentinel::notify::{ChannelError, DeliveryStatus, NotificationChannel, Notifier};
use sentinel::scan::{ScanLimits, Scanner};
use sentinel::types::{Cadence, ContractType, OptionRow, ScanCriteria, UserSession};

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Market data source backed by fixed maps. Chain requests are recorded
/// so tests can assert which expirations were fetched.
#[derive(Default)]
struct StubMarket {
    prices: HashMap<String, f64>,
    expirations: HashMap<String, Vec<NaiveDate>>,
    chains: HashMap<(String, NaiveDate), OptionChain>,
    closes: HashMap<String, Vec<f64>>,
    chain_requests: Mutex<Vec<(String, NaiveDate)>>,
}

impl StubMarket {
    fn with_symbol(
        mut self,
        symbol: &str,
        price: f64,
        expirations: Vec<NaiveDate>,
    ) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self.expirations.insert(symbol.to_string(), expirations);
        self
    }

    fn with_calls(mut self, symbol: &str, expiration: NaiveDate, calls: Vec<OptionRow>) -> Self {
        self.chains.insert(
            (symbol.to_string(), expiration),
            OptionChain {
                calls,
                puts: Vec::new(),
            },
        );
        self
    }

    fn with_closes(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.insert(symbol.to_string(), closes);
        self
    }

    fn requested_expirations(&self, symbol: &str) -> Vec<NaiveDate> {
        self.chain_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, d)| *d)
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for StubMarket {
    async fn current_price(&self, symbol: &str) -> Result<Option<f64>> {
        Ok(self.prices.get(symbol).copied())
    }

    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        Ok(self.expirations.get(symbol).cloned().unwrap_or_default())
    }

    async fn option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        self.chain_requests
            .lock()
            .unwrap()
            .push((symbol.to_string(), expiration));
        Ok(self
            .chains
            .get(&(symbol.to_string(), expiration))
            .cloned()
            .unwrap_or_default())
    }

    async fn daily_closes(&self, symbol: &str, _lookback_days: u32) -> Result<Vec<f64>> {
        // Empty unless scripted: scans then run without an indicators block.
        Ok(self.closes.get(symbol).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Channel that records every message and can fail the first N posts.
struct RecordingChannel {
    sent: Mutex<Vec<String>>,
    failures_remaining: AtomicUsize,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            failures_remaining: AtomicUsize::new(failures),
        })
    }

    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn post(&self, text: &str) -> Result<DeliveryStatus, ChannelError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(DeliveryStatus::Rejected { status: 502 });
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(DeliveryStatus::Delivered)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn row(strike: f64, volume: u64, open_interest: u64) -> OptionRow {
    OptionRow {
        strike,
        volume: Some(volume),
        open_interest: Some(open_interest),
    }
}

struct Harness {
    scanner: Scanner,
    market: Arc<StubMarket>,
    channel: Arc<RecordingChannel>,
    ledger: Arc<AlertLedger>,
    _dir: TempDir,
}

fn harness(market: StubMarket, channel: Arc<RecordingChannel>) -> Harness {
    let dir = TempDir::new().unwrap();
    let market = Arc::new(market);
    let ledger = Arc::new(AlertLedger::open(dir.path().join("sent_alerts.csv")).unwrap());
    let gateway = Arc::new(MarketGateway::new(
        market.clone(),
        Duration::from_secs(300),
    ));
    let notifier = Arc::new(Notifier::new(
        channel.clone(),
        Duration::ZERO,
        Duration::ZERO,
    ));
    let limits = ScanLimits {
        inter_alert_delay: Duration::ZERO,
        ..ScanLimits::default()
    };
    Harness {
        scanner: Scanner::new(gateway, ledger.clone(), notifier, limits),
        market,
        channel,
        ledger,
        _dir: dir,
    }
}

fn call_session() -> UserSession {
    UserSession::new(
        ContractType::Call,
        Cadence::Daily,
        ScanCriteria::default(),
    )
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn qualifying_contract_sends_one_alert_and_dedups_rerun() {
    let exp = d(2026, 9, 18);
    let market = StubMarket::default()
        .with_symbol("XYZ", 100.0, vec![exp])
        .with_calls(
            "XYZ",
            exp,
            vec![
                row(103.0, 12_000, 4_000), // qualifies: ratio 3.0, distance 3%
                row(120.0, 12_000, 4_000), // too far from the money
                row(101.0, 2_000, 500),    // volume under the floor
            ],
        );
    let h = harness(market, RecordingChannel::new());
    let universe = symbols(&["XYZ"]);

    let summary = h.scanner.run_scan(&universe, &call_session()).await.unwrap();
    assert_eq!(summary.symbols_scanned, 1);
    assert_eq!(summary.alerts_sent, 1);
    assert!(summary.any_sent());

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("`XYZ`"));
    assert!(messages[0].contains("`CALL`"));
    assert!(messages[0].contains("`103.00`"));
    assert!(messages[0].contains("`12,000`"));
    assert!(messages[0].contains("`2026-09-18`"));
    // No index data was available, so no indicators section.
    assert!(!messages[0].contains("Market Indicators"));

    let records = h.ledger.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].symbol, "XYZ");
    assert_eq!(records[0].strike, "103");

    // Same pass again: the contract is in the ledger, nothing new goes out.
    let rerun = h.scanner.run_scan(&universe, &call_session()).await.unwrap();
    assert_eq!(rerun.alerts_sent, 0);
    assert_eq!(rerun.duplicates_skipped, 1);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn per_symbol_alert_cap_is_enforced() {
    let exp = d(2026, 9, 18);
    // Ten qualifying strikes near the money.
    let calls: Vec<OptionRow> = (0..10).map(|i| row(96.0 + i as f64, 15_000, 5_000)).collect();
    let market = StubMarket::default()
        .with_symbol("NVDA", 100.0, vec![exp])
        .with_calls("NVDA", exp, calls);
    let h = harness(market, RecordingChannel::new());

    let summary = h
        .scanner
        .run_scan(&symbols(&["NVDA"]), &call_session())
        .await
        .unwrap();
    assert_eq!(summary.alerts_sent, 5);
    assert_eq!(h.channel.messages().len(), 5);
    assert_eq!(h.ledger.records().unwrap().len(), 5);
}

#[tokio::test]
async fn symbol_without_quote_is_skipped_others_still_scan() {
    let exp = d(2026, 9, 18);
    let market = StubMarket::default()
        // "DAX" has no price and no expirations.
        .with_symbol("SPY", 100.0, vec![exp])
        .with_calls("SPY", exp, vec![row(104.0, 30_000, 9_000)]);
    let h = harness(market, RecordingChannel::new());

    let summary = h
        .scanner
        .run_scan(&symbols(&["DAX", "SPY"]), &call_session())
        .await
        .unwrap();
    assert_eq!(summary.symbols_skipped, 1);
    assert_eq!(summary.symbols_scanned, 1);
    assert_eq!(summary.alerts_sent, 1);
}

#[tokio::test]
async fn failed_delivery_is_not_recorded_and_retries_next_pass() {
    let exp = d(2026, 9, 18);
    let market = StubMarket::default()
        .with_symbol("XYZ", 100.0, vec![exp])
        .with_calls("XYZ", exp, vec![row(103.0, 12_000, 4_000)]);
    // First post is rejected, everything after succeeds.
    let h = harness(market, RecordingChannel::failing_first(1));
    let universe = symbols(&["XYZ"]);

    let first = h.scanner.run_scan(&universe, &call_session()).await.unwrap();
    assert_eq!(first.alerts_sent, 0);
    assert!(h.ledger.records().unwrap().is_empty());

    // The contract never made it to the ledger, so the next pass sends it.
    let second = h.scanner.run_scan(&universe, &call_session()).await.unwrap();
    assert_eq!(second.alerts_sent, 1);
    assert_eq!(second.duplicates_skipped, 0);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn no_qualifying_rows_sends_nothing() {
    let exp = d(2026, 9, 18);
    let market = StubMarket::default()
        .with_symbol("GLD", 100.0, vec![exp])
        .with_calls(
            "GLD",
            exp,
            vec![
                row(103.0, 10_500, 10_000), // ratio 1.05, under the floor
                row(103.0, 9_000, 1_000),   // volume under the floor
                OptionRow {
                    strike: 103.0,
                    volume: None,
                    open_interest: Some(4_000),
                },
            ],
        );
    let h = harness(market, RecordingChannel::new());

    let summary = h
        .scanner
        .run_scan(&symbols(&["GLD"]), &call_session())
        .await
        .unwrap();
    assert_eq!(summary.symbols_scanned, 1);
    assert_eq!(summary.alerts_sent, 0);
    assert!(h.channel.messages().is_empty());
}

#[tokio::test]
async fn alert_includes_indicators_when_index_data_present() {
    let exp = d(2026, 9, 18);
    let market = StubMarket::default()
        .with_symbol("XYZ", 100.0, vec![exp])
        .with_calls("XYZ", exp, vec![row(103.0, 12_000, 4_000)])
        .with_closes("^GSPC", vec![5_000.0, 5_100.0])
        .with_closes("^NDX", vec![18_000.0, 17_820.0]);
    let h = harness(market, RecordingChannel::new());

    h.scanner
        .run_scan(&symbols(&["XYZ"]), &call_session())
        .await
        .unwrap();

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Market Indicators"));
    assert!(messages[0].contains("🟢 *SPX:* `5100.00` (+100.00 / +2.00%)"));
    assert!(messages[0].contains("🔴 *NDX:* `17820.00` (-180.00 / -1.00%)"));
}

#[tokio::test]
async fn indicators_report_renders_overview() {
    let market = StubMarket::default()
        .with_closes("^GSPC", vec![5_000.0, 5_100.0])
        .with_closes("^NDX", vec![18_000.0, 17_820.0]);
    let h = harness(market, RecordingChannel::new());

    let report = h.scanner.indicators_report().await.unwrap();
    assert!(report.contains("S&P 500 (SPX)"));
    assert!(report.contains("`+100.00`"));
    assert!(report.contains("NASDAQ 100 (NDX)"));
    assert!(report.contains("Last updated:"));
}

#[tokio::test]
async fn indicators_report_is_none_without_index_data() {
    let market = StubMarket::default();
    let h = harness(market, RecordingChannel::new());
    assert!(h.scanner.indicators_report().await.is_none());
}

#[tokio::test]
async fn weekly_cadence_fetches_only_friday_expirations() {
    // Sep 2 2026 is a Wednesday; Sep 4, 11, 18 are Fridays.
    let wednesday = d(2026, 9, 2);
    let fridays = [d(2026, 9, 4), d(2026, 9, 11), d(2026, 9, 18)];
    let market = StubMarket::default().with_symbol(
        "SPY",
        100.0,
        vec![wednesday, fridays[0], fridays[1], fridays[2]],
    );
    let h = harness(market, RecordingChannel::new());

    let session = UserSession::new(
        ContractType::Call,
        Cadence::Weekly,
        ScanCriteria::default(),
    );
    h.scanner
        .run_scan(&symbols(&["SPY"]), &session)
        .await
        .unwrap();

    // First two Fridays only; the Wednesday expiry is never requested.
    assert_eq!(
        h.market.requested_expirations("SPY"),
        vec![fridays[0], fridays[1]]
    );
}
