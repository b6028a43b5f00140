//! SENTINEL — Unusual Options Activity Scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market gateway, dedup ledger, and Telegram channel, and
//! runs the periodic scan loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use secrecy::SecretString;
use tracing::{error, info};

use sentinel::config;
use sentinel::ledger::AlertLedger;
use sentinel::market::gateway::MarketGateway;
use sentinel::market::yahoo::YahooFinanceClient;
use sentinel::notify::telegram::TelegramChannel;
use sentinel::notify::Notifier;
use sentinel::scan::Scanner;
use sentinel::types::UserSession;

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Unusual Options Activity Scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        symbols = cfg.scanner.symbols.len(),
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        contract_type = %cfg.scanner.contract_type,
        cadence = %cfg.scanner.cadence,
        "SENTINEL starting up"
    );

    // -- Initialise components -------------------------------------------

    let source = YahooFinanceClient::new()?;
    let gateway = Arc::new(MarketGateway::new(
        Arc::new(source),
        cfg.scanner.cache_duration(),
    ));

    let ledger = Arc::new(AlertLedger::open(&cfg.ledger.path)?);

    let bot_token = SecretString::new(config::AppConfig::resolve_env(&cfg.telegram.bot_token_env)?);
    let chat_id = config::AppConfig::resolve_env(&cfg.telegram.chat_id_env)?;
    let channel = TelegramChannel::new(bot_token, chat_id)
        .map_err(|e| anyhow::anyhow!("Failed to build Telegram channel: {e}"))?;
    let notifier = Arc::new(Notifier::new(
        Arc::new(channel),
        Duration::from_secs(cfg.telegram.min_send_interval_secs),
        Duration::from_secs(cfg.telegram.throttle_retry_secs),
    ));

    let scanner = Scanner::new(gateway, ledger, notifier, cfg.scanner.limits());
    let session = UserSession::new(
        cfg.scanner.contract_type()?,
        cfg.scanner.cadence()?,
        cfg.criteria.to_criteria(),
    );

    // -- Main loop -------------------------------------------------------

    let scan_interval = Duration::from_secs(cfg.scanner.scan_interval_secs);
    let mut interval = tokio::time::interval(scan_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering scan loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match scanner.run_scan(&cfg.scanner.symbols, &session).await {
                    Ok(summary) => {
                        info!(%summary, alerts = summary.any_sent(), "Scan complete");
                    }
                    Err(e) => {
                        error!(error = %e, "Scan failed — continuing to next");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("SENTINEL shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
