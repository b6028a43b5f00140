//! Telegram Markdown rendering for alerts and indicator summaries.

use chrono::NaiveDateTime;

use crate::types::{AlertCandidate, IndexSnapshot, MarketIndicators, ScanCriteria};

/// 1234567 -> "1,234,567"
fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn direction_emoji(change: f64) -> &'static str {
    if change >= 0.0 {
        "🟢"
    } else {
        "🔴"
    }
}

fn signed(value: f64) -> String {
    if value >= 0.0 {
        format!("+{value:.2}")
    } else {
        format!("{value:.2}")
    }
}

/// Compact indicator block appended to each alert. Empty string when no
/// indicator data was available, so the alert renders without the section.
pub fn format_indicators_block(indicators: &Option<MarketIndicators>) -> String {
    let indicators = match indicators {
        Some(i) => i,
        None => return String::new(),
    };

    let mut block = String::from("\n\n📊 *Market Indicators:*\n");
    if let Some(spx) = &indicators.spx {
        block.push_str(&index_line("SPX", spx));
    }
    if let Some(ndx) = &indicators.ndx {
        block.push_str(&index_line("NDX", ndx));
    }
    block
}

fn index_line(label: &str, snapshot: &IndexSnapshot) -> String {
    format!(
        "{} *{}:* `{:.2}` ({} / {}%)\n",
        direction_emoji(snapshot.change),
        label,
        snapshot.price,
        signed(snapshot.change),
        signed(snapshot.change_pct),
    )
}

/// Standalone indicator overview, rendered on demand.
pub fn format_indicators_overview(
    indicators: &MarketIndicators,
    as_of: NaiveDateTime,
) -> String {
    let mut message = String::from("📊 *Current Market Indicators*\n");
    if let Some(spx) = &indicators.spx {
        message.push_str(&overview_section("S&P 500 (SPX)", spx));
    }
    if let Some(ndx) = &indicators.ndx {
        message.push_str(&overview_section("NASDAQ 100 (NDX)", ndx));
    }
    message.push_str(&format!(
        "\n🕐 Last updated: {}",
        as_of.format("%Y-%m-%d %H:%M:%S")
    ));
    message
}

fn overview_section(label: &str, snapshot: &IndexSnapshot) -> String {
    format!(
        "\n{} *{}*\n• Price: `{:.2}`\n• Change: `{}` (`{}%`)\n",
        direction_emoji(snapshot.change),
        label,
        snapshot.price,
        signed(snapshot.change),
        signed(snapshot.change_pct),
    )
}

/// Full alert message for one qualifying contract.
pub fn format_alert(
    candidate: &AlertCandidate,
    indicators_block: &str,
    criteria: &ScanCriteria,
    detected_at: NaiveDateTime,
) -> String {
    format!(
        "🚨 *Unusual Activity Alert*\n\n\
         📊 *Contract Details:*\n\
         • *Symbol:* `{symbol}`\n\
         • *Type:* `{contract_type}`\n\
         • *Strike:* `{strike:.2}`\n\
         • *Current Price:* `{price:.2}`\n\
         • *Distance:* `{distance:.2}%`\n\n\
         📈 *Activity Indicators:*\n\
         • *Volume:* `{volume}`\n\
         • *Open Interest:* `{open_interest}`\n\
         • *Volume/OI Ratio:* `{ratio:.2}`\n\n\
         📅 *Additional Info:*\n\
         • *Expiration:* `{expiration}`\n\
         • *Detected:* `{detected}`\
         {indicators}\n\n\
         ⚙️ *Scan Criteria:*\n\
         • Min Volume/OI Ratio: `{min_ratio}`\n\
         • Min Volume: `{min_volume}`\n\
         • Max Distance: `{max_distance:.2}%`",
        symbol = candidate.symbol,
        contract_type = candidate.contract_type,
        strike = candidate.strike,
        price = candidate.underlying_price,
        distance = candidate.strike_distance * 100.0,
        volume = thousands(candidate.volume),
        open_interest = thousands(candidate.open_interest),
        ratio = candidate.ratio,
        expiration = candidate.expiration.format("%Y-%m-%d"),
        detected = detected_at.format("%Y-%m-%d %H:%M:%S"),
        indicators = indicators_block,
        min_ratio = criteria.min_volume_oi_ratio,
        min_volume = thousands(criteria.min_volume),
        max_distance = criteria.max_strike_distance * 100.0,
    )
}
