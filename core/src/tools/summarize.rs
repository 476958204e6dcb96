//! Condenses a message into a short human-readable summary.
//!
//! Three shapes are recognised, first match wins: a rendered stock snapshot
//! mapping, free text mentioning stock labels, and anything else.

use crate::tools::legacy::parse_mapping;
use crate::tools::stock::{COMPANY_NAME, StockSnapshot, TICKER_SYMBOL};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

const SHORT_TEXT_CHARS: usize = 300;
const KEYWORD_BUDGET: usize = 250;
const PLAIN_BUDGET: usize = 200;
const MAX_PLAIN_SELECTED: usize = 2;
const FALLBACK_CHARS: usize = 250;
const ERROR_PREVIEW_CHARS: usize = 150;

const KEY_TERMS: &[&str] = &[
    "stock", "price", "market", "company", "analysis", "growth", "profit", "revenue",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("valid regex"));
static TICKER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:Ticker Symbol)[':]*\s*([^,\n]+)").expect("valid regex")
});
static COMPANY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:Company Name)[':]*\s*([^,\n]+)").expect("valid regex")
});
static PRICE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:Current Stock Price)[':]*\s*([^\n,]+)").expect("valid regex")
});

pub fn summarize(message: &str) -> String {
    match try_summarize(message) {
        Ok(summary) => summary,
        Err(e) => failure_text(&e, message),
    }
}

fn try_summarize(message: &str) -> Result<String> {
    let cleaned = message.trim();

    if cleaned.starts_with('{')
        && cleaned.ends_with('}')
        && let Ok(map) = parse_mapping(cleaned)
        && let Some(snapshot) = StockSnapshot::from_legacy(&map)
    {
        return render_stock_card(&snapshot);
    }

    if cleaned.contains(TICKER_SYMBOL) || cleaned.contains(COMPANY_NAME) {
        return Ok(summarize_stock_text(cleaned));
    }

    Ok(summarize_general_text(cleaned))
}

fn failure_text(err: &anyhow::Error, message: &str) -> String {
    let preview: String = message.chars().take(ERROR_PREVIEW_CHARS).collect();
    format!(
        "Unable to summarize due to error: {}. Original message preview: {}...",
        err, preview
    )
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

fn plain(value: Option<f64>) -> String {
    or_na(value.map(|v| v.to_string()))
}

fn dollars(value: Option<f64>) -> String {
    or_na(value.map(|v| format!("${}", v)))
}

fn percent(value: Option<f64>) -> String {
    or_na(value.map(|v| format!("{}%", v)))
}

pub fn format_market_cap(value: Option<f64>) -> String {
    match value {
        Some(cap) if cap.is_finite() && cap != 0.0 => {
            if cap >= 1e12 {
                format!("${:.1}T", cap / 1e12)
            } else if cap >= 1e9 {
                format!("${:.1}B", cap / 1e9)
            } else if cap >= 1e6 {
                format!("${:.1}M", cap / 1e6)
            } else {
                format!("${}", group_thousands(cap.round() as i64))
            }
        }
        _ => "N/A".to_string(),
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn render_stock_card(snapshot: &StockSnapshot) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "📊 **Stock Analysis Summary: {}**", snapshot.ticker)?;
    writeln!(out)?;
    writeln!(
        out,
        "🏢 **Company:** {}",
        or_na(snapshot.company_name.clone())
    )?;
    writeln!(out, "💰 **Current Price:** {}", dollars(snapshot.current_price))?;
    writeln!(
        out,
        "🏛️ **Market Cap:** {}",
        format_market_cap(snapshot.market_cap)
    )?;
    writeln!(out)?;
    writeln!(out, "📈 **Valuation Metrics:**")?;
    writeln!(out, "• P/E Ratio: {}", plain(snapshot.pe_ratio))?;
    writeln!(out, "• Profit Margin: {}", percent(snapshot.profit_margins))?;
    writeln!(out)?;
    writeln!(out, "📊 **Price Range (52-week):**")?;
    writeln!(out, "• High: {}", dollars(snapshot.week_52_high))?;
    writeln!(out, "• Low: {}", dollars(snapshot.week_52_low))?;
    writeln!(out)?;
    writeln!(out, "💼 **Financial Health:**")?;
    writeln!(out, "• Debt-to-Equity: {}", plain(snapshot.debt_to_equity))?;
    writeln!(out, "• Revenue Growth: {}", percent(snapshot.revenue_growth))?;
    writeln!(out, "• Beta (Volatility): {}", plain(snapshot.beta))?;
    writeln!(out)?;
    write!(
        out,
        "🎯 **Analyst Target:** {}",
        dollars(snapshot.analyst_target_price)
    )?;
    Ok(out)
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn summarize_stock_text(text: &str) -> String {
    let ticker = capture(&TICKER_LABEL, text).unwrap_or_else(|| "Unknown".to_string());
    let company = capture(&COMPANY_LABEL, text).unwrap_or_else(|| "Unknown Company".to_string());
    let price = capture(&PRICE_LABEL, text).unwrap_or_else(|| "N/A".to_string());

    format!(
        "Stock Summary: {} ({}) - Current Price: ${}",
        ticker, company, price
    )
}

fn has_key_term(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    KEY_TERMS.iter().any(|term| lower.contains(term))
}

fn summarize_general_text(text: &str) -> String {
    let cleaned = WHITESPACE.replace_all(text.trim(), " ");

    if cleaned.chars().count() <= SHORT_TEXT_CHARS {
        return format!("Summary: {}", cleaned);
    }

    let mut selected: Vec<&str> = Vec::new();
    let mut total = 0;

    for sentence in SENTENCE_END.split(&cleaned) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let len = sentence.chars().count();
        let key = has_key_term(sentence);

        if key && total + len <= KEYWORD_BUDGET {
            selected.push(sentence);
            total += len;
        } else if !key && total + len <= PLAIN_BUDGET && selected.len() < MAX_PLAIN_SELECTED {
            selected.push(sentence);
            total += len;
        }
    }

    if selected.is_empty() {
        let head: String = cleaned.chars().take(FALLBACK_CHARS).collect();
        format!("Summary: {}...", head)
    } else {
        format!("Summary: {}.", selected.join(". "))
    }
}
