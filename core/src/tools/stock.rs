use crate::tools::legacy::{LegacyMap, LegacyValue};
use crate::traits::{MarketData, PriceBar};
use thiserror::Error;
use tracing::{debug, warn};

pub const HISTORY_YEARS: u32 = 5;
pub const TRADING_DAYS_PER_YEAR: usize = 252;
pub const REVENUE_YEARS: usize = 5;

pub const TICKER_SYMBOL: &str = "Ticker Symbol";
pub const COMPANY_NAME: &str = "Company Name";
pub const CURRENT_PRICE: &str = "Current Stock Price";
pub const WEEK_52_HIGH: &str = "52-Week High";
pub const WEEK_52_LOW: &str = "52-Week Low";
pub const MARKET_CAP: &str = "Market Capitalization";
pub const PE_RATIO: &str = "PE Ratio";
pub const PB_RATIO: &str = "P/B Ratio";
pub const DEBT_TO_EQUITY: &str = "Debt to Equity Ratio";
pub const CURRENT_RATIO: &str = "Current Ratio";
pub const DIVIDEND_YIELD: &str = "Dividend Yield";
pub const REVENUE_GROWTH_5Y: &str = "5-Year Revenue Growth Rate(%)";
pub const FREE_CASH_FLOW: &str = "Free Cash Flow";
pub const PROFIT_MARGINS: &str = "Profit Margins";
pub const OPERATING_MARGIN: &str = "Operating Margin";
pub const EARNINGS_GROWTH: &str = "Earnings Growth";
pub const REVENUE_GROWTH: &str = "Revenue Growth";
pub const ANALYST_TARGET: &str = "Analyst target Price";
pub const BETA: &str = "Beta";
pub const RETURN_ON_EQUITY: &str = "5-year Average Return on Equity(ROE)(%)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(
        "Error: Unable to fetch data for ticker '{0}'. Please check if the ticker symbol is correct."
    )]
    UnknownTicker(String),
    #[error(
        "Error: No historical data available for ticker '{0}'. The stock may be delisted or the ticker may be incorrect."
    )]
    NoHistory(String),
    #[error("Error: Failed to fetch data for ticker '{ticker}'. Details: {details}")]
    Provider { ticker: String, details: String },
}

impl FetchError {
    fn provider(ticker: &str, err: anyhow::Error) -> Self {
        Self::Provider {
            ticker: ticker.to_string(),
            details: format!("{:#}", err),
        }
    }
}

/// Point-in-time financial summary of one ticker. `None` marks a value the
/// data source could not provide. Percentage fields hold percents (25.31),
/// not fractions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockSnapshot {
    pub ticker: String,
    pub company_name: Option<String>,
    pub current_price: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub revenue_growth_5y: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub profit_margins: Option<f64>,
    pub operating_margin: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub analyst_target_price: Option<f64>,
    pub beta: Option<f64>,
    pub return_on_equity: Option<f64>,
}

impl StockSnapshot {
    /// Numeric fields in rendering order, after ticker and company name.
    pub fn numeric_fields(&self) -> [(&'static str, Option<f64>); 18] {
        [
            (CURRENT_PRICE, self.current_price),
            (WEEK_52_HIGH, self.week_52_high),
            (WEEK_52_LOW, self.week_52_low),
            (MARKET_CAP, self.market_cap),
            (PE_RATIO, self.pe_ratio),
            (PB_RATIO, self.pb_ratio),
            (DEBT_TO_EQUITY, self.debt_to_equity),
            (CURRENT_RATIO, self.current_ratio),
            (DIVIDEND_YIELD, self.dividend_yield),
            (REVENUE_GROWTH_5Y, self.revenue_growth_5y),
            (FREE_CASH_FLOW, self.free_cash_flow),
            (PROFIT_MARGINS, self.profit_margins),
            (OPERATING_MARGIN, self.operating_margin),
            (EARNINGS_GROWTH, self.earnings_growth),
            (REVENUE_GROWTH, self.revenue_growth),
            (ANALYST_TARGET, self.analyst_target_price),
            (BETA, self.beta),
            (RETURN_ON_EQUITY, self.return_on_equity),
        ]
    }

    /// Renders the full field set as a quasi-literal mapping, absent values
    /// as `'N/A'`.
    pub fn to_legacy_string(&self) -> String {
        let mut out = String::from("{");
        out.push_str(&format!(
            "{}: {}, {}: {}",
            quote_literal(TICKER_SYMBOL),
            quote_literal(&self.ticker),
            quote_literal(COMPANY_NAME),
            self.company_name
                .as_deref()
                .map_or_else(|| "'N/A'".to_string(), quote_literal),
        ));
        for (label, value) in self.numeric_fields() {
            let rendered = match value {
                Some(v) if v.is_finite() => v.to_string(),
                _ => "'N/A'".to_string(),
            };
            out.push_str(&format!(", {}: {}", quote_literal(label), rendered));
        }
        out.push('}');
        out
    }

    /// Reads a parsed mapping back; `None` unless it has a ticker key.
    pub fn from_legacy(map: &LegacyMap) -> Option<Self> {
        let ticker = map.get(TICKER_SYMBOL)?;
        let number = |label: &str| map.get(label).and_then(legacy_number);

        Some(Self {
            ticker: match ticker {
                LegacyValue::Null => "N/A".to_string(),
                other => other.to_string(),
            },
            company_name: map
                .get(COMPANY_NAME)
                .filter(|v| !v.is_null())
                .map(LegacyValue::to_string),
            current_price: number(CURRENT_PRICE),
            week_52_high: number(WEEK_52_HIGH),
            week_52_low: number(WEEK_52_LOW),
            market_cap: number(MARKET_CAP),
            pe_ratio: number(PE_RATIO),
            pb_ratio: number(PB_RATIO),
            debt_to_equity: number(DEBT_TO_EQUITY),
            current_ratio: number(CURRENT_RATIO),
            dividend_yield: number(DIVIDEND_YIELD),
            revenue_growth_5y: number(REVENUE_GROWTH_5Y),
            free_cash_flow: number(FREE_CASH_FLOW),
            profit_margins: number(PROFIT_MARGINS),
            operating_margin: number(OPERATING_MARGIN),
            earnings_growth: number(EARNINGS_GROWTH),
            revenue_growth: number(REVENUE_GROWTH),
            analyst_target_price: number(ANALYST_TARGET),
            beta: number(BETA),
            return_on_equity: number(RETURN_ON_EQUITY),
        })
    }
}

fn legacy_number(value: &LegacyValue) -> Option<f64> {
    match value {
        LegacyValue::Str(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        other => other.as_f64(),
    }
}

fn quote_literal(s: &str) -> String {
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", s.replace('\\', "\\\\"))
    } else {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(fraction: Option<f64>) -> Option<f64> {
    fraction.filter(|v| v.is_finite()).map(|v| round2(v * 100.0))
}

/// Highest high and lowest low over the trailing year of bars.
pub fn week_52_range(history: &[PriceBar]) -> (Option<f64>, Option<f64>) {
    let start = history.len().saturating_sub(TRADING_DAYS_PER_YEAR);
    let window = &history[start..];

    let high = window.iter().map(|b| b.high).fold(f64::NAN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::NAN, f64::min);

    let finite = |v: f64| v.is_finite().then(|| round2(v));
    (finite(high), finite(low))
}

/// Approximate compound growth over the most recent annual revenues
/// (newest first): `(newest / oldest)^(1 / count) - 1`.
pub fn compound_growth(revenue: &[f64]) -> Option<f64> {
    let recent = &revenue[..revenue.len().min(REVENUE_YEARS)];
    if recent.len() < 2 {
        return None;
    }
    let newest = recent[0];
    let oldest = recent[recent.len() - 1];
    let growth = (newest / oldest).powf(1.0 / recent.len() as f64) - 1.0;
    growth.is_finite().then_some(growth)
}

pub async fn fetch_snapshot(
    source: &dyn MarketData,
    ticker: &str,
) -> Result<StockSnapshot, FetchError> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(FetchError::UnknownTicker(ticker.to_string()));
    }

    let profile = source
        .profile(ticker)
        .await
        .map_err(|e| FetchError::provider(ticker, e))?
        .filter(|p| p.long_name.is_some())
        .ok_or_else(|| FetchError::UnknownTicker(ticker.to_string()))?;

    let history = source
        .daily_history(ticker, HISTORY_YEARS)
        .await
        .map_err(|e| FetchError::provider(ticker, e))?;
    if history.is_empty() {
        return Err(FetchError::NoHistory(ticker.to_string()));
    }

    let revenue = source
        .annual_revenue(ticker)
        .await
        .map_err(|e| FetchError::provider(ticker, e))?;

    debug!(
        ticker,
        source = source.name(),
        bars = history.len(),
        revenue_years = revenue.len(),
        "Fetched market data"
    );

    let (week_52_high, week_52_low) = week_52_range(&history);

    Ok(StockSnapshot {
        ticker: ticker.to_string(),
        company_name: profile.long_name,
        current_price: profile.current_price,
        week_52_high,
        week_52_low,
        market_cap: profile.market_cap,
        pe_ratio: profile.trailing_pe,
        pb_ratio: profile.price_to_book,
        debt_to_equity: profile.debt_to_equity,
        current_ratio: profile.current_ratio,
        dividend_yield: percent(profile.dividend_yield),
        revenue_growth_5y: percent(compound_growth(&revenue)),
        free_cash_flow: profile.free_cashflow,
        profit_margins: percent(profile.profit_margins),
        operating_margin: percent(profile.operating_margins),
        earnings_growth: percent(profile.earnings_growth),
        revenue_growth: percent(profile.revenue_growth),
        analyst_target_price: profile.target_median_price,
        beta: profile.beta,
        return_on_equity: percent(profile.return_on_equity),
    })
}

/// Tool entry point: the rendered snapshot, or the failure text.
pub async fn analyze(source: &dyn MarketData, ticker: &str) -> String {
    match fetch_snapshot(source, ticker).await {
        Ok(snapshot) => snapshot.to_legacy_string(),
        Err(e) => {
            warn!(ticker, error = %e, "Stock snapshot unavailable");
            e.to_string()
        }
    }
}
