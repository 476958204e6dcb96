use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Company metadata and quote fields as reported by the data provider.
///
/// Ratios such as margins and growth rates are fractions (`0.25` for 25%).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyProfile {
    pub long_name: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub free_cashflow: Option<f64>,
    pub profit_margins: Option<f64>,
    pub operating_margins: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub target_median_price: Option<f64>,
    pub beta: Option<f64>,
    pub return_on_equity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: Option<f64>,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the provider knows nothing about the ticker.
    async fn profile(&self, ticker: &str) -> anyhow::Result<Option<CompanyProfile>>;

    /// Daily bars covering the last `years` years, oldest first.
    async fn daily_history(&self, ticker: &str, years: u32) -> anyhow::Result<Vec<PriceBar>>;

    /// Annual total revenue, most recent fiscal year first.
    async fn annual_revenue(&self, ticker: &str) -> anyhow::Result<Vec<f64>>;
}
