pub mod yahoo;

pub use yahoo::YahooFinance;

use crate::config::Config;
use crate::traits::MarketData;
use std::sync::Arc;

pub fn create_market_data(config: &Config) -> Arc<dyn MarketData> {
    match config.market_data_url.as_deref() {
        Some(url) => Arc::new(YahooFinance::with_base_url(url)),
        None => Arc::new(YahooFinance::new()),
    }
}
