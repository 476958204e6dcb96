use crate::traits::{CompanyProfile, MarketData, PriceBar};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

pub const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";
/// Hands out the session cookie the crumb is tied to.
pub const YAHOO_SESSION_URL: &str = "https://fc.yahoo.com";

const PROFILE_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics";
const REVENUE_MODULES: &str = "incomeStatementHistory";

/// Unofficial Yahoo Finance JSON endpoints.
///
/// `quoteSummary` needs a session cookie plus a matching crumb. Both are
/// obtained on first use and kept for the life of the client.
pub struct YahooFinance {
    client: reqwest::Client,
    base_url: String,
    session_url: String,
    crumb: OnceCell<String>,
}

impl YahooFinance {
    pub fn new() -> Self {
        let mut yahoo = Self::with_base_url(YAHOO_BASE_URL);
        yahoo.session_url = YAHOO_SESSION_URL.to_string();
        yahoo
    }

    /// Points every request, the session cookie one included, at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0")
            .cookie_store(true)
            .build()
            .unwrap_or_default();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            session_url: base_url.clone(),
            base_url,
            crumb: OnceCell::new(),
        }
    }

    /// Builds `{base}/<segments..>?<query>`, percent-encoding each segment so
    /// a ticker can never change the path or start a query.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Yahoo Finance base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Invalid Yahoo Finance base URL: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `Ok(None)` on 404, which Yahoo answers for unknown symbols.
    async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        debug!(url = %url, "Yahoo Finance request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Yahoo Finance request failed: {}", url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Yahoo Finance error ({}): {}", status, body);
        }

        let body = response
            .json::<Value>()
            .await
            .context("Failed to parse Yahoo Finance response")?;
        Ok(Some(body))
    }

    async fn crumb(&self) -> Result<&str> {
        self.crumb
            .get_or_try_init(|| self.fetch_crumb())
            .await
            .map(String::as_str)
    }

    async fn fetch_crumb(&self) -> Result<String> {
        // Only the Set-Cookie header matters here; the status is usually 404.
        if let Err(e) = self.client.get(&self.session_url).send().await {
            debug!(error = %e, "Yahoo Finance session request failed");
        }

        let url = self.endpoint(&["v1", "test", "getcrumb"], &[])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Yahoo Finance crumb request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Yahoo Finance crumb")?;
        let crumb = body.trim();

        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            anyhow::bail!("Yahoo Finance refused a crumb ({})", status);
        }
        debug!("Obtained Yahoo Finance crumb");
        Ok(crumb.to_string())
    }

    async fn quote_summary(&self, ticker: &str, modules: &str) -> Result<Option<Value>> {
        let crumb = self.crumb().await?;
        let url = self.endpoint(
            &["v10", "finance", "quoteSummary", ticker],
            &[("modules", modules), ("crumb", crumb)],
        )?;
        Ok(self.get_json(url).await?.and_then(|body| summary_result(&body)))
    }
}

impl Default for YahooFinance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for YahooFinance {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        Ok(self
            .quote_summary(ticker, PROFILE_MODULES)
            .await?
            .map(|result| parse_profile(&result)))
    }

    async fn daily_history(&self, ticker: &str, years: u32) -> Result<Vec<PriceBar>> {
        let range = format!("{}y", years);
        let url = self.endpoint(
            &["v8", "finance", "chart", ticker],
            &[("interval", "1d"), ("range", range.as_str())],
        )?;
        Ok(self
            .get_json(url)
            .await?
            .map(|body| parse_chart(&body))
            .unwrap_or_default())
    }

    async fn annual_revenue(&self, ticker: &str) -> Result<Vec<f64>> {
        Ok(self
            .quote_summary(ticker, REVENUE_MODULES)
            .await?
            .map(|result| parse_annual_revenue(&result))
            .unwrap_or_default())
    }
}

fn summary_result(body: &Value) -> Option<Value> {
    body.pointer("/quoteSummary/result/0")
        .filter(|v| v.is_object())
        .cloned()
}

/// Numeric fields arrive either bare or wrapped as `{"raw": .., "fmt": ..}`.
fn number_at(value: &Value, pointer: &str) -> Option<f64> {
    let field = value.pointer(pointer)?;
    field
        .get("raw")
        .and_then(Value::as_f64)
        .or_else(|| field.as_f64())
}

pub fn parse_profile(result: &Value) -> CompanyProfile {
    CompanyProfile {
        long_name: result
            .pointer("/price/longName")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        current_price: number_at(result, "/financialData/currentPrice")
            .or_else(|| number_at(result, "/price/regularMarketPrice")),
        market_cap: number_at(result, "/price/marketCap")
            .or_else(|| number_at(result, "/summaryDetail/marketCap")),
        trailing_pe: number_at(result, "/summaryDetail/trailingPE"),
        price_to_book: number_at(result, "/defaultKeyStatistics/priceToBook"),
        debt_to_equity: number_at(result, "/financialData/debtToEquity"),
        current_ratio: number_at(result, "/financialData/currentRatio"),
        dividend_yield: number_at(result, "/summaryDetail/dividendYield"),
        free_cashflow: number_at(result, "/financialData/freeCashflow"),
        profit_margins: number_at(result, "/financialData/profitMargins"),
        operating_margins: number_at(result, "/financialData/operatingMargins"),
        earnings_growth: number_at(result, "/financialData/earningsGrowth"),
        revenue_growth: number_at(result, "/financialData/revenueGrowth"),
        target_median_price: number_at(result, "/financialData/targetMedianPrice"),
        beta: number_at(result, "/summaryDetail/beta")
            .or_else(|| number_at(result, "/defaultKeyStatistics/beta")),
        return_on_equity: number_at(result, "/financialData/returnOnEquity"),
    }
}

/// Bars with a missing timestamp, high or low are dropped.
pub fn parse_chart(body: &Value) -> Vec<PriceBar> {
    let Some(result) = body.pointer("/chart/result/0") else {
        return Vec::new();
    };

    let empty = Vec::new();
    let array = |pointer: &str| {
        result
            .pointer(pointer)
            .and_then(Value::as_array)
            .unwrap_or(&empty)
            .clone()
    };
    let timestamps = array("/timestamp");
    let highs = array("/indicators/quote/0/high");
    let lows = array("/indicators/quote/0/low");
    let closes = array("/indicators/quote/0/close");

    let mut bars: Vec<PriceBar> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let timestamp = DateTime::from_timestamp(ts.as_i64()?, 0)?;
            Some(PriceBar {
                timestamp,
                high: highs.get(i)?.as_f64()?,
                low: lows.get(i)?.as_f64()?,
                close: closes.get(i).and_then(Value::as_f64),
            })
        })
        .collect();

    bars.sort_by_key(|bar| bar.timestamp);
    bars
}

pub fn parse_annual_revenue(result: &Value) -> Vec<f64> {
    let Some(statements) = result
        .pointer("/incomeStatementHistory/incomeStatementHistory")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut dated: Vec<(i64, f64)> = statements
        .iter()
        .filter_map(|statement| {
            let revenue = number_at(statement, "/totalRevenue")?;
            let end = number_at(statement, "/endDate").map_or(0, |v| v as i64);
            Some((end, revenue))
        })
        .collect();

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.into_iter().map(|(_, revenue)| revenue).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stock::{FetchError, analyze, fetch_snapshot};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP server answering each request with `route(target)` and
    /// recording every request target it receives.
    async fn serve<F>(route: F) -> (String, Arc<Mutex<Vec<String>>>)
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let route = Arc::new(route);
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let route = route.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut request: Vec<u8> = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    log.lock().unwrap().push(target.clone());

                    let (status, body) = (*route)(&target);
                    let reason = match status {
                        200 => "OK",
                        401 => "Unauthorized",
                        404 => "Not Found",
                        _ => "Error",
                    };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (base, seen)
    }

    fn not_found() -> (u16, String) {
        (404, r#"{"finance":{"error":{"code":"Not Found"}}}"#.to_string())
    }

    fn apple_route(target: &str) -> (u16, String) {
        if target.starts_with("/v1/test/getcrumb") {
            (200, "abc/1".to_string())
        } else if target.starts_with("/v10/finance/quoteSummary/AAPL?modules=price") {
            let body = json!({"quoteSummary": {"result": [{
                "price": {"longName": "Apple Inc.", "marketCap": {"raw": 2.5e12}},
                "financialData": {"currentPrice": {"raw": 150.0}}
            }], "error": null}});
            (200, body.to_string())
        } else if target.starts_with("/v10/finance/quoteSummary/AAPL?modules=incomeStatementHistory") {
            let body = json!({"quoteSummary": {"result": [{
                "incomeStatementHistory": {"incomeStatementHistory": [
                    {"endDate": {"raw": 1_700_000_000}, "totalRevenue": {"raw": 121.0}},
                    {"endDate": {"raw": 1_600_000_000}, "totalRevenue": {"raw": 100.0}}
                ]}
            }], "error": null}});
            (200, body.to_string())
        } else if target.starts_with("/v8/finance/chart/AAPL") {
            let body = json!({"chart": {"result": [{
                "timestamp": [1_700_000_000, 1_700_086_400],
                "indicators": {"quote": [{
                    "high": [11.0, 12.0],
                    "low": [9.0, 10.0],
                    "close": [10.0, 11.0]
                }]}
            }]}});
            (200, body.to_string())
        } else {
            not_found()
        }
    }

    #[tokio::test]
    async fn snapshot_over_http_uses_one_crumb() {
        let (base, seen) = serve(apple_route).await;
        let yahoo = YahooFinance::with_base_url(base);

        let snapshot = fetch_snapshot(&yahoo, "AAPL").await.unwrap();
        assert_eq!(snapshot.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(snapshot.current_price, Some(150.0));
        assert_eq!(snapshot.week_52_high, Some(12.0));
        assert_eq!(snapshot.week_52_low, Some(9.0));
        assert!(snapshot.revenue_growth_5y.is_some());

        let seen = seen.lock().unwrap().clone();
        let crumbs = seen.iter().filter(|t| t.starts_with("/v1/test/getcrumb")).count();
        assert_eq!(crumbs, 1);
        assert!(seen.contains(
            &"/v10/finance/quoteSummary/AAPL?modules=price%2CsummaryDetail%2CfinancialData\
              %2CdefaultKeyStatistics&crumb=abc%2F1"
                .to_string()
        ));
        assert!(seen.contains(
            &"/v10/finance/quoteSummary/AAPL?modules=incomeStatementHistory&crumb=abc%2F1"
                .to_string()
        ));
        assert!(seen.contains(&"/v8/finance/chart/AAPL?interval=1d&range=5y".to_string()));
    }

    #[tokio::test]
    async fn not_found_is_unknown_ticker() {
        let (base, _) = serve(|target: &str| {
            if target.starts_with("/v1/test/getcrumb") {
                (200, "abc".to_string())
            } else {
                not_found()
            }
        })
        .await;
        let yahoo = YahooFinance::with_base_url(base);

        assert_eq!(
            analyze(&yahoo, "ZZZZ").await,
            "Error: Unable to fetch data for ticker 'ZZZZ'. Please check if the ticker symbol is correct."
        );
    }

    #[tokio::test]
    async fn rejected_request_is_provider_failure() {
        let (base, _) = serve(|target: &str| {
            if target.starts_with("/v1/test/getcrumb") {
                (200, "abc".to_string())
            } else {
                let body = json!({"finance": {"result": null,
                    "error": {"code": "Unauthorized", "description": "Invalid Crumb"}}});
                (401, body.to_string())
            }
        })
        .await;
        let yahoo = YahooFinance::with_base_url(base);

        let err = fetch_snapshot(&yahoo, "AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }));
        let text = err.to_string();
        assert!(text.starts_with("Error: Failed to fetch data for ticker 'AAPL'. Details:"));
        assert!(text.contains("401 Unauthorized"));
        assert!(text.contains("Invalid Crumb"));
    }

    #[tokio::test]
    async fn refused_crumb_fails_the_lookup() {
        let (base, seen) = serve(|target: &str| {
            if target.starts_with("/v1/test/getcrumb") {
                (429, "Too Many Requests".to_string())
            } else {
                not_found()
            }
        })
        .await;
        let yahoo = YahooFinance::with_base_url(base);

        let err = yahoo.profile("AAPL").await.unwrap_err();
        assert!(err.to_string().contains("refused a crumb"));
        assert!(
            !seen
                .lock()
                .unwrap()
                .iter()
                .any(|t| t.starts_with("/v10/finance/quoteSummary"))
        );
    }

    #[tokio::test]
    async fn ticker_stays_one_path_segment() {
        let (base, seen) = serve(|target: &str| {
            if target.starts_with("/v1/test/getcrumb") {
                (200, "abc".to_string())
            } else {
                not_found()
            }
        })
        .await;
        let yahoo = YahooFinance::with_base_url(base);

        assert!(yahoo.profile("BRK/B ?x#y").await.unwrap().is_none());
        assert!(yahoo.daily_history("BRK/B", 5).await.unwrap().is_empty());

        let seen = seen.lock().unwrap().clone();
        assert!(seen.iter().any(|t| t.starts_with(
            "/v10/finance/quoteSummary/BRK%2FB%20%3Fx%23y?modules="
        )));
        assert!(seen.contains(&"/v8/finance/chart/BRK%2FB?interval=1d&range=5y".to_string()));
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let yahoo = YahooFinance::with_base_url("http://proxy.local/yahoo/");
        let url = yahoo
            .endpoint(&["v1", "test", "getcrumb"], &[])
            .unwrap();
        assert_eq!(url.as_str(), "http://proxy.local/yahoo/v1/test/getcrumb");
    }

    #[test]
    fn profile_reads_raw_members() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "longName": "Apple Inc.",
                        "marketCap": {"raw": 2.5e12, "fmt": "2.5T"}
                    },
                    "financialData": {
                        "currentPrice": {"raw": 150.0, "fmt": "150.00"},
                        "profitMargins": {"raw": 0.2531},
                        "targetMedianPrice": {}
                    },
                    "summaryDetail": {"trailingPE": {"raw": 28.5}, "beta": {"raw": 1.29}}
                }],
                "error": null
            }
        });

        let result = summary_result(&body).unwrap();
        let profile = parse_profile(&result);
        assert_eq!(profile.long_name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.current_price, Some(150.0));
        assert_eq!(profile.market_cap, Some(2.5e12));
        assert_eq!(profile.trailing_pe, Some(28.5));
        assert_eq!(profile.profit_margins, Some(0.2531));
        assert_eq!(profile.beta, Some(1.29));
        assert_eq!(profile.target_median_price, None);
        assert_eq!(profile.dividend_yield, None);
    }

    #[test]
    fn empty_summary_has_no_result() {
        let body = json!({"quoteSummary": {"result": [], "error": null}});
        assert!(summary_result(&body).is_none());

        let body = json!({"quoteSummary": {"result": null, "error": {"code": "Not Found"}}});
        assert!(summary_result(&body).is_none());
    }

    #[test]
    fn blank_long_name_is_missing() {
        let profile = parse_profile(&json!({"price": {"longName": "  "}}));
        assert!(profile.long_name.is_none());
    }

    #[test]
    fn chart_skips_null_bars_and_sorts() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1_700_086_400, 1_700_000_000, 1_700_172_800],
                    "indicators": {"quote": [{
                        "high": [12.0, 11.0, null],
                        "low": [10.0, 9.0, 8.0],
                        "close": [11.5, 10.5, 9.5]
                    }]}
                }]
            }
        });

        let bars = parse_chart(&body);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].high, 11.0);
        assert_eq!(bars[1].high, 12.0);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn chart_without_result_is_empty() {
        let body = json!({"chart": {"result": null, "error": {"code": "Not Found"}}});
        assert!(parse_chart(&body).is_empty());
    }

    #[test]
    fn revenue_is_newest_first() {
        let result = json!({
            "incomeStatementHistory": {
                "incomeStatementHistory": [
                    {"endDate": {"raw": 1_600_000_000}, "totalRevenue": {"raw": 100.0}},
                    {"endDate": {"raw": 1_700_000_000}, "totalRevenue": {"raw": 121.0}},
                    {"endDate": {"raw": 1_650_000_000}, "totalRevenue": {"raw": 110.0}},
                    {"endDate": {"raw": 1_550_000_000}}
                ]
            }
        });

        assert_eq!(parse_annual_revenue(&result), vec![121.0, 110.0, 100.0]);
        assert!(parse_annual_revenue(&json!({})).is_empty());
    }
}
