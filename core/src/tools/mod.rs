//! The fixed tool set bound to the model.

pub mod legacy;
pub mod stock;
pub mod summarize;

pub use stock::{FetchError, StockSnapshot, fetch_snapshot};
pub use summarize::summarize;

use crate::traits::{MarketData, ToolCall, ToolSpec};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    StockAnalysis,
    SummarizeLastMessage,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::StockAnalysis, ToolKind::SummarizeLastMessage];

    pub fn name(&self) -> &'static str {
        match self {
            Self::StockAnalysis => "yfinance_stock_analysis",
            Self::SummarizeLastMessage => "summarize_last_message",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::StockAnalysis => {
                "Analyze stock data for the given ticker symbol. Returns key financial metrics \
                 such as price, 52-week range, market capitalization, valuation ratios, \
                 margins, growth rates, beta and the analyst target price."
            }
            Self::SummarizeLastMessage => {
                "Summarize the content of a message, such as stock analysis results or any \
                 text, into a concise, well-formatted summary."
            }
        }
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        match self {
            Self::StockAnalysis => json!({
                "type": "object",
                "properties": {
                    "ticker": {
                        "type": "string",
                        "description": "Ticker symbol for the company (e.g., AAPL for Apple Inc.)"
                    }
                },
                "required": ["ticker"]
            }),
            Self::SummarizeLastMessage => json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message content to summarize"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StockAnalysisArgs {
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummarizeArgs {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    StockAnalysis(StockAnalysisArgs),
    SummarizeLastMessage(SummarizeArgs),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ToolInvocation {
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        // Some models send an empty string for "no arguments".
        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let invalid = |source| ToolError::InvalidArguments {
            tool: kind.name(),
            source,
        };

        Ok(match kind {
            ToolKind::StockAnalysis => {
                Self::StockAnalysis(serde_json::from_str(raw).map_err(invalid)?)
            }
            ToolKind::SummarizeLastMessage => {
                Self::SummarizeLastMessage(serde_json::from_str(raw).map_err(invalid)?)
            }
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::StockAnalysis(_) => ToolKind::StockAnalysis,
            Self::SummarizeLastMessage(_) => ToolKind::SummarizeLastMessage,
        }
    }
}

/// Executes tool calls against the market-data source.
pub struct Toolbox {
    market: Arc<dyn MarketData>,
}

impl Toolbox {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        ToolKind::ALL.iter().map(ToolKind::spec).collect()
    }

    pub async fn run(&self, invocation: &ToolInvocation) -> String {
        match invocation {
            ToolInvocation::StockAnalysis(args) => {
                stock::analyze(self.market.as_ref(), &args.ticker).await
            }
            ToolInvocation::SummarizeLastMessage(args) => summarize(&args.message),
        }
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let invocation = ToolInvocation::from_call(call)?;
        info!(tool = invocation.kind().name(), call_id = %call.id, "Executing tool");
        Ok(self.run(&invocation).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stock::tests::apple;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn specs_cover_both_tools() {
        let toolbox = Toolbox::new(Arc::new(apple()));
        let names: Vec<String> = toolbox.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["yfinance_stock_analysis", "summarize_last_message"]);
    }

    #[test]
    fn decodes_typed_arguments() {
        let invocation =
            ToolInvocation::from_call(&call("yfinance_stock_analysis", r#"{"ticker":"AAPL"}"#))
                .unwrap();
        assert_eq!(
            invocation,
            ToolInvocation::StockAnalysis(StockAnalysisArgs {
                ticker: "AAPL".into()
            })
        );
        assert_eq!(invocation.kind(), ToolKind::StockAnalysis);
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let err = ToolInvocation::from_call(&call("foo", "{}")).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "foo"));
        assert_eq!(err.to_string(), "Unknown tool 'foo'");
    }

    #[test]
    fn missing_arguments_are_rejected() {
        let err = ToolInvocation::from_call(&call("summarize_last_message", "")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for summarize_last_message"));

        assert!(ToolInvocation::from_call(&call("yfinance_stock_analysis", "not json")).is_err());
    }

    #[tokio::test]
    async fn executes_both_tools() {
        let toolbox = Toolbox::new(Arc::new(apple()));

        let snapshot = toolbox
            .execute(&call("yfinance_stock_analysis", r#"{"ticker":"AAPL"}"#))
            .await
            .unwrap();
        assert!(snapshot.starts_with("{'Ticker Symbol': 'AAPL'"));

        let args = serde_json::json!({ "message": snapshot }).to_string();
        let summary = toolbox
            .execute(&call("summarize_last_message", &args))
            .await
            .unwrap();
        assert!(summary.contains("Market Cap:** $2.5T"));
    }
}
