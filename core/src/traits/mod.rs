pub mod market;
pub mod provider;
pub mod tool;

pub use market::{CompanyProfile, MarketData, PriceBar};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, Role, ToolCall};
pub use tool::ToolSpec;
