pub mod agent;
pub mod config;
pub mod market;
pub mod providers;
pub mod tools;
pub mod traits;

pub use agent::{AgentLoop, ContextBuilder, Conversation, Turn};
pub use config::*;
pub use market::*;
pub use providers::*;
pub use tools::*;
pub use traits::*;
