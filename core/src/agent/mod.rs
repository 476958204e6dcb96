pub mod context;
pub mod loop_;
pub mod session;

pub use context::ContextBuilder;
pub use loop_::{AgentLoop, Turn};
pub use session::Conversation;
