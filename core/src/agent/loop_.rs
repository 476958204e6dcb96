use crate::agent::ContextBuilder;
use crate::tools::Toolbox;
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Outcome of one user turn.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Text shown to the user.
    pub reply: String,
    /// Full history to carry into the next turn.
    pub messages: Vec<ChatMessage>,
}

/// Single-step tool dispatch: one model call per turn, followed by the
/// requested tool calls in emission order.
///
/// The model is not consulted again after tools run. The reply is the text
/// of the assistant message that requested the tools; their output only
/// lands in the returned history.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    context_builder: ContextBuilder,
    toolbox: Arc<Toolbox>,
    temperature: f64,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        context_builder: ContextBuilder,
        toolbox: Arc<Toolbox>,
    ) -> Self {
        Self {
            provider,
            context_builder,
            toolbox,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn process(&self, message: &str) -> String {
        self.respond(&[], message).await.reply
    }

    /// Never fails: model and tool errors become an `Error: ...` reply, and
    /// the history then records that reply as the assistant message.
    pub async fn respond(&self, history: &[ChatMessage], message: &str) -> Turn {
        let mut messages = self.context_builder.build_turn(history, message);

        match self.run_turn(&messages).await {
            Ok((reply, produced)) => {
                messages.extend(produced);
                Turn { reply, messages }
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!(error = %detail, "Turn failed");
                let reply = format!("Error: {}", e);
                messages.push(ChatMessage::assistant(reply.clone()));
                Turn { reply, messages }
            }
        }
    }

    async fn run_turn(&self, messages: &[ChatMessage]) -> Result<(String, Vec<ChatMessage>)> {
        let request_messages = self.context_builder.build_request(messages);
        let tools = self.toolbox.specs();
        let request = ChatRequest {
            messages: &request_messages,
            tools: if tools.is_empty() { None } else { Some(&tools) },
            temperature: self.temperature,
        };

        debug!(
            provider = self.provider.name(),
            messages = request_messages.len(),
            "Requesting completion"
        );
        let response = self.provider.chat(request).await?;

        let produced = self.dispatch(&response).await?;
        Ok((response.text_or_empty().to_string(), produced))
    }

    async fn dispatch(&self, response: &ChatResponse) -> Result<Vec<ChatMessage>> {
        let mut produced = vec![response.to_message()];

        for tool_call in &response.tool_calls {
            let output = self.toolbox.execute(tool_call).await?;
            produced.push(ChatMessage::tool_result(
                tool_call.id.clone(),
                tool_call.name.clone(),
                output,
            ));
        }

        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stock::tests::apple;
    use crate::traits::{Role, ToolCall};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses and records every request it receives.
    struct ScriptedProvider {
        responses: Mutex<Vec<anyhow::Result<ChatResponse>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<anyhow::Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("no scripted response left");
            }
            responses.remove(0)
        }
    }

    fn text(reply: &str) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            text: Some(reply.to_string()),
            tool_calls: vec![],
        })
    }

    fn with_calls(reply: Option<&str>, calls: &[(&str, &str, &str)]) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            text: reply.map(str::to_string),
            tool_calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
        })
    }

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(
            provider,
            ContextBuilder::new(),
            Arc::new(Toolbox::new(Arc::new(apple()))),
        )
    }

    #[tokio::test]
    async fn plain_reply_is_returned_and_recorded() {
        let provider = ScriptedProvider::new(vec![text("Hello there!")]);
        let agent = agent(provider.clone());
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hey")];

        let turn = agent.respond(&history, "how are you?").await;

        assert_eq!(turn.reply, "Hello there!");
        assert_eq!(turn.messages.len(), 4);
        assert_eq!(turn.messages[2], ChatMessage::user("how are you?"));
        assert_eq!(turn.messages[3], ChatMessage::assistant("Hello there!"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.seen.lock().unwrap()[0].len(), 3);
    }

    #[tokio::test]
    async fn tool_output_lands_in_history_not_reply() {
        let provider = ScriptedProvider::new(vec![with_calls(
            Some("Let me look that up."),
            &[
                ("call_a", "yfinance_stock_analysis", r#"{"ticker":"AAPL"}"#),
                ("call_b", "summarize_last_message", r#"{"message":"short note"}"#),
            ],
        )]);
        let agent = agent(provider.clone());

        let turn = agent.respond(&[], "How is Apple doing?").await;

        assert_eq!(turn.reply, "Let me look that up.");
        assert_eq!(provider.calls(), 1);
        assert_eq!(turn.messages.len(), 4);

        let assistant = &turn.messages[1];
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.has_tool_calls());

        let stock = &turn.messages[2];
        assert_eq!(stock.role, Role::Tool);
        assert_eq!(stock.tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(stock.name.as_deref(), Some("yfinance_stock_analysis"));
        assert!(stock.content.starts_with("{'Ticker Symbol': 'AAPL'"));
        assert!(!turn.reply.contains("Ticker Symbol"));

        let summary = &turn.messages[3];
        assert_eq!(summary.tool_call_id.as_deref(), Some("call_b"));
        assert_eq!(summary.content, "Summary: short note");
    }

    #[tokio::test]
    async fn tool_calls_without_text_reply_empty() {
        let provider = ScriptedProvider::new(vec![with_calls(
            None,
            &[("call_a", "summarize_last_message", r#"{"message":"note"}"#)],
        )]);

        let turn = agent(provider).respond(&[], "summarize").await;
        assert_eq!(turn.reply, "");
        assert_eq!(turn.messages.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_reply() {
        let provider = ScriptedProvider::new(vec![with_calls(
            Some("calling foo"),
            &[("call_x", "foo", "{}")],
        )]);

        let turn = agent(provider).respond(&[], "do foo").await;
        assert_eq!(turn.reply, "Error: Unknown tool 'foo'");
        assert_eq!(turn.messages.len(), 2);
        assert_eq!(turn.messages[1], ChatMessage::assistant("Error: Unknown tool 'foo'"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_error_reply() {
        let provider = ScriptedProvider::new(vec![Err(anyhow::anyhow!("rate limited"))]);

        let turn = agent(provider).respond(&[], "hello").await;
        assert_eq!(turn.reply, "Error: rate limited");
        assert_eq!(turn.messages[0], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn system_prompt_is_sent_but_not_stored() {
        let provider = ScriptedProvider::new(vec![text("ok")]);
        let agent = AgentLoop::new(
            provider.clone(),
            ContextBuilder::new().with_system_prompt("You analyse stocks."),
            Arc::new(Toolbox::new(Arc::new(apple()))),
        );

        let turn = agent.respond(&[], "hi").await;
        assert_eq!(provider.seen.lock().unwrap()[0][0].role, Role::System);
        assert!(turn.messages.iter().all(|m| m.role != Role::System));
    }
}
