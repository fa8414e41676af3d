use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use llmagent_common::{Error, Message, Result, Role, ToolCall, ToolResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod registry;
mod stream;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;
pub use registry::{create_provider, model_token_limit};

/// Fixed network timeout for a whole provider request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Placeholder sent when a provider rejects empty tool output.
pub const EMPTY_TOOL_RESULT: &str = "Error: Tool returned no output";

pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Normalized unit of provider output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub content: String,
    pub finish_reason: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn finish(reason: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            content: String::new(),
            finish_reason: Some(reason.into()),
            tool_calls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One executed tool call and its output.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Conversation in the wire shape a provider expects.
///
/// The orchestrator never matches on the variant; it only uses the append
/// operations, which keep each shape's tool-exchange layout.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessages {
    /// OpenAI-compatible list with the system prompt as the first message.
    Flat(Vec<Message>),
    /// System text kept apart from the conversation (Anthropic, Gemini).
    Split { system: String, messages: Vec<Message> },
}

impl ProviderMessages {
    pub fn flat(system: &str, history: &[Message], user: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(conversation(history));
        messages.push(Message::user(user));
        ProviderMessages::Flat(messages)
    }

    pub fn split(system: &str, history: &[Message], user: &str) -> Self {
        let mut messages: Vec<Message> = conversation(history).collect();
        messages.push(Message::user(user));
        ProviderMessages::Split {
            system: system.to_string(),
            messages,
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            ProviderMessages::Flat(messages) => messages,
            ProviderMessages::Split { messages, .. } => messages,
        }
    }

    fn messages_mut(&mut self) -> &mut Vec<Message> {
        match self {
            ProviderMessages::Flat(messages) => messages,
            ProviderMessages::Split { messages, .. } => messages,
        }
    }

    /// System text, wherever the shape keeps it.
    pub fn system(&self) -> Option<&str> {
        match self {
            ProviderMessages::Flat(messages) => messages
                .first()
                .filter(|m| m.role == Role::System)
                .map(Message::text),
            ProviderMessages::Split { system, .. } => Some(system.as_str()),
        }
    }

    pub fn push_assistant_text(&mut self, text: &str) {
        self.messages_mut().push(Message::assistant(text));
    }

    pub fn push_user_text(&mut self, text: &str) {
        self.messages_mut().push(Message::user(text));
    }

    /// Record the assistant turn that requested `calls`.
    ///
    /// Split transcripts get one assistant message holding the text and every
    /// call. Flat transcripts interleave each call with its result, so their
    /// call messages are written by [`append_tool_results`](Self::append_tool_results).
    pub fn append_assistant_tool_use(&mut self, text: &str, calls: &[ToolCall]) {
        if let ProviderMessages::Split { messages, .. } = self {
            messages.push(Message::assistant_tool_calls(text, calls.to_vec()));
        }
    }

    /// Record tool outputs in call order.
    pub fn append_tool_results(&mut self, exchanges: &[ToolExchange]) {
        match self {
            ProviderMessages::Flat(messages) => {
                for exchange in exchanges {
                    messages.push(Message::assistant_tool_calls("", vec![exchange.call.clone()]));
                    messages.push(Message::tool_result(&exchange.result));
                }
            }
            ProviderMessages::Split { messages, .. } => {
                messages.extend(exchanges.iter().map(|e| Message::tool_result(&e.result)));
            }
        }
    }
}

fn conversation(history: &[Message]) -> impl Iterator<Item = Message> + '_ {
    history.iter().filter(|m| m.role != Role::System).cloned()
}

/// Trait for LLM provider integrations (OpenAI, Anthropic, Gemini, Ollama, OpenRouter).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "anthropic", "openai", "ollama").
    fn provider_id(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Fail fast when mandatory credentials or endpoints are missing.
    fn validate_config(&self) -> Result<()>;

    fn supports_tools(&self) -> bool {
        false
    }

    fn build_messages(&self, system: &str, history: &[Message], user: &str) -> Result<ProviderMessages> {
        Ok(ProviderMessages::flat(system, history, user))
    }

    /// Issue one streaming request. The returned stream is finite and consumed once.
    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream>;
}

/// Drain a stream, returning the concatenated content.
pub async fn collect_text(mut stream: EventStream) -> Result<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        text.push_str(&event?.content);
    }
    Ok(text)
}

pub(crate) fn http_client() -> Client {
    client_with_timeout(REQUEST_TIMEOUT)
}

fn client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("http client without request timeout: {e}");
            Client::new()
        })
}

pub(crate) fn network_error(provider: &str, err: reqwest::Error) -> Error {
    Error::Provider(format!("{provider} request failed: {err}"))
}

/// Map a non-2xx response to a provider error carrying the body.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Provider(format!("{provider} API error ({status}): {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "git_status", Map::new())
    }

    fn exchange(id: &str, out: &str) -> ToolExchange {
        ToolExchange {
            call: call(id),
            result: ToolResult {
                tool_call_id: id.into(),
                content: out.into(),
            },
        }
    }

    #[tokio::test]
    async fn client_enforces_request_timeout() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client_with_timeout(Duration::from_millis(100))
            .get(server.uri())
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[test]
    fn flat_puts_system_first_and_drops_history_system() {
        let history = vec![Message::system("stale"), Message::user("q"), Message::assistant("a")];
        let messages = ProviderMessages::flat("sys", &history, "now");
        let roles: Vec<Role> = messages.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages.system(), Some("sys"));
    }

    #[test]
    fn flat_interleaves_call_and_result_per_exchange() {
        let mut messages = ProviderMessages::flat("sys", &[], "go");
        let calls = vec![call("a"), call("b")];
        messages.append_assistant_tool_use("checking", &calls);
        messages.append_tool_results(&[exchange("a", "one"), exchange("b", "two")]);

        let tail = &messages.messages()[2..];
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].tool_calls[0].id, "a");
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("a"));
        assert_eq!(tail[2].tool_calls[0].id, "b");
        assert_eq!(tail[3].text(), "two");
    }

    #[test]
    fn split_groups_calls_then_results() {
        let mut messages = ProviderMessages::split("sys", &[], "go");
        let calls = vec![call("a"), call("b")];
        messages.append_assistant_tool_use("checking", &calls);
        messages.append_tool_results(&[exchange("a", "one"), exchange("b", "two")]);

        let all = messages.messages();
        assert_eq!(all.len(), 4);
        assert_eq!(all[1].text(), "checking");
        assert_eq!(all[1].tool_calls.len(), 2);
        assert_eq!(all[2].role, Role::Tool);
        assert_eq!(all[3].role, Role::Tool);
    }
}
