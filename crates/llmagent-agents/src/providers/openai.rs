use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use llmagent_common::{Error, Message, Result, Role, ToolCall};
use llmagent_config::OpenAiSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::stream::{LineDecoder, decode_lines, sse_data};
use super::{
    EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition, ensure_success,
    http_client, network_error,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
enum Endpoint {
    Standard {
        base_url: String,
    },
    Azure {
        endpoint: Option<String>,
        deployment: Option<String>,
        api_version: Option<String>,
    },
}

/// OpenAI chat completions, including Azure OpenAI deployments.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: Endpoint,
}

impl OpenAiProvider {
    pub fn new(settings: &OpenAiSettings) -> Self {
        let endpoint = if settings.is_azure() {
            Endpoint::Azure {
                endpoint: settings.azure_endpoint.clone(),
                deployment: settings.azure_deployment.clone(),
                api_version: settings.azure_api_version.clone(),
            }
        } else {
            Endpoint::Standard {
                base_url: settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            }
        };
        Self {
            client: http_client(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            endpoint,
        }
    }

    pub fn is_azure(&self) -> bool {
        matches!(self.endpoint, Endpoint::Azure { .. })
    }

    fn url(&self) -> Result<String> {
        match &self.endpoint {
            Endpoint::Standard { base_url } => {
                Ok(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            }
            Endpoint::Azure {
                endpoint: Some(endpoint),
                deployment: Some(deployment),
                api_version: Some(version),
            } => Ok(format!(
                "{}/openai/deployments/{deployment}/chat/completions?api-version={version}",
                endpoint.trim_end_matches('/')
            )),
            Endpoint::Azure { .. } => Err(Error::Config(
                "Azure OpenAI requires azure_endpoint, azure_deployment and azure_api_version"
                    .to_string(),
            )),
        }
    }

    pub(crate) fn request_body(
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> ChatCompletionRequest {
        // Only the gpt- family accepts temperature and max_tokens; reasoning
        // models take max_completion_tokens alone.
        let classic = model.starts_with("gpt-");
        let tools: Option<Vec<OpenAiTool>> = tools
            .filter(|t| !t.is_empty())
            .map(|defs| defs.iter().map(OpenAiTool::from).collect());
        ChatCompletionRequest {
            model: model.to_string(),
            messages: wire_messages(messages),
            stream: true,
            temperature: classic.then_some(temperature),
            max_tokens: classic.then_some(max_tokens),
            max_completion_tokens: (!classic).then_some(max_tokens),
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        if self.is_azure() { "azure" } else { "openai" }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::Config(
                "OpenAI API key not set (OPENAI_API_KEY or llm_agent_key)".to_string(),
            ));
        }
        self.url().map(|_| ())
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        let url = self.url()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let body = Self::request_body(messages, model, temperature, max_tokens, tools);
        debug!(%url, model, messages = body.messages.len(), "openai stream request");

        let request = self.client.post(&url).json(&body);
        let request = if self.is_azure() {
            request.header("api-key", api_key)
        } else {
            request.bearer_auth(api_key)
        };
        let response = request
            .send()
            .await
            .map_err(|e| network_error("OpenAI", e))?;
        let response = ensure_success("OpenAI", response).await?;

        let bytes = response
            .bytes_stream()
            .map_err(|e| network_error("OpenAI", e));
        Ok(decode_lines(Box::pin(bytes), ChatChunkDecoder::new("OpenAI")))
    }
}

pub(crate) fn wire_messages(messages: &ProviderMessages) -> Vec<OpenAiMessage> {
    let mut wire = Vec::with_capacity(messages.messages().len() + 1);
    if let ProviderMessages::Split { system, .. } = messages {
        if !system.is_empty() {
            wire.push(OpenAiMessage::System {
                content: system.clone(),
            });
        }
    }
    wire.extend(messages.messages().iter().map(OpenAiMessage::from));
    wire
}

// Request types

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub(crate) enum OpenAiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        match msg.role {
            Role::System => OpenAiMessage::System {
                content: msg.text().to_string(),
            },
            Role::User => OpenAiMessage::User {
                content: msg.text().to_string(),
            },
            Role::Assistant => OpenAiMessage::Assistant {
                content: msg.content.clone(),
                tool_calls: (!msg.tool_calls.is_empty())
                    .then(|| msg.tool_calls.iter().map(OpenAiToolCall::from).collect()),
            },
            Role::Tool => OpenAiMessage::Tool {
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: msg.text().to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunctionCall,
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function",
            function: OpenAiFunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAiFunctionDefinition,
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: OpenAiFunctionDefinition {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.input_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

// Stream types

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u64,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn finish(self) -> Option<ToolCall> {
        // Argument-less tools (git_status, get_working_directory) stream no
        // argument text at all; only text that is present and unparseable is dropped.
        let arguments = if self.arguments.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&self.arguments) {
                Ok(Value::Object(map)) => map,
                _ => {
                    warn!(tool = %self.name, "skipping tool call with malformed arguments");
                    return None;
                }
            }
        };
        Some(ToolCall::new(self.id, self.name, arguments))
    }
}

/// Decoder for OpenAI-compatible `chat/completions` SSE streams.
///
/// Tool-call fragments are accumulated per index and parsed once a finish
/// reason arrives.
pub(crate) struct ChatChunkDecoder {
    provider: &'static str,
    calls: BTreeMap<u64, PartialCall>,
    done: bool,
}

impl ChatChunkDecoder {
    pub(crate) fn new(provider: &'static str) -> Self {
        Self {
            provider,
            calls: BTreeMap::new(),
            done: false,
        }
    }

    fn take_calls(&mut self) -> Option<Vec<ToolCall>> {
        if self.calls.is_empty() {
            return None;
        }
        let calls = std::mem::take(&mut self.calls);
        Some(calls.into_values().filter_map(PartialCall::finish).collect())
    }
}

impl LineDecoder for ChatChunkDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<StreamEvent>> {
        let Some(data) = sse_data(line) else {
            return Ok(Vec::new());
        };
        if data.trim() == "[DONE]" {
            self.done = true;
            return Ok(Vec::new());
        }
        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("ignoring unparseable {} chunk: {e}", self.provider);
                return Ok(Vec::new());
            }
        };
        if let Some(err) = chunk.error {
            return Err(Error::Provider(format!("{} stream error: {err}", self.provider)));
        }

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };
        if let Some(delta) = choice.delta {
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::text(text));
            }
            for fragment in delta.tool_calls.unwrap_or_default() {
                let entry = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
        }
        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            let calls = self.take_calls();
            events.push(StreamEvent::finish(reason, calls));
        }
        Ok(events)
    }

    fn finished(&self) -> bool {
        self.done
    }
}
