use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use llmagent_common::{Error, Message, Result, Role, ToolCall};
use llmagent_config::AnthropicSettings;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::stream::{LineDecoder, decode_lines, sse_data};
use super::{
    EMPTY_TOOL_RESULT, EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition,
    ensure_success, http_client, network_error,
};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(settings: &AnthropicSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            client: http_client(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
        }
    }

    /// `{base}/messages`, adding the `/v1` segment when the base lacks it.
    fn messages_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn process_messages(messages: &[Message]) -> Vec<Value> {
        let mut processed: Vec<Value> = Vec::with_capacity(messages.len());
        let mut results: Vec<Value> = Vec::new();

        for msg in messages {
            if msg.role == Role::Tool {
                let content = match msg.text() {
                    "" => EMPTY_TOOL_RESULT,
                    text => text,
                };
                results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": content,
                }));
                continue;
            }
            // Consecutive tool results travel together in one user message.
            if !results.is_empty() {
                processed.push(json!({"role": "user", "content": std::mem::take(&mut results)}));
            }

            match msg.role {
                Role::User => processed.push(json!({"role": "user", "content": msg.text()})),
                Role::Assistant if msg.tool_calls.is_empty() => {
                    processed.push(json!({"role": "assistant", "content": msg.text()}))
                }
                Role::Assistant => {
                    let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
                    if !msg.text().is_empty() {
                        blocks.push(json!({"type": "text", "text": msg.text()}));
                    }
                    for call in &msg.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": Value::Object(call.arguments.clone()),
                        }));
                    }
                    processed.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::System | Role::Tool => {}
            }
        }
        if !results.is_empty() {
            processed.push(json!({"role": "user", "content": results}));
        }
        processed
    }

    fn create_request_body(
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": Self::process_messages(messages.messages()),
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": true,
        });

        if let Some(system) = messages.system().filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    }))
                    .collect::<Vec<_>>()
            );
        }

        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(Error::Config("ANTHROPIC_API_KEY not set".to_string())),
        }
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn build_messages(&self, system: &str, history: &[Message], user: &str) -> Result<ProviderMessages> {
        Ok(ProviderMessages::split(system, history, user))
    }

    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        if messages.messages().is_empty() {
            return Err(Error::Agent("Anthropic request has no messages".to_string()));
        }
        let body = Self::create_request_body(messages, model, temperature, max_tokens, tools);
        let url = self.messages_url();
        debug!(%url, model, "anthropic stream request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("Anthropic", e))?;
        let response = ensure_success("Anthropic", response).await?;

        let bytes = response
            .bytes_stream()
            .map_err(|e| network_error("Anthropic", e));
        Ok(decode_lines(Box::pin(bytes), AnthropicDecoder::default()))
    }
}

#[derive(Default)]
struct PartialToolUse {
    id: String,
    name: String,
    input: String,
}

/// Decoder for Anthropic `event:`/`data:` message streams.
#[derive(Default)]
struct AnthropicDecoder {
    blocks: BTreeMap<u64, PartialToolUse>,
    done: bool,
}

impl AnthropicDecoder {
    fn take_calls(&mut self) -> Option<Vec<ToolCall>> {
        if self.blocks.is_empty() {
            return None;
        }
        let blocks = std::mem::take(&mut self.blocks);
        let calls = blocks
            .into_values()
            .filter_map(|block| {
                let input = if block.input.trim().is_empty() {
                    Map::new()
                } else {
                    match serde_json::from_str::<Value>(&block.input) {
                        Ok(Value::Object(map)) => map,
                        _ => {
                            warn!(tool = %block.name, "skipping tool_use with malformed input");
                            return None;
                        }
                    }
                };
                Some(ToolCall::new(block.id, block.name, input))
            })
            .collect();
        Some(calls)
    }
}

impl LineDecoder for AnthropicDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<StreamEvent>> {
        let Some(data) = sse_data(line) else {
            return Ok(Vec::new());
        };
        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!("ignoring unparseable Anthropic event: {e}");
                return Ok(Vec::new());
            }
        };

        let index = event["index"].as_u64().unwrap_or(0);
        match event["type"].as_str().unwrap_or_default() {
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    self.blocks.insert(
                        index,
                        PartialToolUse {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            input: String::new(),
                        },
                    );
                }
                Ok(Vec::new())
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => {
                        let text = delta["text"].as_str().unwrap_or_default();
                        Ok(if text.is_empty() {
                            Vec::new()
                        } else {
                            vec![StreamEvent::text(text)]
                        })
                    }
                    "input_json_delta" => {
                        if let Some(block) = self.blocks.get_mut(&index) {
                            block
                                .input
                                .push_str(delta["partial_json"].as_str().unwrap_or_default());
                        }
                        Ok(Vec::new())
                    }
                    _ => Ok(Vec::new()),
                }
            }
            "message_delta" => match event["delta"]["stop_reason"].as_str() {
                Some(reason) if !reason.is_empty() => {
                    let calls = self.take_calls();
                    Ok(vec![StreamEvent::finish(reason, calls)])
                }
                _ => Ok(Vec::new()),
            },
            "message_stop" => {
                self.done = true;
                Ok(Vec::new())
            }
            "error" => Err(Error::Provider(format!(
                "Anthropic stream error: {}",
                event["error"]["message"].as_str().unwrap_or("unknown error")
            ))),
            _ => Ok(Vec::new()),
        }
    }

    fn finished(&self) -> bool {
        self.done
    }
}
