use async_trait::async_trait;
use futures::TryStreamExt;
use llmagent_common::{Error, Result, Role};
use llmagent_config::OllamaSettings;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::stream::{LineDecoder, decode_lines};
use super::{
    EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition, ensure_success,
    http_client, network_error,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
    model: String,
}

impl OllamaProvider {
    pub fn new(settings: &OllamaSettings) -> Self {
        Self {
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http_client(),
            model: settings.model.clone(),
        }
    }

    fn build_request_body(
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut wire: Vec<Value> = Vec::new();
        if let ProviderMessages::Split { system, .. } = messages {
            wire.push(serde_json::json!({"role": "system", "content": system}));
        }
        wire.extend(messages.messages().iter().map(|msg| {
            serde_json::json!({
                "role": match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                },
                "content": msg.text(),
            })
        }));

        serde_json::json!({
            "model": model,
            "messages": wire,
            "stream": true,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        })
    }
}

#[derive(Deserialize)]
struct OllamaChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// NDJSON decoder for `/api/chat`.
#[derive(Default)]
struct OllamaDecoder {
    done: bool,
}

impl LineDecoder for OllamaDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<StreamEvent>> {
        let chunk: OllamaChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!("ignoring unparseable Ollama line: {e}");
                return Ok(Vec::new());
            }
        };
        if let Some(err) = chunk.error {
            return Err(Error::Provider(format!("Ollama error: {err}")));
        }

        let mut events = Vec::new();
        if let Some(text) = chunk.message.map(|m| m.content).filter(|t| !t.is_empty()) {
            events.push(StreamEvent::text(text));
        }
        if chunk.done {
            self.done = true;
            events.push(StreamEvent::finish("stop", None));
        }
        Ok(events)
    }

    fn finished(&self) -> bool {
        self.done
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_id(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("Ollama base URL is empty".to_string()));
        }
        Ok(())
    }

    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        let body = Self::build_request_body(messages, model, temperature, max_tokens);
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("Ollama", e))?;
        let res = ensure_success("Ollama", res).await?;

        let bytes = res.bytes_stream().map_err(|e| network_error("Ollama", e));
        Ok(decode_lines(Box::pin(bytes), OllamaDecoder::default()))
    }
}
