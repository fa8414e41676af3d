use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use llmagent_common::{Error, Message, Result, Role};
use llmagent_config::GeminiSettings;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition, ensure_success,
    http_client, network_error,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini. The response is read whole and replayed as events.
pub struct GeminiProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(settings: &GeminiSettings) -> Self {
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

    fn request_body(messages: &ProviderMessages, temperature: f32, max_tokens: u32) -> Value {
        let contents: Vec<Value> = messages
            .messages()
            .iter()
            .filter_map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System | Role::Tool => return None,
                };
                Some(json!({"role": role, "parts": [{"text": msg.text()}]}))
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });
        if let Some(system) = messages.system().filter(|s| !s.is_empty()) {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }
}

/// Parse a `streamGenerateContent` body: a JSON array of candidates, or a
/// single object.
pub(crate) fn parse_response(text: &str) -> Result<Vec<StreamEvent>> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut events = Vec::new();
    for item in items {
        if let Some(err) = item.get("error") {
            let message = err["message"].as_str().unwrap_or("unknown error");
            return Err(Error::Provider(format!("Gemini API error: {message}")));
        }
        let Some(candidate) = item["candidates"].get(0) else {
            continue;
        };
        if let Some(parts) = candidate["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::text(text));
                }
            }
        }
        if let Some(reason) = candidate["finishReason"].as_str() {
            let reason = if reason == "STOP" { "stop" } else { reason };
            events.push(StreamEvent::finish(reason.to_ascii_lowercase(), None));
        }
    }
    Ok(events)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(Error::Config("GEMINI_API_KEY not set".to_string())),
        }
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
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        let url = format!(
            "{}/models/{model}:streamGenerateContent",
            self.base_url.trim_end_matches('/')
        );
        debug!(%url, "gemini request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_deref().unwrap_or_default())])
            .json(&Self::request_body(messages, temperature, max_tokens))
            .send()
            .await
            .map_err(|e| network_error("Gemini", e))?;
        let response = ensure_success("Gemini", response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| network_error("Gemini", e))?;

        let events = parse_response(&text)?;
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
