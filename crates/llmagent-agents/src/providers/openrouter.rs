use async_trait::async_trait;
use futures::TryStreamExt;
use llmagent_common::{Error, Result};
use llmagent_config::OpenRouterSettings;
use reqwest::Client;
use tracing::debug;

use super::openai::{ChatChunkDecoder, ChatCompletionRequest, wire_messages};
use super::stream::decode_lines;
use super::{
    EventStream, LlmProvider, ProviderMessages, ToolDefinition, ensure_success, http_client,
    network_error,
};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const REFERER: &str = "https://github.com/llmagent/llmagent";
const TITLE: &str = "llmagent";

/// OpenRouter's OpenAI-compatible endpoint. Text only.
pub struct OpenRouterProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
    model: String,
}

impl OpenRouterProvider {
    pub fn new(settings: &OpenRouterSettings) -> Self {
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
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn provider_id(&self) -> &str {
        "openrouter"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn validate_config(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(Error::Config("OPENROUTER_API_KEY not set".to_string())),
        }
    }

    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        model: &str,
        temperature: f32,
        max_tokens: u32,
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: model.to_string(),
            messages: wire_messages(messages),
            stream: true,
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            max_completion_tokens: None,
            tools: None,
            tool_choice: None,
        };
        debug!(%url, model, "openrouter stream request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("OpenRouter", e))?;
        let response = ensure_success("OpenRouter", response).await?;

        let bytes = response
            .bytes_stream()
            .map_err(|e| network_error("OpenRouter", e));
        Ok(decode_lines(Box::pin(bytes), ChatChunkDecoder::new("OpenRouter")))
    }
}
