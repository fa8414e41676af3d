use std::sync::Arc;

use llmagent_common::Result;
use llmagent_config::AgentConfig;
use tracing::{info, warn};

use super::{
    AnthropicProvider, GeminiProvider, LlmProvider, OllamaProvider, OpenAiProvider,
    OpenRouterProvider,
};

/// Construct and validate the provider named by `config.provider`.
/// Unknown names fall back to OpenAI.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicProvider::new(&config.anthropic)),
        "gemini" => Arc::new(GeminiProvider::new(&config.gemini)),
        "ollama" => Arc::new(OllamaProvider::new(&config.ollama)),
        "openrouter" => Arc::new(OpenRouterProvider::new(&config.openrouter)),
        "openai" | "azure" => Arc::new(OpenAiProvider::new(&config.openai)),
        other => {
            warn!("unknown provider {other:?}, using openai");
            Arc::new(OpenAiProvider::new(&config.openai))
        }
    };
    provider.validate_config()?;
    info!(
        provider = provider.provider_id(),
        model = provider.model_name(),
        "provider ready"
    );
    Ok(provider)
}

/// Context window, in tokens, used for history budgeting.
pub fn model_token_limit(model: &str) -> usize {
    match model {
        "gpt-3.5-turbo" => 4_097,
        "gpt-3.5-turbo-16k" | "gpt-3.5-turbo-1106" => 16_385,
        "gpt-4" => 8_192,
        "gpt-4-32k" => 32_768,
        "gpt-4-turbo" | "gpt-4-turbo-preview" | "gpt-4o" | "gpt-4o-mini" => 128_000,
        "o1" | "o3" | "o3-mini" | "o4-mini" => 200_000,
        _ => 100_000,
    }
}
