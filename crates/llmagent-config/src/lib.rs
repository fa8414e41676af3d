pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AgentConfig, AnthropicSettings, GeminiSettings, LogLevel, OllamaSettings, OpenAiSettings,
    OpenRouterSettings,
};
