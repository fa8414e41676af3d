pub const DEFAULT_PERSONA: &str = "You are a helpful expert programmer. You answer precisely, show code when it helps, and keep explanations short.";

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Provider name: `openai`, `anthropic`, `gemini`, `ollama` or `openrouter`.
    pub provider: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Response language appended to the persona, if set.
    pub lang: Option<String>,
    pub persona: String,
    pub enable_tools: bool,
    pub require_plan_approval: bool,
    pub require_tool_approval: bool,
    /// Persist turns to `history.txt`.
    pub session_mode: bool,
    pub suppress_display: bool,
    /// Trailing bytes of history that compaction never summarizes.
    pub recent_history_size: u64,
    pub log_level: LogLevel,
    pub openai: OpenAiSettings,
    pub anthropic: AnthropicSettings,
    pub gemini: GeminiSettings,
    pub ollama: OllamaSettings,
    pub openrouter: OpenRouterSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            lang: None,
            persona: DEFAULT_PERSONA.to_string(),
            enable_tools: true,
            require_plan_approval: true,
            require_tool_approval: true,
            session_mode: true,
            suppress_display: false,
            recent_history_size: 30_480,
            log_level: LogLevel::Off,
            openai: OpenAiSettings::default(),
            anthropic: AnthropicSettings::default(),
            gemini: GeminiSettings::default(),
            ollama: OllamaSettings::default(),
            openrouter: OpenRouterSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Model name of the currently selected provider.
    pub fn active_model(&self) -> &str {
        match self.provider.as_str() {
            "anthropic" => &self.anthropic.model,
            "gemini" => &self.gemini.model,
            "ollama" => &self.ollama.model,
            "openrouter" => &self.openrouter.model,
            _ => &self.openai.model,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    /// `azure` switches to deployment-style endpoints.
    pub api_type: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o".to_string(),
            api_type: None,
            azure_endpoint: None,
            azure_deployment: None,
            azure_api_version: None,
        }
    }
}

impl OpenAiSettings {
    pub fn is_azure(&self) -> bool {
        self.api_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("azure"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnthropicSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OllamaSettings {
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "llama3.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenRouterSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for OpenRouterSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "anthropic/claude-3.5-sonnet".to_string(),
        }
    }
}

/// Diagnostic log verbosity. `Off` disables `debug.log` entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    #[default]
    Off,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Numeric config value: 0 off, 1 debug, 2 info, 3 warn, 4 error.
    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            0 => Some(LogLevel::Off),
            1 => Some(LogLevel::Debug),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Warn),
            4 => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.recent_history_size, 30_480);
        assert!(config.require_tool_approval);
        assert_eq!(config.log_level, LogLevel::Off);
        assert_eq!(config.active_model(), "gpt-4o");
    }

    #[test]
    fn active_model_follows_provider() {
        let config = AgentConfig {
            provider: "ollama".into(),
            ..Default::default()
        };
        assert_eq!(config.active_model(), "llama3.2");
    }

    #[test]
    fn log_level_numbers() {
        assert_eq!(LogLevel::from_number(2), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_number(9), None);
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }
}
