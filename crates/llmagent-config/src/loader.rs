use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use llmagent_common::{Error, Result};
use tracing::{debug, warn};

use crate::model::{AgentConfig, LogLevel};

/// Prefix of current configuration keys.
pub const KEY_PREFIX: &str = "llm_agent_";
/// Prefix of keys written by older releases, still honored.
pub const LEGACY_KEY_PREFIX: &str = "chat_gpt_";

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Flat key/value configuration with new-name/legacy-name fallback.
///
/// Values come from TOML files (nested tables flatten to `table_key`) and
/// explicit `set` calls. Provider credentials also consult the process
/// environment through a replaceable lookup.
pub struct ConfigLoader {
    values: HashMap<String, String>,
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup (tests use a fixed map).
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// User-level config file, `~/.config/llmagent/config.toml`.
    pub fn default_user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("llmagent").join("config.toml"))
    }

    /// Merge a TOML file. A missing file is not an error; returns whether it was read.
    pub fn merge_file(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            debug!("config file {} not present", path.display());
            return Ok(false);
        }
        let text = std::fs::read_to_string(path)?;
        self.merge_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!("merged config file {}", path.display());
        Ok(true)
    }

    pub fn merge_toml_str(&mut self, text: &str) -> Result<()> {
        let table: toml::Table = text
            .parse()
            .map_err(|e: toml::de::Error| Error::Config(e.message().to_string()))?;
        self.merge_table("", &table);
        Ok(())
    }

    fn merge_table(&mut self, prefix: &str, table: &toml::Table) {
        for (key, value) in table {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}_{key}")
            };
            match value {
                toml::Value::String(s) => {
                    self.values.insert(full_key, s.clone());
                }
                toml::Value::Integer(i) => {
                    self.values.insert(full_key, i.to_string());
                }
                toml::Value::Float(f) => {
                    self.values.insert(full_key, f.to_string());
                }
                toml::Value::Boolean(b) => {
                    self.values.insert(full_key, if *b { "1" } else { "0" }.to_string());
                }
                toml::Value::Table(inner) => self.merge_table(&full_key, inner),
                other => warn!("ignoring config key {full_key}: unsupported value {other}"),
            }
        }
    }

    /// Literal lookup; empty values count as unset.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// General setting lookup: `llm_agent_<key>`, then `chat_gpt_<key>`, then `<key>`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw(&format!("{KEY_PREFIX}{key}"))
            .or_else(|| self.raw(&format!("{LEGACY_KEY_PREFIX}{key}")))
            .or_else(|| self.raw(key))
    }

    fn env(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }

    fn owned(&self, key: &str) -> Option<String> {
        self.raw(key).map(str::to_string)
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {value:?}"))),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            Some(value) => parse_bool(value)
                .ok_or_else(|| Error::Config(format!("invalid boolean for {key}: {value:?}"))),
            None => Ok(default),
        }
    }

    /// Resolve everything into an [`AgentConfig`].
    pub fn load(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::default();

        if let Some(provider) = self.get("provider") {
            config.provider = provider.trim().to_ascii_lowercase();
        }
        config.temperature = self.parsed("temperature", config.temperature)?;
        config.max_tokens = self.parsed("max_tokens", config.max_tokens)?;
        config.lang = self
            .get("lang")
            .filter(|l| !l.eq_ignore_ascii_case("none"))
            .map(str::to_string);
        if let Some(persona) = self.get("persona") {
            config.persona = persona.to_string();
        }
        config.enable_tools = self.flag("enable_tools", config.enable_tools)?;
        config.require_plan_approval =
            self.flag("require_plan_approval", config.require_plan_approval)?;
        config.require_tool_approval =
            self.flag("require_tool_approval", config.require_tool_approval)?;
        config.session_mode = self.flag("session_mode", config.session_mode)?;
        config.suppress_display = self.flag("suppress_display", config.suppress_display)?;
        config.recent_history_size =
            self.parsed("recent_history_size", config.recent_history_size)?;
        let level: u8 = self.parsed("log_level", 0)?;
        config.log_level = LogLevel::from_number(level)
            .ok_or_else(|| Error::Config(format!("log_level must be 0-4, got {level}")))?;

        let openai = &mut config.openai;
        openai.api_key = self
            .env("OPENAI_API_KEY")
            .or_else(|| self.get("key").map(str::to_string))
            .or_else(|| self.owned("openai_api_key"));
        openai.base_url = self
            .env("OPENAI_PROXY")
            .or_else(|| self.env("OPENAI_API_BASE"))
            .or_else(|| self.owned("openai_base_url"));
        if let Some(model) = self.get("model") {
            openai.model = model.to_string();
        }
        openai.api_type = self.owned("api_type");
        openai.azure_endpoint = self.owned("azure_endpoint");
        openai.azure_deployment = self.owned("azure_deployment");
        openai.azure_api_version = self.owned("azure_api_version");

        let anthropic = &mut config.anthropic;
        anthropic.api_key = self
            .env("ANTHROPIC_API_KEY")
            .or_else(|| self.owned("anthropic_api_key"));
        anthropic.base_url = self
            .env("ANTHROPIC_BASE_URL")
            .or_else(|| self.owned("anthropic_base_url"));
        if let Some(model) = self.raw("anthropic_model") {
            anthropic.model = model.to_string();
        }

        let gemini = &mut config.gemini;
        gemini.api_key = self
            .env("GEMINI_API_KEY")
            .or_else(|| self.owned("gemini_api_key"));
        gemini.base_url = self.owned("gemini_base_url");
        if let Some(model) = self.raw("gemini_model") {
            gemini.model = model.to_string();
        }

        let ollama = &mut config.ollama;
        ollama.base_url = self
            .env("OLLAMA_HOST")
            .or_else(|| self.owned("ollama_base_url"));
        if let Some(model) = self.raw("ollama_model") {
            ollama.model = model.to_string();
        }

        let openrouter = &mut config.openrouter;
        openrouter.api_key = self
            .env("OPENROUTER_API_KEY")
            .or_else(|| self.owned("openrouter_api_key"));
        openrouter.base_url = self.owned("openrouter_base_url");
        if let Some(model) = self.raw("openrouter_model") {
            openrouter.model = model.to_string();
        }

        debug!(
            provider = %config.provider,
            model = %config.active_model(),
            "configuration resolved"
        );
        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
