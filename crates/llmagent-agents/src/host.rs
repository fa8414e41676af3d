use async_trait::async_trait;

/// The editor (or terminal) the agent runs inside.
///
/// Decisions return `None` when no answer could be obtained; callers treat
/// that as the safest choice.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Show a streamed fragment. `finish` is set once, on the final call of
    /// a response; `session` names the buffer the conversation is shown in.
    fn display(&self, fragment: &str, finish: Option<&str>, session: &str);

    /// Ask the user to pick one of `options`.
    async fn choose(&self, prompt: &str, options: &[&str]) -> Option<String>;

    /// Ask the user for free text.
    async fn input(&self, prompt: &str) -> Option<String>;
}

/// Headless host: shows nothing and never decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

#[async_trait]
impl EditorHost for NullHost {
    fn display(&self, _fragment: &str, _finish: Option<&str>, _session: &str) {}

    async fn choose(&self, _prompt: &str, _options: &[&str]) -> Option<String> {
        None
    }

    async fn input(&self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Ask a yes/no question; anything but an explicit "Yes" is a no.
pub async fn confirm(host: &dyn EditorHost, prompt: &str) -> bool {
    matches!(host.choose(prompt, &["Yes", "No"]).await.as_deref(), Some("Yes"))
}
