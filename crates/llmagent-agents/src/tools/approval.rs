use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::ToolError;
use crate::host::EditorHost;

pub const ALLOW_ONCE: &str = "Allow Once";
pub const ALWAYS_ALLOW: &str = "Always Allow";
pub const DENY: &str = "Deny";

const MAX_PROMPT_ARGS: usize = 100;

/// Sticky per-tool decision. "Allow once" is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    AlwaysAllow,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::AlwaysAllow => "always",
            ApprovalStatus::Denied => "denied",
        }
    }
}

/// Per-tool-name approval cache for one session.
#[derive(Debug, Clone, Default)]
pub struct ApprovalSession {
    enabled: bool,
    decisions: HashMap<String, ApprovalStatus>,
}

impl ApprovalSession {
    /// `enabled = false` approves everything without asking.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            decisions: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set(&mut self, tool: impl Into<String>, status: ApprovalStatus) {
        self.decisions.insert(tool.into(), status);
    }

    pub fn status(&self, tool: &str) -> Option<ApprovalStatus> {
        self.decisions.get(tool).copied()
    }

    /// Forget every stored decision.
    pub fn clear(&mut self) {
        self.decisions.clear();
        info!("all tool approvals cleared");
    }

    /// Stored decisions, sorted by tool name.
    pub fn snapshot(&self) -> Vec<(String, ApprovalStatus)> {
        let mut out: Vec<_> = self
            .decisions
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Decide whether `tool` may run, prompting through `host` on first use.
    pub async fn check(
        &mut self,
        tool: &str,
        args: &Map<String, Value>,
        host: &dyn EditorHost,
    ) -> Result<(), ToolError> {
        if !self.enabled {
            return Ok(());
        }
        match self.status(tool) {
            Some(ApprovalStatus::AlwaysAllow) => return Ok(()),
            Some(ApprovalStatus::Denied) => {
                return Err(ToolError::Blocked(format!("Tool '{tool}' was denied by user")));
            }
            None => {}
        }

        let prompt = format!(
            "AI wants to use tool: {tool}\nArguments: {}",
            prompt_arguments(args)
        );
        match host.choose(&prompt, &[ALLOW_ONCE, ALWAYS_ALLOW, DENY]).await.as_deref() {
            Some(ALLOW_ONCE) => {
                info!(tool, "tool allowed once");
                Ok(())
            }
            Some(ALWAYS_ALLOW) => {
                info!(tool, "tool always allowed");
                self.set(tool, ApprovalStatus::AlwaysAllow);
                Ok(())
            }
            Some(_) => {
                warn!(tool, "tool denied by user");
                self.set(tool, ApprovalStatus::Denied);
                Err(ToolError::Blocked(format!("Tool '{tool}' denied by user")))
            }
            None => {
                warn!(tool, "no approval channel, denying");
                Err(ToolError::Blocked(format!(
                    "Tool approval failed: no way to ask the user about '{tool}'"
                )))
            }
        }
    }
}

fn prompt_arguments(args: &Map<String, Value>) -> String {
    let text = Value::Object(args.clone()).to_string();
    if text.chars().count() > MAX_PROMPT_ARGS {
        let cut: String = text.chars().take(MAX_PROMPT_ARGS).collect();
        format!("{cut}...")
    } else {
        text
    }
}
