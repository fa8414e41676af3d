use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use llmagent_common::{Message, Result, Role, ToolCall, ToolResult};
use llmagent_config::AgentConfig;
use llmagent_session::history::turn_marker;
use llmagent_session::{HistoryBudget, HistoryTurn, SessionStore};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::host::{EditorHost, confirm};
use crate::plan;
use crate::prompts::{EXECUTE_STEP_ONE, Preamble, revision_request};
use crate::providers::{
    LlmProvider, ProviderMessages, ToolDefinition, ToolExchange, create_provider,
    model_token_limit,
};
use crate::tools::{ApprovalSession, CommandRunner, ToolExecutor, tool_definitions};

/// Maximum number of tool rounds in a single turn.
/// Prevents runaway loops if the model keeps requesting tools.
pub const MAX_TOOL_ITERATIONS: usize = 25;

/// Plan presentations without a tool round in between before the turn is
/// abandoned.
const MAX_PLAN_PRESENTATIONS: usize = 2;

/// Result lines shown per tool call.
const RESULT_PREVIEW_LINES: usize = 15;
const PREVIEW_ARGS_CHARS: usize = 60;
const PREVIEW_VALUE_CHARS: usize = 40;

/// Leading text of tool results that report a failure rather than output.
const FAILURE_PREFIXES: &[&str] = &[
    "Error",
    "Unknown tool:",
    "Invalid arguments",
    "Tool execution blocked:",
    "Tool execution timed out:",
    "Git error:",
    "Security:",
    "File not found:",
    "Directory not found:",
    "Not a directory:",
    "Permission denied",
    "Invalid regex",
];

/// Display buffer used when turns are persisted.
pub const SESSION_BUFFER: &str = "llm-agent-session";
/// Display buffer for one-off responses.
pub const RESPONSE_BUFFER: &str = "llm-agent-response";

pub const YES: &str = "Yes";
pub const NO: &str = "No";
pub const REVISE: &str = "Revise";

/// Where the orchestrator is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Composing,
    Streaming,
    PlanPendingApproval,
    ToolsPending,
    Executing,
    Done,
}

/// How a turn ended. Turns never fail with an error; failures are reported
/// to the host and summarized here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
    LoopDetected,
    IterationLimit,
    Failed(String),
}

enum PlanDecision {
    Approve,
    Reject,
    Revise(String),
}

/// One model response: its text and the tool calls it requested.
struct Reply {
    text: String,
    calls: Vec<ToolCall>,
}

/// Drives user prompts through the model, the approval workflow and the tools.
pub struct AgentRuntime {
    config: AgentConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    store: SessionStore,
    tools: ToolExecutor,
    host: Arc<dyn EditorHost>,
    state: TurnState,
}

impl AgentRuntime {
    pub fn new(config: AgentConfig, project_root: &Path, host: Arc<dyn EditorHost>) -> Result<Self> {
        let store = SessionStore::open(project_root)?;
        let tools = ToolExecutor::new(project_root, config.require_tool_approval, host.clone());
        Ok(Self {
            config,
            provider: None,
            store,
            tools,
            host,
            state: TurnState::Done,
        })
    }

    /// Use `provider` instead of building one from the configuration.
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.tools = self.tools.with_runner(runner);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn approvals(&self) -> &ApprovalSession {
        self.tools.approvals()
    }

    pub fn approvals_mut(&mut self) -> &mut ApprovalSession {
        self.tools.approvals_mut()
    }

    /// The configured provider, built on first use.
    pub fn provider(&mut self) -> Result<Arc<dyn LlmProvider>> {
        if let Some(provider) = &self.provider {
            return Ok(provider.clone());
        }
        let provider = create_provider(&self.config)?;
        self.provider = Some(provider.clone());
        Ok(provider)
    }

    /// Run one user prompt to completion.
    #[instrument(skip(self, prompt), fields(provider = %self.config.provider, prompt_len = prompt.len()))]
    pub async fn run_turn(&mut self, prompt: &str) -> TurnOutcome {
        self.state = TurnState::Composing;
        let mut reply = String::new();
        let outcome = match self.turn(prompt, &mut reply).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("turn failed: {e}");
                self.show(&format!("\n\nError: {e}\n"));
                TurnOutcome::Failed(e.to_string())
            }
        };
        if self.config.session_mode && !reply.is_empty() {
            if let Err(e) = self.store.history().append_turn(Role::Assistant, &reply) {
                warn!("failed to persist assistant reply: {e}");
            }
        }
        self.state = TurnState::Done;
        info!(?outcome, "turn finished");
        outcome
    }

    async fn turn(&mut self, prompt: &str, reply: &mut String) -> Result<TurnOutcome> {
        let provider = self.provider()?;
        provider.validate_config()?;
        let tools_on = self.config.enable_tools && provider.supports_tools();

        let system = self.compose_system(tools_on);
        let history = self.load_history(provider.model_name(), prompt, &system);

        if self.config.session_mode {
            self.store.history().append_turn(Role::User, prompt)?;
            self.show(&format!(
                "{}{prompt}{}",
                turn_marker(Role::User),
                turn_marker(Role::Assistant)
            ));
        }

        let mut messages = provider.build_messages(&system, &history, prompt)?;
        let definitions = tools_on.then(tool_definitions);
        let mut in_planning = tools_on && self.config.require_plan_approval;
        let mut presentations = 0;
        let mut iteration = 0;

        loop {
            if iteration >= MAX_TOOL_ITERATIONS {
                warn!(iteration, "tool iteration limit reached");
                self.show(&format!(
                    "\n\nMaximum tool iterations reached ({MAX_TOOL_ITERATIONS}). Stopping.\n"
                ));
                return Ok(TurnOutcome::IterationLimit);
            }

            self.state = TurnState::Streaming;
            let Reply { text, calls } = self
                .stream_reply(provider.as_ref(), &messages, definitions.as_deref())
                .await?;
            reply.push_str(&text);

            if calls.is_empty() {
                if !(in_planning && plan::detect_plan(&text)) {
                    return Ok(TurnOutcome::Completed);
                }
                presentations += 1;
                if presentations > MAX_PLAN_PRESENTATIONS {
                    warn!(presentations, "model keeps presenting plans");
                    self.show(
                        "\n\nERROR: Model keeps presenting plans without executing. \
                         Please try rephrasing your request or disable plan approval.\n",
                    );
                    return Ok(TurnOutcome::LoopDetected);
                }

                self.state = TurnState::PlanPendingApproval;
                messages.push_assistant_text(&text);
                match self.ask_plan_approval().await {
                    PlanDecision::Approve => {
                        self.save_plan(&text);
                        in_planning = false;
                        self.show("\n\nPlan approved! Proceeding with execution...\n\n");
                        messages.push_user_text(EXECUTE_STEP_ONE);
                    }
                    PlanDecision::Reject => {
                        self.show("\n\nPlan cancelled by user.\n");
                        return Ok(TurnOutcome::Cancelled);
                    }
                    PlanDecision::Revise(feedback) => {
                        info!("plan revision requested");
                        self.show("\n\nRevising plan...\n\n");
                        messages.push_user_text(&revision_request(&feedback));
                    }
                }
                continue;
            }

            self.state = TurnState::ToolsPending;
            if self.config.require_plan_approval
                && !in_planning
                && !self.config.suppress_display
                && plan::is_revised_plan(&text, in_planning)
            {
                let approved = confirm(
                    self.host.as_ref(),
                    "The plan has been revised. Approve the revised plan?",
                )
                .await;
                if !approved {
                    self.show("\n\nRevised plan cancelled by user.\n");
                    return Ok(TurnOutcome::Cancelled);
                }
                self.save_plan(&text);
                self.show("\n\nRevised plan approved! Continuing execution...\n\n");
            }

            iteration += 1;
            presentations = 0;
            self.state = TurnState::Executing;
            let rule = "=".repeat(70);
            self.show(&format!("\n\n{rule}\nTool Execution - Iteration {iteration}\n{rule}\n"));

            messages.append_assistant_tool_use(&text, &calls);
            let exchanges = self.execute_calls(calls).await;
            messages.append_tool_results(&exchanges);
        }
    }

    fn compose_system(&self, tools_on: bool) -> String {
        let context = self.store.load_context();
        let summary = self.store.summary().load().unwrap_or_else(|e| {
            warn!("failed to load summary: {e}");
            None
        });
        let active_plan = self.store.plan().load().unwrap_or_else(|e| {
            warn!("failed to load plan: {e}");
            None
        });
        Preamble {
            persona: &self.config.persona,
            lang: self.config.lang.as_deref(),
            tools: tools_on,
            require_plan_approval: self.config.require_plan_approval,
            context: context.as_deref(),
            summary: summary.as_ref().map(|s| s.body.as_str()).filter(|b| !b.is_empty()),
            plan: active_plan.as_deref(),
        }
        .render()
    }

    /// Turns after the summary cutoff that fit the model's budget.
    fn load_history(&self, model: &str, prompt: &str, system: &str) -> Vec<Message> {
        if !self.config.session_mode {
            return Vec::new();
        }
        let cutoff = self.store.summary().cutoff();
        let budget = HistoryBudget {
            model_limit: model_token_limit(model),
            max_tokens: self.config.max_tokens as usize,
            prompt_len: prompt.chars().count(),
            system_len: system.chars().count(),
        };
        match self.store.history().load_bounded(cutoff, &budget) {
            Ok(turns) => turns.into_iter().filter_map(history_message).collect(),
            Err(e) => {
                warn!("failed to load history: {e}");
                Vec::new()
            }
        }
    }

    async fn stream_reply(
        &self,
        provider: &dyn LlmProvider,
        messages: &ProviderMessages,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Reply> {
        let mut stream = provider
            .stream_chat(
                messages,
                provider.model_name(),
                self.config.temperature,
                self.config.max_tokens,
                tools,
            )
            .await?;

        let mut reply = Reply {
            text: String::new(),
            calls: Vec::new(),
        };
        while let Some(event) = stream.next().await {
            let event = event?;
            if !event.content.is_empty() {
                self.show(&event.content);
                reply.text.push_str(&event.content);
            }
            if let Some(reason) = event.finish_reason.filter(|r| !r.is_empty()) {
                reply.calls.extend(event.tool_calls.unwrap_or_default());
                debug!(%reason, calls = reply.calls.len(), "response finished");
                self.finish(&reason);
                break;
            }
        }
        Ok(reply)
    }

    async fn execute_calls(&mut self, calls: Vec<ToolCall>) -> Vec<ToolExchange> {
        let mut exchanges = Vec::with_capacity(calls.len());
        for call in calls {
            info!(tool = %call.name, "executing tool call");
            let output = self.tools.execute(&call.name, &call.arguments).await;
            self.show(&format_tool_result(&call.name, &call.arguments, &output));
            let result = ToolResult {
                tool_call_id: call.id.clone(),
                content: output,
            };
            exchanges.push(ToolExchange { call, result });
        }
        exchanges
    }

    async fn ask_plan_approval(&self) -> PlanDecision {
        let choice = self
            .host
            .choose("Plan presented above. Approve?", &[YES, NO, REVISE])
            .await;
        match choice.as_deref() {
            Some(YES) => PlanDecision::Approve,
            Some(REVISE) => match self.host.input("What changes would you like?").await {
                Some(feedback) if !feedback.trim().is_empty() => PlanDecision::Revise(feedback),
                _ => PlanDecision::Reject,
            },
            _ => PlanDecision::Reject,
        }
    }

    /// Persist the plan block of `text`, or the whole text when it has none.
    fn save_plan(&self, text: &str) {
        let plan = plan::extract_plan(text).unwrap_or_else(|| text.trim().to_string());
        if let Err(e) = self.store.plan().save(&plan) {
            warn!("failed to save plan: {e}");
        }
    }

    fn buffer(&self) -> &'static str {
        if self.config.session_mode {
            SESSION_BUFFER
        } else {
            RESPONSE_BUFFER
        }
    }

    fn show(&self, text: &str) {
        if !self.config.suppress_display {
            self.host.display(text, None, self.buffer());
        }
    }

    fn finish(&self, reason: &str) {
        if !self.config.suppress_display {
            self.host.display("", Some(reason), self.buffer());
        }
    }
}

fn history_message(turn: HistoryTurn) -> Option<Message> {
    match turn.role {
        Role::User => Some(Message::user(turn.content)),
        Role::Assistant => Some(Message::assistant(turn.content)),
        Role::System | Role::Tool => None,
    }
}

/// Result block shown to the user after one tool call.
pub fn format_tool_result(name: &str, args: &Map<String, Value>, output: &str) -> String {
    let rule = "─".repeat(60);
    let status = if is_failure(output) { "✗ Error" } else { "✓ Success" };
    let mut out = format!("\n{rule}\n{status}: {name}({})\n", preview_args(args));
    if !output.is_empty() {
        out.push_str("\nOutput:\n");
        let lines: Vec<&str> = output.lines().collect();
        for line in lines.iter().take(RESULT_PREVIEW_LINES) {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        if lines.len() > RESULT_PREVIEW_LINES {
            out.push_str(&format!(
                "  ... (truncated, {} more lines)\n",
                lines.len() - RESULT_PREVIEW_LINES
            ));
        }
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

fn is_failure(output: &str) -> bool {
    let output = output.trim_start();
    FAILURE_PREFIXES.iter().any(|prefix| output.starts_with(prefix))
}

fn preview_args(args: &Map<String, Value>) -> String {
    let joined = args
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{key}={}", truncate(&value, PREVIEW_VALUE_CHARS))
        })
        .collect::<Vec<_>>()
        .join(", ");
    truncate(&joined, PREVIEW_ARGS_CHARS)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
