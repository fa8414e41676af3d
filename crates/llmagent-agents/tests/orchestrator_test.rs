mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    PLAN, RecordingHost, ScriptedProvider, ScriptedRunner, config, text_reply, tool_reply,
    tool_reply_with_text,
};
use llmagent_agents::runtime::{MAX_TOOL_ITERATIONS, RESPONSE_BUFFER, SESSION_BUFFER};
use llmagent_agents::{
    AgentRuntime, EditorHost, EventStream, LlmProvider, ProviderMessages, ToolDefinition,
    TurnOutcome,
};
use llmagent_common::{Error, Result, Role};
use llmagent_config::AgentConfig;
use serde_json::json;
use tempfile::TempDir;

fn runtime(
    dir: &TempDir,
    config: AgentConfig,
    provider: Arc<ScriptedProvider>,
    host: Arc<RecordingHost>,
    runner: Arc<ScriptedRunner>,
) -> AgentRuntime {
    AgentRuntime::new(config, dir.path(), host)
        .unwrap()
        .with_provider(provider)
        .with_command_runner(runner)
}

fn has_tool_result(messages: &ProviderMessages, needle: &str) -> bool {
    messages
        .messages()
        .iter()
        .any(|m| m.role == Role::Tool && m.text().contains(needle))
}

fn last_user_text(messages: &ProviderMessages) -> String {
    messages
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn tool_result_is_fed_back_to_the_model() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_reply("git_status", json!({})),
        text_reply("The working tree is clean."),
    ]);
    let host = RecordingHost::new(&[], &[]);
    let runner = ScriptedRunner::new("nothing to commit, working tree clean");
    let mut agent = runtime(&dir, config(), provider.clone(), host.clone(), runner.clone());

    let outcome = agent.run_turn("Is my working tree clean?").await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(provider.calls(), 2);
    assert!(has_tool_result(&provider.request(1), "working tree clean"));
    assert_eq!(runner.calls()[0], vec!["status"]);
    let shown = host.shown();
    assert!(shown.contains("Tool Execution - Iteration 1"));
    assert!(shown.contains("✓ Success: git_status()"));
    assert!(shown.contains("The working tree is clean."));
    assert_eq!(host.finishes(), vec!["tool_calls", "stop"]);
}

#[tokio::test]
async fn tools_are_only_offered_when_enabled() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("hi")]);
    let cfg = AgentConfig {
        enable_tools: false,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider.clone(), RecordingHost::new(&[], &[]), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("hello").await, TurnOutcome::Completed);
    assert_eq!(provider.tool_lists(), vec![false]);
    let system = provider.request(0).system().unwrap_or_default().to_string();
    assert!(!system.contains("TOOL CALLING CAPABILITY"));
}

#[tokio::test]
async fn approved_plan_is_saved_and_executed() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        text_reply(PLAN),
        tool_reply("git_status", json!({})),
        text_reply("Step 1 done."),
    ]);
    let host = RecordingHost::new(&["Yes"], &[]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider.clone(), host.clone(), ScriptedRunner::new("clean"));

    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::Completed);
    assert_eq!(provider.calls(), 3);
    assert!(last_user_text(&provider.request(1)).starts_with("Plan approved. Execute step 1 now."));
    assert_eq!(host.prompts(), vec!["Plan presented above. Approve?"]);

    let saved = agent.store().plan().load().unwrap().unwrap();
    assert!(saved.starts_with("GOAL: Commit the parser fix"));
    assert!(saved.ends_with("ESTIMATED STEPS: 2"));
    assert!(host.shown().contains("Plan approved! Proceeding with execution..."));
}

#[tokio::test]
async fn rejected_plan_ends_the_turn() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply(PLAN)]);
    let host = RecordingHost::new(&["No"], &[]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider.clone(), host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::Cancelled);
    assert_eq!(provider.calls(), 1);
    assert!(!agent.store().plan().exists());
    assert!(host.shown().contains("Plan cancelled by user."));
}

#[tokio::test]
async fn unanswered_plan_approval_cancels() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply(PLAN)]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider, RecordingHost::new(&[], &[]), ScriptedRunner::new(""));
    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::Cancelled);
}

#[tokio::test]
async fn repeated_plans_trip_the_loop_guard() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::repeating(text_reply(PLAN));
    let host = RecordingHost::new(&["Revise", "Revise"], &["smaller steps", "fewer tools"]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let runner = ScriptedRunner::new("");
    let mut agent = runtime(&dir, cfg, provider.clone(), host.clone(), runner.clone());

    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::LoopDetected);
    assert_eq!(provider.calls(), 3);
    assert!(
        last_user_text(&provider.request(1))
            .contains("REVISED PLAN based on this feedback: smaller steps")
    );
    assert!(host.shown().contains("Model keeps presenting plans without executing"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn markers_without_numbered_steps_are_plain_answers() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("GOAL: none really. PLAN: just talk.")]);
    let host = RecordingHost::new(&[], &[]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider.clone(), host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("What is the plan?").await, TurnOutcome::Completed);
    assert!(host.prompts().is_empty());
}

#[tokio::test]
async fn revised_plan_during_execution_needs_approval() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        text_reply(PLAN),
        tool_reply_with_text(
            "= REVISED PLAN\nGOAL: Amend instead\n\nPLAN:\n1. Amend (git_commit)",
            "git_commit",
            json!({"amend": true}),
        ),
    ]);
    let host = RecordingHost::new(&["Yes", "No"], &[]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let runner = ScriptedRunner::new("");
    let mut agent = runtime(&dir, cfg, provider.clone(), host.clone(), runner.clone());

    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::Cancelled);
    assert!(runner.calls().is_empty());
    assert!(host.shown().contains("Revised plan cancelled by user."));
    let saved = agent.store().plan().load().unwrap().unwrap();
    assert!(saved.starts_with("GOAL: Commit the parser fix"));
}

#[tokio::test]
async fn approved_revision_replaces_the_stored_plan() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        text_reply(PLAN),
        tool_reply_with_text(
            "= REVISED PLAN\nGOAL: Inspect first\n\nPLAN:\n1. Status (git_status)",
            "git_status",
            json!({}),
        ),
        text_reply("All done."),
    ]);
    let host = RecordingHost::new(&["Yes", "Yes"], &[]);
    let cfg = AgentConfig {
        require_plan_approval: true,
        ..config()
    };
    let runner = ScriptedRunner::new("clean");
    let mut agent = runtime(&dir, cfg, provider, host, runner.clone());

    assert_eq!(agent.run_turn("Commit the fix").await, TurnOutcome::Completed);
    assert_eq!(runner.calls()[0], vec!["status"]);
    let saved = agent.store().plan().load().unwrap().unwrap();
    assert!(saved.contains("GOAL: Inspect first"));
}

#[tokio::test]
async fn endless_tool_calls_hit_the_iteration_limit() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::repeating(tool_reply("get_working_directory", json!({})));
    let host = RecordingHost::new(&[], &[]);
    let mut agent = runtime(&dir, config(), provider.clone(), host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("loop forever").await, TurnOutcome::IterationLimit);
    assert_eq!(provider.calls(), MAX_TOOL_ITERATIONS);
    let shown = host.shown();
    assert!(shown.contains(&format!("Tool Execution - Iteration {MAX_TOOL_ITERATIONS}")));
    assert!(shown.contains("Maximum tool iterations reached"));
}

#[tokio::test]
async fn denied_tool_is_reported_to_the_model() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_reply("git_commit", json!({"message": "wip"})),
        text_reply("You declined the commit."),
    ]);
    let host = RecordingHost::new(&["Deny"], &[]);
    let cfg = AgentConfig {
        require_tool_approval: true,
        ..config()
    };
    let runner = ScriptedRunner::new("");
    let mut agent = runtime(&dir, cfg, provider.clone(), host, runner.clone());

    assert_eq!(agent.run_turn("commit it").await, TurnOutcome::Completed);
    assert!(runner.calls().is_empty());
    assert!(has_tool_result(
        &provider.request(1),
        "Tool execution blocked: Tool 'git_commit' denied by user"
    ));
    assert_eq!(
        agent.approvals().status("git_commit"),
        Some(llmagent_agents::ApprovalStatus::Denied)
    );
}

#[tokio::test]
async fn turns_are_persisted_and_replayed() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("Hello there"), text_reply("Still here")]);
    let host = RecordingHost::new(&[], &[]);
    let mut agent = runtime(&dir, config(), provider.clone(), host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("hi").await, TurnOutcome::Completed);
    let history = std::fs::read_to_string(agent.store().history().path()).unwrap();
    assert_eq!(
        history,
        "\n\n\x01>>>User:\x01\nhi\n\n\x01>>>Assistant:\x01\nHello there"
    );

    assert_eq!(agent.run_turn("are you there?").await, TurnOutcome::Completed);
    let replay = provider.request(1);
    let texts: Vec<(Role, &str)> = replay
        .messages()
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| (m.role, m.text()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (Role::User, "hi"),
            (Role::Assistant, "Hello there"),
            (Role::User, "are you there?"),
        ]
    );
    assert!(host.buffers().iter().all(|b| b == SESSION_BUFFER));
}

#[tokio::test]
async fn without_session_mode_nothing_is_written() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("ok")]);
    let host = RecordingHost::new(&[], &[]);
    let cfg = AgentConfig {
        session_mode: false,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider, host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("hi").await, TurnOutcome::Completed);
    assert_eq!(agent.store().history().size(), 0);
    assert!(host.buffers().iter().all(|b| b == RESPONSE_BUFFER));
}

#[tokio::test]
async fn suppressed_display_shows_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("quiet")]);
    let host = RecordingHost::new(&[], &[]);
    let cfg = AgentConfig {
        suppress_display: true,
        ..config()
    };
    let mut agent = runtime(&dir, cfg, provider, host.clone(), ScriptedRunner::new(""));

    assert_eq!(agent.run_turn("hi").await, TurnOutcome::Completed);
    assert!(host.shown().is_empty());
    assert!(host.finishes().is_empty());
}

#[tokio::test]
async fn summary_and_plan_are_injected_into_the_preamble() {
    let dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("ok")]);
    let mut agent = runtime(&dir, config(), provider.clone(), RecordingHost::new(&[], &[]), ScriptedRunner::new(""));
    agent.store().plan().save("GOAL: keep going").unwrap();
    std::fs::write(
        agent.store().dir().join("summary.md"),
        "<!-- SUMMARY_METADATA\ncutoff_byte: 0\nlast_updated: 2026-01-01\n-->\n\n# Conversation Summary\n- prefers tabs",
    )
    .unwrap();

    agent.run_turn("continue").await;

    let system = provider.request(0).system().unwrap_or_default().to_string();
    assert!(system.contains("## Conversation Summary & User Preferences\n\n# Conversation Summary\n- prefers tabs"));
    assert!(system.contains("## Current Active Plan"));
    assert!(system.contains("GOAL: keep going"));
    assert!(!system.contains("SUMMARY_METADATA"));
}

struct BrokenProvider;

#[async_trait]
impl LlmProvider for BrokenProvider {
    fn provider_id(&self) -> &str {
        "broken"
    }

    fn model_name(&self) -> &str {
        "broken-model"
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    async fn stream_chat(
        &self,
        _messages: &ProviderMessages,
        _model: &str,
        _temperature: f32,
        _max_tokens: u32,
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        Err(Error::Provider("upstream returned 503".into()))
    }
}

#[tokio::test]
async fn provider_failure_ends_the_turn_gracefully() {
    let dir = TempDir::new().unwrap();
    let host = RecordingHost::new(&[], &[]);
    let mut agent = AgentRuntime::new(config(), dir.path(), host.clone() as Arc<dyn EditorHost>)
        .unwrap()
        .with_provider(Arc::new(BrokenProvider));

    match agent.run_turn("hi").await {
        TurnOutcome::Failed(reason) => assert!(reason.contains("upstream returned 503")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(host.shown().contains("Error:"));
}

#[tokio::test]
async fn missing_credentials_fail_the_turn() {
    let dir = TempDir::new().unwrap();
    let cfg = AgentConfig {
        provider: "anthropic".into(),
        ..config()
    };
    let mut agent = AgentRuntime::new(cfg, dir.path(), RecordingHost::new(&[], &[])).unwrap();
    assert!(matches!(agent.run_turn("hi").await, TurnOutcome::Failed(_)));
}
