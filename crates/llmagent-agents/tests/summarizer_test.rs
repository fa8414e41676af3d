mod common;

use common::{PLAN, ScriptedProvider, text_reply};
use llmagent_agents::{SummarizeOutcome, Summarizer};
use llmagent_common::Role;
use llmagent_config::AgentConfig;
use llmagent_session::SessionStore;
use tempfile::TempDir;

const FIRST_SUMMARY: &str = "# Conversation Summary\n\n## Key Topics Discussed\n- parser rewrite\n\n## User Preferences\n- prefers small commits";

fn setup(recent: u64) -> (TempDir, SessionStore, AgentConfig) {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::open(dir.path()).unwrap();
    let config = AgentConfig {
        recent_history_size: recent,
        ..Default::default()
    };
    (dir, store, config)
}

fn request_text(provider: &ScriptedProvider, index: usize) -> String {
    provider
        .request(index)
        .messages()
        .last()
        .map(|m| m.text().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn empty_history_needs_no_summary() {
    let (_dir, store, config) = setup(100);
    let provider = ScriptedProvider::new(vec![]);
    let summarizer = Summarizer::new(provider.clone(), store, &config);

    assert_eq!(summarizer.summarize().await.unwrap(), SummarizeOutcome::NoHistory);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn recent_window_is_never_summarized() {
    let (_dir, store, config) = setup(10_000);
    store.history().append_turn(Role::User, "short chat").unwrap();
    let provider = ScriptedProvider::new(vec![]);
    let summarizer = Summarizer::new(provider.clone(), store, &config);

    assert_eq!(
        summarizer.summarize().await.unwrap(),
        SummarizeOutcome::UpToDate { cutoff: 0 }
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn first_pass_writes_summary_with_cutoff() {
    let (_dir, store, config) = setup(20);
    let history = store.history();
    history.append_turn(Role::User, "Let's rewrite the parser.").unwrap();
    history.append_turn(Role::Assistant, "Sure, starting with the lexer.").unwrap();
    let size = history.size();

    let provider = ScriptedProvider::new(vec![text_reply(FIRST_SUMMARY)]);
    let summarizer = Summarizer::new(provider.clone(), store.clone(), &config);
    let outcome = summarizer.summarize().await.unwrap();

    assert_eq!(
        outcome,
        SummarizeOutcome::Summarized {
            from: 0,
            cutoff: size - 20,
            plan_extracted: false
        }
    );
    let request = request_text(&provider, 0);
    assert!(request.contains("comprehensive summary"));
    assert!(request.contains("Let's rewrite the parser."));
    assert!(provider.tool_lists().iter().all(|offered| !offered));

    let saved = store.summary().load().unwrap().unwrap();
    assert_eq!(saved.cutoff, size - 20);
    assert_eq!(saved.body, FIRST_SUMMARY);

    assert_eq!(
        summarizer.summarize().await.unwrap(),
        SummarizeOutcome::UpToDate { cutoff: size - 20 }
    );
}

#[tokio::test]
async fn extension_keeps_every_old_heading() {
    let (_dir, store, config) = setup(0);
    let history = store.history();
    history.append_turn(Role::User, "Let's rewrite the parser.").unwrap();

    let provider = ScriptedProvider::new(vec![
        text_reply(FIRST_SUMMARY),
        text_reply("# Conversation Summary\n\n## Key Topics Discussed\n- parser rewrite\n- error recovery"),
    ]);
    let summarizer = Summarizer::new(provider.clone(), store.clone(), &config);
    summarizer.summarize().await.unwrap();
    let first_cutoff = store.summary().cutoff();

    history.append_turn(Role::User, "Now add error recovery.").unwrap();
    match summarizer.summarize().await.unwrap() {
        SummarizeOutcome::Summarized { from, cutoff, .. } => {
            assert_eq!(from, first_cutoff);
            assert_eq!(cutoff, history.size());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let request = request_text(&provider, 1);
    assert!(request.contains("extend the existing summary"));
    assert!(request.contains("Now add error recovery."));
    assert!(!request.contains("Let's rewrite the parser."));

    let body = store.summary().load().unwrap().unwrap().body;
    assert!(body.contains("- error recovery"));
    assert!(body.contains("## User Preferences\n- prefers small commits"));
}

#[tokio::test]
async fn plan_found_in_history_is_stored_separately() {
    let (_dir, store, config) = setup(0);
    store.history().append_turn(Role::Assistant, PLAN).unwrap();
    store.history().append_turn(Role::User, "Yes, go ahead.").unwrap();

    let provider = ScriptedProvider::new(vec![text_reply(&format!(
        "# Conversation Summary\n\n{PLAN}\n\n## Action Items\n- commit the fix"
    ))]);
    let summarizer = Summarizer::new(provider.clone(), store.clone(), &config);

    match summarizer.summarize().await.unwrap() {
        SummarizeOutcome::Summarized { plan_extracted, .. } => assert!(plan_extracted),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(store.plan().load().unwrap().unwrap().starts_with("GOAL: Commit the parser fix"));
    assert!(request_text(&provider, 0).contains("Do NOT include it in the summary"));

    let body = store.summary().load().unwrap().unwrap().body;
    assert!(!body.contains("GOAL:"));
    assert!(body.contains("## Action Items"));
}

#[tokio::test]
async fn empty_reply_leaves_summary_untouched() {
    let (_dir, store, config) = setup(0);
    store.history().append_turn(Role::User, "hello").unwrap();
    let provider = ScriptedProvider::new(vec![text_reply("   ")]);
    let summarizer = Summarizer::new(provider, store.clone(), &config);

    assert!(summarizer.summarize().await.is_err());
    assert_eq!(store.summary().load().unwrap(), None);
}
