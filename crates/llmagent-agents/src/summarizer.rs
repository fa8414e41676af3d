//! History compaction: fold everything but the recent window of
//! `history.txt` into `summary.md`, one bounded chunk per pass.

use std::sync::Arc;

use llmagent_common::{Error, Result};
use llmagent_config::AgentConfig;
use llmagent_session::{SessionStore, Summary};
use tracing::{info, instrument, warn};

use crate::plan::extract_plan;
use crate::prompts::summary_request;
use crate::providers::{LlmProvider, collect_text};

/// Largest byte range summarized in one pass. The older part of a larger
/// range is skipped.
pub const MAX_SUMMARY_BYTES: u64 = 204_800;

const SUMMARIZER_PERSONA: &str = "You are a helpful assistant that creates concise, \
well-organized summaries of conversations. Focus on key information, decisions, \
and user preferences.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeOutcome {
    /// `history.txt` is missing or empty.
    NoHistory,
    /// Everything outside the recent window is already summarized.
    UpToDate { cutoff: u64 },
    Summarized {
        /// First byte read this pass.
        from: u64,
        cutoff: u64,
        plan_extracted: bool,
    },
}

pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    store: SessionStore,
    recent_window: u64,
    temperature: f32,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, store: SessionStore, config: &AgentConfig) -> Self {
        Self {
            provider,
            store,
            recent_window: config.recent_history_size,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    #[instrument(skip(self), fields(provider = %self.provider.provider_id()))]
    pub async fn summarize(&self) -> Result<SummarizeOutcome> {
        let history = self.store.history();
        let size = history.size();
        if size == 0 {
            return Ok(SummarizeOutcome::NoHistory);
        }

        let summary_file = self.store.summary();
        let previous = summary_file.load()?;
        let old_cutoff = previous.as_ref().map(|s| s.cutoff).unwrap_or(0);
        let Some((from, new_cutoff)) = compute_range(size, old_cutoff, self.recent_window) else {
            info!(size, old_cutoff, "summary already up to date");
            return Ok(SummarizeOutcome::UpToDate { cutoff: old_cutoff });
        };
        if from > old_cutoff {
            warn!(skipped = from - old_cutoff, "history range too large, summarizing newest part");
        }

        let conversation = history.read_range(from, Some(new_cutoff))?;

        let plans = self.store.plan();
        let mut plan_extracted = false;
        if !plans.exists() {
            if let Some(plan) = extract_plan(&conversation) {
                info!("saving plan found in summarized history");
                plans.save(&plan)?;
                plan_extracted = true;
            }
        }
        let plan_stored = plans.exists();

        let existing = previous
            .as_ref()
            .filter(|s| s.cutoff > 0 && !s.body.is_empty())
            .map(|s| s.body.as_str());
        let request = summary_request(existing, &conversation, plan_stored);
        let messages = self.provider.build_messages(SUMMARIZER_PERSONA, &[], &request)?;
        let stream = self
            .provider
            .stream_chat(
                &messages,
                self.provider.model_name(),
                self.temperature,
                self.max_tokens,
                None,
            )
            .await?;
        let reply = collect_text(stream).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(Error::Agent("summarizer returned an empty reply".to_string()));
        }

        let mut body = match existing {
            Some(old) => preserve_sections(old, reply),
            None => reply.to_string(),
        };
        if plan_stored {
            body = strip_plan(&body);
        }

        summary_file.save(&Summary {
            body,
            cutoff: new_cutoff,
        })?;
        info!(from, cutoff = new_cutoff, plan_extracted, "summary updated");
        Ok(SummarizeOutcome::Summarized {
            from,
            cutoff: new_cutoff,
            plan_extracted,
        })
    }
}

/// Byte range `[from, cutoff)` to summarize next, or `None` when nothing
/// outside the recent window is new.
pub fn compute_range(size: u64, old_cutoff: u64, recent_window: u64) -> Option<(u64, u64)> {
    let new_cutoff = size.saturating_sub(recent_window);
    if new_cutoff <= old_cutoff {
        return None;
    }
    let from = old_cutoff.max(new_cutoff.saturating_sub(MAX_SUMMARY_BYTES));
    Some((from, new_cutoff))
}

/// Re-append every `#`/`##` section of `old` whose heading is missing from
/// `new`, so extension never loses a topic.
pub fn preserve_sections(old: &str, new: &str) -> String {
    let mut out = new.trim_end().to_string();
    for (heading, section) in sections(old) {
        if !new.lines().any(|line| line.trim() == heading) {
            out.push_str("\n\n");
            out.push_str(section.trim_end());
        }
    }
    out
}

fn sections(text: &str) -> Vec<(&str, String)> {
    let mut out: Vec<(&str, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with('#') {
            out.push((line.trim(), format!("{line}\n")));
        } else if let Some((_, body)) = out.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    out
}

/// Drop a plan block the model copied into the summary anyway.
fn strip_plan(body: &str) -> String {
    match extract_plan(body) {
        Some(plan) => body.replacen(&plan, "", 1).trim().to_string(),
        None => body.to_string(),
    }
}
