#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use llmagent_agents::tools::{CommandOutput, CommandRunner};
use llmagent_agents::{EditorHost, EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition, ToolError};
use llmagent_common::{Result, ToolCall};
use llmagent_config::AgentConfig;
use serde_json::{Map, Value};

pub const PLAN: &str = "GOAL: Commit the parser fix\n\nPLAN:\n1. Check repository status (git_status)\n2. Commit the change (git_commit)\n\nTOOLS REQUIRED: git_status, git_commit\n\nESTIMATED STEPS: 2";

/// Config with both approval gates off and history persisted.
pub fn config() -> AgentConfig {
    AgentConfig {
        require_plan_approval: false,
        require_tool_approval: false,
        ..Default::default()
    }
}

pub fn text_reply(text: &str) -> Vec<StreamEvent> {
    vec![StreamEvent::text(text), StreamEvent::finish("stop", None)]
}

pub fn tool_reply(name: &str, args: Value) -> Vec<StreamEvent> {
    tool_reply_with_text("", name, args)
}

pub fn tool_reply_with_text(text: &str, name: &str, args: Value) -> Vec<StreamEvent> {
    let args: Map<String, Value> = args.as_object().cloned().unwrap_or_default();
    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(StreamEvent::text(text));
    }
    events.push(StreamEvent::finish(
        "tool_calls",
        Some(vec![ToolCall::new(format!("call_{name}"), name, args)]),
    ));
    events
}

/// Provider answering from a queue of event vectors.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Vec<StreamEvent>>>,
    repeat: Option<Vec<StreamEvent>>,
    requests: Mutex<Vec<ProviderMessages>>,
    tool_lists: Mutex<Vec<bool>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            tool_lists: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `reply`.
    pub fn repeating(reply: Vec<StreamEvent>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            repeat: Some(reply),
            requests: Mutex::new(Vec::new()),
            tool_lists: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ProviderMessages {
        self.requests.lock().unwrap()[index].clone()
    }

    /// Whether each request carried tool definitions.
    pub fn tool_lists(&self) -> Vec<bool> {
        self.tool_lists.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn stream_chat(
        &self,
        messages: &ProviderMessages,
        _model: &str,
        _temperature: f32,
        _max_tokens: u32,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<EventStream> {
        self.requests.lock().unwrap().push(messages.clone());
        self.tool_lists.lock().unwrap().push(tools.is_some());
        let events = match &self.repeat {
            Some(reply) => reply.clone(),
            None => self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| text_reply("done")),
        };
        Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

/// Host that records everything shown and answers from queues.
#[derive(Default)]
pub struct RecordingHost {
    choices: Mutex<VecDeque<Option<String>>>,
    inputs: Mutex<VecDeque<Option<String>>>,
    shown: Mutex<String>,
    finishes: Mutex<Vec<String>>,
    buffers: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new(choices: &[&str], inputs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            choices: Mutex::new(choices.iter().map(|c| Some(c.to_string())).collect()),
            inputs: Mutex::new(inputs.iter().map(|i| Some(i.to_string())).collect()),
            ..Default::default()
        })
    }

    pub fn shown(&self) -> String {
        self.shown.lock().unwrap().clone()
    }

    pub fn finishes(&self) -> Vec<String> {
        self.finishes.lock().unwrap().clone()
    }

    pub fn buffers(&self) -> Vec<String> {
        self.buffers.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditorHost for RecordingHost {
    fn display(&self, fragment: &str, finish: Option<&str>, session: &str) {
        self.shown.lock().unwrap().push_str(fragment);
        if let Some(reason) = finish {
            self.finishes.lock().unwrap().push(reason.to_string());
        }
        self.buffers.lock().unwrap().push(session.to_string());
    }

    async fn choose(&self, prompt: &str, _options: &[&str]) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.choices.lock().unwrap().pop_front().flatten()
    }

    async fn input(&self, prompt: &str) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.inputs.lock().unwrap().pop_front().flatten()
    }
}

/// Command runner returning a fixed stdout and recording argument lists.
pub struct ScriptedRunner {
    stdout: String,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            stdout: stdout.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _cwd: &Path,
        _timeout: Duration,
    ) -> std::result::Result<CommandOutput, ToolError> {
        self.calls.lock().unwrap().push(args.to_vec());
        Ok(CommandOutput::ok(self.stdout.clone()))
    }
}
