pub mod host;
pub mod plan;
pub mod prompts;
pub mod providers;
pub mod runtime;
pub mod summarizer;
pub mod tools;

pub use host::{EditorHost, NullHost};
pub use providers::{
    EventStream, LlmProvider, ProviderMessages, StreamEvent, ToolDefinition, ToolExchange,
    create_provider,
};
pub use runtime::{AgentRuntime, TurnOutcome, TurnState};
pub use summarizer::{SummarizeOutcome, Summarizer};
pub use tools::{ApprovalSession, ApprovalStatus, ToolError, ToolExecutor};
