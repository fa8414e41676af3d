use std::path::Path;
use std::sync::Arc;

use llmagent_security::{PathGuard, PathVerdict};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::approval::ApprovalSession;
use super::args::ToolInvocation;
use super::process::{CommandRunner, SystemRunner};
use super::{ToolError, ToolName, fs, git};
use crate::host::{EditorHost, confirm};

/// Runs tool calls for one project root. Every outcome, including
/// failures and denials, comes back as text for the model.
pub struct ToolExecutor {
    guard: PathGuard,
    approvals: ApprovalSession,
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn EditorHost>,
}

impl ToolExecutor {
    pub fn new(root: impl AsRef<Path>, require_approval: bool, host: Arc<dyn EditorHost>) -> Self {
        Self {
            guard: PathGuard::new(root.as_ref()),
            approvals: ApprovalSession::new(require_approval),
            runner: Arc::new(SystemRunner),
            host,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn approvals(&self) -> &ApprovalSession {
        &self.approvals
    }

    pub fn approvals_mut(&mut self) -> &mut ApprovalSession {
        &mut self.approvals
    }

    /// Execute one call. Never fails; errors become the returned text.
    #[instrument(skip(self, args))]
    pub async fn execute(&mut self, name: &str, args: &Map<String, Value>) -> String {
        debug!(?args, "tool arguments");
        match self.try_execute(name, args).await {
            Ok(output) => output,
            Err(ToolError::Timeout(_)) => {
                warn!("tool timed out");
                ToolError::Timeout(name.to_string()).to_string()
            }
            Err(e) => {
                info!("tool returned error: {e}");
                e.to_string()
            }
        }
    }

    async fn try_execute(&mut self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        let tool = ToolName::parse(name)?;
        self.approvals.check(name, args, self.host.as_ref()).await?;
        let invocation = ToolInvocation::parse(tool, args)?;
        self.check_paths(&invocation).await?;
        self.dispatch(&invocation).await
    }

    async fn check_paths(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
        for (raw, operation) in invocation.paths() {
            match self.guard.check(raw, operation) {
                PathVerdict::Allowed(_) => {}
                PathVerdict::Denied(reason) => return Err(ToolError::PathDenied(reason)),
                PathVerdict::NeedsConfirmation(resolved) => {
                    let prompt = format!(
                        "AI wants to {operation}:\n{raw}\n\nThis is OUTSIDE the project directory ({}).\n\nAllow this operation?",
                        self.root().display()
                    );
                    if confirm(self.host.as_ref(), &prompt).await {
                        info!(path = %resolved.display(), operation, "user approved path outside project");
                    } else {
                        warn!(path = %resolved.display(), operation, "path outside project refused");
                        return Err(ToolError::PathDenied(format!(
                            "Security: {operation} denied by user. Path '{raw}' is outside project directory."
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<String, ToolError> {
        let root = self.root();
        let runner = self.runner.as_ref();
        match invocation {
            ToolInvocation::GetWorkingDirectory => Ok(fs::get_working_directory(root)),
            ToolInvocation::ListDirectory(args) => fs::list_directory(root, args).await,
            ToolInvocation::ReadFile(args) => fs::read_file(root, args).await,
            ToolInvocation::FindInFile(args) => fs::find_in_file(runner, root, args).await,
            ToolInvocation::FindFileInProject(args) => fs::find_file_in_project(runner, root, args).await,
            ToolInvocation::CreateFile(args) => fs::create_file(root, args).await,
            ToolInvocation::EditFile(args) => fs::edit_file(root, args).await,
            ToolInvocation::EditFileLines(args) => fs::edit_file_lines(root, args).await,
            ToolInvocation::GitStatus => git::status(runner, root).await,
            ToolInvocation::GitDiff(args) => git::diff(runner, root, args).await,
            ToolInvocation::GitLog(args) => git::log(runner, root, args).await,
            ToolInvocation::GitShow(args) => git::show(runner, root, args).await,
            ToolInvocation::GitBranch(args) => git::branch(runner, root, args).await,
            ToolInvocation::GitAdd(args) => git::add(runner, root, args).await,
            ToolInvocation::GitReset(args) => git::reset(runner, root, args).await,
            ToolInvocation::GitCommit(args) => git::commit(runner, root, args).await,
        }
    }
}
