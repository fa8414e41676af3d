use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::ToolError;
use super::args::{GitBranchArgs, GitCommitArgs, GitDiffArgs, GitFilesArgs, GitLogArgs, GitShowArgs};
use super::process::{CommandOutput, CommandRunner};

const SHORT: Duration = Duration::from_secs(5);
const STANDARD: Duration = Duration::from_secs(10);
const LONG: Duration = Duration::from_secs(30);

async fn git(
    runner: &dyn CommandRunner,
    root: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    runner.run("git", &args, root, timeout).await
}

/// Run git and map a non-zero exit to [`ToolError::Git`].
async fn git_ok(
    runner: &dyn CommandRunner,
    root: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<String, ToolError> {
    let output = git(runner, root, args, timeout).await?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(ToolError::Git(output.stderr))
    }
}

/// Context sections are best-effort; a failure just leaves them out.
async fn git_context(runner: &dyn CommandRunner, root: &Path, args: &[&str]) -> Option<String> {
    match git(runner, root, args, STANDARD).await {
        Ok(output) if output.success() => Some(output.stdout),
        Ok(output) => {
            debug!(?args, stderr = %output.stderr, "git context unavailable");
            None
        }
        Err(e) => {
            debug!(?args, "git context unavailable: {e}");
            None
        }
    }
}

fn or_no_changes(stdout: String) -> String {
    if stdout.trim().is_empty() {
        "No changes".to_string()
    } else {
        stdout
    }
}

pub async fn status(runner: &dyn CommandRunner, root: &Path) -> Result<String, ToolError> {
    let status = git_ok(runner, root, &["status"], STANDARD).await?;
    let mut parts = vec!["=== Git Status ===".to_string(), status];
    if let Some(log) = git_context(runner, root, &["log", "-5", "--oneline"]).await {
        parts.push("\n=== Recent Commits ===".to_string());
        parts.push(log);
    }
    Ok(parts.join("\n"))
}

pub async fn diff(runner: &dyn CommandRunner, root: &Path, args: &GitDiffArgs) -> Result<String, ToolError> {
    let mut parts = Vec::new();
    if let Some(short) = git_context(runner, root, &["status", "-s"]).await {
        parts.push("=== Git Status (short) ===".to_string());
        parts.push(or_no_changes(short));
    }

    let mut cmd = vec!["diff"];
    if args.staged {
        cmd.push("--cached");
    }
    if let Some(path) = &args.file_path {
        cmd.extend(["--", path.as_str()]);
    }
    let diff = git_ok(runner, root, &cmd, LONG).await?;

    let kind = if args.staged { "Staged Changes" } else { "Unstaged Changes" };
    let scope = args
        .file_path
        .as_ref()
        .map(|p| format!(" ({p})"))
        .unwrap_or_default();
    parts.push(format!("\n=== {kind}{scope} ==="));
    if diff.trim().is_empty() {
        parts.push("No changes found.".to_string());
    } else {
        parts.push(diff);
    }
    Ok(parts.join("\n"))
}

pub async fn log(runner: &dyn CommandRunner, root: &Path, args: &GitLogArgs) -> Result<String, ToolError> {
    let count = format!("-{}", args.max_count);
    let mut cmd = vec!["log", count.as_str()];
    if args.oneline {
        cmd.push("--oneline");
    }
    if let Some(path) = &args.file_path {
        cmd.extend(["--", path.as_str()]);
    }
    let out = git_ok(runner, root, &cmd, STANDARD).await?;
    Ok(if out.trim().is_empty() {
        "No commits found.".to_string()
    } else {
        out
    })
}

pub async fn show(runner: &dyn CommandRunner, root: &Path, args: &GitShowArgs) -> Result<String, ToolError> {
    if args.commit.trim().starts_with('-') {
        return Err(ToolError::InvalidArguments {
            tool: "git_show".to_string(),
            reason: format!("'{}' is not a commit reference", args.commit),
        });
    }
    let mut cmd = vec!["show"];
    if args.stat {
        cmd.push("--stat");
    }
    cmd.push(args.commit.as_str());
    git_ok(runner, root, &cmd, LONG).await
}

pub async fn branch(runner: &dyn CommandRunner, root: &Path, args: &GitBranchArgs) -> Result<String, ToolError> {
    let cmd: &[&str] = if args.list_all {
        &["branch", "-a"]
    } else {
        &["branch", "--show-current"]
    };
    Ok(git_ok(runner, root, cmd, SHORT).await?.trim().to_string())
}

pub async fn add(runner: &dyn CommandRunner, root: &Path, args: &GitFilesArgs) -> Result<String, ToolError> {
    if args.files.is_empty() {
        return Err(ToolError::Failed("Error: No files specified to add.".to_string()));
    }
    let mut cmd = vec!["add", "--"];
    cmd.extend(args.files.iter().map(String::as_str));
    git_ok(runner, root, &cmd, LONG).await?;

    let mut parts = vec![format!("Successfully staged: {}", args.files.join(", "))];
    if let Some(short) = git_context(runner, root, &["status", "-s"]).await {
        parts.push("\n=== Updated Status ===".to_string());
        parts.push(or_no_changes(short));
    }
    Ok(parts.join("\n"))
}

pub async fn reset(runner: &dyn CommandRunner, root: &Path, args: &GitFilesArgs) -> Result<String, ToolError> {
    let mut cmd = vec!["reset", "HEAD"];
    if !args.files.is_empty() {
        cmd.push("--");
        cmd.extend(args.files.iter().map(String::as_str));
    }
    git_ok(runner, root, &cmd, LONG).await?;
    Ok(if args.files.is_empty() {
        "Successfully unstaged all files.".to_string()
    } else {
        format!("Successfully unstaged: {}", args.files.join(", "))
    })
}

/// Commit staged changes. The report always carries status, staged diff
/// and recent history so the model can see what it committed.
pub async fn commit(runner: &dyn CommandRunner, root: &Path, args: &GitCommitArgs) -> Result<String, ToolError> {
    let message = args.message.as_deref().filter(|m| !m.trim().is_empty());
    if message.is_none() && !args.amend {
        return Err(ToolError::Failed("Error: Commit message is required.".to_string()));
    }

    let mut parts = Vec::new();
    if let Some(status) = git_context(runner, root, &["status"]).await {
        parts.push("=== Git Status ===".to_string());
        parts.push(status);
    }
    match git(runner, root, &["diff", "--cached"], LONG).await {
        Ok(staged) if staged.success() && !staged.stdout.trim().is_empty() => {
            parts.push("\n=== Staged Changes (will be committed) ===".to_string());
            parts.push(staged.stdout);
        }
        Ok(staged) if staged.success() => {
            parts.push("\n=== Staged Changes ===".to_string());
            parts.push("No staged changes found.".to_string());
        }
        Ok(_) => {}
        Err(e) => parts.push(format!("\nWarning: Could not get staged changes: {e}")),
    }
    if let Some(log) = git_context(runner, root, &["log", "-5", "--oneline"]).await {
        parts.push("\n=== Recent Commits ===".to_string());
        parts.push(log);
    }

    let mut cmd = vec!["commit"];
    if args.amend {
        cmd.push("--amend");
        if message.is_none() {
            cmd.push("--no-edit");
        }
    }
    if let Some(message) = message {
        cmd.extend(["-m", message]);
    }

    parts.push("\n=== Commit Result ===".to_string());
    let output = git(runner, root, &cmd, LONG).await?;
    if output.success() {
        parts.push(format!("Commit successful:\n{}", output.stdout));
    } else {
        let report = format!("{}{}", output.stdout, output.stderr);
        if report.contains("nothing to commit") || report.contains("no changes added to commit") {
            parts.push("Error: No changes staged for commit. Use git_add first.".to_string());
        } else {
            parts.push(ToolError::Git(output.stderr).to_string());
        }
    }
    Ok(parts.join("\n"))
}
