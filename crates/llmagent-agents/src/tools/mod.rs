pub mod approval;
mod args;
pub mod executor;
mod fs;
mod git;
pub mod process;

use serde_json::{Value, json};

use crate::providers::ToolDefinition;

pub use approval::{ApprovalSession, ApprovalStatus};
pub use args::ToolInvocation;
pub use executor::ToolExecutor;
pub use process::{CommandOutput, CommandRunner, SystemRunner};

/// Failure of a single tool call. Rendered to text and handed back to the
/// model; never surfaced to the host as an error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution blocked: {0}")]
    Blocked(String),

    /// Path gate refusal, already phrased for the model.
    #[error("{0}")]
    PathDenied(String),

    #[error("Tool execution timed out: {0}")]
    Timeout(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("{0}")]
    Failed(String),

    #[error("Error running command: {0}")]
    Io(#[from] std::io::Error),
}

/// The closed set of tools the agent may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetWorkingDirectory,
    ListDirectory,
    ReadFile,
    FindInFile,
    FindFileInProject,
    CreateFile,
    EditFile,
    EditFileLines,
    GitStatus,
    GitDiff,
    GitLog,
    GitShow,
    GitBranch,
    GitAdd,
    GitReset,
    GitCommit,
}

impl ToolName {
    pub const ALL: [ToolName; 16] = [
        ToolName::GetWorkingDirectory,
        ToolName::ListDirectory,
        ToolName::ReadFile,
        ToolName::FindInFile,
        ToolName::FindFileInProject,
        ToolName::CreateFile,
        ToolName::EditFile,
        ToolName::EditFileLines,
        ToolName::GitStatus,
        ToolName::GitDiff,
        ToolName::GitLog,
        ToolName::GitShow,
        ToolName::GitBranch,
        ToolName::GitAdd,
        ToolName::GitReset,
        ToolName::GitCommit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetWorkingDirectory => "get_working_directory",
            ToolName::ListDirectory => "list_directory",
            ToolName::ReadFile => "read_file",
            ToolName::FindInFile => "find_in_file",
            ToolName::FindFileInProject => "find_file_in_project",
            ToolName::CreateFile => "create_file",
            ToolName::EditFile => "edit_file",
            ToolName::EditFileLines => "edit_file_lines",
            ToolName::GitStatus => "git_status",
            ToolName::GitDiff => "git_diff",
            ToolName::GitLog => "git_log",
            ToolName::GitShow => "git_show",
            ToolName::GitBranch => "git_branch",
            ToolName::GitAdd => "git_add",
            ToolName::GitReset => "git_reset",
            ToolName::GitCommit => "git_commit",
        }
    }

    pub fn parse(name: &str) -> Result<Self, ToolError> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::GetWorkingDirectory => {
                "Get the project root directory. Use this to learn where relative paths are resolved."
            }
            ToolName::ListDirectory => {
                "List the files and directories at a path. Use this to explore the project layout."
            }
            ToolName::ReadFile => "Read a text file and return its first lines.",
            ToolName::FindInFile => {
                "Search one file for a text pattern with grep. Returns matching lines with line numbers."
            }
            ToolName::FindFileInProject => {
                "Find files in the project by name pattern (wildcards such as *.rs or *test* are supported)."
            }
            ToolName::CreateFile => {
                "Create a file with the given content. Parent directories are created as needed."
            }
            ToolName::EditFile => {
                "Edit a file by replacing one exact occurrence of old_content with new_content. \
                 The match must include whitespace exactly."
            }
            ToolName::EditFileLines => {
                "Replace a range of lines in a file. Line numbers are 1-based and BOTH start_line \
                 and end_line are INCLUSIVE: start_line=5, end_line=7 replaces lines 5, 6 and 7. \
                 Use the same number twice to replace a single line."
            }
            ToolName::GitStatus => {
                "Show the git working tree status together with the five most recent commits."
            }
            ToolName::GitDiff => "Show unstaged changes, or staged changes when staged is true.",
            ToolName::GitLog => "Show commit history, optionally for a single path.",
            ToolName::GitShow => "Show a commit with its diff, or only its file summary when stat is true.",
            ToolName::GitBranch => "Show the current branch, or every branch when list_all is true.",
            ToolName::GitAdd => "Stage files for the next commit. Use [\".\"] to stage everything.",
            ToolName::GitReset => {
                "Unstage files without touching the working tree. An empty list unstages everything."
            }
            ToolName::GitCommit => "Commit the staged changes.",
        }
    }

    pub fn input_schema(&self) -> Value {
        match self {
            ToolName::GetWorkingDirectory | ToolName::GitStatus => json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            ToolName::ListDirectory => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory to list, absolute or relative to the project root. Use '.' for the root."
                    },
                    "show_hidden": {
                        "type": "boolean",
                        "description": "Include entries starting with '.'. Default: false",
                        "default": false
                    }
                },
                "required": ["path"]
            }),
            ToolName::ReadFile => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to read, absolute or relative to the project root"
                    },
                    "max_lines": {
                        "type": "integer",
                        "description": "Maximum number of lines to return (default: 100)",
                        "default": 100
                    }
                },
                "required": ["file_path"]
            }),
            ToolName::FindInFile => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to search"
                    },
                    "pattern": {
                        "type": "string",
                        "description": "Text, or an extended regex when use_regex is true"
                    },
                    "case_sensitive": {
                        "type": "boolean",
                        "description": "Match case exactly (default: false)",
                        "default": false
                    },
                    "use_regex": {
                        "type": "boolean",
                        "description": "Treat pattern as an extended regex instead of a fixed string (default: false)",
                        "default": false
                    }
                },
                "required": ["file_path", "pattern"]
            }),
            ToolName::FindFileInProject => json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "File name pattern, e.g. '*.rs' or '*config*'"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of paths to return (default: 20)",
                        "default": 20
                    }
                },
                "required": ["pattern"]
            }),
            ToolName::CreateFile => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Where to create the file"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content of the new file"
                    },
                    "overwrite": {
                        "type": "boolean",
                        "description": "Replace the file if it already exists (default: false)",
                        "default": false
                    }
                },
                "required": ["file_path", "content"]
            }),
            ToolName::EditFile => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to edit"
                    },
                    "old_content": {
                        "type": "string",
                        "description": "Exact text to replace, including whitespace"
                    },
                    "new_content": {
                        "type": "string",
                        "description": "Replacement text"
                    }
                },
                "required": ["file_path", "old_content", "new_content"]
            }),
            ToolName::EditFileLines => json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to edit"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "First line to replace (1-based, INCLUSIVE)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Last line to replace (1-based, INCLUSIVE, >= start_line)"
                    },
                    "new_content": {
                        "type": "string",
                        "description": "Text that replaces every line from start_line through end_line"
                    }
                },
                "required": ["file_path", "start_line", "end_line", "new_content"]
            }),
            ToolName::GitDiff => json!({
                "type": "object",
                "properties": {
                    "staged": {
                        "type": "boolean",
                        "description": "Show staged changes (git diff --cached). Default: false",
                        "default": false
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Optional: limit the diff to one path"
                    }
                },
                "required": []
            }),
            ToolName::GitLog => json!({
                "type": "object",
                "properties": {
                    "max_count": {
                        "type": "integer",
                        "description": "Maximum number of commits (default: 10)",
                        "default": 10
                    },
                    "oneline": {
                        "type": "boolean",
                        "description": "Compact one-line format (default: true)",
                        "default": true
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Optional: history of one path"
                    }
                },
                "required": []
            }),
            ToolName::GitShow => json!({
                "type": "object",
                "properties": {
                    "commit": {
                        "type": "string",
                        "description": "Commit hash, branch or reference such as 'HEAD~1' (default: HEAD)",
                        "default": "HEAD"
                    },
                    "stat": {
                        "type": "boolean",
                        "description": "Only list changed files (default: false)",
                        "default": false
                    }
                },
                "required": []
            }),
            ToolName::GitBranch => json!({
                "type": "object",
                "properties": {
                    "list_all": {
                        "type": "boolean",
                        "description": "List local and remote branches instead of the current one (default: false)",
                        "default": false
                    }
                },
                "required": []
            }),
            ToolName::GitAdd => json!({
                "type": "object",
                "properties": {
                    "files": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Paths to stage"
                    }
                },
                "required": ["files"]
            }),
            ToolName::GitReset => json!({
                "type": "object",
                "properties": {
                    "files": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Paths to unstage. Empty unstages everything."
                    }
                },
                "required": []
            }),
            ToolName::GitCommit => json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Commit message"
                    },
                    "amend": {
                        "type": "boolean",
                        "description": "Amend the previous commit (default: false)",
                        "default": false
                    }
                },
                "required": ["message"]
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarations for every tool, in a stable order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}
