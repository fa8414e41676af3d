use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{ToolError, ToolName};

fn current_dir() -> String {
    ".".to_string()
}

fn default_max_lines() -> usize {
    100
}

fn default_max_results() -> usize {
    20
}

fn default_max_count() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn head() -> String {
    "HEAD".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryArgs {
    #[serde(default = "current_dir")]
    pub path: String,
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    pub file_path: String,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindInFileArgs {
    pub file_path: String,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub use_regex: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindFileArgs {
    pub pattern: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFileArgs {
    pub file_path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditFileArgs {
    pub file_path: String,
    pub old_content: String,
    pub new_content: String,
}

/// Line numbers stay signed so out-of-range input gets a readable message
/// instead of a deserialization error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditFileLinesArgs {
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(default)]
    pub new_content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitDiffArgs {
    #[serde(default)]
    pub staged: bool,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitLogArgs {
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    #[serde(default = "default_true")]
    pub oneline: bool,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitShowArgs {
    #[serde(default = "head")]
    pub commit: String,
    #[serde(default)]
    pub stat: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitBranchArgs {
    #[serde(default)]
    pub list_all: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitFilesArgs {
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitCommitArgs {
    pub message: Option<String>,
    #[serde(default)]
    pub amend: bool,
}

/// A tool call with its arguments validated into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    GetWorkingDirectory,
    ListDirectory(ListDirectoryArgs),
    ReadFile(ReadFileArgs),
    FindInFile(FindInFileArgs),
    FindFileInProject(FindFileArgs),
    CreateFile(CreateFileArgs),
    EditFile(EditFileArgs),
    EditFileLines(EditFileLinesArgs),
    GitStatus,
    GitDiff(GitDiffArgs),
    GitLog(GitLogArgs),
    GitShow(GitShowArgs),
    GitBranch(GitBranchArgs),
    GitAdd(GitFilesArgs),
    GitReset(GitFilesArgs),
    GitCommit(GitCommitArgs),
}

fn decode<T: DeserializeOwned>(tool: ToolName, args: &Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| ToolError::InvalidArguments {
        tool: tool.as_str().to_string(),
        reason: e.to_string(),
    })
}

impl ToolInvocation {
    /// Validate `args` against `tool`'s argument shape. Unknown and missing
    /// required fields are rejected here, before anything runs.
    pub fn parse(tool: ToolName, args: &Map<String, Value>) -> Result<Self, ToolError> {
        Ok(match tool {
            ToolName::GetWorkingDirectory => {
                decode::<NoArgs>(tool, args)?;
                ToolInvocation::GetWorkingDirectory
            }
            ToolName::ListDirectory => ToolInvocation::ListDirectory(decode(tool, args)?),
            ToolName::ReadFile => ToolInvocation::ReadFile(decode(tool, args)?),
            ToolName::FindInFile => ToolInvocation::FindInFile(decode(tool, args)?),
            ToolName::FindFileInProject => ToolInvocation::FindFileInProject(decode(tool, args)?),
            ToolName::CreateFile => ToolInvocation::CreateFile(decode(tool, args)?),
            ToolName::EditFile => ToolInvocation::EditFile(decode(tool, args)?),
            ToolName::EditFileLines => ToolInvocation::EditFileLines(decode(tool, args)?),
            ToolName::GitStatus => {
                decode::<NoArgs>(tool, args)?;
                ToolInvocation::GitStatus
            }
            ToolName::GitDiff => ToolInvocation::GitDiff(decode(tool, args)?),
            ToolName::GitLog => ToolInvocation::GitLog(decode(tool, args)?),
            ToolName::GitShow => ToolInvocation::GitShow(decode(tool, args)?),
            ToolName::GitBranch => ToolInvocation::GitBranch(decode(tool, args)?),
            ToolName::GitAdd => ToolInvocation::GitAdd(decode(tool, args)?),
            ToolName::GitReset => ToolInvocation::GitReset(decode(tool, args)?),
            ToolName::GitCommit => ToolInvocation::GitCommit(decode(tool, args)?),
        })
    }

    /// Filesystem paths this call touches, each with the operation name used
    /// in path-gate messages.
    pub fn paths(&self) -> Vec<(&str, &'static str)> {
        match self {
            ToolInvocation::ListDirectory(a) => vec![(a.path.as_str(), "list directory")],
            ToolInvocation::ReadFile(a) => vec![(a.file_path.as_str(), "read file")],
            ToolInvocation::FindInFile(a) => vec![(a.file_path.as_str(), "search file")],
            ToolInvocation::CreateFile(a) => vec![(a.file_path.as_str(), "create file")],
            ToolInvocation::EditFile(a) => vec![(a.file_path.as_str(), "edit file")],
            ToolInvocation::EditFileLines(a) => vec![(a.file_path.as_str(), "edit file")],
            ToolInvocation::GitDiff(a) => a.file_path.iter().map(|p| (p.as_str(), "diff file")).collect(),
            ToolInvocation::GitLog(a) => a.file_path.iter().map(|p| (p.as_str(), "read file history")).collect(),
            ToolInvocation::GitAdd(a) => a.files.iter().map(|p| (p.as_str(), "stage file")).collect(),
            ToolInvocation::GitReset(a) => a.files.iter().map(|p| (p.as_str(), "unstage file")).collect(),
            ToolInvocation::GetWorkingDirectory
            | ToolInvocation::FindFileInProject(_)
            | ToolInvocation::GitStatus
            | ToolInvocation::GitShow(_)
            | ToolInvocation::GitBranch(_)
            | ToolInvocation::GitCommit(_) => Vec::new(),
        }
    }
}
