//! Filesystem tools. Paths are resolved against the project root; messages
//! echo the path exactly as the model wrote it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::ToolError;
use super::args::{
    CreateFileArgs, EditFileArgs, EditFileLinesArgs, FindFileArgs, FindInFileArgs,
    ListDirectoryArgs, ReadFileArgs,
};
use super::process::CommandRunner;

const GREP_TIMEOUT: Duration = Duration::from_secs(5);
const FIND_TIMEOUT: Duration = Duration::from_secs(10);

fn resolve(root: &Path, raw: &str) -> PathBuf {
    root.join(raw)
}

fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{size} bytes")
    } else {
        format!("{:.1} KB", size as f64 / 1024.0)
    }
}

pub fn get_working_directory(root: &Path) -> String {
    format!("Current working directory: {}", root.display())
}

pub async fn list_directory(root: &Path, args: &ListDirectoryArgs) -> Result<String, ToolError> {
    let path = &args.path;
    let dir = resolve(root, path);
    let meta = match tokio::fs::metadata(&dir).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ToolError::Failed(format!("Directory not found: {path}")));
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(ToolError::Failed(format!(
                "Permission denied accessing directory: {path}"
            )));
        }
        Err(e) => return Err(ToolError::Failed(format!("Error listing directory: {e}"))),
    };
    if !meta.is_dir() {
        return Err(ToolError::Failed(format!("Not a directory: {path}")));
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| ToolError::Failed(format!("Error listing directory: {e}")))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ToolError::Failed(format!("Error listing directory: {e}")))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !args.show_hidden && name.starts_with('.') {
            continue;
        }
        // Follow symlinks so a linked directory lists as a directory.
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_dir() => dirs.push(name),
            Ok(meta) if meta.is_file() => files.push((name, Some(meta.len()))),
            Ok(_) => {}
            Err(_) => files.push((name, None)),
        }
    }

    if dirs.is_empty() && files.is_empty() {
        return Ok(format!("Directory is empty: {path}"));
    }
    dirs.sort();
    files.sort();

    let mut lines = vec![format!(
        "Listing {path} ({} directories, {} files):\n",
        dirs.len(),
        files.len()
    )];
    if !dirs.is_empty() {
        lines.push("Directories:".to_string());
        lines.extend(dirs.iter().map(|d| format!("  {d}/")));
    }
    if !files.is_empty() {
        if !dirs.is_empty() {
            lines.push(String::new());
        }
        lines.push("Files:".to_string());
        lines.extend(files.iter().map(|(name, size)| match size {
            Some(size) => format!("  {name} ({})", format_size(*size)),
            None => format!("  {name}"),
        }));
    }
    Ok(lines.join("\n"))
}

pub async fn read_file(root: &Path, args: &ReadFileArgs) -> Result<String, ToolError> {
    let path = &args.file_path;
    let text = match tokio::fs::read_to_string(resolve(root, path)).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ToolError::Failed(format!("File not found: {path}")));
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(ToolError::Failed(format!("Permission denied reading file: {path}")));
        }
        Err(e) => return Err(ToolError::Failed(format!("Error reading file: {e}"))),
    };

    let mut lines: Vec<&str> = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if i >= args.max_lines {
            break;
        }
        lines.push(line.trim_end());
    }
    let mut out = lines.join("\n");
    if text.lines().nth(args.max_lines).is_some() {
        out.push_str(&format!("\n... (truncated at {} lines)", args.max_lines));
    }
    out.push('\n');
    Ok(out)
}

pub async fn find_in_file(
    runner: &dyn CommandRunner,
    root: &Path,
    args: &FindInFileArgs,
) -> Result<String, ToolError> {
    let mut cmd = vec!["-n".to_string()];
    cmd.push(if args.use_regex { "-E" } else { "-F" }.to_string());
    if !args.case_sensitive {
        cmd.push("-i".to_string());
    }
    cmd.extend(["-e".to_string(), args.pattern.clone(), args.file_path.clone()]);

    let output = runner.run("grep", &cmd, root, GREP_TIMEOUT).await?;
    match output.code {
        Some(0) => Ok(output.stdout.trim().to_string()),
        Some(1) => Ok(format!(
            "No matches found for '{}' in {}",
            args.pattern, args.file_path
        )),
        _ => {
            let stderr = output.stderr.trim();
            let lower = stderr.to_lowercase();
            if lower.contains("invalid") || lower.contains("unmatched") {
                Err(ToolError::Failed(format!(
                    "Invalid regex pattern '{}'. Error: {stderr}",
                    args.pattern
                )))
            } else {
                Err(ToolError::Failed(format!("Error searching file: {stderr}")))
            }
        }
    }
}

pub async fn find_file_in_project(
    runner: &dyn CommandRunner,
    root: &Path,
    args: &FindFileArgs,
) -> Result<String, ToolError> {
    let cmd: Vec<String> = [".", "-name", args.pattern.as_str(), "-type", "f"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let output = runner.run("find", &cmd, root, FIND_TIMEOUT).await?;
    if !output.success() {
        return Err(ToolError::Failed(format!(
            "Error finding files: {}",
            output.stderr.trim()
        )));
    }

    let mut files: Vec<&str> = output.stdout.lines().filter(|l| !l.is_empty()).collect();
    if files.is_empty() {
        return Ok(format!("No files found matching pattern: {}\n", args.pattern));
    }
    if files.len() > args.max_results {
        files.truncate(args.max_results);
        return Ok(format!(
            "{}\n... ({} results shown, more available)\n",
            files.join("\n"),
            files.len()
        ));
    }
    Ok(files.join("\n"))
}

pub async fn create_file(root: &Path, args: &CreateFileArgs) -> Result<String, ToolError> {
    let path = &args.file_path;
    let target = resolve(root, path);
    let write_err = |e: std::io::Error| match e.kind() {
        ErrorKind::PermissionDenied => {
            ToolError::Failed(format!("Permission denied creating file: {path}"))
        }
        _ => ToolError::Failed(format!("Error creating file: {e}")),
    };

    if tokio::fs::try_exists(&target).await.unwrap_or(false) && !args.overwrite {
        return Err(ToolError::Failed(format!(
            "File already exists: {path}. Set overwrite=true to replace it."
        )));
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(&target, &args.content).await.map_err(write_err)?;

    debug!(path = %target.display(), bytes = args.content.len(), "file written");
    Ok(format!(
        "Successfully created file: {path} ({} characters)",
        args.content.chars().count()
    ))
}

async fn read_for_edit(target: &Path, path: &str) -> Result<String, ToolError> {
    tokio::fs::read_to_string(target).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ToolError::Failed(format!("File not found: {path}")),
        ErrorKind::PermissionDenied => {
            ToolError::Failed(format!("Permission denied editing file: {path}"))
        }
        _ => ToolError::Failed(format!("Error editing file: {e}")),
    })
}

async fn write_edit(target: &Path, path: &str, content: &str) -> Result<(), ToolError> {
    tokio::fs::write(target, content).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => {
            ToolError::Failed(format!("Permission denied editing file: {path}"))
        }
        _ => ToolError::Failed(format!("Error editing file: {e}")),
    })
}

pub async fn edit_file(root: &Path, args: &EditFileArgs) -> Result<String, ToolError> {
    let path = &args.file_path;
    let target = resolve(root, path);
    let content = read_for_edit(&target, path).await?;

    match content.matches(args.old_content.as_str()).count() {
        0 => {
            return Err(ToolError::Failed(format!(
                "Content not found in {path}. The exact content must match including whitespace."
            )));
        }
        1 => {}
        n => {
            return Err(ToolError::Failed(format!(
                "Found {n} occurrences of the content in {path}. Please provide more specific \
                 content to replace (include more surrounding context)."
            )));
        }
    }

    let updated = content.replacen(&args.old_content, &args.new_content, 1);
    write_edit(&target, path, &updated).await?;
    Ok(format!(
        "Successfully edited {path}: replaced {} characters with {} characters",
        args.old_content.chars().count(),
        args.new_content.chars().count()
    ))
}

/// Replace lines `start..=end` (1-based) of `content` with `replacement`.
///
/// The last replacement line gets a newline when more lines follow, or when
/// either the replacement or the replaced tail ended with one.
pub(crate) fn replace_lines(
    content: &str,
    start: usize,
    end: usize,
    replacement: &str,
) -> (String, usize) {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let total = lines.len();
    let (start_idx, end_idx) = (start - 1, end - 1);

    let mut new_lines: Vec<&str> = if replacement.is_empty() {
        Vec::new()
    } else {
        replacement.split('\n').collect()
    };
    let trailing_newline = new_lines.last() == Some(&"");
    if trailing_newline {
        new_lines.pop();
    }

    let mut out = String::with_capacity(content.len() + replacement.len());
    for line in &lines[..start_idx] {
        out.push_str(line);
    }
    let count = new_lines.len();
    for (i, line) in new_lines.iter().enumerate() {
        out.push_str(line);
        let is_last = i + 1 == count;
        let newline = !is_last
            || end_idx + 1 < total
            || trailing_newline
            || lines[end_idx].ends_with('\n');
        if newline {
            out.push('\n');
        }
    }
    for line in &lines[end_idx + 1..] {
        out.push_str(line);
    }
    (out, count)
}

pub async fn edit_file_lines(root: &Path, args: &EditFileLinesArgs) -> Result<String, ToolError> {
    let path = &args.file_path;
    let (start, end) = (args.start_line, args.end_line);
    if start < 1 {
        return Err(ToolError::Failed(format!(
            "Invalid start_line: {start}. Line numbers must be >= 1."
        )));
    }
    if end < start {
        return Err(ToolError::Failed(format!(
            "Invalid line range: end_line ({end}) must be >= start_line ({start})."
        )));
    }

    let target = resolve(root, path);
    let content = read_for_edit(&target, path).await?;
    let total = content.split_inclusive('\n').count() as i64;
    if start > total {
        return Err(ToolError::Failed(format!(
            "start_line ({start}) exceeds file length ({total} lines)."
        )));
    }
    if end > total {
        return Err(ToolError::Failed(format!(
            "end_line ({end}) exceeds file length ({total} lines)."
        )));
    }

    debug!(path = %path, start, end, "replacing line range");
    let (updated, added) = replace_lines(&content, start as usize, end as usize, &args.new_content);
    write_edit(&target, path, &updated).await?;
    Ok(format!(
        "Successfully edited {path}: replaced lines {start} through {end} inclusive \
         ({} line(s) removed, {added} line(s) added)",
        end - start + 1
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn list_directory_groups_dirs_before_files() {
        let dir = project();
        let out = list_directory(
            dir.path(),
            &ListDirectoryArgs {
                path: ".".into(),
                show_hidden: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            out,
            "Listing . (1 directories, 1 files):\n\nDirectories:\n  src/\n\nFiles:\n  README.md (6 bytes)"
        );
    }

    #[tokio::test]
    async fn list_directory_can_show_hidden_entries() {
        let dir = project();
        let out = list_directory(
            dir.path(),
            &ListDirectoryArgs {
                path: ".".into(),
                show_hidden: true,
            },
        )
        .await
        .unwrap();
        assert!(out.contains("  .env (9 bytes)"));
    }

    #[tokio::test]
    async fn list_directory_reports_missing_and_empty() {
        let dir = project();
        let missing = list_directory(
            dir.path(),
            &ListDirectoryArgs {
                path: "nope".into(),
                show_hidden: false,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(missing.to_string(), "Directory not found: nope");

        let empty = list_directory(
            dir.path(),
            &ListDirectoryArgs {
                path: "src".into(),
                show_hidden: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(empty, "Directory is empty: src");
    }

    #[tokio::test]
    async fn read_file_truncates_after_max_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo  \nthree\n").unwrap();
        let out = read_file(
            dir.path(),
            &ReadFileArgs {
                file_path: "a.txt".into(),
                max_lines: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(out, "one\ntwo\n... (truncated at 2 lines)\n");

        let whole = read_file(
            dir.path(),
            &ReadFileArgs {
                file_path: "a.txt".into(),
                max_lines: 3,
            },
        )
        .await
        .unwrap();
        assert_eq!(whole, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn create_file_refuses_to_clobber() {
        let dir = project();
        let args = CreateFileArgs {
            file_path: "README.md".into(),
            content: "replaced".into(),
            overwrite: false,
        };
        let err = create_file(dir.path(), &args).await.unwrap_err();
        assert!(err.to_string().starts_with("File already exists: README.md"));

        let args = CreateFileArgs {
            overwrite: true,
            ..args
        };
        create_file(dir.path(), &args).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("README.md")).unwrap(), "replaced");
    }

    #[tokio::test]
    async fn create_file_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let out = create_file(
            dir.path(),
            &CreateFileArgs {
                file_path: "a/b/c.txt".into(),
                content: "héllo".into(),
                overwrite: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(out, "Successfully created file: a/b/c.txt (5 characters)");
        assert!(dir.path().join("a/b/c.txt").is_file());
    }

    #[tokio::test]
    async fn edit_file_requires_a_single_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.rs"), "let a = 1;\nlet a = 1;\nlet b = 2;\n").unwrap();

        let ambiguous = edit_file(
            dir.path(),
            &EditFileArgs {
                file_path: "f.rs".into(),
                old_content: "let a = 1;".into(),
                new_content: "let a = 3;".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(ambiguous.to_string().starts_with("Found 2 occurrences"));

        let missing = edit_file(
            dir.path(),
            &EditFileArgs {
                file_path: "f.rs".into(),
                old_content: "let c".into(),
                new_content: "x".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(missing.to_string().starts_with("Content not found in f.rs"));

        let ok = edit_file(
            dir.path(),
            &EditFileArgs {
                file_path: "f.rs".into(),
                old_content: "let b = 2;".into(),
                new_content: "let b = 20;".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(ok, "Successfully edited f.rs: replaced 10 characters with 11 characters");
        assert!(std::fs::read_to_string(dir.path().join("f.rs")).unwrap().ends_with("let b = 20;\n"));
    }

    #[test]
    fn replace_lines_in_the_middle_keeps_following_lines() {
        let (out, added) = replace_lines("a\nb\nc\nd\n", 2, 3, "x\ny\nz");
        assert_eq!(out, "a\nx\ny\nz\nd\n");
        assert_eq!(added, 3);
    }

    #[test]
    fn replace_last_line_follows_original_newline() {
        assert_eq!(replace_lines("a\nb", 2, 2, "c").0, "a\nc");
        assert_eq!(replace_lines("a\nb\n", 2, 2, "c").0, "a\nc\n");
        assert_eq!(replace_lines("a\nb", 2, 2, "c\n").0, "a\nc\n");
    }

    #[test]
    fn replace_with_empty_content_deletes_lines() {
        let (out, added) = replace_lines("a\nb\nc\n", 2, 2, "");
        assert_eq!(out, "a\nc\n");
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn edit_file_lines_validates_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "1\n2\n3\n").unwrap();
        let args = |start, end| EditFileLinesArgs {
            file_path: "f.txt".into(),
            start_line: start,
            end_line: end,
            new_content: "x".into(),
        };

        let err = edit_file_lines(dir.path(), &args(0, 1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid start_line: 0. Line numbers must be >= 1.");
        let err = edit_file_lines(dir.path(), &args(3, 2)).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid line range"));
        let err = edit_file_lines(dir.path(), &args(2, 4)).await.unwrap_err();
        assert_eq!(err.to_string(), "end_line (4) exceeds file length (3 lines).");

        let ok = edit_file_lines(dir.path(), &args(2, 3)).await.unwrap();
        assert!(ok.contains("(2 line(s) removed, 1 line(s) added)"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "1\nx\n");
    }
}
