//! Best-effort allow/deny gate for filesystem paths handed to tools.
//!
//! This is not a sandbox: it stops obvious mistakes (system directories,
//! `..` escapes) and asks before touching anything outside the project.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::RegexSet;
use tracing::{debug, warn};

static SYSTEM_DIRS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^/etc(/|$)",
        r"(?i)^/private/etc(/|$)",
        r"(?i)^/sys(/|$)",
        r"(?i)^/proc(/|$)",
        r"(?i)^/dev(/|$)",
        r"(?i)^/root(/|$)",
        r"(?i)^/boot(/|$)",
        r"(?i)^/bin(/|$)",
        r"(?i)^/sbin(/|$)",
        r"(?i)^/lib(32|64)?(/|$)",
        r"(?i)^/usr/bin(/|$)",
        r"(?i)^/usr/sbin(/|$)",
        r"(?i)^/usr/lib(32|64)?(/|$)",
        r"(?i)^/System(/|$)",
        r"(?i)^/Library/System(/|$)",
        r"(?i)^[a-z]:[\\/]Windows([\\/]|$)",
        r"(?i)^[a-z]:[\\/]Program Files",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Outcome of validating one path argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    /// Inside the project root.
    Allowed(PathBuf),
    /// Outside the project root; the user has to confirm.
    NeedsConfirmation(PathBuf),
    Denied(String),
}

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `raw` for `operation` (used in denial messages).
    pub fn check(&self, raw: &str, operation: &str) -> PathVerdict {
        if Path::new(raw)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            warn!(path = raw, operation, "rejected path traversal");
            return PathVerdict::Denied(format!(
                "Security: {operation} denied. Path contains '..' traversal: {raw}"
            ));
        }

        let resolved = self.resolve(raw);
        let display_path = resolved.to_string_lossy().replace('\\', "/");
        if SYSTEM_DIRS.is_match(&display_path) || SYSTEM_DIRS.is_match(raw) {
            warn!(path = %display_path, operation, "rejected system directory");
            return PathVerdict::Denied(format!(
                "Security: {operation} denied. Cannot access system directory: {display_path}"
            ));
        }

        if resolved.starts_with(&self.root) {
            debug!(path = %display_path, "path inside project root");
            PathVerdict::Allowed(resolved)
        } else {
            PathVerdict::NeedsConfirmation(resolved)
        }
    }

    /// Absolute form of `raw`, following symlinks for the part that exists.
    fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let mut existing = joined.as_path();
        let mut rest = Vec::new();
        loop {
            if let Ok(canonical) = std::fs::canonicalize(existing) {
                let mut out = canonical;
                out.extend(rest.iter().rev());
                return out;
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    rest.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }

        joined
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
}
