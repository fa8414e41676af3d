use std::path::{Path, PathBuf};

use llmagent_common::Result;
use tracing::{info, warn};

use crate::history::HistoryLog;
use crate::plan_store::PlanStore;
use crate::strip_metadata;
use crate::summary::SummaryFile;

pub const PROJECT_DIR_NAME: &str = ".vim-llm-agent";
pub const LEGACY_PROJECT_DIR_NAME: &str = ".vim-chatgpt";

/// Per-project session directory holding history, summary, plan and context.
#[derive(Debug, Clone)]
pub struct SessionStore {
    project_root: PathBuf,
    dir: PathBuf,
}

impl SessionStore {
    /// Open (creating if needed) the session directory under `project_root`.
    pub fn open(project_root: &Path) -> Result<Self> {
        let dir = Self::resolve_dir(project_root);
        std::fs::create_dir_all(&dir)?;
        info!("opening session store at {}", dir.display());
        Ok(Self {
            project_root: project_root.to_path_buf(),
            dir,
        })
    }

    /// `.vim-llm-agent`, or the legacy `.vim-chatgpt` when only that exists.
    pub fn resolve_dir(project_root: &Path) -> PathBuf {
        let current = project_root.join(PROJECT_DIR_NAME);
        let legacy = project_root.join(LEGACY_PROJECT_DIR_NAME);
        if !current.exists() && legacy.is_dir() {
            return legacy;
        }
        current
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history(&self) -> HistoryLog {
        HistoryLog::new(self.dir.join("history.txt"))
    }

    pub fn summary(&self) -> SummaryFile {
        SummaryFile::new(self.dir.join("summary.md"))
    }

    pub fn plan(&self) -> PlanStore {
        PlanStore::new(self.dir.join("plan.md"))
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.dir.join("debug.log")
    }

    /// Project analysis written by an external tool; best effort.
    pub fn load_context(&self) -> Option<String> {
        let path = self.dir.join("context.md");
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(strip_metadata(&text)).filter(|c| !c.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_project_dir() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        assert!(store.dir().ends_with(PROJECT_DIR_NAME));
        assert!(store.dir().is_dir());
        assert_eq!(store.history().path(), store.dir().join("history.txt"));
    }

    #[test]
    fn legacy_dir_is_reused() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join(LEGACY_PROJECT_DIR_NAME)).unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        assert!(store.dir().ends_with(LEGACY_PROJECT_DIR_NAME));
    }

    #[test]
    fn context_is_optional_and_stripped() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::open(root.path()).unwrap();
        assert!(store.load_context().is_none());

        std::fs::write(
            store.dir().join("context.md"),
            "<!-- Context generated at: 2026-03-01 -->\n\n# Project\nRust workspace\n",
        )
        .unwrap();
        assert_eq!(store.load_context().as_deref(), Some("# Project\nRust workspace"));
    }
}
