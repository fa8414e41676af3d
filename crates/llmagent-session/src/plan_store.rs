use std::path::{Path, PathBuf};

use llmagent_common::{Error, Result};
use tracing::info;

use crate::strip_metadata;

/// The single approved plan of a project, kept in `plan.md`.
#[derive(Debug, Clone)]
pub struct PlanStore {
    path: PathBuf,
}

impl PlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the active plan.
    pub fn save(&self, plan: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        std::fs::write(
            &self.path,
            format!("<!-- Plan saved at: {stamp} -->\n\n{}\n", plan.trim()),
        )?;
        info!("plan saved to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let plan = strip_metadata(&text);
                Ok((!plan.is_empty()).then_some(plan))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Remove the plan; returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("plan cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
