use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use llmagent_common::{Error, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::strip_metadata;

static CUTOFF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"cutoff_byte:\s*(\d+)").ok());

/// Number of leading lines searched for the metadata block.
const METADATA_SCAN_LINES: usize = 10;

/// Rolling conversation summary with its history cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Summary text without the metadata header.
    pub body: String,
    /// Bytes of `history.txt` already folded into `body`.
    pub cutoff: u64,
}

impl Summary {
    pub fn parse(text: &str) -> Self {
        let header: String = text
            .lines()
            .take(METADATA_SCAN_LINES)
            .collect::<Vec<_>>()
            .join("\n");
        let cutoff = CUTOFF
            .as_ref()
            .and_then(|re| re.captures(&header))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Self {
            body: strip_metadata(text),
            cutoff,
        }
    }

    pub fn render(&self, last_updated: &str) -> String {
        format!(
            "<!-- SUMMARY_METADATA\ncutoff_byte: {}\nlast_updated: {}\n-->\n\n{}\n",
            self.cutoff,
            last_updated,
            self.body.trim_end()
        )
    }
}

#[derive(Debug, Clone)]
pub struct SummaryFile {
    path: PathBuf,
}

impl SummaryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Summary>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(Summary::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Cutoff of the stored summary; unreadable or missing files count as 0.
    pub fn cutoff(&self) -> u64 {
        match self.load() {
            Ok(summary) => summary.map(|s| s.cutoff).unwrap_or(0),
            Err(e) => {
                warn!("failed to read summary cutoff: {e}");
                0
            }
        }
    }

    /// Write `summary`. The cutoff never moves backwards.
    pub fn save(&self, summary: &Summary) -> Result<()> {
        let previous = self.cutoff();
        if summary.cutoff < previous {
            return Err(Error::Storage(format!(
                "summary cutoff would decrease from {previous} to {}",
                summary.cutoff
            )));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        std::fs::write(&self.path, summary.render(&today))?;
        debug!(cutoff = summary.cutoff, "summary saved");
        Ok(())
    }
}
