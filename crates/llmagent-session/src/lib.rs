pub mod history;
pub mod plan_store;
pub mod session_store;
pub mod summary;

pub use history::{HistoryBudget, HistoryLog, HistoryTurn, MIN_RECENT_TURNS};
pub use plan_store::PlanStore;
pub use session_store::SessionStore;
pub use summary::{Summary, SummaryFile};

use std::sync::LazyLock;

use regex::Regex;

static METADATA_COMMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->[ \t]*\r?\n?").ok());

/// Remove `<!-- ... -->` metadata blocks from a stored file.
pub fn strip_metadata(text: &str) -> String {
    match METADATA_COMMENT.as_ref() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}
