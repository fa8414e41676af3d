use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use llmagent_common::{Error, Result, Role};
use tracing::debug;

/// Separator that opens every framed turn in `history.txt`.
pub const TURN_SEPARATOR: &str = "\n\n\x01>>>";
const ROLE_TERMINATOR: &str = ":\x01\n";

/// Newest turns kept regardless of the token budget.
pub const MIN_RECENT_TURNS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Inputs of the running budget used when windowing history.
#[derive(Debug, Clone, Copy)]
pub struct HistoryBudget {
    pub model_limit: usize,
    pub max_tokens: usize,
    pub prompt_len: usize,
    pub system_len: usize,
}

impl HistoryBudget {
    fn initial(&self) -> i64 {
        self.model_limit as i64
            - self.max_tokens as i64
            - self.prompt_len as i64
            - self.system_len as i64
    }
}

/// Role marker, e.g. `\n\n\x01>>>User:\x01\n`.
pub fn turn_marker(role: Role) -> String {
    let label = match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Tool => "Tool",
    };
    format!("{TURN_SEPARATOR}{label}{ROLE_TERMINATOR}")
}

/// Append-only transcript of turns.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_turn(&self, role: Role, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(turn_marker(role).as_bytes())?;
        file.write_all(text.as_bytes())?;
        debug!(role = role.as_str(), bytes = text.len(), "appended history turn");
        Ok(())
    }

    /// Size in bytes; a missing file is empty.
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Decode bytes `[start, end)`; `None` reads to the end of the file.
    pub fn read_range(&self, start: u64, end: Option<u64>) -> Result<String> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let len = file.metadata()?.len();
        let start = start.min(len);
        let end = end.unwrap_or(len).clamp(start, len);

        file.seek(SeekFrom::Start(start))?;
        let mut bytes = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut bytes)?;
        Ok(decode_fragment(&bytes))
    }

    /// All turns after `cutoff`, oldest first.
    pub fn load_turns(&self, cutoff: u64) -> Result<Vec<HistoryTurn>> {
        Ok(parse_turns(&self.read_range(cutoff, None)?))
    }

    /// Turns after `cutoff` trimmed to `budget`, oldest first.
    pub fn load_bounded(&self, cutoff: u64, budget: &HistoryBudget) -> Result<Vec<HistoryTurn>> {
        let turns = self.load_turns(cutoff)?;
        let total = turns.len();
        let kept = bound_turns(turns, budget);
        debug!(total, kept = kept.len(), cutoff, "loaded bounded history");
        Ok(kept)
    }
}

/// Decode a byte slice cut at arbitrary offsets: a partial UTF-8 sequence at
/// either edge is dropped, invalid bytes in the middle become U+FFFD.
pub fn decode_fragment(bytes: &[u8]) -> String {
    let lead = bytes
        .iter()
        .take_while(|b| (**b & 0xC0) == 0x80)
        .count();
    let mut body = &bytes[lead..];
    if let Err(e) = std::str::from_utf8(body) {
        if e.error_len().is_none() {
            body = &body[..e.valid_up_to()];
        }
    }
    String::from_utf8_lossy(body).into_owned()
}

/// Split framed history text into turns, oldest first. Fragments without a
/// recognizable role header are skipped.
pub fn parse_turns(text: &str) -> Vec<HistoryTurn> {
    text.split(TURN_SEPARATOR)
        .filter_map(|chunk| {
            let (label, content) = chunk.split_once(ROLE_TERMINATOR)?;
            let role = Role::parse(label)?;
            Some(HistoryTurn {
                role,
                content: content.trim_end().to_string(),
            })
        })
        .collect()
}

/// Keep the newest [`MIN_RECENT_TURNS`] unconditionally, then older turns
/// while the remaining budget stays positive.
pub fn bound_turns(turns: Vec<HistoryTurn>, budget: &HistoryBudget) -> Vec<HistoryTurn> {
    let mut remaining = budget.initial();
    let mut kept: Vec<HistoryTurn> = Vec::new();

    for (i, turn) in turns.into_iter().rev().enumerate() {
        let len = turn.content.chars().count() as i64;
        if i < MIN_RECENT_TURNS {
            remaining -= len;
            kept.push(turn);
            continue;
        }
        remaining -= len;
        if remaining <= 0 {
            break;
        }
        kept.push(turn);
    }

    kept.reverse();
    kept
}
