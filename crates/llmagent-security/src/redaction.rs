use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// A writer that redacts provider credentials from log output.
pub struct RedactingWriter<W> {
    inner: W,
}

/// Append-mode log file shared by every writer handed out by the subscriber.
#[derive(Clone)]
pub struct SharedFile(Arc<Mutex<File>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

impl RedactingWriter<SharedFile> {
    /// Open (or create) `path` for appending, e.g. the project's `debug.log`.
    pub fn append_to(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: SharedFile(Arc::new(Mutex::new(file))),
        })
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        let redacted = redact_secrets(&original);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<SharedFile> {
    type Writer = RedactingWriter<SharedFile>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Replace known API key patterns with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    static PATTERNS: std::sync::LazyLock<Option<regex::Regex>> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r"(?x)
              sk-ant-\S{10,}             # Anthropic API keys
            | sk-or-\S{10,}              # OpenRouter keys
            | sk-\S{20,}                 # OpenAI-style keys
            | AIza[0-9A-Za-z_\-]{30,}    # Google / Gemini keys
            | (?i:bearer)\s+[A-Za-z0-9._\-]{20,}
            | key=[A-Za-z0-9_\-]{20,}    # query-string keys
            ",
        )
        .ok()
    });

    match PATTERNS.as_ref() {
        Some(re) => re.replace_all(input, "[REDACTED]").into_owned(),
        None => input.to_string(),
    }
}
