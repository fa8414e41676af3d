pub mod path_guard;
pub mod redaction;

pub use path_guard::{PathGuard, PathVerdict};
pub use redaction::{RedactingWriter, SharedFile, redact_secrets};
