use std::fmt;

use serde::Serialize;

/// A single piece of negative evidence: an unpinned reference or an insecure
/// fetch-execute idiom found in one file.
///
/// Line numbers are best-effort. For shell findings they are relative to the
/// script text that was walked, which for Dockerfiles and workflow jobs is a
/// concatenation of the relevant instruction or step bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: String,
    pub line: usize,
    pub snippet: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.path, self.line, self.message, self.snippet
        )
    }
}
