use std::fmt;

use serde::Serialize;

use crate::finding::Finding;

/// Which validator produced a file's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dockerfile,
    Workflow,
    Shell,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Dockerfile => write!(f, "dockerfile"),
            FileKind::Workflow => write!(f, "workflow"),
            FileKind::Shell => write!(f, "shell"),
        }
    }
}

/// Per-file verdict plus the evidence behind it.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub kind: FileKind,
    pub all_pinned: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

/// Aggregated result of scanning one repository. Scoring arithmetic is the
/// consumer's business; this carries booleans and findings only.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub files: Vec<FileReport>,
}

impl ScanReport {
    pub fn all_pinned(&self) -> bool {
        self.files.iter().all(|f| f.all_pinned)
    }

    pub fn finding_count(&self) -> usize {
        self.files.iter().map(|f| f.findings.len()).sum()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.files.iter().flat_map(|f| f.findings.iter())
    }
}
