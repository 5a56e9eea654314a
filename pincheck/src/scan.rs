//! File-scan orchestration.
//!
//! Routes repository files to the right validator by path pattern, fans the
//! work out concurrently (each file gets fresh validator state, so files are
//! independent), and aggregates per-file verdicts into a [`ScanReport`].

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::dockerfile;
use crate::provider::FileProvider;
use crate::report::{FileKind, FileReport, ScanReport};
use crate::shell;
use crate::workflow;

const WORKFLOW_PATTERN: &str = ".github/workflows/*";
const DOCKERFILE_PATTERN: &str = "*dockerfile*";

pub struct ScanOptions {
    pub max_concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
        }
    }
}

/// Scan every file the provider lists. Structural errors (a Dockerfile with
/// no `FROM`, an unparsable workflow) abort the scan: such a file cannot be
/// scored, and a low score would misrepresent it.
pub async fn scan_repository(
    provider: Arc<dyn FileProvider>,
    options: &ScanOptions,
) -> Result<ScanReport> {
    let paths = provider.list_files().await?;
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency));

    let tasks: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let provider = provider.clone();
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                validate_file(provider.as_ref(), &path).await
            }
        })
        .collect();

    let mut files = Vec::new();
    for result in join_all(tasks).await {
        if let Some(report) = result? {
            files.push(report);
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanReport { files })
}

#[instrument(skip(provider))]
async fn validate_file(provider: &dyn FileProvider, path: &str) -> Result<Option<FileReport>> {
    let content = provider
        .file_content(path)
        .await
        .with_context(|| format!("failed to fetch {path}"))?;

    if matches_path(WORKFLOW_PATTERN, path) {
        let text = decode(path, content)?;
        let audit = workflow::audit_workflow(path, &text)?;
        return Ok(Some(FileReport {
            path: path.to_string(),
            kind: FileKind::Workflow,
            all_pinned: audit.all_pinned,
            findings: audit.findings,
        }));
    }

    if matches_path(DOCKERFILE_PATTERN, path) {
        let text = decode(path, content)?;
        let audit = dockerfile::audit_dockerfile(path, &text)?;
        return Ok(Some(FileReport {
            path: path.to_string(),
            kind: FileKind::Dockerfile,
            all_pinned: audit.all_pinned,
            findings: audit.findings,
        }));
    }

    // Everything else is interesting only if it turns out to be a shell
    // script in a dialect the walker can parse.
    let Ok(text) = String::from_utf8(content) else {
        return Ok(None);
    };
    let Some(dialect) = shell::shell_dialect(path, &text) else {
        return Ok(None);
    };
    if !shell::is_supported_dialect(&dialect) {
        debug!(path = %path, dialect = %dialect, "shell dialect not supported, skipping");
        return Ok(None);
    }
    let audit = shell::audit_script(path, &text);
    Ok(Some(FileReport {
        path: path.to_string(),
        kind: FileKind::Shell,
        all_pinned: audit.all_pinned,
        findings: audit.findings,
    }))
}

fn decode(path: &str, content: Vec<u8>) -> Result<String> {
    String::from_utf8(content).with_context(|| format!("{path} is not valid UTF-8"))
}

/// Case-insensitive glob match (`*` only) against the full path and, failing
/// that, the basename.
fn matches_path(pattern: &str, path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    glob_match(pattern, path) || glob_match(pattern, basename)
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let text: Vec<char> = text.to_ascii_lowercase().chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
