//! Repository file access.
//!
//! The analysis engine never does I/O of its own; it consumes content handed
//! over by a [`FileProvider`]. Local checkouts and GitHub repositories are
//! the two provided implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";

#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Repository-relative, `/`-separated paths of every regular file.
    async fn list_files(&self) -> Result<Vec<String>>;

    async fn file_content(&self, path: &str) -> Result<Vec<u8>>;
}

/// A repository checkout on the local filesystem.
pub struct LocalRepo {
    root: PathBuf,
}

impl LocalRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileProvider for LocalRepo {
    async fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        collect_files(&self.root, &self.root, &mut files)?;
        files.sort();
        Ok(files)
    }

    async fn file_content(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(self.root.join(path)).with_context(|| format!("failed to read {path}"))
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if path.is_file() {
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("path escapes root: {}", path.display()))?;
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// A repository fetched over the GitHub API: the git-trees endpoint for the
/// file listing, the raw-content host for bytes.
pub struct GitHubRepo {
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
    raw_base: String,
    owner: String,
    repo: String,
    git_ref: String,
}

impl GitHubRepo {
    pub fn new(owner: &str, repo: &str, git_ref: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("pincheck")
                .build()
                .expect("failed to build HTTP client"),
            token,
            api_base: GITHUB_API_BASE.to_string(),
            raw_base: GITHUB_RAW_BASE.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
        }
    }

    /// Point the provider at different hosts. Tests use this to stand up a
    /// mock server in place of the GitHub API.
    pub fn with_base_urls(mut self, api_base: &str, raw_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.raw_base = raw_base.trim_end_matches('/').to_string();
        self
    }

    #[instrument(skip(self))]
    async fn api_get(&self, url: &str) -> Result<Value> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to parse JSON from {url}"))
    }
}

#[async_trait]
impl FileProvider for GitHubRepo {
    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn list_files(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.git_ref
        );
        let json = self.api_get(&url).await?;

        if json.get("truncated").and_then(Value::as_bool) == Some(true) {
            warn!(
                owner = %self.owner,
                repo = %self.repo,
                "tree listing was truncated by the API; scan may be incomplete"
            );
        }

        let tree = json
            .get("tree")
            .and_then(Value::as_array)
            .context("missing 'tree' in trees response")?;

        let mut files = Vec::new();
        for entry in tree {
            if entry.get("type").and_then(Value::as_str) != Some("blob") {
                continue;
            }
            if let Some(path) = entry.get("path").and_then(Value::as_str) {
                files.push(path.to_string());
            }
        }
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn file_content(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, self.owner, self.repo, self.git_ref, path
        );

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            bail!("{path} not found in {}/{}@{}", self.owner, self.repo, self.git_ref);
        }
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(bytes.to_vec())
    }
}
