use std::path::PathBuf;

use clap::Parser;

/// Audit build and CI files for dependencies fetched without pinning
#[derive(Parser)]
#[command(name = "pincheck", version)]
pub struct Cli {
    /// Path to a local repository checkout to audit
    #[arg(value_name = "PATH", required_unless_present = "repo", conflicts_with = "repo")]
    pub path: Option<PathBuf>,

    /// Audit a GitHub repository instead (owner/name)
    #[arg(long)]
    pub repo: Option<String>,

    /// Git ref to audit when using --repo
    #[arg(long = "ref", default_value = "HEAD")]
    pub git_ref: String,

    /// GitHub token for API requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Emit the report as JSON (and logs as JSON lines on stderr)
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}
