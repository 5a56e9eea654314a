mod cli;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pincheck::provider::{FileProvider, GitHubRepo, LocalRepo};
use pincheck::{ScanOptions, output, scan_repository};

use cli::Cli;

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(args.verbosity.tracing_level_filter().into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: &Cli) -> Result<bool> {
    let provider: Arc<dyn FileProvider> = match (&args.path, &args.repo) {
        (Some(path), None) => {
            if !path.is_dir() {
                bail!("not a directory: {}", path.display());
            }
            Arc::new(LocalRepo::new(path))
        }
        (None, Some(repo)) => {
            let (owner, name) = repo
                .split_once('/')
                .context("--repo expects owner/name")?;
            Arc::new(GitHubRepo::new(
                owner,
                name,
                &args.git_ref,
                args.github_token.clone(),
            ))
        }
        _ => bail!("provide a local path or --repo owner/name"),
    };

    let report = scan_repository(provider, &ScanOptions::default()).await?;

    let formatter = output::formatter(args.json);
    let mut stdout = std::io::stdout().lock();
    formatter.write_report(&report, &mut stdout)?;

    Ok(report.all_pinned())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(&args);

    match run(&args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    }
}
