//! CI workflow pinning validation.
//!
//! Two independent passes over a parsed workflow document: `uses:` references
//! must be pinned to a full commit hash, and `run:` bodies in supported
//! shells are handed to the shell walker once per job.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::finding::Finding;
use crate::shell;

#[derive(Debug)]
pub struct WorkflowAudit {
    pub all_pinned: bool,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Deserialize)]
struct Workflow {
    #[serde(default)]
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    uses: Option<String>,
    #[serde(default)]
    steps: Option<Vec<Step>>,
    #[serde(default)]
    defaults: Option<Defaults>,
}

#[derive(Debug, Deserialize)]
struct Defaults {
    #[serde(default)]
    run: Option<RunDefaults>,
}

#[derive(Debug, Deserialize)]
struct RunDefaults {
    #[serde(default)]
    shell: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    uses: Option<String>,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    shell: Option<String>,
}

/// Validate one workflow document. An empty or undeserializable document is a
/// hard error, unlike the walker's fail-open policy for shell grammar.
pub fn audit_workflow(path: &str, content: &str) -> Result<WorkflowAudit> {
    if content.trim().is_empty() {
        bail!("{path}: empty workflow document");
    }
    let workflow: Workflow = serde_yaml::from_str(content)
        .with_context(|| format!("{path}: failed to parse workflow"))?;

    let mut all_pinned = true;
    let mut findings = Vec::new();

    for (job_name, job) in &workflow.jobs {
        check_uses(path, content, job_name, job, &mut findings);
        walk_run_scripts(path, job_name, job, &mut findings);
    }
    if !findings.is_empty() {
        all_pinned = false;
    }

    Ok(WorkflowAudit {
        all_pinned,
        findings,
    })
}

/// Every job- or step-level `uses:` must end in `@` plus at least 40 hex
/// characters, i.e. at least as strong as a full SHA-1 commit id.
fn check_uses(
    path: &str,
    content: &str,
    job_name: &str,
    job: &Job,
    findings: &mut Vec<Finding>,
) {
    let mut references = Vec::new();
    if let Some(uses) = &job.uses {
        references.push(uses);
    }
    for step in job.steps.iter().flatten() {
        if let Some(uses) = &step.uses {
            references.push(uses);
        }
    }
    for reference in references {
        if !is_hash_pinned(reference) {
            findings.push(Finding {
                path: path.to_string(),
                line: line_of(content, reference),
                snippet: format!("uses: {reference}"),
                message: format!(
                    "job `{job_name}` uses `{reference}`, which is not pinned to a commit hash"
                ),
            });
        }
    }
}

fn is_hash_pinned(reference: &str) -> bool {
    match reference.rsplit_once('@') {
        Some((_, revision)) => {
            revision.len() >= 40
                && revision
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        }
        None => false,
    }
}

/// Concatenate the job's `run:` bodies whose effective shell the walker
/// supports, in step order, and walk them once per job. Steps in a job share
/// a runner, so a download in one step can be executed in a later one.
fn walk_run_scripts(path: &str, job_name: &str, job: &Job, findings: &mut Vec<Finding>) {
    let default_shell = job
        .defaults
        .as_ref()
        .and_then(|d| d.run.as_ref())
        .and_then(|r| r.shell.as_deref())
        .unwrap_or("bash");

    let mut script = String::new();
    for step in job.steps.iter().flatten() {
        let Some(run) = &step.run else {
            continue;
        };
        let effective = step.shell.as_deref().unwrap_or(default_shell);
        let shell_name = effective.split_whitespace().next().unwrap_or(effective);
        if !shell::is_supported_shell(shell_name) {
            debug!(job = %job_name, shell = %shell_name, "skipping step in unsupported shell");
            continue;
        }
        if !script.is_empty() {
            script.push('\n');
        }
        script.push_str(&scrub_expressions(run));
    }

    if script.is_empty() {
        return;
    }
    let audit = shell::audit_script(path, &script);
    findings.extend(audit.findings);
}

/// Replace `${{ ... }}` expressions with an opaque token so interpolation
/// never produces false parse failures or false matches.
fn scrub_expressions(run: &str) -> String {
    let mut out = String::with_capacity(run.len());
    let mut rest = run;
    while let Some(start) = rest.find("${{") {
        out.push_str(&rest[..start]);
        match rest[start..].find("}}") {
            Some(end) => {
                out.push_str("GITHUB_EXPRESSION");
                rest = &rest[start + end + 2..];
            }
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn line_of(content: &str, needle: &str) -> usize {
    content
        .lines()
        .position(|line| line.contains(needle))
        .map_or(1, |idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINNED_SHA: &str = "8f4b7f84864484a7bf31766abe9204da3cbe65b3";

    fn audit(content: &str) -> WorkflowAudit {
        audit_workflow(".github/workflows/ci.yml", content).expect("workflow should parse")
    }

    #[test]
    fn tag_pinned_uses_is_a_finding() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - uses: actions/checkout@v4\n",
        );
        assert!(!result.all_pinned);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("actions/checkout@v4"));
        assert!(result.findings[0].message.contains("build"));
        assert_eq!(result.findings[0].line, 4);
    }

    #[test]
    fn hash_pinned_uses_passes() {
        let result = audit(&format!(
            "jobs:\n  build:\n    steps:\n      - uses: actions/checkout@{PINNED_SHA}\n"
        ));
        assert!(result.all_pinned, "findings: {:?}", result.findings);
    }

    #[test]
    fn job_level_uses_is_checked() {
        let result = audit("jobs:\n  release:\n    uses: org/shared/.github/workflows/ci.yml@main\n");
        assert!(!result.all_pinned);
        assert!(result.findings[0].message.contains("release"));
    }

    #[test]
    fn short_hash_is_not_a_pin() {
        let result = audit("jobs:\n  build:\n    steps:\n      - uses: actions/checkout@8f4b7f8\n");
        assert!(!result.all_pinned);
    }

    #[test]
    fn uppercase_hash_is_not_a_pin() {
        let reference = "actions/checkout@8F4B7F84864484A7BF31766ABE9204DA3CBE65B3";
        let result = audit(&format!("jobs:\n  build:\n    steps:\n      - uses: {reference}\n"));
        assert!(!result.all_pinned);
    }

    #[test]
    fn run_step_with_insecure_download_is_a_finding() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - run: curl -s https://x/y.sh | bash\n",
        );
        assert!(!result.all_pinned);
        assert!(result.findings[0].message.contains("piped straight into"));
    }

    #[test]
    fn download_in_one_step_executed_in_another_is_caught() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - run: wget -O /tmp/i.sh https://x/y.sh\n      - run: /tmp/i.sh\n",
        );
        assert!(!result.all_pinned);
    }

    #[test]
    fn jobs_do_not_share_download_state() {
        let result = audit(
            "jobs:\n  a:\n    steps:\n      - run: wget -O /tmp/i.sh https://x/y.sh\n  b:\n    steps:\n      - run: /tmp/i.sh\n",
        );
        assert!(result.all_pinned, "findings: {:?}", result.findings);
    }

    #[test]
    fn unsupported_step_shell_is_skipped() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - shell: pwsh\n        run: iwr https://x/y.ps1 | iex\n",
        );
        assert!(result.all_pinned);
    }

    #[test]
    fn job_default_shell_applies_to_steps() {
        let result = audit(
            "jobs:\n  build:\n    defaults:\n      run:\n        shell: python\n    steps:\n      - run: print(1)\n",
        );
        assert!(result.all_pinned);
    }

    #[test]
    fn step_shell_overrides_job_default() {
        let result = audit(
            "jobs:\n  build:\n    defaults:\n      run:\n        shell: python\n    steps:\n      - shell: bash\n        run: curl -s https://x/y.sh | sh\n",
        );
        assert!(!result.all_pinned);
    }

    #[test]
    fn shell_with_arguments_resolves_by_first_word() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - shell: bash -e {0}\n        run: curl -s https://x/y.sh | sh\n",
        );
        assert!(!result.all_pinned);
    }

    #[test]
    fn github_expressions_are_scrubbed() {
        let result = audit(
            "jobs:\n  build:\n    steps:\n      - run: \"echo ${{ matrix.os }}\"\n",
        );
        assert!(result.all_pinned, "findings: {:?}", result.findings);
    }

    #[test]
    fn scrub_replaces_every_expression() {
        let scrubbed = scrub_expressions("echo ${{ a }} and ${{ b }}");
        assert_eq!(scrubbed, "echo GITHUB_EXPRESSION and GITHUB_EXPRESSION");
        assert_eq!(scrub_expressions("no expressions"), "no expressions");
        assert_eq!(scrub_expressions("broken ${{ a"), "broken ${{ a");
    }

    #[test]
    fn empty_document_is_a_hard_error() {
        assert!(audit_workflow("ci.yml", "").is_err());
        assert!(audit_workflow("ci.yml", "   \n").is_err());
    }

    #[test]
    fn invalid_yaml_is_a_hard_error() {
        assert!(audit_workflow("ci.yml", "jobs: [not: {{{").is_err());
    }

    #[test]
    fn workflow_without_jobs_is_vacuously_pinned() {
        let result = audit("name: empty\non: push\n");
        assert!(result.all_pinned);
        assert!(result.findings.is_empty());
    }
}
