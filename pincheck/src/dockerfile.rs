//! Dockerfile pinning validation.
//!
//! `FROM` instructions are checked against a digest-pin rule with multi-stage
//! alias tracking; shell-form `RUN` bodies are concatenated and handed to the
//! shell walker, so a download in one `RUN` and an execution in a later one
//! is still caught.

use std::collections::HashSet;

use anyhow::{Result, bail};

use crate::finding::Finding;
use crate::shell;

#[derive(Debug)]
pub struct DockerfileAudit {
    pub all_pinned: bool,
    pub findings: Vec<Finding>,
}

struct Instruction {
    keyword: String,
    args: String,
    line: usize,
}

/// Validate one Dockerfile. A file without a single `FROM`, or with a `FROM`
/// whose shape the grammar does not allow, is a hard error: the file cannot
/// be scored.
pub fn audit_dockerfile(path: &str, content: &str) -> Result<DockerfileAudit> {
    let instructions = scan_instructions(content);

    let mut pinned_aliases: HashSet<String> = HashSet::new();
    let mut from_count = 0;
    let mut all_pinned = true;
    let mut findings = Vec::new();
    let mut run_bodies: Vec<(usize, String)> = Vec::new();

    for instruction in &instructions {
        match instruction.keyword.to_ascii_uppercase().as_str() {
            "FROM" => {
                from_count += 1;
                let (image, pinned) =
                    classify_from(path, instruction, &mut pinned_aliases)?;
                if !pinned {
                    all_pinned = false;
                    findings.push(Finding {
                        path: path.to_string(),
                        line: instruction.line,
                        snippet: format!("FROM {}", instruction.args),
                        message: format!("base image `{image}` is not pinned by digest"),
                    });
                }
            }
            "RUN" => {
                // Exec form (`RUN ["bin", "arg"]`) never passes through a
                // shell, so there is nothing for the walker to see.
                if !instruction.args.starts_with('[') && !instruction.args.is_empty() {
                    run_bodies.push((instruction.line, instruction.args.clone()));
                }
            }
            _ => {}
        }
    }

    if from_count == 0 {
        bail!("{path}: no FROM instruction, not a valid Dockerfile");
    }

    if !run_bodies.is_empty() {
        let script = run_bodies
            .iter()
            .map(|(_, body)| body.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let audit = shell::audit_script(path, &script);
        all_pinned = all_pinned && audit.all_pinned;
        for mut finding in audit.findings {
            // Walker lines index into the concatenated RUN script, one body
            // per line; map them back to the Dockerfile where possible.
            if let Some((dockerfile_line, _)) = run_bodies.get(finding.line.saturating_sub(1)) {
                finding.line = *dockerfile_line;
            }
            findings.push(finding);
        }
    }

    Ok(DockerfileAudit {
        all_pinned,
        findings,
    })
}

/// Classify one `FROM`. Returns the base image name and whether it is pinned,
/// recording the stage alias when it is.
fn classify_from(
    path: &str,
    instruction: &Instruction,
    pinned_aliases: &mut HashSet<String>,
) -> Result<(String, bool)> {
    let tokens: Vec<&str> = instruction
        .args
        .split_whitespace()
        .filter(|t| !t.starts_with("--"))
        .collect();

    let (image, alias) = match tokens.as_slice() {
        [image] => (*image, None),
        [image, as_keyword, alias] if as_keyword.eq_ignore_ascii_case("as") => {
            (*image, Some(*alias))
        }
        _ => bail!(
            "{path}:{}: malformed FROM instruction: {}",
            instruction.line,
            instruction.args
        ),
    };

    let pinned =
        image == "scratch" || is_digest_pinned(image) || pinned_aliases.contains(image);
    if pinned {
        if let Some(alias) = alias {
            pinned_aliases.insert(alias.to_string());
        }
    }
    Ok((image.to_string(), pinned))
}

fn is_digest_pinned(image: &str) -> bool {
    match image.rsplit_once("@sha256:") {
        Some((_, digest)) => {
            digest.len() >= 64
                && digest
                    .chars()
                    .take(64)
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        }
        None => false,
    }
}

/// Split a Dockerfile into logical instructions: continuation backslashes are
/// collapsed, comment and blank lines are dropped (including inside a
/// continuation, as the Dockerfile syntax allows).
fn scan_instructions(content: &str) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (start, mut acc) = pending.take().unwrap_or((idx + 1, String::new()));
        if !acc.is_empty() {
            acc.push(' ');
        }
        acc.push_str(trimmed);
        if acc.ends_with('\\') {
            acc.pop();
            let trimmed_acc = acc.trim_end().to_string();
            pending = Some((start, trimmed_acc));
        } else {
            instructions.push(split_instruction(start, &acc));
        }
    }
    if let Some((start, acc)) = pending {
        if !acc.trim().is_empty() {
            instructions.push(split_instruction(start, &acc));
        }
    }
    instructions
}

fn split_instruction(line: usize, text: &str) -> Instruction {
    match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => Instruction {
            keyword: keyword.to_string(),
            args: rest.trim().to_string(),
            line,
        },
        None => Instruction {
            keyword: text.to_string(),
            args: String::new(),
            line,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn audit(content: &str) -> DockerfileAudit {
        audit_dockerfile("Dockerfile", content).expect("dockerfile should validate")
    }

    #[test]
    fn digest_pinned_base_image_passes() {
        let content = format!("FROM golang:1.21@{DIGEST}\nRUN make build\n");
        let result = audit(&content);
        assert!(result.all_pinned);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn tag_only_base_image_is_unpinned() {
        let result = audit("FROM golang:1.21\n");
        assert!(!result.all_pinned);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("golang:1.21"));
        assert_eq!(result.findings[0].line, 1);
    }

    #[test]
    fn scratch_is_always_pinned() {
        let result = audit("FROM scratch\n");
        assert!(result.all_pinned);
    }

    #[test]
    fn pinned_alias_propagates_to_later_stages() {
        let content = format!(
            "FROM golang:1.21@{DIGEST} AS build\nRUN make\nFROM build\nRUN make install\n"
        );
        let result = audit(&content);
        assert!(result.all_pinned, "findings: {:?}", result.findings);
    }

    #[test]
    fn unpinned_alias_taints_dependent_stages() {
        let content = "FROM golang:1.21 AS build\nFROM build\n";
        let result = audit(content);
        assert!(!result.all_pinned);
        assert_eq!(result.findings.len(), 2);
    }

    #[test]
    fn alias_chain_stays_pinned() {
        let content = format!(
            "FROM alpine:3.19@{DIGEST} AS base\nFROM base AS builder\nFROM builder\n"
        );
        let result = audit(&content);
        assert!(result.all_pinned);
    }

    #[test]
    fn platform_flag_is_skipped() {
        let content = format!("FROM --platform=linux/amd64 golang:1.21@{DIGEST}\n");
        let result = audit(&content);
        assert!(result.all_pinned);
    }

    #[test]
    fn uppercase_digest_is_not_a_pin() {
        let result = audit(
            "FROM golang@sha256:0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF\n",
        );
        assert!(!result.all_pinned);
    }

    #[test]
    fn short_digest_is_not_a_pin() {
        let result = audit("FROM golang@sha256:abcdef\n");
        assert!(!result.all_pinned);
    }

    #[test]
    fn no_from_is_a_hard_error() {
        let err = audit_dockerfile("Dockerfile", "RUN make\n").unwrap_err();
        assert!(err.to_string().contains("no FROM"));
    }

    #[test]
    fn malformed_from_is_a_hard_error() {
        let err = audit_dockerfile("Dockerfile", "FROM a b c d\n").unwrap_err();
        assert!(err.to_string().contains("malformed FROM"));
    }

    #[test]
    fn empty_file_is_a_hard_error() {
        assert!(audit_dockerfile("Dockerfile", "").is_err());
    }

    #[test]
    fn run_bodies_are_walked() {
        let content = format!("FROM alpine@{DIGEST}\nRUN curl -s https://x/y.sh | sh\n");
        let result = audit(&content);
        assert!(!result.all_pinned);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("piped straight into"));
        assert_eq!(result.findings[0].line, 2);
    }

    #[test]
    fn download_and_execute_across_run_lines_is_caught() {
        let content = format!(
            "FROM alpine@{DIGEST}\nRUN wget -O /tmp/i.sh https://x/y.sh\nRUN /tmp/i.sh\n"
        );
        let result = audit(&content);
        assert!(!result.all_pinned);
        assert_eq!(result.findings[0].line, 3);
    }

    #[test]
    fn continuation_lines_form_one_instruction() {
        let content = format!(
            "FROM alpine@{DIGEST}\nRUN apt-get update && \\\n    apt-get install -y jq\n"
        );
        let result = audit(&content);
        assert!(result.all_pinned, "findings: {:?}", result.findings);
    }

    #[test]
    fn continued_insecure_run_is_still_caught() {
        let content = format!(
            "FROM alpine@{DIGEST}\nRUN curl -s https://x/y.sh \\\n    | bash\n"
        );
        let result = audit(&content);
        assert!(!result.all_pinned);
    }

    #[test]
    fn exec_form_run_is_skipped() {
        let content = format!("FROM alpine@{DIGEST}\nRUN [\"curl\", \"https://x\"]\n");
        let result = audit(&content);
        assert!(result.all_pinned);
    }

    #[test]
    fn lowercase_instructions_are_recognized() {
        let result = audit("from golang:1.21\nrun echo hi\n");
        assert!(!result.all_pinned);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let content = format!("# syntax=docker/dockerfile:1\n\nFROM alpine@{DIGEST}\n# done\n");
        let result = audit(&content);
        assert!(result.all_pinned);
    }
}
