//! The shell walker: depth-first traversal applying the insecure-download
//! detectors at every node. Findings accumulate across the whole tree; the
//! verdict is the AND of every per-node verdict, with no early termination.

use std::collections::HashSet;

use tracing::debug;

use crate::finding::Finding;

use super::command::{self, extract_call};
use super::download::{self, clean_path};
use super::install;
use super::syntax::{self, Arg, CallExpr, ShellNode};

/// Result of walking one top-level script.
#[derive(Debug)]
pub struct ShellAudit {
    pub all_pinned: bool,
    pub findings: Vec<Finding>,
}

/// Walk a script and report every insecure download-and-execute idiom and
/// unpinned package-manager install in it.
///
/// A script the grammar cannot parse is downgraded to a debug note with a
/// pinned verdict: the supported dialect subset is known-incomplete, and
/// failing a whole file over exotic-but-legitimate shell would be worse than
/// under-detecting it.
pub fn audit_script(path: &str, source: &str) -> ShellAudit {
    let mut auditor = Auditor {
        path,
        downloads: HashSet::new(),
        findings: Vec::new(),
        all_pinned: true,
    };
    auditor.run(source);
    ShellAudit {
        all_pinned: auditor.all_pinned,
        findings: auditor.findings,
    }
}

struct Auditor<'a> {
    path: &'a str,
    /// Output paths produced by download utilities earlier in this walk,
    /// cleaned and lowercased. Scoped to one top-level script.
    downloads: HashSet<String>,
    findings: Vec<Finding>,
    all_pinned: bool,
}

impl Auditor<'_> {
    fn run(&mut self, source: &str) {
        match syntax::parse_script(source) {
            Some(root) => self.walk(&root),
            None => debug!(path = %self.path, "shell grammar did not recognize script, assuming pinned"),
        }
    }

    fn walk(&mut self, node: &ShellNode) {
        match node {
            ShellNode::Group(children) => {
                for child in children {
                    self.walk(child);
                }
            }
            ShellNode::Pipeline { elems, line, text } => {
                self.check_pipe_fetch_execute(elems, *line, text);
                for elem in elems {
                    self.walk(elem);
                }
            }
            ShellNode::Call(call) => self.visit_call(call),
        }
    }

    fn visit_call(&mut self, call: &CallExpr) {
        let tokens = extract_call(call);
        self.check_proc_subst_fetch_execute(call, &tokens);
        self.check_executes_downloaded_file(call, &tokens);
        self.check_unpinned_install(call, &tokens);
        self.recurse_inline_script(&tokens);
        self.record_download(call, &tokens);
        for arg in &call.args {
            match arg {
                Arg::ProcSub(body) | Arg::CmdSub(body) => {
                    for node in body {
                        self.walk(node);
                    }
                }
                _ => {}
            }
        }
    }

    /// `download | interpreter`, checked over every adjacent pipeline pair.
    fn check_pipe_fetch_execute(&mut self, elems: &[ShellNode], line: usize, text: &str) {
        for pair in elems.windows(2) {
            let (ShellNode::Call(left), ShellNode::Call(right)) = (&pair[0], &pair[1]) else {
                continue;
            };
            let left_tokens = extract_call(left);
            let right_tokens = extract_call(right);
            if download::is_download_utility(&left_tokens) && command::is_interpreter(&right_tokens)
            {
                self.report(line, text, "downloaded content is piped straight into an interpreter");
            }
        }
    }

    /// `interpreter <(download ...)`.
    fn check_proc_subst_fetch_execute(&mut self, call: &CallExpr, tokens: &[String]) {
        if !command::is_interpreter(tokens) {
            return;
        }
        // Positions are judged with `sudo` prefixes skipped, so
        // `sudo bash <(curl ...)` and `bash <(curl ...)` look alike.
        let args: Vec<&Arg> = call
            .args
            .iter()
            .filter(|a| !matches!(a, Arg::Literal(s) if s == "sudo"))
            .collect();
        let Some(Arg::ProcSub(body)) = args.get(1) else {
            return;
        };
        let fetches = first_call(body)
            .is_some_and(|inner| download::is_download_utility(&extract_call(inner)));
        if fetches {
            self.report(
                call.line,
                &call.text,
                "process substitution feeds downloaded content to an interpreter",
            );
        }
    }

    /// Running a file recorded as a download output earlier in this walk,
    /// either as the program itself or as a trailing argument.
    fn check_executes_downloaded_file(&mut self, call: &CallExpr, tokens: &[String]) {
        let mut candidates: Vec<&String> = Vec::new();
        if let Some(program) = tokens.first() {
            candidates.push(program);
        }
        if tokens.len() > 1 {
            if let Some(trailing) = tokens.last() {
                candidates.push(trailing);
            }
        }
        for token in candidates {
            let key = clean_path(token).to_lowercase();
            if self.downloads.contains(&key) {
                self.report(
                    call.line,
                    &call.text,
                    &format!("runs previously downloaded file `{token}` without verification"),
                );
                return;
            }
        }
    }

    fn check_unpinned_install(&mut self, call: &CallExpr, tokens: &[String]) {
        if let Some(ecosystem) = install::unpinned_install(tokens) {
            self.report(
                call.line,
                &call.text,
                &format!("{ecosystem} install is not pinned to a verified version"),
            );
        }
    }

    /// `sh -c "<script>"` and friends: re-parse and re-walk the inline script
    /// with the same accumulated state. Terminates because the inline script
    /// is strictly smaller than its enclosing source.
    fn recurse_inline_script(&mut self, tokens: &[String]) {
        let Some(program) = tokens.first() else {
            return;
        };
        if !command::is_supported_shell(program) {
            return;
        }
        let Some(flag_idx) = tokens.iter().position(|t| t == "-c") else {
            return;
        };
        if let Some(script) = tokens.get(flag_idx + 1) {
            let script = script.clone();
            self.run(&script);
        }
    }

    /// Record where a bare download-utility call writes. A statement-level
    /// output redirect takes precedence over the utility's own output-path
    /// logic.
    fn record_download(&mut self, call: &CallExpr, tokens: &[String]) {
        if !download::is_download_utility(tokens) {
            return;
        }
        let output = call
            .redirects
            .first()
            .cloned()
            .or_else(|| download::output_file(tokens));
        if let Some(path) = output {
            self.downloads.insert(clean_path(&path).to_lowercase());
        }
    }

    fn report(&mut self, line: usize, snippet: &str, message: &str) {
        self.all_pinned = false;
        self.findings.push(Finding {
            path: self.path.to_string(),
            line,
            snippet: snippet.trim().to_string(),
            message: message.to_string(),
        });
    }
}

fn first_call(nodes: &[ShellNode]) -> Option<&CallExpr> {
    for node in nodes {
        match node {
            ShellNode::Call(call) => return Some(call),
            ShellNode::Group(children) => {
                if let Some(call) = first_call(children) {
                    return Some(call);
                }
            }
            ShellNode::Pipeline { elems, .. } => {
                if let Some(call) = first_call(elems) {
                    return Some(call);
                }
            }
        }
    }
    None
}
