//! Command extraction and interpreter classification.

use super::syntax::{Arg, CallExpr, ShellNode};

/// Shell dialects the walker can actually parse.
pub(crate) const SUPPORTED_SHELLS: &[&str] = &["sh", "bash", "mksh"];

/// Shells recognized for file-typing, including dialects the grammar does not
/// cover and which are therefore never walked.
pub(crate) const KNOWN_SHELLS: &[&str] = &["sh", "bash", "mksh", "dash", "ksh", "zsh"];

const OTHER_INTERPRETERS: &[&str] = &[
    "python",
    "python2",
    "python2.7",
    "python3",
    "perl",
    "ruby",
    "php",
    "node",
    "nodejs",
    "java",
    "exec",
    "su",
];

/// Flatten a node into its resolved argument tokens, program name first.
/// Returns `None` for anything that is not a call expression.
pub fn extract(node: &ShellNode) -> Option<Vec<String>> {
    match node {
        ShellNode::Call(call) => Some(extract_call(call)),
        _ => None,
    }
}

/// Resolved tokens of a call: `sudo` is filtered out so elevated and plain
/// invocations classify identically, and unresolved words are dropped
/// silently rather than erroring.
pub fn extract_call(call: &CallExpr) -> Vec<String> {
    call.args
        .iter()
        .filter_map(|arg| match arg {
            Arg::Literal(token) => Some(token.clone()),
            _ => None,
        })
        .filter(|token| token != "sudo")
        .collect()
}

/// Matching is by executable basename only, so `./tools/curl` classifies as
/// `curl`. Renamed binaries are not caught.
pub(crate) fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// Does this command invoke something that executes code handed to it:
/// a shell, a scripting language runtime, `exec`, or `su`?
pub(crate) fn is_interpreter(tokens: &[String]) -> bool {
    let Some(program) = tokens.first() else {
        return false;
    };
    let name = basename(program);
    KNOWN_SHELLS.contains(&name) || OTHER_INTERPRETERS.contains(&name)
}

pub(crate) fn is_supported_shell(name: &str) -> bool {
    SUPPORTED_SHELLS.contains(&basename(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::syntax::parse_script;

    fn call_tokens(source: &str) -> Vec<String> {
        let root = parse_script(source).expect("script should parse");
        let ShellNode::Group(children) = root else {
            panic!("expected group");
        };
        extract(&children[0]).expect("expected a call expression")
    }

    #[test]
    fn extract_returns_none_for_non_call_nodes() {
        assert!(extract(&ShellNode::Group(Vec::new())).is_none());
    }

    #[test]
    fn sudo_is_stripped() {
        assert_eq!(call_tokens("sudo curl -s https://x"), call_tokens("curl -s https://x"));
    }

    #[test]
    fn unresolved_words_are_dropped() {
        assert_eq!(call_tokens("curl $URL"), vec!["curl".to_string()]);
    }

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("/usr/bin/curl"), "curl");
        assert_eq!(basename("./tools/curl"), "curl");
        assert_eq!(basename("wget"), "wget");
    }

    #[test]
    fn interpreters_match_by_basename() {
        let tokens = vec!["/bin/bash".to_string()];
        assert!(is_interpreter(&tokens));
        let tokens = vec!["python3".to_string()];
        assert!(is_interpreter(&tokens));
        let tokens = vec!["gcc".to_string()];
        assert!(!is_interpreter(&tokens));
        assert!(!is_interpreter(&[]));
    }

    #[test]
    fn unsupported_shells_are_still_interpreters() {
        let tokens = vec!["zsh".to_string()];
        assert!(is_interpreter(&tokens));
        assert!(!is_supported_shell("zsh"));
        assert!(is_supported_shell("bash"));
        assert!(is_supported_shell("/bin/sh"));
    }
}
