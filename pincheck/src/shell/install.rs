//! Package-manager install classification.
//!
//! Each ecosystem encodes its own pin-exemption rules; the classifiers are
//! independent and never share state. A command is insecure when any of them
//! matches.

use std::fmt;

use super::command::basename;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    Npm,
    Pip,
    Go,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Pip => write!(f, "pip"),
            Ecosystem::Go => write!(f, "go"),
        }
    }
}

/// Which ecosystem, if any, this command performs an unpinned install for.
pub fn unpinned_install(tokens: &[String]) -> Option<Ecosystem> {
    if is_unpinned_npm_install(tokens) {
        return Some(Ecosystem::Npm);
    }
    if is_unpinned_pip_install(tokens) {
        return Some(Ecosystem::Pip);
    }
    if is_unpinned_go_install(tokens) {
        return Some(Ecosystem::Go);
    }
    None
}

pub fn is_unpinned_install(tokens: &[String]) -> bool {
    unpinned_install(tokens).is_some()
}

/// `npm install <pkg>` resolves the registry tag at install time. Bare
/// `npm install` is exempt: it resolves from `package-lock.json`.
fn is_unpinned_npm_install(tokens: &[String]) -> bool {
    let Some(program) = tokens.first() else {
        return false;
    };
    if basename(program) != "npm" {
        return false;
    }
    let Some(pos) = tokens
        .iter()
        .skip(1)
        .position(|t| t == "install" || t == "i")
    else {
        return false;
    };
    tokens.iter().skip(pos + 2).any(|t| !t.starts_with('-'))
}

/// `pip install` is pinned only under `--require-hashes`, or when every
/// positional argument is a local wheel. Anything resolved from an index at
/// install time (including a bare `pip install` or `-r requirements.txt`
/// without hash enforcement) is unpinned.
fn is_unpinned_pip_install(tokens: &[String]) -> bool {
    let Some(program) = tokens.first() else {
        return false;
    };
    let rest: &[String] = match basename(program) {
        "pip" | "pip3" => &tokens[1..],
        "python" | "python3" | "python2.7" => match module_pip_offset(tokens) {
            Some(offset) => &tokens[offset..],
            None => return false,
        },
        _ => return false,
    };
    if rest.first().map(String::as_str) != Some("install") {
        return false;
    }
    let mut has_wheel = false;
    let mut has_other = false;
    for arg in &rest[1..] {
        if arg == "--require-hashes" {
            return false;
        }
        if arg.starts_with('-') {
            continue;
        }
        if arg.ends_with(".whl") {
            has_wheel = true;
        } else {
            has_other = true;
        }
    }
    has_other || !has_wheel
}

/// Locate `-m pip` anywhere in the argument list; the remainder is the pip
/// command.
fn module_pip_offset(tokens: &[String]) -> Option<usize> {
    tokens
        .windows(2)
        .position(|pair| pair[0] == "-m" && pair[1] == "pip")
        .map(|idx| idx + 2)
}

/// `go get`/`go install` is pinned when every module path is qualified with a
/// full commit hash. No module argument at all defers to go.sum and is exempt.
fn is_unpinned_go_install(tokens: &[String]) -> bool {
    let Some(program) = tokens.first() else {
        return false;
    };
    if basename(program) != "go" {
        return false;
    }
    if !matches!(tokens.get(1).map(String::as_str), Some("get") | Some("install")) {
        return false;
    }
    for arg in &tokens[2..] {
        if arg.starts_with('-') {
            continue;
        }
        match arg.rsplit_once('@') {
            Some((_, revision)) if is_commit_hash(revision) => {}
            _ => return true,
        }
    }
    false
}

fn is_commit_hash(revision: &str) -> bool {
    revision.len() >= 40 && revision.chars().all(|c| c.is_ascii_hexdigit())
}
