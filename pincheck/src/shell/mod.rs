//! Shell-script analysis: parsing, lowering, and the insecure-download walk.

mod command;
mod download;
mod install;
mod syntax;
mod walker;

pub use command::extract;
pub use download::{is_download_utility, output_file};
pub use install::{Ecosystem, is_unpinned_install, unpinned_install};
pub use syntax::{Arg, CallExpr, ShellNode, parse_script};
pub use walker::{ShellAudit, audit_script};

pub(crate) use command::is_supported_shell;

use command::{KNOWN_SHELLS, basename};

/// The shell dialect a file is written in, if it is a shell script at all.
///
/// A shebang names the dialect authoritatively (`env` is resolved to its
/// argument); without one, a `.sh` extension is taken as plain `sh`. Files
/// whose shebang names a non-shell interpreter are not shell scripts, even
/// with a `.sh` extension.
pub fn shell_dialect(path: &str, content: &str) -> Option<String> {
    if let Some(interpreter) = shebang_interpreter(content) {
        let name = basename(&interpreter).to_string();
        if KNOWN_SHELLS.contains(&name.as_str()) {
            return Some(name);
        }
        return None;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.eq_ignore_ascii_case("sh") => {
            Some("sh".to_string())
        }
        _ => None,
    }
}

/// Can the walker actually parse this file's dialect?
pub fn is_supported_dialect(dialect: &str) -> bool {
    is_supported_shell(dialect)
}

fn shebang_interpreter(content: &str) -> Option<String> {
    let first_line = content.lines().next()?;
    let rest = first_line.strip_prefix("#!")?.trim();
    let mut parts = rest.split_whitespace();
    let interpreter = parts.next()?;
    if basename(interpreter) == "env" {
        return parts.next().map(str::to_string);
    }
    Some(interpreter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_identifies_the_dialect() {
        assert_eq!(shell_dialect("run", "#!/bin/bash\necho hi"), Some("bash".to_string()));
        assert_eq!(shell_dialect("run", "#!/bin/sh\necho hi"), Some("sh".to_string()));
        assert_eq!(
            shell_dialect("run", "#!/usr/bin/env mksh\necho hi"),
            Some("mksh".to_string())
        );
    }

    #[test]
    fn unsupported_shells_are_recognized_but_not_supported() {
        let dialect = shell_dialect("run", "#!/bin/zsh\necho hi").expect("zsh is a shell");
        assert_eq!(dialect, "zsh");
        assert!(!is_supported_dialect(&dialect));
        assert!(is_supported_dialect("bash"));
    }

    #[test]
    fn extension_implies_sh_without_a_shebang() {
        assert_eq!(shell_dialect("scripts/build.sh", "echo hi"), Some("sh".to_string()));
        assert_eq!(shell_dialect("scripts/build.SH", "echo hi"), Some("sh".to_string()));
        assert_eq!(shell_dialect("scripts/build.py", "print(1)"), None);
        assert_eq!(shell_dialect("Makefile", "all:"), None);
    }

    #[test]
    fn non_shell_shebang_wins_over_extension() {
        assert_eq!(shell_dialect("tool.sh", "#!/usr/bin/env python3\nprint(1)"), None);
    }

    #[test]
    fn dotfile_named_sh_is_not_a_script() {
        assert_eq!(shell_dialect(".sh", "echo hi"), None);
    }
}
