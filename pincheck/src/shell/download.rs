//! Download-utility classification and output-file resolution.

use super::command::basename;

/// Does this token list invoke a recognized download utility?
///
/// Recognized: `curl`, `wget`, `gsutil`, and the `aws s3api get-object`
/// idiom. First match wins; only one utility can match per call.
pub fn is_download_utility(tokens: &[String]) -> bool {
    let Some(program) = tokens.first() else {
        return false;
    };
    match basename(program) {
        "curl" | "wget" | "gsutil" => true,
        "aws" => is_aws_get_object(tokens),
        _ => false,
    }
}

fn is_aws_get_object(tokens: &[String]) -> bool {
    tokens.get(1).map(String::as_str) == Some("s3api")
        && tokens.get(2).map(String::as_str) == Some("get-object")
}

/// The file a download utility would write, if it can be resolved from the
/// arguments alone. `curl` never contributes a path of its own; only a shell
/// redirect records one for it.
pub fn output_file(tokens: &[String]) -> Option<String> {
    let program = tokens.first()?;
    match basename(program) {
        "wget" => wget_output_file(tokens),
        "gsutil" => gsutil_output_file(tokens),
        "aws" if is_aws_get_object(tokens) => aws_output_file(tokens),
        _ => None,
    }
}

fn wget_output_file(tokens: &[String]) -> Option<String> {
    let mut iter = tokens.iter().skip(1);
    while let Some(token) = iter.next() {
        if token == "-O" {
            return iter.next().cloned();
        }
    }
    let url = tokens.iter().skip(1).find(|t| t.starts_with("http"))?;
    url_basename(url)
}

fn gsutil_output_file(tokens: &[String]) -> Option<String> {
    let source_idx = tokens.iter().position(|t| t.starts_with("gs://"))?;
    let destination = tokens.get(source_idx + 1)?;
    resolve_destination(destination, &tokens[source_idx])
}

fn aws_output_file(tokens: &[String]) -> Option<String> {
    // Positional tail is `<input-uri> <output-file>`.
    if tokens.len() < 5 {
        return None;
    }
    let destination = tokens.last()?;
    let source = &tokens[tokens.len() - 2];
    resolve_destination(destination, source)
}

/// A destination whose parent-directory form cleans to itself (`.`, `/`,
/// `dir/`) is a directory: the downloaded file keeps the source basename
/// inside it. Anything else names the file directly.
fn resolve_destination(destination: &str, source: &str) -> Option<String> {
    let cleaned = clean_path(destination);
    if parent_dir(destination) == cleaned {
        let base = url_basename(source)?;
        if cleaned == "." {
            Some(base)
        } else {
            Some(format!("{}/{base}", cleaned.trim_end_matches('/')))
        }
    } else {
        Some(cleaned)
    }
}

fn url_basename(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let base = path.rsplit('/').next().unwrap_or("");
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => clean_path(&path[..idx]),
        None => ".".to_string(),
    }
}

/// Lexical path normalization: collapses `//`, removes `.` segments, and
/// resolves `..` where possible, without touching the filesystem.
pub(crate) fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
