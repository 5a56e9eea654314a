//! Shell parsing and lowering.
//!
//! Scripts are parsed with tree-sitter-bash and lowered once into the small
//! syntax subset the walker consumes. Word resolution is deliberately
//! conservative: only single-part words (bare words, numbers, raw strings,
//! and double-quoted strings made purely of literal content) resolve to
//! [`Arg::Literal`]. Concatenations, variable expansions, and arithmetic are
//! [`Arg::Opaque`] and never participate in matching, so an ambiguous script
//! can be passed but never falsely flagged.

use std::cell::RefCell;

use tree_sitter::{Node, Parser};

thread_local! {
    // tree-sitter `Parser` is !Send, so each thread keeps its own.
    static BASH_PARSER: RefCell<Parser> = RefCell::new({
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_bash::LANGUAGE.into())
            .expect("tree-sitter-bash grammar failed to load");
        parser
    });
}

/// The grammar subset the walker consumes.
#[derive(Debug, Clone)]
pub enum ShellNode {
    Call(CallExpr),
    Pipeline {
        elems: Vec<ShellNode>,
        line: usize,
        text: String,
    },
    Group(Vec<ShellNode>),
}

/// A simple command: ordered arguments (program first), plus any literal
/// output-redirect destinations attached to the same statement.
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub args: Vec<Arg>,
    pub redirects: Vec<String>,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Arg {
    /// A fully resolved literal word.
    Literal(String),
    /// `<(...)` input process substitution, body lowered.
    ProcSub(Vec<ShellNode>),
    /// `$(...)`, backticks, or `>(...)`: opaque as a word, but the body is
    /// still walked.
    CmdSub(Vec<ShellNode>),
    /// Anything the conservative resolution policy refuses to interpret.
    Opaque,
}

/// Parse a script and lower it. Returns `None` when the grammar does not
/// recognize the input; callers decide what an unparsable script means.
pub fn parse_script(source: &str) -> Option<ShellNode> {
    let tree = BASH_PARSER.with(|p| p.borrow_mut().parse(source, None))?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }
    Some(lower(root, source).unwrap_or_else(|| ShellNode::Group(Vec::new())))
}

fn lower(node: Node<'_>, src: &str) -> Option<ShellNode> {
    match node.kind() {
        "command" => Some(ShellNode::Call(lower_command(node, src, Vec::new()))),
        "redirected_statement" => lower_redirected(node, src),
        "pipeline" => {
            let elems = named_children(node)
                .into_iter()
                .filter_map(|c| lower(c, src))
                .collect();
            Some(ShellNode::Pipeline {
                elems,
                line: node.start_position().row + 1,
                text: node_text(node, src),
            })
        }
        // Containers: sequencing, control flow, substitution bodies. Their
        // structure is irrelevant to pinning; only the commands inside count.
        "program" | "list" | "subshell" | "compound_statement" | "do_group" | "if_statement"
        | "elif_clause" | "else_clause" | "while_statement" | "for_statement"
        | "c_style_for_statement" | "case_statement" | "case_item" | "function_definition"
        | "negated_command" | "command_substitution" | "declaration_command"
        | "variable_assignment" => {
            let children: Vec<ShellNode> = named_children(node)
                .into_iter()
                .filter_map(|c| lower(c, src))
                .collect();
            if children.is_empty() {
                None
            } else {
                Some(ShellNode::Group(children))
            }
        }
        _ => None,
    }
}

fn lower_command(node: Node<'_>, src: &str, redirects: Vec<String>) -> CallExpr {
    let mut args = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "command_name" => {
                if let Some(inner) = child.named_child(0) {
                    args.push(lower_word(inner, src));
                }
            }
            // `FOO=1 cmd` prefix assignments are not arguments.
            "variable_assignment" => {}
            _ => args.push(lower_word(child, src)),
        }
    }
    CallExpr {
        args,
        redirects,
        line: node.start_position().row + 1,
        text: node_text(node, src),
    }
}

fn lower_redirected(node: Node<'_>, src: &str) -> Option<ShellNode> {
    let mut redirects = Vec::new();
    for child in named_children(node) {
        if child.kind() == "file_redirect" {
            if let Some(dest) = output_redirect_target(child, src) {
                redirects.push(dest);
            }
        }
    }
    let body = node.child_by_field_name("body")?;
    if body.kind() == "command" {
        Some(ShellNode::Call(lower_command(body, src, redirects)))
    } else {
        lower(body, src)
    }
}

fn output_redirect_target(node: Node<'_>, src: &str) -> Option<String> {
    let mut cursor = node.walk();
    let is_output = node
        .children(&mut cursor)
        .any(|c| matches!(c.kind(), ">" | ">>" | "&>" | "&>>"));
    if !is_output {
        return None;
    }
    let dest = node.child_by_field_name("destination")?;
    match lower_word(dest, src) {
        Arg::Literal(target) => Some(target),
        _ => None,
    }
}

fn lower_word(node: Node<'_>, src: &str) -> Arg {
    match node.kind() {
        "word" | "number" => Arg::Literal(node_text(node, src)),
        "raw_string" => {
            let text = node_text(node, src);
            Arg::Literal(text.trim_matches('\'').to_string())
        }
        "string" => {
            let parts = named_children(node);
            if parts.iter().all(|p| p.kind() == "string_content") {
                Arg::Literal(parts.iter().map(|p| node_text(*p, src)).collect())
            } else {
                Arg::Opaque
            }
        }
        "command_substitution" => Arg::CmdSub(lower_body(node, src)),
        "process_substitution" => {
            if node_text(node, src).starts_with("<(") {
                Arg::ProcSub(lower_body(node, src))
            } else {
                Arg::CmdSub(lower_body(node, src))
            }
        }
        _ => Arg::Opaque,
    }
}

fn lower_body(node: Node<'_>, src: &str) -> Vec<ShellNode> {
    named_children(node)
        .into_iter()
        .filter_map(|c| lower(c, src))
        .collect()
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn node_text(node: Node<'_>, src: &str) -> String {
    node.utf8_text(src.as_bytes()).unwrap_or_default().to_string()
}
