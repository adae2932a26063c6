//! Python source helpers on top of tree-sitter.
//!
//! Everything the extractors and the matching engine need from a Python file:
//! docstrings (with `inspect.cleandoc` whitespace rules), plain-name base
//! classes, source segments, and the names of called functions.

use std::collections::BTreeSet;
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, Error)]
pub enum PythonParseError {
    #[error("tree-sitter rejected the Python grammar: {0}")]
    Language(String),
    #[error("parser produced no tree")]
    NoTree,
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
    #[error("Python 2 `{statement}` statement at line {line}")]
    Python2 { statement: &'static str, line: usize },
}

/// Statements tree-sitter-python still accepts but Python 3 rejects.
const PYTHON2_STATEMENTS: &[(&str, &str)] = &[("print_statement", "print"), ("exec_statement", "exec")];

/// A parsed Python module together with its text.
pub struct PySource {
    text: String,
    tree: Tree,
}

impl PySource {
    /// Parse `text`; any syntax error rejects the whole file, and so does a
    /// Python 2 `print` / `exec` statement.
    pub fn parse(text: impl Into<String>) -> Result<Self, PythonParseError> {
        let text = text.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| PythonParseError::Language(e.to_string()))?;
        let tree = parser
            .parse(&text, None)
            .ok_or(PythonParseError::NoTree)?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, column) = first_error_position(root);
            return Err(PythonParseError::Syntax { line, column });
        }
        if let Some((statement, line)) = first_python2_statement(root) {
            return Err(PythonParseError::Python2 { statement, line });
        }
        Ok(Self { text, tree })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        self.text.get(node.byte_range()).unwrap_or("")
    }

    /// Name of a `class_definition` / `function_definition`.
    pub fn def_name(&self, node: Node<'_>) -> Option<&str> {
        node.child_by_field_name("name").map(|n| self.node_text(n))
    }

    /// Source text of a definition, without its decorators.
    pub fn source_segment(&self, node: Node<'_>) -> String {
        self.node_text(node).to_string()
    }

    /// Docstring of a module, class or function node.
    ///
    /// Only a plain (non f-, non bytes) string literal as the first statement
    /// counts. The result is cleaned like `inspect.cleandoc`.
    pub fn docstring(&self, node: Node<'_>) -> Option<String> {
        let body = if node.kind() == "module" {
            node
        } else {
            node.child_by_field_name("body")?
        };

        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment")?;
        if first.kind() != "expression_statement" || first.named_child_count() != 1 {
            return None;
        }
        let expr = first.named_child(0)?;

        let raw = match expr.kind() {
            "string" => self.string_value(expr)?,
            "concatenated_string" => {
                let mut out = String::new();
                let mut c = expr.walk();
                for part in expr.named_children(&mut c) {
                    if part.kind() == "string" {
                        out.push_str(&self.string_value(part)?);
                    }
                }
                out
            }
            _ => return None,
        };
        Some(cleandoc(&raw))
    }

    /// Decoded value of a `string` node, `None` for f-strings and bytes.
    fn string_value(&self, node: Node<'_>) -> Option<String> {
        let mut cursor = node.walk();
        if node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "interpolation")
        {
            return None;
        }
        decode_string_literal(self.node_text(node))
    }

    /// Base classes written as bare identifiers (`class A(B, mod.C)` → `["B"]`).
    pub fn base_classes(&self, class_node: Node<'_>) -> Vec<String> {
        let Some(args) = class_node.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        let mut cursor = args.walk();
        args.named_children(&mut cursor)
            .filter(|arg| arg.kind() == "identifier")
            .map(|arg| self.node_text(arg).to_string())
            .collect()
    }

    /// Unique names of called functions: `f()` → `f`, `a.b.c()` → `c`.
    pub fn call_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if node.kind() == "call" {
                if let Some(func) = node.child_by_field_name("function") {
                    match func.kind() {
                        "identifier" => {
                            names.insert(self.node_text(func).to_string());
                        }
                        "attribute" => {
                            if let Some(attr) = func.child_by_field_name("attribute") {
                                names.insert(self.node_text(attr).to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }
        names
    }
}

fn first_python2_statement(root: Node<'_>) -> Option<(&'static str, usize)> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some((_, keyword)) = PYTHON2_STATEMENTS.iter().find(|(kind, _)| *kind == node.kind()) {
            return Some((*keyword, node.start_position().row + 1));
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    None
}

fn first_error_position(root: Node<'_>) -> (usize, usize) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            return (pos.row + 1, pos.column + 1);
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    let pos = root.start_position();
    (pos.row + 1, pos.column + 1)
}

/// Decode a Python string literal (prefix and quotes included).
pub fn decode_string_literal(literal: &str) -> Option<String> {
    let prefix_len = literal
        .find(|c: char| c == '"' || c == '\'')
        .unwrap_or(literal.len());
    let prefix = literal[..prefix_len].to_ascii_lowercase();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }
    let raw = prefix.contains('r');

    let rest = &literal[prefix_len..];
    let quote = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|q| rest.starts_with(q) && rest.len() >= 2 * q.len() && rest.ends_with(q))?;
    let inner = &rest[quote.len()..rest.len() - quote.len()];

    if raw {
        Some(inner.to_string())
    } else {
        Some(unescape(inner))
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\n') => {}
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Whitespace cleanup with the rules of Python's `inspect.cleandoc`.
pub fn cleandoc(doc: &str) -> String {
    let expanded = expand_tabs(doc, 8);
    let mut lines: Vec<String> = expanded.split('\n').map(str::to_string).collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let content = line.trim_start().chars().count();
            (content > 0).then(|| line.chars().count() - content)
        })
        .min();

    if let Some(first) = lines.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(margin) = margin {
        for line in lines.iter_mut().skip(1) {
            *line = line.chars().skip(margin).collect();
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    lines.join("\n")
}

fn expand_tabs(s: &str, tab: usize) -> String {
    let mut out = String::with_capacity(s.len());
    let mut column = 0usize;
    for c in s.chars() {
        match c {
            '\t' => {
                let pad = tab - (column % tab);
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

/// Comment lines of a script joined with spaces.
///
/// A line counts when its trimmed form starts with `#`; leading `#` and space
/// characters are stripped and empty remainders dropped.
pub fn comment_block(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches(['#', ' ']).trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First paragraph of a docstring on a single line.
pub fn first_paragraph(doc: &str) -> String {
    doc.trim()
        .split("\n\n")
        .next()
        .unwrap_or("")
        .trim()
        .replace('\n', " ")
}
