//! Tree-sitter parsing wrapper used by the extraction pass.

use tree_sitter::{Node, Parser, Tree};

use crate::errors::{CoreError, CoreResult};

/// Parse Python source into a syntax tree.
///
/// Tree-sitter recovers from malformed input by inserting `ERROR` and
/// missing nodes; any such node turns the whole file into a parse failure.
pub fn parse_python(source: &str, path: &str) -> CoreResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| CoreError::SyntaxParse {
            path: path.to_string(),
            reason: format!("Failed to set language: {e}"),
        })?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| CoreError::SyntaxParse {
            path: path.to_string(),
            reason: "parser returned no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let reason = match first_error(root) {
            Some(node) => format!(
                "invalid syntax at line {}, column {}",
                node.start_position().row + 1,
                node.start_position().column + 1
            ),
            None => "invalid syntax".to_string(),
        };
        return Err(CoreError::SyntaxParse {
            path: path.to_string(),
            reason,
        });
    }

    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Source text covered by `node`, or `""` if the range is not a char boundary.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based inclusive last line of `node`.
///
/// A node whose end point sits at column 0 ended on the previous line's
/// newline, so that line is the last one it covers.
pub fn end_line(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    }
}

/// Statements whose extent tree-sitter stretches over trailing comments.
const COMPOUND_KINDS: &[&str] = &[
    "block",
    "function_definition",
    "class_definition",
    "decorated_definition",
    "if_statement",
    "elif_clause",
    "else_clause",
    "for_statement",
    "while_statement",
    "try_statement",
    "except_clause",
    "except_group_clause",
    "finally_clause",
    "with_statement",
    "match_statement",
    "case_clause",
];

/// 1-based last line of the code in `node`, not counting comments that
/// trail its final statement.
pub fn code_end_line(node: Node<'_>) -> usize {
    if !COMPOUND_KINDS.contains(&node.kind()) {
        return end_line(node);
    }
    let mut cursor = node.walk();
    let last = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .last();
    match last {
        Some(child) => code_end_line(child),
        None => end_line(node),
    }
}
