//! Function, class and import extraction from Python syntax trees.
//!
//! Only direct children of the module become top-level records. Functions
//! nested in other functions stay inside the parent's body text; functions
//! directly inside a class body become that class's methods.

use std::path::Path;

use tracing::{debug, warn};
use tree_sitter::Node;

use crate::analyzer::docstring::{decode_concatenated_docstring, decode_docstring};
use crate::analyzer::parser::{code_end_line, node_text, parse_python};
use crate::config::ComplexityThresholds;
use crate::errors::{CoreError, CoreResult};
use crate::models::{ClassRecord, Entity, FunctionRecord, SourceUnit};

/// Node kinds counted as branching constructs by the complexity heuristic.
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "try_statement",
    "with_statement",
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Convert a file path to a dotted module name.
///
/// Strips the extension, joins path components with dots, and maps a
/// package's `__init__` file to the package itself.
pub fn to_module_name(path: &str) -> String {
    let p = Path::new(path);
    let without_ext = p.with_extension("");
    let mut parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if parts.len() > 1 && parts.last() == Some(&"__init__") {
        parts.pop();
    }
    parts.join(".")
}

/// Count branching constructs anywhere in the subtree rooted at `node`.
pub fn count_branches(node: Node<'_>) -> usize {
    let own = usize::from(BRANCH_KINDS.contains(&node.kind()));
    let mut cursor = node.walk();
    let nested: usize = node
        .named_children(&mut cursor)
        .map(count_branches)
        .sum();
    own + nested
}

/// Split a possibly decorated definition into (definition, decorators).
fn unwrap_decorated(node: Node<'_>) -> Option<(Node<'_>, Vec<Node<'_>>)> {
    match node.kind() {
        "function_definition" | "class_definition" => Some((node, Vec::new())),
        "decorated_definition" => {
            let definition = node.child_by_field_name("definition")?;
            let mut cursor = node.walk();
            let decorators = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "decorator")
                .collect();
            Some((definition, decorators))
        }
        _ => None,
    }
}

/// First statement of a module or block, skipping comments.
fn first_statement(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let first = node
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment");
    first
}

/// Docstring of a module or block: a leading string expression statement.
fn block_docstring(block: Node<'_>, source: &str) -> Option<String> {
    let statement = first_statement(block)?;
    if statement.kind() != "expression_statement" || statement.named_child_count() != 1 {
        return None;
    }
    let expr = statement.named_child(0)?;
    match expr.kind() {
        "string" => decode_docstring(node_text(expr, source)),
        "concatenated_string" => {
            let mut cursor = expr.walk();
            let parts: Vec<&str> = expr
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "string")
                .map(|c| node_text(c, source))
                .collect();
            decode_concatenated_docstring(&parts)
        }
        _ => None,
    }
}

/// Name of a decorator: the bare name, the callee of a call, or the
/// expression text.
fn decorator_name(decorator: Node<'_>, source: &str) -> String {
    let Some(expr) = first_named_non_comment(decorator) else {
        return node_text(decorator, source).trim_start_matches('@').trim().to_string();
    };
    match expr.kind() {
        "identifier" => node_text(expr, source).to_string(),
        "call" => match expr.child_by_field_name("function") {
            Some(func) => node_text(func, source).to_string(),
            None => node_text(expr, source).to_string(),
        },
        _ => node_text(expr, source).to_string(),
    }
}

fn first_named_non_comment(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment");
    found
}

/// Base class names; keyword arguments such as `metaclass=` are not bases.
fn base_class_names(class: Node<'_>, source: &str) -> Vec<String> {
    let Some(superclasses) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = superclasses.walk();
    superclasses
        .named_children(&mut cursor)
        .filter(|c| !matches!(c.kind(), "keyword_argument" | "comment" | "dictionary_splat"))
        .map(|c| node_text(c, source).to_string())
        .collect()
}

/// Names of positional parameters in declaration order.
///
/// Collection stops at `*` or `*args`: keyword-only parameters and the
/// `*args` / `**kwargs` collectors are excluded.
fn parameter_names(function: Node<'_>, source: &str) -> Vec<String> {
    let Some(params) = function.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        let name_node = match param.kind() {
            "identifier" => Some(param),
            "default_parameter" | "typed_default_parameter" => param.child_by_field_name("name"),
            "typed_parameter" => {
                let first = param.named_child(0);
                match first.map(|n| n.kind()) {
                    Some("identifier") => first,
                    Some("list_splat_pattern") => break,
                    _ => None,
                }
            }
            "list_splat_pattern" | "keyword_separator" => break,
            _ => None,
        };
        if let Some(node) = name_node {
            let name = node_text(node, source);
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn collect_imports(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let dotted = if name.kind() == "aliased_import" {
                    name.child_by_field_name("name")
                } else {
                    Some(name)
                };
                if let Some(dotted) = dotted {
                    out.push(node_text(dotted, source).to_string());
                }
            }
            return;
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                match module.kind() {
                    "dotted_name" => out.push(node_text(module, source).to_string()),
                    "relative_import" => {
                        let mut cursor = module.walk();
                        let dotted = module
                            .named_children(&mut cursor)
                            .find(|c| c.kind() == "dotted_name");
                        if let Some(dotted) = dotted {
                            out.push(node_text(dotted, source).to_string());
                        }
                    }
                    _ => {}
                }
            }
            return;
        }
        "future_import_statement" => {
            out.push("__future__".to_string());
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_imports(child, source, out);
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Per-file state shared by the extraction helpers.
struct FileContext<'s> {
    path: &'s str,
    source: &'s str,
    lines: Vec<&'s str>,
}

impl<'s> FileContext<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node_text(node, self.source)
    }

    fn extraction_error(&self, entity: &str, reason: impl Into<String>) -> CoreError {
        CoreError::EntityExtraction {
            path: self.path.to_string(),
            entity: entity.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses Python files into [`SourceUnit`]s.
#[derive(Clone, Debug, Default)]
pub struct Analyzer {
    thresholds: ComplexityThresholds,
}

impl Analyzer {
    pub fn new(thresholds: ComplexityThresholds) -> Self {
        Self { thresholds }
    }

    /// Analyze one file. `path` is the file's repository-relative identity.
    ///
    /// Fails only when the file does not parse; a function or class that
    /// cannot be extracted is logged and left out.
    pub fn analyze(&self, source: &str, path: &str) -> CoreResult<SourceUnit> {
        let tree = parse_python(source, path)?;
        let root = tree.root_node();
        let ctx = FileContext {
            path,
            source,
            lines: source.lines().collect(),
        };

        let mut imports = Vec::new();
        collect_imports(root, source, &mut imports);

        let mut functions = Vec::new();
        let mut classes = Vec::new();
        for entity in self.top_level_entities(root, &ctx) {
            match entity {
                Entity::Function(f) => functions.push(f),
                Entity::Class(c) => classes.push(c),
            }
        }

        debug!(
            "Analyzed {}: {} functions, {} classes, {} imports",
            path,
            functions.len(),
            classes.len(),
            imports.len()
        );

        Ok(SourceUnit {
            path: path.to_string(),
            module_name: to_module_name(path),
            docstring: block_docstring(root, source),
            imports,
            functions,
            classes,
        })
    }

    fn top_level_entities(&self, root: Node<'_>, ctx: &FileContext<'_>) -> Vec<Entity> {
        let mut entities = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let Some((definition, decorators)) = unwrap_decorated(child) else {
                continue;
            };
            let result = match definition.kind() {
                "function_definition" => self
                    .extract_function(definition, &decorators, ctx)
                    .map(Entity::Function),
                "class_definition" => self
                    .extract_class(definition, &decorators, ctx)
                    .map(Entity::Class),
                _ => continue,
            };
            match result {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!("{e}"),
            }
        }
        entities
    }

    fn extract_function(
        &self,
        node: Node<'_>,
        decorators: &[Node<'_>],
        ctx: &FileContext<'_>,
    ) -> CoreResult<FunctionRecord> {
        let name_node = node
            .child_by_field_name("name")
            .ok_or_else(|| ctx.extraction_error("function", "definition has no name"))?;
        let name = ctx.text(name_node).to_string();
        if name.is_empty() {
            return Err(ctx.extraction_error("function", "empty function name"));
        }

        let start_line = node.start_position().row + 1;
        let end_line = code_end_line(node).max(start_line);
        if start_line > ctx.lines.len() {
            return Err(ctx.extraction_error(
                &name,
                format!("start line {start_line} beyond end of file"),
            ));
        }
        let body_lines: Vec<String> = ctx.lines[start_line - 1..end_line.min(ctx.lines.len())]
            .iter()
            .map(|l| l.to_string())
            .collect();

        let docstring = node
            .child_by_field_name("body")
            .and_then(|body| block_docstring(body, ctx.source));
        let returns = node
            .child_by_field_name("return_type")
            .map(|r| ctx.text(r).to_string());
        let branches = count_branches(node);
        let complexity = self.thresholds.classify(body_lines.len(), branches);

        Ok(FunctionRecord {
            name,
            file_path: ctx.path.to_string(),
            start_line,
            end_line,
            docstring,
            parameters: parameter_names(node, ctx.source),
            returns,
            decorators: decorators
                .iter()
                .map(|d| decorator_name(*d, ctx.source))
                .collect(),
            complexity,
            body_lines,
        })
    }

    fn extract_class(
        &self,
        node: Node<'_>,
        decorators: &[Node<'_>],
        ctx: &FileContext<'_>,
    ) -> CoreResult<ClassRecord> {
        let name_node = node
            .child_by_field_name("name")
            .ok_or_else(|| ctx.extraction_error("class", "definition has no name"))?;
        let name = ctx.text(name_node).to_string();
        let start_line = node.start_position().row + 1;
        let end_line = code_end_line(node).max(start_line);

        let mut docstring = None;
        let mut methods = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            docstring = block_docstring(body, ctx.source);
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                let Some((definition, method_decorators)) = unwrap_decorated(item) else {
                    continue;
                };
                if definition.kind() != "function_definition" {
                    continue;
                }
                match self.extract_function(definition, &method_decorators, ctx) {
                    Ok(method) => methods.push(method),
                    Err(e) => warn!("{e} (in class {name})"),
                }
            }
        }

        Ok(ClassRecord {
            name,
            file_path: ctx.path.to_string(),
            start_line,
            end_line,
            docstring,
            base_classes: base_class_names(node, ctx.source),
            decorators: decorators
                .iter()
                .map(|d| decorator_name(*d, ctx.source))
                .collect(),
            methods,
        })
    }
}

/// Analyze with the default complexity thresholds.
pub fn analyze_source(source: &str, path: &str) -> CoreResult<SourceUnit> {
    Analyzer::default().analyze(source, path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
