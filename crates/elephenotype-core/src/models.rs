//! Shared typed models used across analysis, slicing, correlation and
//! compilation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Schema / contract constants
// ---------------------------------------------------------------------------

/// Analyzer version stamped into every slice's metadata.
pub const ANALYZER_VERSION: &str = "1.0";

/// Repository tag for batch outputs outside the expected directory layout.
pub const UNKNOWN_REPO: &str = "unknown_repo";

// ---------------------------------------------------------------------------
// 1. Complexity
// ---------------------------------------------------------------------------

/// Heuristic structural complexity of a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 2. FunctionRecord / ClassRecord / SourceUnit
// ---------------------------------------------------------------------------

/// A function (or method) discovered by the analyzer.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub file_path: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive. Never less than `start_line`.
    pub end_line: usize,
    pub docstring: Option<String>,
    pub parameters: Vec<String>,
    pub returns: Option<String>,
    pub decorators: Vec<String>,
    pub complexity: Complexity,
    pub body_lines: Vec<String>,
}

impl FunctionRecord {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// A class discovered by the analyzer, with its direct methods.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassRecord {
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub docstring: Option<String>,
    pub base_classes: Vec<String>,
    pub decorators: Vec<String>,
    pub methods: Vec<FunctionRecord>,
}

impl ClassRecord {
    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }
}

/// A top-level entity of a source file.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Function(FunctionRecord),
    Class(ClassRecord),
}

/// One parsed source file. Transient: its records are absorbed by the slicer.
#[derive(Clone, Debug, Default)]
pub struct SourceUnit {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Dotted module name derived from `path`.
    pub module_name: String,
    pub docstring: Option<String>,
    pub imports: Vec<String>,
    pub functions: Vec<FunctionRecord>,
    pub classes: Vec<ClassRecord>,
}

impl SourceUnit {
    /// Functions of this file at the given complexity, in source order.
    pub fn functions_by_complexity(&self, complexity: Complexity) -> Vec<&FunctionRecord> {
        self.functions
            .iter()
            .filter(|f| f.complexity == complexity)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// 3. Slice
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceKind {
    Function,
    Class,
}

impl SliceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceKind::Function => "function",
            SliceKind::Class => "class",
        }
    }

    /// Suffix used in slice identifiers.
    pub fn id_suffix(&self) -> &'static str {
        match self {
            SliceKind::Function => "func",
            SliceKind::Class => "class",
        }
    }
}

impl fmt::Display for SliceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific context carried by a slice.
///
/// Untagged so that exported records stay plain JSON objects; anything that
/// does not match a known shape is kept verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SliceContext {
    Function {
        docstring: Option<String>,
        parameters: Vec<String>,
        returns: Option<String>,
        decorators: Vec<String>,
    },
    Class {
        docstring: Option<String>,
        base_classes: Vec<String>,
        methods: Vec<String>,
        decorators: Vec<String>,
    },
    Other(Map<String, Value>),
}

impl SliceContext {
    pub fn docstring(&self) -> Option<&str> {
        match self {
            SliceContext::Function { docstring, .. } | SliceContext::Class { docstring, .. } => {
                docstring.as_deref()
            }
            SliceContext::Other(map) => map.get("docstring").and_then(Value::as_str),
        }
    }

    pub fn base_classes(&self) -> Vec<String> {
        match self {
            SliceContext::Class { base_classes, .. } => base_classes.clone(),
            SliceContext::Function { .. } => Vec::new(),
            SliceContext::Other(map) => string_list(map.get("base_classes")),
        }
    }

    /// Method names; object entries contribute their `name` field.
    pub fn method_names(&self) -> Vec<String> {
        match self {
            SliceContext::Class { methods, .. } => methods.clone(),
            SliceContext::Function { .. } => Vec::new(),
            SliceContext::Other(map) => match map.get("methods") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        Value::Object(obj) => obj
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        other => other.to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            },
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceMetadata {
    pub sliced_at: String,
    pub analyzer_version: String,
    /// SHA-256 of the source file the slice was cut from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The persisted unit: one function or class cut out of a repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SliceKind,
    pub repository: String,
    pub file_path: String,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code_snippet: String,
    pub complexity: Complexity,
    pub context: SliceContext,
    pub metadata: SliceMetadata,
}

impl Slice {
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Build a slice identifier: `{repo}_{ordinal:05}_{func|class}`.
pub fn slice_id(repository: &str, ordinal: usize, kind: SliceKind) -> String {
    format!(
        "{}_{:05}_{}",
        repository.replace('/', "_"),
        ordinal,
        kind.id_suffix()
    )
}

// ---------------------------------------------------------------------------
// 4. Scenario
// ---------------------------------------------------------------------------

/// Dataset generation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Question answering over functions.
    Scenario1,
    /// Architectural design reasoning over classes.
    Scenario2,
    Unknown,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Scenario1 => "scenario1",
            Scenario::Scenario2 => "scenario2",
            Scenario::Unknown => "unknown",
        }
    }

    /// Attribute a batch output file to a scenario by its file name prefix.
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.starts_with("scenario1") {
            Scenario::Scenario1
        } else if file_name.starts_with("scenario2") {
            Scenario::Scenario2
        } else {
            Scenario::Unknown
        }
    }

    /// Prefix prepended to a slice id to form a batch `custom_id`.
    pub fn custom_id_prefix(&self) -> Option<&'static str> {
        match self {
            Scenario::Scenario1 => Some("scenario1_"),
            Scenario::Scenario2 => Some("scenario2_"),
            Scenario::Unknown => None,
        }
    }

    pub fn custom_id(&self, slice_id: &str) -> String {
        format!("{}{}", self.custom_id_prefix().unwrap_or(""), slice_id)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recover the slice identifier from a batch `custom_id`.
pub fn source_id_from_custom_id(custom_id: &str) -> &str {
    custom_id
        .strip_prefix("scenario1_")
        .or_else(|| custom_id.strip_prefix("scenario2_"))
        .unwrap_or(custom_id)
}

// ---------------------------------------------------------------------------
// 5. TrainingItem
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub custom_id: String,
    pub scenario: Scenario,
    pub repo: String,
}

/// Final instruction/input/output training triple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingItem {
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub metadata: TrainingMetadata,
    /// Origin tag attached when items from several scenarios are pooled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_scenario: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn function(name: &str, complexity: Complexity) -> FunctionRecord {
        FunctionRecord {
            name: name.into(),
            file_path: "m.py".into(),
            start_line: 1,
            end_line: 2,
            docstring: None,
            parameters: vec![],
            returns: None,
            decorators: vec![],
            complexity,
            body_lines: vec![],
        }
    }

    #[test]
    fn test_functions_by_complexity_keeps_source_order() {
        let unit = SourceUnit {
            functions: vec![
                function("a", Complexity::Simple),
                function("b", Complexity::Complex),
                function("c", Complexity::Simple),
            ],
            ..SourceUnit::default()
        };
        let simple: Vec<&str> = unit
            .functions_by_complexity(Complexity::Simple)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(simple, vec!["a", "c"]);
        assert!(unit.functions_by_complexity(Complexity::Medium).is_empty());
    }

    #[test]
    fn test_slice_id_format() {
        assert_eq!(
            slice_id("pallets/flask", 7, SliceKind::Function),
            "pallets_flask_00007_func"
        );
        assert_eq!(slice_id("repo", 12345, SliceKind::Class), "repo_12345_class");
    }

    #[test]
    fn test_scenario_from_file_name() {
        assert_eq!(
            Scenario::from_file_name("scenario1_batch_abc_output.jsonl"),
            Scenario::Scenario1
        );
        assert_eq!(
            Scenario::from_file_name("scenario2_output.jsonl"),
            Scenario::Scenario2
        );
        assert_eq!(Scenario::from_file_name("other_output.jsonl"), Scenario::Unknown);
    }

    #[test]
    fn test_source_id_strips_only_prefix() {
        assert_eq!(source_id_from_custom_id("scenario1_repo_00001_func"), "repo_00001_func");
        assert_eq!(source_id_from_custom_id("scenario2_repo_00002_class"), "repo_00002_class");
        assert_eq!(
            source_id_from_custom_id("repo_scenario1_00003_func"),
            "repo_scenario1_00003_func"
        );
    }

    #[test]
    fn test_context_deserializes_function_shape() {
        let ctx: SliceContext = serde_json::from_value(json!({
            "docstring": null,
            "parameters": ["a", "b"],
            "returns": "int",
            "decorators": []
        }))
        .unwrap();
        assert!(matches!(ctx, SliceContext::Function { .. }));
    }

    #[test]
    fn test_context_deserializes_class_shape() {
        let ctx: SliceContext = serde_json::from_value(json!({
            "docstring": "Doc",
            "base_classes": ["Base"],
            "methods": ["a", "b"],
            "decorators": ["dataclass"]
        }))
        .unwrap();
        assert_eq!(ctx.docstring(), Some("Doc"));
        assert_eq!(ctx.base_classes(), vec!["Base".to_string()]);
        assert_eq!(ctx.method_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_context_keeps_unknown_shape() {
        let ctx: SliceContext = serde_json::from_value(json!({
            "methods": [{"name": "run"}, "stop"],
            "note": 3
        }))
        .unwrap();
        assert!(matches!(ctx, SliceContext::Other(_)));
        assert_eq!(ctx.method_names(), vec!["run".to_string(), "stop".to_string()]);
        assert_eq!(ctx.docstring(), None);
    }

    #[test]
    fn test_training_item_omits_absent_scenario_tag() {
        let item = TrainingItem {
            instruction: "i".into(),
            input: String::new(),
            output: "o".into(),
            metadata: TrainingMetadata {
                custom_id: "scenario1_x".into(),
                scenario: Scenario::Scenario1,
                repo: "r".into(),
            },
            training_scenario: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("training_scenario").is_none());
        assert_eq!(value["metadata"]["scenario"], "scenario1");
    }
}
