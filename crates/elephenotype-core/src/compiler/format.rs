//! Rendering of parsed payloads and source slices into training text.

use serde_json::{Map, Value};

use crate::models::Slice;

pub const SCENARIO1_INSTRUCTION: &str =
    "分析以下代码片段，并从资深开发者的角度回答一个典型的初级开发者提问。请包含详细的推理过程。";
pub const SCENARIO2_INSTRUCTION: &str =
    "基于提供的代码架构概览，为新需求设计一套技术方案。请包含详细的设计推理过程，并确保方案符合现有架构模式。";

const DEFAULT_REQUIREMENT_TITLE: &str = "新需求";

/// `snake_case` key to `Title Case`: every alphabetic run starts upper-case
/// and continues lower-case.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut in_word = false;
    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Plain-text rendering of a JSON value. Null renders as empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn text_at(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).map(display_value).unwrap_or_default()
}

fn object_at<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn list_at<'a>(map: Option<&'a Map<String, Value>>, key: &str) -> &'a [Value] {
    map.and_then(|m| m.get(key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The reasoning-trace step list, preferring `primary` and falling back to
/// `fallback` when the primary list is absent or empty.
pub fn trace_list<'a>(payload: &'a Map<String, Value>, primary: &str, fallback: &str) -> &'a [Value] {
    let trace = object_at(payload, "reasoning_trace");
    let first = list_at(trace, primary);
    if first.is_empty() {
        list_at(trace, fallback)
    } else {
        first
    }
}

/// Render steps as `"{header}:\n{Key: value lines}"` blocks. The step number
/// is read from `number_keys` in order; non-object and field-less steps are
/// skipped.
fn render_steps(steps: &[Value], number_keys: [&str; 2], bare_header: &str) -> Vec<String> {
    steps
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|step| {
            let number = number_keys
                .iter()
                .find_map(|k| step.get(*k).filter(|v| is_truthy(v)));
            let header = match number {
                Some(n) => format!("Step {}", display_value(n)),
                None => bare_header.to_string(),
            };
            let lines: Vec<String> = step
                .iter()
                .filter(|(k, _)| !number_keys.contains(&k.as_str()))
                .map(|(k, v)| format!("{}: {}", title_case(k), display_value(v)))
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(format!("{header}:\n{}", lines.join("\n")))
            }
        })
        .collect()
}

fn thought_block(parts: &[String]) -> String {
    format!("<thought>\n{}\n</thought>", parts.join("\n\n"))
}

/// Question/answer output with the reasoning trace in a thought block.
pub fn format_scenario1_output(payload: &Map<String, Value>) -> String {
    let trace = object_at(payload, "reasoning_trace");
    let mut parts = render_steps(
        list_at(trace, "steps"),
        ["step_number", "step"],
        "Step",
    );
    let conclusion = trace.map(|t| text_at(t, "conclusion")).unwrap_or_default();
    if !conclusion.is_empty() {
        parts.push(format!("Conclusion: {conclusion}"));
    }
    format!(
        "{}\n\n初级开发者提问：{}\n\n资深专家解答：{}",
        thought_block(&parts),
        text_at(payload, "question"),
        text_at(payload, "answer")
    )
}

/// Requirement section, preferring `requirement_analysis` over `requirement`.
fn requirement(payload: &Map<String, Value>) -> Option<&Map<String, Value>> {
    object_at(payload, "requirement_analysis").or_else(|| object_at(payload, "requirement"))
}

fn bullet_list(out: &mut String, items: &[Value]) {
    for item in items {
        out.push_str("- ");
        out.push_str(&display_value(item));
        out.push('\n');
    }
}

/// Design output: thought block, requirement, design, components,
/// integration points, data flow and implementation plan.
pub fn format_scenario2_output(payload: &Map<String, Value>) -> String {
    let trace = object_at(payload, "reasoning_trace");
    let mut parts = render_steps(
        trace_list(payload, "analysis_steps", "steps"),
        ["step", "step_number"],
        "Analysis Step",
    );
    let rationale = trace.map(|t| text_at(t, "design_rationale")).unwrap_or_default();
    if !rationale.is_empty() {
        parts.push(format!("Design Rationale: {rationale}"));
    }

    let req = requirement(payload);
    let design = object_at(payload, "design_solution");
    let architecture = design.and_then(|d| object_at(d, "architecture"));

    let mut out = thought_block(&parts);
    out.push_str("\n\n需求分析：\n");
    out.push_str(&format!(
        "标题: {}\n描述: {}\n",
        req.map(|r| text_at(r, "title")).unwrap_or_default(),
        req.map(|r| text_at(r, "description")).unwrap_or_default()
    ));
    out.push_str(&format!(
        "\n设计方案：\n概览: {}\n\n架构组件:\n",
        design.map(|d| text_at(d, "overview")).unwrap_or_default()
    ));
    bullet_list(&mut out, list_at(architecture, "components"));
    out.push_str("\n集成点:\n");
    bullet_list(&mut out, list_at(architecture, "integration_points"));
    out.push_str(&format!(
        "\n数据流: {}\n",
        architecture.map(|a| text_at(a, "data_flow")).unwrap_or_default()
    ));
    out.push_str("\n实现计划:\n");
    bullet_list(&mut out, list_at(design, "implementation_plan"));
    out
}

/// Path, name and snippet of a function slice.
pub fn scenario1_input(slice: &Slice) -> String {
    format!(
        "代码路径: {}\n代码名称: {}\n\n代码内容:\n{}",
        slice.file_path, slice.name, slice.code_snippet
    )
}

/// Class outline: name, file, docstring, bases and method list.
pub fn architecture_skeleton(slice: &Slice) -> String {
    let mut skeleton = format!("Class: {}\nFile: {}\n", slice.name, slice.file_path);
    if let Some(doc) = slice.context.docstring().filter(|d| !d.is_empty()) {
        skeleton.push_str(&format!("Docstring: {doc}\n"));
    }
    let bases = slice.context.base_classes();
    if !bases.is_empty() {
        skeleton.push_str(&format!("Base classes: {}\n", bases.join(", ")));
    }
    skeleton.push_str("\nMethods:\n");
    for method in slice.context.method_names() {
        skeleton.push_str(&format!("- {method}()\n"));
    }
    skeleton
}

/// Skeleton plus the requirement the model proposed for it.
pub fn scenario2_input(slice: &Slice, payload: &Map<String, Value>) -> String {
    let req = requirement(payload);
    let title = req
        .and_then(|r| r.get("title"))
        .map(display_value)
        .unwrap_or_else(|| DEFAULT_REQUIREMENT_TITLE.to_string());
    let description = req.map(|r| text_at(r, "description")).unwrap_or_default();
    format!(
        "架构概览:\n{}\n\n需求: {}\n详情: {}",
        architecture_skeleton(slice),
        title,
        description
    )
}
