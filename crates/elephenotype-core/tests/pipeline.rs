//! End-to-end: slice a repository, prepare batch requests, fake the batch
//! outputs, and compile the training datasets.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};

use elephenotype_core::batch::{BatchRequest, RequestBuilder};
use elephenotype_core::compiler::DatasetCompiler;
use elephenotype_core::config::{CompilationConfig, PipelineConfig};
use elephenotype_core::errors::CoreError;
use elephenotype_core::jsonl::read_jsonl;
use elephenotype_core::models::{Complexity, Scenario, SliceContext, SliceKind, TrainingItem};
use elephenotype_core::slicer::{SliceCollection, Slicer};

const CALC: &str = r#""""Calculator helpers."""
import math


def add(a, b):
    return a + b


class Calculator(Base):
    """Keeps a running total."""

    def __init__(self):
        self.total = 0

    def add(self, x):
        self.total += x

    def sub(self, x):
        self.total -= x

    def mul(self, x):
        self.total *= x

    def div(self, x):
        self.total /= x

    def reset(self):
        self.total = 0
"#;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn output_line(custom_id: &str, content: &str) -> String {
    json!({
        "custom_id": custom_id,
        "response": {"body": {"choices": [{"message": {"content": content}}]}}
    })
    .to_string()
}

fn scenario1_content(i: usize) -> String {
    json!({
        "question": format!("What does add do? ({i})"),
        "answer": "It returns the sum of a and b.",
        "reasoning_trace": {
            "steps": [
                {"step_number": 1, "description": "Read the signature"},
                {"step_number": 2, "description": "Read the return"}
            ],
            "conclusion": "Plain addition."
        }
    })
    .to_string()
}

fn scenario2_content() -> String {
    json!({
        "requirement_analysis": {"title": "History", "description": "Record every operation"},
        "design_solution": {
            "overview": "Add an operation log",
            "architecture": {"components": ["OperationLog"], "integration_points": ["Calculator.add"], "data_flow": "op -> log"},
            "implementation_plan": ["Add log", "Hook operations"]
        },
        "reasoning_trace": {"analysis_steps": [{"step": 1, "analysis": "Operations mutate total"}]}
    })
    .to_string()
}

#[test]
fn test_slice_prepare_compile_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let config = PipelineConfig::default();

    // Slice.
    write(&root.join("repos/calc/calc.py"), CALC);
    write(&root.join("repos/calc/tests/test_calc.py"), "def test_add():\n    pass\n");
    let slicer = Slicer::new(config.analysis.clone());
    let slices = slicer
        .slice_repository(&root.join("repos/calc"), "calc", None)
        .unwrap();
    assert_eq!(slices.len(), 2);

    let function = &slices[0];
    assert_eq!(function.kind, SliceKind::Function);
    assert_eq!(function.id, "calc_00000_func");
    assert_eq!(function.complexity, Complexity::Simple);
    assert_eq!(function.code_snippet, "def add(a, b):\n    return a + b");
    match &function.context {
        SliceContext::Function { parameters, .. } => assert_eq!(parameters, &["a", "b"]),
        other => panic!("unexpected context {other:?}"),
    }

    let class = &slices[1];
    assert_eq!(class.id, "calc_00001_class");
    assert_eq!(class.context.method_names().len(), 6);
    assert_eq!(class.context.base_classes(), vec!["Base".to_string()]);

    let collection: SliceCollection = slices.clone().into_iter().collect();
    let slices_path = root.join("slices/calc/code_slices.jsonl");
    collection.export_jsonl(&slices_path).unwrap();
    let reloaded = SliceCollection::load_jsonl(&slices_path).unwrap();
    assert_eq!(reloaded.slices(), slices.as_slice());

    // Prepare.
    let builder = RequestBuilder::new(config.generation.clone());
    let prepared = builder
        .prepare(reloaded.slices(), &root.join("batch_input"))
        .unwrap();
    assert_eq!(prepared.len(), 2);
    let s1_requests: Vec<BatchRequest> = read_jsonl(&prepared[0].path).unwrap();
    let s2_requests: Vec<BatchRequest> = read_jsonl(&prepared[1].path).unwrap();
    assert_eq!(s1_requests[0].custom_id, "scenario1_calc_00000_func");
    assert_eq!(s2_requests[0].custom_id, "scenario2_calc_00001_class");

    // Fake batch outputs: fenced, bare, malformed and archived records.
    let outputs = root.join("4.batch_output");
    let s1_lines = [
        output_line(&s1_requests[0].custom_id, &format!("```json\n{}\n```", scenario1_content(0))),
        output_line(&s1_requests[0].custom_id, &scenario1_content(1)),
        output_line(&s1_requests[0].custom_id, "```json\n{\"question\": \n```"),
    ]
    .join("\n");
    write(&outputs.join("calc/scenario1_batch_1_output.jsonl"), &s1_lines);
    write(
        &outputs.join("calc/scenario2_batch_1_output.jsonl"),
        &output_line(&s2_requests[0].custom_id, &scenario2_content()),
    );
    write(
        &outputs.join("archive/calc/scenario1_old_output.jsonl"),
        &output_line(&s1_requests[0].custom_id, &scenario1_content(9)),
    );

    // Compile.
    let final_dir = root.join("final");
    let compiler = DatasetCompiler::new(&final_dir, CompilationConfig::default());
    let report = compiler
        .process_all_outputs(&outputs, &root.join("slices"))
        .unwrap();

    let stats = &report.statistics;
    assert_eq!(stats.scenario1.records_seen, 3);
    assert_eq!(stats.scenario1.total_count, 2);
    assert_eq!(stats.scenario1.parse_success_rate, 66.67);
    assert_eq!(stats.scenario1.avg_reasoning_steps, 2.0);
    assert_eq!(stats.scenario2.total_count, 1);
    assert_eq!(stats.scenario2.avg_decision_points, Some(1.0));
    assert_eq!(stats.combined.total_items, 3);
    assert_eq!(stats.combined.overall_parse_success_rate, 75.0);
    assert_eq!(stats.by_repository["calc"].total, 3);

    assert_eq!(report.train_count + report.val_count, 3);
    assert_eq!(report.train_count, 2);

    let per_repo = &report.repo_files["calc"];
    let s1_items: Vec<TrainingItem> = read_jsonl(&per_repo[&Scenario::Scenario1]).unwrap();
    assert_eq!(s1_items.len(), 2);
    assert_eq!(
        s1_items[0].input,
        "代码路径: calc.py\n代码名称: add\n\n代码内容:\ndef add(a, b):\n    return a + b"
    );
    assert!(s1_items[0].output.starts_with("<thought>\nStep 1:\nDescription: Read the signature"));
    assert_eq!(s1_items[0].metadata.repo, "calc");

    let s2_items: Vec<TrainingItem> = read_jsonl(&per_repo[&Scenario::Scenario2]).unwrap();
    assert!(s2_items[0].input.starts_with("架构概览:\nClass: Calculator\nFile: calc.py\n"));
    assert!(s2_items[0].input.contains("- reset()\n"));
    assert!(s2_items[0].input.ends_with("需求: History\n详情: Record every operation"));

    let train: Vec<Value> = read_jsonl(&report.train_file).unwrap();
    assert!(train.iter().all(|item| item["training_scenario"]
        .as_str()
        .is_some_and(|t| t.ends_with("_processed"))));

    let summary = fs::read_to_string(&report.summary_file).unwrap();
    assert!(summary.contains("- **Total Items**: 3"));
    let stats_json: Value =
        serde_json::from_str(&fs::read_to_string(&report.statistics_file).unwrap()).unwrap();
    assert_eq!(stats_json["combined"]["total_items"], 3);
}

#[test]
fn test_same_seed_gives_identical_split() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = dir.path().join("4.batch_output");
    let lines: Vec<String> = (0..20)
        .map(|i| output_line(&format!("scenario1_r_{i:05}_func"), &scenario1_content(i)))
        .collect();
    write(&outputs.join("r/scenario1_output.jsonl"), &lines.join("\n"));

    let run = |out: &str| {
        let compiler = DatasetCompiler::new(dir.path().join(out), CompilationConfig::default());
        let report = compiler
            .process_all_outputs(&outputs, &dir.path().join("no_sources"))
            .unwrap();
        (
            fs::read_to_string(report.train_file).unwrap(),
            fs::read_to_string(report.val_file).unwrap(),
        )
    };
    let first = run("a");
    let second = run("b");
    assert_eq!(first, second);
    assert_eq!(first.0.lines().count(), 16);
    assert_eq!(first.1.lines().count(), 4);
}

#[test]
fn test_mismatched_ratios_fail_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let outputs = dir.path().join("4.batch_output");
    write(
        &outputs.join("r/scenario1_output.jsonl"),
        &output_line("scenario1_r_00000_func", &scenario1_content(0)),
    );
    let final_dir = dir.path().join("final");
    let config = CompilationConfig {
        train_ratio: 0.8,
        val_ratio: 0.19,
        ..CompilationConfig::default()
    };
    let err = DatasetCompiler::new(&final_dir, config)
        .process_all_outputs(&outputs, dir.path())
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration(_)));
    assert!(!final_dir.exists() || fs::read_dir(&final_dir).unwrap().next().is_none());
}

#[test]
fn test_missing_batch_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = DatasetCompiler::new(dir.path().join("final"), CompilationConfig::default());
    let err = compiler
        .process_all_outputs(&dir.path().join("4.batch_output"), dir.path())
        .unwrap_err();
    assert!(matches!(err, CoreError::DirectoryNotFound(_)));
}
