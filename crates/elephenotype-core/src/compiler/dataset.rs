//! Training item compilation, deterministic splitting and dataset export.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{BatchOutputs, CorrelatedRecord, Correlator, SourceIndex};
use crate::compiler::format::{
    format_scenario1_output, format_scenario2_output, scenario1_input, scenario2_input,
    SCENARIO1_INSTRUCTION, SCENARIO2_INSTRUCTION,
};
use crate::compiler::stats::{DatasetStatistics, StatisticsBuilder};
use crate::config::{validate_split_ratios, CompilationConfig};
use crate::errors::CoreResult;
use crate::jsonl::{create_fresh_file, iso_now, write_jsonl_fresh};
use crate::models::{Scenario, TrainingItem, TrainingMetadata};

/// Build the training item for one correlated record. Records of an unknown
/// scenario produce nothing.
pub fn compile_record(record: &CorrelatedRecord) -> Option<TrainingItem> {
    let (instruction, input, output) = match record.scenario {
        Scenario::Scenario1 => (
            SCENARIO1_INSTRUCTION,
            record.source.as_ref().map(scenario1_input),
            format_scenario1_output(&record.payload),
        ),
        Scenario::Scenario2 => (
            SCENARIO2_INSTRUCTION,
            record
                .source
                .as_ref()
                .map(|s| scenario2_input(s, &record.payload)),
            format_scenario2_output(&record.payload),
        ),
        Scenario::Unknown => return None,
    };
    Some(TrainingItem {
        instruction: instruction.to_string(),
        input: input.unwrap_or_default(),
        output,
        metadata: TrainingMetadata {
            custom_id: record.custom_id.clone(),
            scenario: record.scenario,
            repo: record.repo.clone(),
        },
        training_scenario: None,
    })
}

/// Compile correlated records of `scenario`, in order.
pub fn compile(records: &[CorrelatedRecord], scenario: Scenario) -> Vec<TrainingItem> {
    records
        .iter()
        .filter(|r| r.scenario == scenario)
        .filter_map(compile_record)
        .collect()
}

/// Tag with `{scenario}_processed`, shuffle with `seed` and split by
/// `train_ratio`. Ratios are validated before anything else happens.
pub fn split_dataset(
    mut items: Vec<TrainingItem>,
    train_ratio: f64,
    val_ratio: f64,
    seed: u64,
) -> CoreResult<(Vec<TrainingItem>, Vec<TrainingItem>)> {
    validate_split_ratios(train_ratio, val_ratio)?;
    for item in &mut items {
        item.training_scenario = Some(format!("{}_processed", item.metadata.scenario));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let train_count = ((items.len() as f64 * train_ratio).floor() as usize).min(items.len());
    let val = items.split_off(train_count);
    Ok((items, val))
}

/// Paths written by [`DatasetCompiler::process_all_outputs`].
#[derive(Clone, Debug, Serialize)]
pub struct CompileReport {
    pub repo_files: BTreeMap<String, BTreeMap<Scenario, PathBuf>>,
    pub train_file: PathBuf,
    pub val_file: PathBuf,
    pub train_count: usize,
    pub val_count: usize,
    pub combined_file: PathBuf,
    pub statistics: DatasetStatistics,
    pub statistics_file: PathBuf,
    pub summary_file: PathBuf,
    pub processing_timestamp: String,
}

#[derive(Clone, Debug, Default)]
pub struct CompiledItems {
    /// Items per repository and scenario, in record order.
    pub by_repo: BTreeMap<String, BTreeMap<Scenario, Vec<TrainingItem>>>,
    pub statistics: StatisticsBuilder,
}

impl CompiledItems {
    /// All items, repository by repository.
    pub fn all_items(&self) -> Vec<TrainingItem> {
        self.by_repo
            .values()
            .flat_map(|s| s.values())
            .flat_map(|items| items.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_repo
            .values()
            .flat_map(|s| s.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compiles batch outputs into training datasets under one output directory.
#[derive(Clone, Debug)]
pub struct DatasetCompiler {
    output_dir: PathBuf,
    config: CompilationConfig,
}

impl DatasetCompiler {
    pub fn new(output_dir: impl Into<PathBuf>, config: CompilationConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            config,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Correlate and compile every group of `outputs`.
    ///
    /// Items are grouped under the output file's repository directory.
    pub fn compile_outputs(&self, outputs: &BatchOutputs, correlator: &Correlator) -> CompiledItems {
        let mut compiled = CompiledItems::default();
        for (repo, scenarios) in &outputs.groups {
            for (scenario, records) in scenarios {
                let correlation = correlator.correlate_all(records);
                compiled
                    .statistics
                    .record_counts(*scenario, correlation.counts);
                if correlation.unmatched > 0 {
                    warn!(
                        "{} {} records in {} have no source slice",
                        correlation.unmatched, scenario, repo
                    );
                }
                let items = compile(&correlation.pairs, *scenario);
                for pair in correlation.pairs.iter().take(items.len()) {
                    compiled
                        .statistics
                        .record_item(*scenario, repo, &pair.payload);
                }
                info!(
                    "Compiled {} {} items for {} ({} of {} records parsed)",
                    items.len(),
                    scenario,
                    repo,
                    correlation.counts.parsed,
                    correlation.counts.seen
                );
                compiled
                    .by_repo
                    .entry(repo.clone())
                    .or_default()
                    .insert(*scenario, items);
            }
        }
        compiled
    }

    /// Write `{output}/{repo}/{scenario}_processed_{timestamp}.jsonl` for
    /// each repository and known scenario.
    pub fn export_by_repo(
        &self,
        compiled: &CompiledItems,
    ) -> CoreResult<BTreeMap<String, BTreeMap<Scenario, PathBuf>>> {
        let mut results = BTreeMap::new();
        for (repo, scenarios) in &compiled.by_repo {
            let mut files = BTreeMap::new();
            for (scenario, items) in scenarios {
                if *scenario == Scenario::Unknown {
                    continue;
                }
                let stem = format!("{scenario}_processed");
                let path = write_jsonl_fresh(&self.output_dir.join(repo), &stem, items)?;
                info!("Exported {} items to {}", items.len(), path.display());
                files.insert(*scenario, path);
            }
            results.insert(repo.clone(), files);
        }
        Ok(results)
    }

    /// Shuffle all items with `seed` and write train/validation files.
    ///
    /// Fails with a configuration error, before writing anything, when the
    /// ratios do not sum to 1.0.
    pub fn create_unified_dataset(
        &self,
        items: Vec<TrainingItem>,
        train_ratio: f64,
        val_ratio: f64,
        seed: u64,
    ) -> CoreResult<(PathBuf, PathBuf, usize, usize)> {
        let total = items.len();
        let (train, val) = split_dataset(items, train_ratio, val_ratio, seed)?;
        info!(
            "Split {} items into {} train and {} val",
            total,
            train.len(),
            val.len()
        );
        let train_file = write_jsonl_fresh(&self.output_dir, "train_dataset", &train)?;
        let val_file = write_jsonl_fresh(&self.output_dir, "val_dataset", &val)?;
        Ok((train_file, val_file, train.len(), val.len()))
    }

    /// Every item tagged with its scenario, optionally shuffled with `seed`,
    /// in one `combined_training_dataset_{timestamp}.jsonl`.
    pub fn export_combined(&self, items: Vec<TrainingItem>, seed: Option<u64>) -> CoreResult<PathBuf> {
        let mut items = items;
        for item in &mut items {
            item.training_scenario = Some(format!("{}_processed", item.metadata.scenario));
        }
        if let Some(seed) = seed {
            items.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        let path = write_jsonl_fresh(&self.output_dir, "combined_training_dataset", &items)?;
        info!("Exported combined training dataset to {}", path.display());
        Ok(path)
    }

    /// Pretty-printed `dataset_statistics_{timestamp}.json`.
    pub fn export_statistics(&self, stats: &DatasetStatistics) -> CoreResult<PathBuf> {
        let (path, mut file) = create_fresh_file(&self.output_dir, "dataset_statistics", "json")?;
        serde_json::to_writer_pretty(&mut file, stats)?;
        file.write_all(b"\n")?;
        info!("Exported statistics to {}", path.display());
        Ok(path)
    }

    /// Markdown `review_summary_{timestamp}.md` for manual review.
    pub fn create_review_summary(&self, stats: &DatasetStatistics) -> CoreResult<PathBuf> {
        let (path, mut file) = create_fresh_file(&self.output_dir, "review_summary", "md")?;
        file.write_all(render_review_summary(stats).as_bytes())?;
        info!("Created review summary at {}", path.display());
        Ok(path)
    }

    /// Load sources, scan outputs, export per repository, split, and write
    /// statistics and the review summary.
    pub fn process_all_outputs(&self, batch_output_dir: &Path, source_dir: &Path) -> CoreResult<CompileReport> {
        self.config.validate()?;
        info!("Starting dataset compilation");

        let correlator = Correlator::new(SourceIndex::load(source_dir)?);
        let outputs = BatchOutputs::scan(batch_output_dir, &self.config.batch_output_marker)?;
        info!(
            "Loaded {} records from {} files",
            outputs.total_records(),
            outputs.files.len()
        );

        let compiled = self.compile_outputs(&outputs, &correlator);
        let repo_files = self.export_by_repo(&compiled)?;

        let items = compiled.all_items();
        let (train_file, val_file, train_count, val_count) = self.create_unified_dataset(
            items.clone(),
            self.config.train_ratio,
            self.config.val_ratio,
            self.config.random_seed,
        )?;
        let combined_file = self.export_combined(items, Some(self.config.random_seed))?;

        let statistics = compiled.statistics.build(iso_now());
        let statistics_file = self.export_statistics(&statistics)?;
        let summary_file = self.create_review_summary(&statistics)?;

        info!("Dataset compilation completed");
        Ok(CompileReport {
            repo_files,
            train_file,
            val_file,
            train_count,
            val_count,
            combined_file,
            statistics,
            statistics_file,
            summary_file,
            processing_timestamp: iso_now(),
        })
    }
}

fn render_review_summary(stats: &DatasetStatistics) -> String {
    let mut out = String::new();
    out.push_str("# Training Dataset Review Summary\n# 训练数据集审核摘要\n\n");
    out.push_str(&format!("Generated: {}\n\n", stats.generated_at));
    out.push_str("## Overview / 概览\n\n");
    out.push_str(&format!("- **Total Items**: {}\n", stats.combined.total_items));
    out.push_str(&format!(
        "- **Scenario 1 (Q&A)**: {} ({}%)\n",
        stats.scenario1.total_count, stats.combined.scenario1_percentage
    ));
    out.push_str(&format!(
        "- **Scenario 2 (Design)**: {} ({}%)\n",
        stats.scenario2.total_count, stats.combined.scenario2_percentage
    ));
    out.push_str(&format!(
        "- **Overall Parse Success Rate**: {}%\n",
        stats.combined.overall_parse_success_rate
    ));

    out.push_str("\n## By Repository / 按仓库统计\n\n");
    for (repo, counts) in &stats.by_repository {
        out.push_str(&format!(
            "- {}: {} (scenario1: {}, scenario2: {})\n",
            repo, counts.total, counts.scenario1, counts.scenario2
        ));
    }

    out.push_str("\n## Scenario 1 Statistics / 场景1统计\n\n");
    out.push_str(&format!(
        "- Parse success rate: {}%\n- {} steps per Q&A\n",
        stats.scenario1.parse_success_rate, stats.scenario1.avg_reasoning_steps
    ));

    out.push_str("\n## Scenario 2 Statistics / 场景2统计\n\n");
    out.push_str(&format!(
        "- Parse success rate: {}%\n- {} points per design\n",
        stats.scenario2.parse_success_rate,
        stats.scenario2.avg_decision_points.unwrap_or_default()
    ));

    out.push_str("\n## Next Steps / 下一步\n\n");
    out.push_str("1. Review the training dataset JSONL file\n");
    out.push_str("2. Verify quality and diversity of generated data\n");
    out.push_str("3. Use for model fine-tuning\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::errors::CoreError;
    use crate::slicer::Slicer;
    use serde_json::{json, Map, Value};

    fn record(i: usize, scenario: Scenario) -> CorrelatedRecord {
        CorrelatedRecord {
            custom_id: format!("{}_r_{:05}_func", scenario, i),
            scenario,
            repo: "r".into(),
            source: None,
            payload: json!({"question": format!("q{i}"), "answer": "a"})
                .as_object()
                .cloned()
                .unwrap_or_else(Map::new),
        }
    }

    fn items(n: usize) -> Vec<TrainingItem> {
        let records: Vec<_> = (0..n).map(|i| record(i, Scenario::Scenario1)).collect();
        compile(&records, Scenario::Scenario1)
    }

    #[test]
    fn test_compile_without_source_has_empty_input() {
        let compiled = items(2);
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].input, "");
        assert_eq!(compiled[0].instruction, SCENARIO1_INSTRUCTION);
        assert!(compiled[0].output.ends_with("初级开发者提问：q0\n\n资深专家解答：a"));
        assert_eq!(compiled[0].metadata.custom_id, "scenario1_r_00000_func");
    }

    #[test]
    fn test_unknown_scenario_yields_nothing() {
        assert!(compile_record(&record(0, Scenario::Unknown)).is_none());
    }

    #[test]
    fn test_split_is_seed_deterministic() {
        let (train_a, val_a) = split_dataset(items(10), 0.8, 0.2, 42).unwrap();
        let (train_b, val_b) = split_dataset(items(10), 0.8, 0.2, 42).unwrap();
        assert_eq!(train_a.len(), 8);
        assert_eq!(val_a.len(), 2);
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);
        assert!(train_a
            .iter()
            .all(|i| i.training_scenario.as_deref() == Some("scenario1_processed")));

        let (train_c, _) = split_dataset(items(10), 0.8, 0.2, 7).unwrap();
        let ids = |v: &[TrainingItem]| v.iter().map(|i| i.metadata.custom_id.clone()).collect::<Vec<_>>();
        assert_ne!(ids(&train_a), ids(&train_c));
    }

    #[test]
    fn test_bad_ratios_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(dir.path(), CompilationConfig::default());
        let err = compiler
            .create_unified_dataset(items(5), 0.8, 0.19, 42)
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unified_dataset_files() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = DatasetCompiler::new(dir.path(), CompilationConfig::default());
        let (train, val, train_count, val_count) =
            compiler.create_unified_dataset(items(5), 0.8, 0.2, 42).unwrap();
        assert_eq!((train_count, val_count), (4, 1));
        let train_lines: Vec<Value> = crate::jsonl::read_jsonl(&train).unwrap();
        assert_eq!(train_lines.len(), 4);
        assert_eq!(train_lines[0]["training_scenario"], "scenario1_processed");
        assert!(val.file_name().unwrap().to_string_lossy().starts_with("val_dataset_"));
    }

    #[test]
    fn test_review_summary_mentions_totals() {
        let mut builder = StatisticsBuilder::new();
        builder.record_item(Scenario::Scenario1, "flask", &Map::new());
        let summary = render_review_summary(&builder.build("2026-01-01T00:00:00".into()));
        assert!(summary.contains("- **Total Items**: 1"));
        assert!(summary.contains("- flask: 1 (scenario1: 1, scenario2: 0)"));
    }

    #[test]
    fn test_items_and_statistics_share_directory_repo() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("flask");
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("app.py"), "def run():\n    pass\n").unwrap();
        let slices = Slicer::new(AnalysisConfig::default())
            .slice_repository(&repo, "flask", None)
            .unwrap();
        let correlator = Correlator::new(slices.into_iter().collect());

        let mut outputs = BatchOutputs::default();
        let raw = json!({
            "custom_id": "scenario1_flask_00000_func",
            "response": {"body": {"choices": [{"message": {
                "content": "{\"question\": \"q\", \"answer\": \"a\"}"
            }}]}}
        });
        outputs.push_records("flask-main", Scenario::Scenario1, vec![raw]);

        let compiler = DatasetCompiler::new(dir.path().join("out"), CompilationConfig::default());
        let compiled = compiler.compile_outputs(&outputs, &correlator);
        let stats = compiled.statistics.build("t".into());
        assert_eq!(stats.by_repository.keys().collect::<Vec<_>>(), vec!["flask-main"]);
        let item = &compiled.by_repo["flask-main"][&Scenario::Scenario1][0];
        assert_eq!(item.metadata.repo, "flask-main");
        assert!(item.input.contains("def run():"));
    }
}
