//! Pipeline configuration loaded from a JSON file with per-field defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{CoreError, CoreResult};
use crate::models::{Complexity, ANALYZER_VERSION};

/// Tolerance for `train_ratio + val_ratio == 1.0`.
pub const RATIO_TOLERANCE: f64 = 0.001;

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "tests",
    "test",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "venv",
    "env",
    ".venv",
    "build",
    "dist",
    ".git",
    ".hg",
    ".svn",
];

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub repos_dir: PathBuf,
    pub slices_dir: PathBuf,
    pub batch_input_dir: PathBuf,
    pub batch_output_dir: PathBuf,
    pub final_output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("data/0.cloned_repo"),
            slices_dir: PathBuf::from("data/1.slices"),
            batch_input_dir: PathBuf::from("data/3.batch_input"),
            batch_output_dir: PathBuf::from("data/4.batch_output"),
            final_output_dir: PathBuf::from("data/5.final_output"),
        }
    }
}

/// Thresholds of the three-tier complexity heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityThresholds {
    pub simple_max_lines: usize,
    pub simple_max_branches: usize,
    pub medium_max_lines: usize,
    pub medium_max_branches: usize,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            simple_max_lines: 10,
            simple_max_branches: 2,
            medium_max_lines: 30,
            medium_max_branches: 5,
        }
    }
}

impl ComplexityThresholds {
    pub fn classify(&self, line_count: usize, branch_count: usize) -> Complexity {
        if line_count <= self.simple_max_lines && branch_count <= self.simple_max_branches {
            Complexity::Simple
        } else if line_count <= self.medium_max_lines && branch_count <= self.medium_max_branches {
            Complexity::Medium
        } else {
            Complexity::Complex
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_files_per_repo: Option<usize>,
    pub analyzer_version: String,
    pub complexity: ComplexityThresholds,
    pub excluded_dirs: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_files_per_repo: None,
            analyzer_version: ANALYZER_VERSION.to_string(),
            complexity: ComplexityThresholds::default(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub endpoint_url: String,
    pub max_scenario1_items: usize,
    pub max_scenario2_items: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            endpoint_url: "/v1/chat/completions".to_string(),
            max_scenario1_items: 100,
            max_scenario2_items: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationConfig {
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub random_seed: u64,
    /// Directory name preceding the repository segment of batch output paths.
    pub batch_output_marker: String,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            val_ratio: 0.2,
            random_seed: 42,
            batch_output_marker: "4.batch_output".to_string(),
        }
    }
}

impl CompilationConfig {
    pub fn validate(&self) -> CoreResult<()> {
        validate_split_ratios(self.train_ratio, self.val_ratio)
    }
}

/// Fail unless both ratios are in `[0, 1]` and sum to 1.0.
pub fn validate_split_ratios(train_ratio: f64, val_ratio: f64) -> CoreResult<()> {
    if !(0.0..=1.0).contains(&train_ratio) || !(0.0..=1.0).contains(&val_ratio) {
        return Err(CoreError::Configuration(format!(
            "split ratios must lie in [0, 1], got train={train_ratio} val={val_ratio}"
        )));
    }
    if (train_ratio + val_ratio - 1.0).abs() > RATIO_TOLERANCE {
        return Err(CoreError::Configuration(format!(
            "train_ratio + val_ratio must equal 1.0, got {}",
            train_ratio + val_ratio
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub analysis: AnalysisConfig,
    pub generation: GenerationConfig,
    pub compilation: CompilationConfig,
}

impl PipelineConfig {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<PipelineConfig>(&content)?
        } else {
            warn!("Config file {} not found. Using defaults.", path.display());
            PipelineConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Honour `ELEPHENOTYPE_MAX_FILES` and `ELEPHENOTYPE_RANDOM_SEED`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ELEPHENOTYPE_MAX_FILES") {
            match val.trim().parse::<usize>() {
                Ok(0) => self.analysis.max_files_per_repo = None,
                Ok(n) => self.analysis.max_files_per_repo = Some(n),
                Err(_) => warn!("Ignoring non-numeric ELEPHENOTYPE_MAX_FILES={val:?}"),
            }
        }
        if let Ok(val) = std::env::var("ELEPHENOTYPE_RANDOM_SEED") {
            match val.trim().parse::<u64>() {
                Ok(seed) => self.compilation.random_seed = seed,
                Err(_) => warn!("Ignoring non-numeric ELEPHENOTYPE_RANDOM_SEED={val:?}"),
            }
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.compilation.validate()?;
        let t = &self.analysis.complexity;
        if t.simple_max_lines > t.medium_max_lines || t.simple_max_branches > t.medium_max_branches
        {
            return Err(CoreError::Configuration(
                "simple complexity thresholds must not exceed medium thresholds".to_string(),
            ));
        }
        Ok(())
    }
}
