//! Batch output scanning and correlation with the slices they were built from.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::batch::extract::extract_record_payload;
use crate::errors::{CoreError, CoreResult};
use crate::jsonl::read_jsonl;
use crate::models::{source_id_from_custom_id, Scenario, Slice, UNKNOWN_REPO};

const SOURCE_FILE_NAME: &str = "code_slices.jsonl";
const OUTPUT_PREFIX: &str = "scenario";
const OUTPUT_SUFFIX: &str = "_output.jsonl";
const ARCHIVE_SEGMENT: &str = "archive";

// ---------------------------------------------------------------------------
// Source slices
// ---------------------------------------------------------------------------

/// Slice lookup by identifier.
#[derive(Clone, Debug, Default)]
pub struct SourceIndex {
    slices: HashMap<String, Slice>,
}

impl SourceIndex {
    /// Load every `code_slices.jsonl` under `dir`. A missing directory is
    /// logged and yields an empty index.
    pub fn load(dir: &Path) -> CoreResult<Self> {
        if !dir.is_dir() {
            warn!("Source slice directory not found: {}", dir.display());
            return Ok(Self::default());
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == SOURCE_FILE_NAME)
            .map(|e| e.into_path())
            .collect();
        files.sort();
        info!("Loading source slices from {} files", files.len());

        let mut index = Self::default();
        for file in &files {
            match read_jsonl::<Slice>(file) {
                Ok(slices) => index.extend(slices),
                Err(e) => warn!("Skipping source file {}: {e}", file.display()),
            }
        }
        info!("Loaded {} source slices for mapping", index.len());
        Ok(index)
    }

    pub fn extend(&mut self, slices: impl IntoIterator<Item = Slice>) {
        for slice in slices {
            self.slices.insert(slice.id.clone(), slice);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Slice> {
        self.slices.get(id)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl FromIterator<Slice> for SourceIndex {
    fn from_iter<I: IntoIterator<Item = Slice>>(iter: I) -> Self {
        let mut index = Self::default();
        index.extend(iter);
        index
    }
}

// ---------------------------------------------------------------------------
// Batch outputs
// ---------------------------------------------------------------------------

/// One raw line of a batch output file, attributed to a repository and
/// scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchRecord {
    pub custom_id: String,
    pub repo: String,
    pub scenario: Scenario,
    pub raw: Value,
}

/// First path segment after `marker`, or [`UNKNOWN_REPO`].
pub fn repo_from_path(path: &Path, marker: &str) -> String {
    let mut segments = path.components().filter_map(|c| match c {
        Component::Normal(os) => Some(os.to_string_lossy()),
        _ => None,
    });
    while let Some(segment) = segments.next() {
        if segment == marker {
            return match segments.next() {
                Some(repo) => repo.to_string(),
                None => UNKNOWN_REPO.to_string(),
            };
        }
    }
    UNKNOWN_REPO.to_string()
}

fn is_output_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with(OUTPUT_PREFIX) && n.ends_with(OUTPUT_SUFFIX))
}

fn is_archived(rel: &Path) -> bool {
    rel.components()
        .any(|c| matches!(c, Component::Normal(os) if os == ARCHIVE_SEGMENT))
}

/// Batch output records grouped by repository, then scenario.
#[derive(Clone, Debug, Default)]
pub struct BatchOutputs {
    pub files: Vec<PathBuf>,
    pub groups: BTreeMap<String, BTreeMap<Scenario, Vec<BatchRecord>>>,
}

impl BatchOutputs {
    /// Scan `dir` for `scenario*_output.jsonl` files, skipping anything under
    /// an `archive` directory.
    pub fn scan(dir: &Path, marker: &str) -> CoreResult<Self> {
        if !dir.is_dir() {
            return Err(CoreError::DirectoryNotFound(dir.to_path_buf()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_output_file(e.path()))
            .filter(|e| !is_archived(e.path().strip_prefix(dir).unwrap_or(e.path())))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        info!("Found {} batch output files", files.len());

        let mut outputs = Self::default();
        for file in &files {
            let repo = repo_from_path(file, marker);
            let scenario = file
                .file_name()
                .map(|n| Scenario::from_file_name(&n.to_string_lossy()))
                .unwrap_or(Scenario::Unknown);
            let records: Vec<Value> = match read_jsonl(file) {
                Ok(records) => records,
                Err(e) => {
                    warn!("Skipping batch output {}: {e}", file.display());
                    continue;
                }
            };
            info!(
                "Loaded {} records from {} (repo: {}, scenario: {})",
                records.len(),
                file.display(),
                repo,
                scenario
            );
            outputs.push_records(&repo, scenario, records);
        }
        outputs.files = files;
        Ok(outputs)
    }

    pub fn push_records(&mut self, repo: &str, scenario: Scenario, records: Vec<Value>) {
        let bucket = self
            .groups
            .entry(repo.to_string())
            .or_default()
            .entry(scenario)
            .or_default();
        bucket.extend(records.into_iter().map(|raw| BatchRecord {
            custom_id: raw
                .get("custom_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            repo: repo.to_string(),
            scenario,
            raw,
        }));
    }

    pub fn total_records(&self) -> usize {
        self.groups
            .values()
            .flat_map(|s| s.values())
            .map(Vec::len)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// A parsed response joined with its source slice, when one exists.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelatedRecord {
    pub custom_id: String,
    pub scenario: Scenario,
    /// Repository directory the output file was found under.
    pub repo: String,
    pub source: Option<Slice>,
    pub payload: Map<String, Value>,
}

/// Records seen and successfully parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseCounts {
    pub seen: usize,
    pub parsed: usize,
}

impl ParseCounts {
    pub fn failed(&self) -> usize {
        self.seen - self.parsed
    }

    pub fn merge(&mut self, other: ParseCounts) {
        self.seen += other.seen;
        self.parsed += other.parsed;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Correlation {
    pub pairs: Vec<CorrelatedRecord>,
    pub counts: ParseCounts,
    /// Parsed records with no matching slice.
    pub unmatched: usize,
}

/// Joins batch records to source slices through their `custom_id`.
#[derive(Clone, Debug, Default)]
pub struct Correlator {
    index: SourceIndex,
}

impl Correlator {
    pub fn new(index: SourceIndex) -> Self {
        Self { index }
    }

    pub fn correlate(&self, record: &BatchRecord) -> CoreResult<CorrelatedRecord> {
        let payload =
            extract_record_payload(&record.raw).map_err(|reason| CoreError::PayloadParse {
                custom_id: record.custom_id.clone(),
                reason,
            })?;
        let source = self
            .index
            .get(source_id_from_custom_id(&record.custom_id))
            .cloned();
        if source.is_none() {
            debug!("No source slice for {}", record.custom_id);
        }
        Ok(CorrelatedRecord {
            custom_id: record.custom_id.clone(),
            scenario: record.scenario,
            repo: record.repo.clone(),
            source,
            payload,
        })
    }

    /// Correlate every record; parse failures are logged and counted.
    pub fn correlate_all<'a>(&self, records: impl IntoIterator<Item = &'a BatchRecord>) -> Correlation {
        let mut out = Correlation::default();
        for record in records {
            out.counts.seen += 1;
            match self.correlate(record) {
                Ok(pair) => {
                    out.counts.parsed += 1;
                    if pair.source.is_none() {
                        out.unmatched += 1;
                    }
                    out.pairs.push(pair);
                }
                Err(e) => warn!("{e}"),
            }
        }
        out
    }
}
