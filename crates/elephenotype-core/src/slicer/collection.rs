//! In-memory slice accumulator with JSONL export, statistics and filtering.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::errors::{CoreError, CoreResult};
use crate::jsonl::{read_jsonl, write_jsonl, write_jsonl_fresh};
use crate::models::{Complexity, Slice, SliceKind};

/// Slice counts grouped by type, complexity and repository.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SliceStatistics {
    pub total_slices: usize,
    pub by_type: IndexMap<String, usize>,
    pub by_complexity: IndexMap<String, usize>,
    pub by_repository: IndexMap<String, usize>,
}

/// Selection criteria for [`SliceCollection::filter`]. Empty criteria match
/// everything.
#[derive(Clone, Debug, Default)]
pub struct SliceFilter {
    pub complexity: Option<Vec<Complexity>>,
    pub kinds: Option<Vec<SliceKind>>,
    pub min_lines: Option<usize>,
    pub max_lines: Option<usize>,
}

impl SliceFilter {
    pub fn matches(&self, slice: &Slice) -> bool {
        if let Some(levels) = &self.complexity {
            if !levels.is_empty() && !levels.contains(&slice.complexity) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.is_empty() && !kinds.contains(&slice.kind) {
                return false;
            }
        }
        let lines = slice.line_count();
        if self.min_lines.is_some_and(|min| lines < min) {
            return false;
        }
        if self.max_lines.is_some_and(|max| lines > max) {
            return false;
        }
        true
    }
}

/// Slices accumulated over one slicing run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SliceCollection {
    slices: Vec<Slice>,
}

impl SliceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, slices: impl IntoIterator<Item = Slice>) {
        self.slices.extend(slices);
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn filter(&self, criteria: &SliceFilter) -> Vec<&Slice> {
        self.slices.iter().filter(|s| criteria.matches(s)).collect()
    }

    pub fn statistics(&self) -> SliceStatistics {
        let mut stats = SliceStatistics {
            total_slices: self.slices.len(),
            ..SliceStatistics::default()
        };
        for slice in &self.slices {
            *stats.by_type.entry(slice.kind.to_string()).or_insert(0) += 1;
            *stats
                .by_complexity
                .entry(slice.complexity.to_string())
                .or_insert(0) += 1;
            *stats
                .by_repository
                .entry(slice.repository.clone())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Write every slice to `path` as JSONL.
    pub fn export_jsonl(&self, path: &Path) -> CoreResult<usize> {
        let written = write_jsonl(path, &self.slices)?;
        info!("Exported {} slices to {}", written, path.display());
        Ok(written)
    }

    /// Write every slice to a new `code_slices_{timestamp}.jsonl` in `dir`.
    pub fn export_fresh(&self, dir: &Path) -> CoreResult<PathBuf> {
        let path = write_jsonl_fresh(dir, "code_slices", &self.slices)?;
        info!("Exported {} slices to {}", self.slices.len(), path.display());
        Ok(path)
    }

    pub fn load_jsonl(path: &Path) -> CoreResult<Self> {
        Ok(Self {
            slices: read_jsonl(path)?,
        })
    }

    /// Load a JSONL file, or every `*.jsonl` file under a directory in path
    /// order.
    pub fn load_path(path: &Path) -> CoreResult<Self> {
        if path.is_file() {
            return Self::load_jsonl(path);
        }
        if !path.is_dir() {
            return Err(CoreError::DirectoryNotFound(path.to_path_buf()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        let mut collection = Self::new();
        for file in files {
            collection.extend(read_jsonl::<Slice>(&file)?);
        }
        info!("Loaded {} slices from {}", collection.len(), path.display());
        Ok(collection)
    }
}

impl FromIterator<Slice> for SliceCollection {
    fn from_iter<I: IntoIterator<Item = Slice>>(iter: I) -> Self {
        Self {
            slices: iter.into_iter().collect(),
        }
    }
}
