//! Repository slicing with Rayon-based per-repository parallelism.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::analyzer::filesystem::{compute_content_hash, iter_python_files, relative_path};
use crate::analyzer::Analyzer;
use crate::config::AnalysisConfig;
use crate::errors::{CoreError, CoreResult};
use crate::jsonl::iso_now;
use crate::models::{
    slice_id, ClassRecord, Complexity, FunctionRecord, Slice, SliceContext, SliceKind,
    SliceMetadata, SourceUnit,
};
use crate::slicer::collection::SliceCollection;

/// A repository checked out on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositorySource {
    pub name: String,
    pub root: PathBuf,
}

/// Every directory directly under `repos_dir`, sorted by name.
pub fn discover_repositories(repos_dir: &Path) -> CoreResult<Vec<RepositorySource>> {
    if !repos_dir.is_dir() {
        return Err(CoreError::DirectoryNotFound(repos_dir.to_path_buf()));
    }
    let mut repos = Vec::new();
    for entry in std::fs::read_dir(repos_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        repos.push(RepositorySource {
            name,
            root: entry.path(),
        });
    }
    repos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(repos)
}

struct AnalyzedFile {
    absolute: PathBuf,
    content_hash: String,
    unit: SourceUnit,
}

/// Outcome of slicing several repositories.
#[derive(Debug, Default)]
pub struct SliceRun {
    pub collection: SliceCollection,
    /// Slice count per repository, in input order.
    pub per_repository: Vec<(String, usize)>,
    pub failures: Vec<(String, CoreError)>,
}

/// Turns repositories into ordered [`Slice`] sequences.
#[derive(Clone, Debug)]
pub struct Slicer {
    analyzer: Analyzer,
    config: AnalysisConfig,
}

impl Slicer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            analyzer: Analyzer::new(config.complexity),
            config,
        }
    }

    /// Slice one repository.
    ///
    /// Function slices come first (file order, then source order), followed
    /// by class slices; a single counter numbers both. A `max_files` of zero
    /// means no limit. Unreadable or unparsable files are logged and skipped.
    pub fn slice_repository(
        &self,
        root: &Path,
        repository: &str,
        max_files: Option<usize>,
    ) -> CoreResult<Vec<Slice>> {
        if !root.is_dir() {
            return Err(CoreError::RepositoryNotFound(root.to_path_buf()));
        }
        let started = Instant::now();

        let mut files = iter_python_files(root, &self.config.excluded_dirs);
        if let Some(limit) = max_files.filter(|&n| n > 0) {
            files.truncate(limit);
        }
        let files_seen = files.len();

        let analyzed: Vec<AnalyzedFile> = files
            .into_iter()
            .filter_map(|path| self.analyze_file(root, path))
            .collect();

        let mut snippets = SnippetReader::default();
        let mut slices = Vec::new();
        for file in &analyzed {
            for function in &file.unit.functions {
                let ordinal = slices.len();
                let code = snippets.snippet(&file.absolute, function.start_line, function.end_line);
                slices.push(self.function_slice(repository, ordinal, function, code, file));
            }
        }
        for file in &analyzed {
            for class in &file.unit.classes {
                let ordinal = slices.len();
                let code = snippets.snippet(&file.absolute, class.start_line, class.end_line);
                slices.push(self.class_slice(repository, ordinal, class, code, file));
            }
        }

        info!(
            "Sliced {}: {} files seen, {} analyzed, {} slices in {} ms",
            repository,
            files_seen,
            analyzed.len(),
            slices.len(),
            started.elapsed().as_millis()
        );
        Ok(slices)
    }

    /// Slice several repositories on a Rayon pool and merge the results in
    /// input order. A missing repository contributes zero slices.
    pub fn slice_repositories(
        &self,
        repos: &[RepositorySource],
        max_files: Option<usize>,
        workers: usize,
    ) -> SliceRun {
        if repos.is_empty() {
            return SliceRun::default();
        }

        let job = |repo: &RepositorySource| {
            (
                repo.name.clone(),
                self.slice_repository(&repo.root, &repo.name, max_files),
            )
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build();
        let results: Vec<(String, CoreResult<Vec<Slice>>)> = match pool {
            Ok(pool) => pool.install(|| repos.par_iter().map(job).collect()),
            Err(e) => {
                warn!("Thread pool unavailable, slicing sequentially: {e}");
                repos.iter().map(job).collect()
            }
        };

        let mut run = SliceRun::default();
        for (name, result) in results {
            match result {
                Ok(slices) => {
                    run.per_repository.push((name, slices.len()));
                    run.collection.extend(slices);
                }
                Err(e) => {
                    warn!("Skipping repository {name}: {e}");
                    run.per_repository.push((name.clone(), 0));
                    run.failures.push((name, e));
                }
            }
        }
        run
    }

    fn analyze_file(&self, root: &Path, absolute: PathBuf) -> Option<AnalyzedFile> {
        let rel = relative_path(root, &absolute);
        let bytes = match std::fs::read(&absolute) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {e}", absolute.display());
                return None;
            }
        };
        let content_hash = compute_content_hash(&bytes);
        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(e) => {
                warn!("Skipping non-UTF-8 file {rel}: {e}");
                return None;
            }
        };
        match self.analyzer.analyze(&source, &rel) {
            Ok(unit) => Some(AnalyzedFile {
                absolute,
                content_hash,
                unit,
            }),
            Err(e) => {
                warn!("Skipping {rel}: {e}");
                None
            }
        }
    }

    fn metadata(&self, file: &AnalyzedFile) -> SliceMetadata {
        SliceMetadata {
            sliced_at: iso_now(),
            analyzer_version: self.config.analyzer_version.clone(),
            content_hash: Some(file.content_hash.clone()),
            extra: Map::new(),
        }
    }

    fn function_slice(
        &self,
        repository: &str,
        ordinal: usize,
        function: &FunctionRecord,
        code_snippet: String,
        file: &AnalyzedFile,
    ) -> Slice {
        Slice {
            id: slice_id(repository, ordinal, SliceKind::Function),
            kind: SliceKind::Function,
            repository: repository.to_string(),
            file_path: function.file_path.clone(),
            name: function.name.clone(),
            start_line: function.start_line,
            end_line: function.end_line,
            code_snippet,
            complexity: function.complexity,
            context: SliceContext::Function {
                docstring: function.docstring.clone(),
                parameters: function.parameters.clone(),
                returns: function.returns.clone(),
                decorators: function.decorators.clone(),
            },
            metadata: self.metadata(file),
        }
    }

    fn class_slice(
        &self,
        repository: &str,
        ordinal: usize,
        class: &ClassRecord,
        code_snippet: String,
        file: &AnalyzedFile,
    ) -> Slice {
        Slice {
            id: slice_id(repository, ordinal, SliceKind::Class),
            kind: SliceKind::Class,
            repository: repository.to_string(),
            file_path: class.file_path.clone(),
            name: class.name.clone(),
            start_line: class.start_line,
            end_line: class.end_line,
            code_snippet,
            // Classes are not scored.
            complexity: Complexity::Medium,
            context: SliceContext::Class {
                docstring: class.docstring.clone(),
                base_classes: class.base_classes.clone(),
                methods: class.method_names(),
                decorators: class.decorators.clone(),
            },
            metadata: self.metadata(file),
        }
    }
}

/// Re-reads source files for snippet extraction, once per file.
#[derive(Default)]
struct SnippetReader {
    current: Option<(PathBuf, Option<Vec<String>>)>,
}

impl SnippetReader {
    fn lines(&mut self, path: &Path) -> Option<&[String]> {
        let stale = self.current.as_ref().map_or(true, |(p, _)| p != path);
        if stale {
            let lines = match std::fs::read_to_string(path) {
                Ok(text) => Some(text.lines().map(str::to_string).collect()),
                Err(e) => {
                    warn!("Failed to re-read {} for snippet: {e}", path.display());
                    None
                }
            };
            self.current = Some((path.to_path_buf(), lines));
        }
        self.current.as_ref().and_then(|(_, lines)| lines.as_deref())
    }

    /// Lines `[start, end]`, 1-based inclusive, joined with `\n`.
    fn snippet(&mut self, path: &Path, start: usize, end: usize) -> String {
        let Some(lines) = self.lines(path) else {
            return String::new();
        };
        let from = start.saturating_sub(1).min(lines.len());
        let to = end.min(lines.len()).max(from);
        debug!("Snippet {}:{}-{}", path.display(), start, end);
        lines[from..to].join("\n")
    }
}
