//! Filesystem scanning helpers for the slicing pass.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const PYTHON_EXTENSION: &str = "py";

/// True if any path segment is hidden or a conventional exclusion name.
pub fn is_excluded(rel_path: &Path, excluded_dirs: &[String]) -> bool {
    rel_path.components().any(|c| match c {
        Component::Normal(os) => {
            let name = os.to_string_lossy();
            name.starts_with('.') || excluded_dirs.iter().any(|d| d.as_str() == name)
        }
        _ => false,
    })
}

/// Repository-relative path with `/` separators.
pub fn relative_path(repo_root: &Path, path: &Path) -> String {
    path.strip_prefix(repo_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Python files under `repo_root`, sorted by relative path.
///
/// Excluded directories are pruned during the walk, so their contents are
/// never visited.
pub fn iter_python_files(repo_root: &Path, excluded_dirs: &[String]) -> Vec<PathBuf> {
    let keep = |entry: &DirEntry| {
        if entry.depth() == 0 {
            return true;
        }
        let rel = entry.path().strip_prefix(repo_root).unwrap_or(entry.path());
        !is_excluded(rel, excluded_dirs)
    };

    let mut files: Vec<(String, PathBuf)> = WalkDir::new(repo_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(keep)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(PYTHON_EXTENSION))
                .unwrap_or(false)
        })
        .map(|e| (relative_path(repo_root, e.path()), e.into_path()))
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));
    debug!("Found {} Python files under {}", files.len(), repo_root.display());
    files.into_iter().map(|(_, path)| path).collect()
}

/// SHA-256 hex digest of file content.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
