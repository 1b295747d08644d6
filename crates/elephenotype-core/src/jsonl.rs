//! JSON Lines reading/writing and timestamped, never-overwriting output files.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::errors::CoreResult;

/// Timestamp used in generated file names.
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Local time in ISO-8601 form, used for `sliced_at` / `generated_at`.
pub fn iso_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Create `{dir}/{stem}_{timestamp}.{ext}`, adding `_1`, `_2`, ... on a
/// name collision. An existing file is never opened for writing.
pub fn create_fresh_file(dir: &Path, stem: &str, ext: &str) -> CoreResult<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let base = format!("{stem}_{}", file_timestamp());
    let mut attempt = 0usize;
    loop {
        let name = if attempt == 0 {
            format!("{base}.{ext}")
        } else {
            format!("{base}_{attempt}.{ext}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write one JSON object per line. Non-ASCII text is written as-is.
pub fn write_records<T: Serialize, W: Write>(writer: W, records: &[T]) -> CoreResult<usize> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Write records to `path`, creating parent directories.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> CoreResult<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_records(File::create(path)?, records)
}

/// Write records to a freshly named file in `dir` and return its path.
pub fn write_jsonl_fresh<T: Serialize>(dir: &Path, stem: &str, records: &[T]) -> CoreResult<PathBuf> {
    let (path, file) = create_fresh_file(dir, stem, "jsonl")?;
    write_records(file, records)?;
    Ok(path)
}

/// Read records, skipping blank lines and logging lines that fail to
/// decode as UTF-8 or parse as JSON.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> CoreResult<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let line = match std::str::from_utf8(&bytes) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping line {} in {}: {e}", index + 1, path.display());
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                "Failed to parse line {} in {}: {e}",
                index + 1,
                path.display()
            ),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_write_preserves_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/data.jsonl");
        write_jsonl(&path, &[json!({"text": "资深专家解答"})]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"text\":\"资深专家解答\"}\n");
    }

    #[test]
    fn test_read_skips_blank_and_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n{not json\n{\"a\":2}\n").unwrap();
        let records: Vec<Value> = read_jsonl(&path).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_read_skips_invalid_utf8_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, b"{\"a\":1}\r\n{\"a\":\"\xff\xfe\"}\n{\"a\":2}").unwrap();
        let records: Vec<Value> = read_jsonl(&path).unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_fresh_files_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_jsonl_fresh(dir.path(), "train_dataset", &[json!(1)]).unwrap();
        let second = write_jsonl_fresh(dir.path(), "train_dataset", &[json!(2)]).unwrap();
        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "1\n");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "2\n");
    }
}
