//! Exported report files on disk.
//!
//! Accepts a `.json` file holding an array of rows, a `.jsonl` file with
//! one row per line, or a directory searched recursively for both.

use crate::error::AggregateError;
use crate::store::ReportQuery;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Report rows read from export files.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row and keep the ones matching `query`.
    pub fn fetch(&self, query: &ReportQuery) -> Result<Vec<Value>> {
        let files = self.export_files()?;
        info!(
            "Reading {} export file(s) from {}",
            files.len(),
            self.path.display()
        );

        let mut rows = Vec::new();
        for file in &files {
            let before = rows.len();
            rows.extend(read_rows(file)?.into_iter().filter(|row| query.matches(row)));
            debug!("{}: {} matching rows", file.display(), rows.len() - before);
        }

        Ok(rows)
    }

    /// Export files under the store path, sorted by path.
    fn export_files(&self) -> Result<Vec<PathBuf>> {
        if !self.path.exists() {
            anyhow::bail!("Report export not found: {}", self.path.display());
        }

        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()))
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_export(e.path()))
            .map(|e| e.into_path())
            .collect();

        files.sort();
        Ok(files)
    }
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}

fn is_export(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("jsonl")
    )
}

/// Read rows from one export file.
fn read_rows(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read export file: {}", path.display()))?;

    if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        return Ok(read_json_lines(path, &content));
    }

    let payload: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse export file: {}", path.display()))?;

    match payload {
        Value::Array(rows) => Ok(rows),
        Value::Object(_) => Err(AggregateError::NotAList("an object"))
            .with_context(|| format!("Unexpected payload in {}", path.display())),
        _ => Err(AggregateError::NotAList("a scalar"))
            .with_context(|| format!("Unexpected payload in {}", path.display())),
    }
}

/// One row per non-empty line. Lines that fail to parse are kept as
/// `null` so they surface as malformed rows downstream.
fn read_json_lines(path: &Path, content: &str) -> Vec<Value> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).unwrap_or_else(|e| {
                warn!("{}:{}: invalid JSON: {}", path.display(), n + 1, e);
                Value::Null
            })
        })
        .collect()
}
