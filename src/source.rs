//! Source file collection
//!
//! Walks a source tree for definition files and reads their contents. The
//! change detector compares the filesystem modification time at decision
//! time; what gets recorded is the time observed just before the content was
//! read, so a save landing after the read still counts as newer.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// A candidate definition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    /// Latest of clock and mtime, taken before `content` was read
    pub observed_at: Option<i64>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            observed_at: None,
        }
    }

    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let clock = Utc::now().timestamp();
        let observed_at = modified_unix(&path).map_or(clock, |mtime| mtime.max(clock));
        let content = fs::read_to_string(&path)?;
        Ok(Self {
            path,
            content,
            observed_at: Some(observed_at),
        })
    }

    /// Key used for this file in the cache indices
    pub fn key(&self) -> String {
        path_key(&self.path)
    }

    /// Whether the file has anything worth parsing
    pub fn is_non_trivial(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Index key for a path
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Current modification time of `path` in unix seconds, if it can be read
pub fn modified_unix(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp())
}

/// Configuration for source collection
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extension to collect, without the dot
    pub extension: String,
    /// Skip files whose path relative to the root starts with one of these
    pub skip_prefixes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "xml".to_string(),
            skip_prefixes: vec![
                "_cache/".to_string(),
                ".git/".to_string(),
                "vendor/".to_string(),
                "node_modules/".to_string(),
            ],
        }
    }
}

/// Collect every matching file under `root`, sorted by path
pub fn collect_sources(root: &Path, config: &ScanConfig) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path
            .extension()
            .map(|ext| ext != config.extension.as_str())
            .unwrap_or(true)
        {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if config.skip_prefixes.iter().any(|p| relative_str.starts_with(p)) {
            continue;
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        files.push(SourceFile::read(absolute)?);
    }

    Ok(files)
}
