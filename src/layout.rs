//! On-disk cache layout
//!
//! ```text
//! <cache_root>/
//! ├── TestToTime          file path -> last parse timestamp
//! ├── TestToFiles         entity name -> comma-joined contributing files
//! └── data/
//!     └── test/
//!         ├── LoginTest.json
//!         └── CheckoutTest.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::scope::Scope;

/// Explicit cache location for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    cache_root: PathBuf,
    scope: Scope,
}

impl CacheLayout {
    pub fn new(cache_root: impl Into<PathBuf>, scope: Scope) -> Self {
        Self {
            cache_root: cache_root.into(),
            scope,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Path of the `<Scope>ToTime` index
    pub fn file_to_time_path(&self) -> PathBuf {
        self.cache_root.join(format!("{}ToTime", self.scope.name()))
    }

    /// Path of the `<Scope>ToFiles` index
    pub fn entity_to_files_path(&self) -> PathBuf {
        self.cache_root.join(format!("{}ToFiles", self.scope.name()))
    }

    /// Directory holding one artifact per entity
    pub fn data_dir(&self) -> PathBuf {
        self.cache_root.join("data").join(self.scope.dir_name())
    }

    /// Create the cache root and the scope's data directory if missing
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.data_dir())
    }

    /// Remove every persisted file belonging to this scope
    pub fn clear(&self) -> std::io::Result<()> {
        for path in [self.file_to_time_path(), self.entity_to_files_path()] {
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }
        let data_dir = self.data_dir();
        if data_dir.is_dir() {
            fs::remove_dir_all(data_dir)?;
        }
        Ok(())
    }
}
