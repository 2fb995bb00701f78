//! Change detection
//!
//! A file is skipped only when the index already knows it and its current
//! modification time is not newer than the recorded one. Everything else is
//! re-parsed, and so is every file the index knows about that has vanished
//! from the candidate list.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::mapping::FileTimeIndex;
use crate::source::{modified_unix, SourceFile};

/// Files selected for re-parse in the current run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// File key -> timestamp to record once the run succeeds
    pub files_to_read: BTreeMap<String, i64>,
    /// Files that changed on disk (as opposed to being pulled in by propagation)
    pub changed: BTreeSet<String>,
    /// Indexed files no longer present among the candidates
    pub removed: BTreeSet<String>,
    /// Whether anything must be rebuilt
    pub cache_invalidated: bool,
}

impl ChangeSet {
    pub fn contains(&self, file: &str) -> bool {
        self.files_to_read.contains_key(file)
    }

    /// Select `file` for re-parse; returns `false` if it already was
    pub fn select(&mut self, file: &str, stamp: i64) -> bool {
        if self.files_to_read.contains_key(file) {
            return false;
        }
        self.files_to_read.insert(file.to_string(), stamp);
        true
    }
}

/// Timestamp recorded for a re-parsed file.
///
/// Files read from disk carry the time observed before their content was
/// read; an edit saved after that stays newer than the stamp and is picked up
/// by the next run. Future-dated files are stamped with their own mtime so
/// they are not re-parsed on every run until the clock catches up. In-memory
/// files fall back to the run time.
pub fn record_stamp(file: &SourceFile, now: i64) -> i64 {
    file.observed_at
        .unwrap_or_else(|| modified_unix(&file.path).map_or(now, |mtime| mtime.max(now)))
}

/// Compare every candidate against the file-time index
pub fn detect_changes(files: &[SourceFile], index: &FileTimeIndex, now: i64) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen = BTreeSet::new();

    for file in files {
        let key = file.key();
        seen.insert(key.clone());

        let unchanged = match (index.get(&key), modified_unix(&file.path)) {
            (Some(recorded), Some(mtime)) => mtime <= recorded,
            _ => false,
        };
        if unchanged {
            continue;
        }

        debug!("break cache {}", key);
        changes.select(&key, record_stamp(file, now));
        changes.changed.insert(key);
        changes.cache_invalidated = true;
    }

    for file in index.files() {
        if !seen.contains(file) {
            debug!("indexed file removed {}", file);
            changes.removed.insert(file.to_string());
            changes.cache_invalidated = true;
        }
    }

    changes
}
