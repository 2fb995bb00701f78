//! Mapping file codec
//!
//! Index files are flat `key:value` lines. The format does not escape
//! anything: keys and values must not contain `:` or a newline. Decoding
//! splits on the first colon and skips lines without one, so trailing blank
//! lines and partially written files never fail a read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::store::write_atomic;

// Drive-letter paths (`C:\...`) contain the delimiter and do not survive a
// reload, so Windows source trees never hit the cache. `encode` warns about them.
#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

/// Separator between file paths in an `EntityFileIndex` value
const FILE_LIST_SEPARATOR: char = ',';

/// Decode `key:value` lines into a map
pub fn decode(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Encode a map as `key:value` lines
pub fn encode(map: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        if key.contains(&[':', '\n', '\r'][..]) {
            warn!("index key {:?} contains a delimiter and will not decode back", key);
        }
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push_str(LINE_ENDING);
    }
    out
}

/// Read and decode a mapping file; a missing or unreadable file is an empty map
fn read_mapping(path: &Path) -> BTreeMap<String, String> {
    if !path.is_file() {
        return BTreeMap::new();
    }
    match fs::read_to_string(path) {
        Ok(text) => decode(&text),
        Err(e) => {
            warn!("ignoring unreadable cache index {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// File path -> last timestamp (unix seconds) at which it was parsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTimeIndex {
    times: BTreeMap<String, i64>,
}

impl FileTimeIndex {
    pub fn load(path: &Path) -> Self {
        let mut times = BTreeMap::new();
        for (file, value) in read_mapping(path) {
            match value.trim().parse::<i64>() {
                Ok(time) => {
                    times.insert(file, time);
                }
                Err(_) => warn!("dropping corrupt timestamp for {} in {}", file, path.display()),
            }
        }
        Self { times }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let map = self
            .times
            .iter()
            .map(|(file, time)| (file.clone(), time.to_string()))
            .collect();
        write_atomic(path, encode(&map).as_bytes())
    }

    pub fn get(&self, file: &str) -> Option<i64> {
        self.times.get(file).copied()
    }

    pub fn insert(&mut self, file: impl Into<String>, time: i64) {
        self.times.insert(file.into(), time);
    }

    pub fn remove(&mut self, file: &str) -> Option<i64> {
        self.times.remove(file)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.times.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Entity name -> files currently contributing to it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFileIndex {
    files: BTreeMap<String, Vec<String>>,
}

impl EntityFileIndex {
    pub fn load(path: &Path) -> Self {
        let files = read_mapping(path)
            .into_iter()
            .map(|(entity, value)| {
                let files = value
                    .split(FILE_LIST_SEPARATOR)
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>();
                (entity, files)
            })
            .filter(|(_, files)| !files.is_empty())
            .collect();
        Self { files }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let sep = FILE_LIST_SEPARATOR.to_string();
        let map = self
            .files
            .iter()
            .map(|(entity, files)| (entity.clone(), files.join(&sep)))
            .collect();
        write_atomic(path, encode(&map).as_bytes())
    }

    /// Files recorded for an entity
    pub fn files_for(&self, entity: &str) -> &[String] {
        self.files.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entities whose recorded contributors include `file`
    pub fn entities_for_file(&self, file: &str) -> BTreeSet<String> {
        self.files
            .iter()
            .filter(|(_, files)| files.iter().any(|f| f == file))
            .map(|(entity, _)| entity.clone())
            .collect()
    }

    /// Record the contributors of an entity; empty lists are not stored
    pub fn insert(&mut self, entity: impl Into<String>, files: Vec<String>) {
        if !files.is_empty() {
            self.files.insert(entity.into(), files);
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
