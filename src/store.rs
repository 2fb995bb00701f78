//! Entity cache store
//!
//! One JSON artifact per entity inside the scope's data directory. The set of
//! artifacts in that directory is the full cached result for the scope.

use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::entity::{EntityMap, EntityRecord};
use crate::error::Result;
use crate::layout::CacheLayout;

const ARTIFACT_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

fn plain_name() -> &'static Regex {
    static PLAIN: OnceLock<Regex> = OnceLock::new();
    PLAIN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").unwrap())
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").unwrap())
}

/// Write `bytes` to a temporary sibling of `path`, then rename it into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}", TEMP_EXTENSION));
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// File name of an entity's artifact.
///
/// Plain names map to `<name>.json`; anything else is sanitized and suffixed
/// with a checksum of the original name so distinct names never collide.
pub fn artifact_file_name(entity: &str) -> String {
    if plain_name().is_match(entity) {
        format!("{}.{}", entity, ARTIFACT_EXTENSION)
    } else {
        let stem = unsafe_chars().replace_all(entity, "_");
        let checksum = Checksum::from_bytes(entity.as_bytes());
        format!("{}-{}.{}", stem, checksum.short(12), ARTIFACT_EXTENSION)
    }
}

/// Outcome of persisting a scope's entities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub written: usize,
    pub unchanged: usize,
    pub pruned: usize,
}

/// Per-scope artifact directory
#[derive(Debug, Clone)]
pub struct EntityStore {
    dir: PathBuf,
}

impl EntityStore {
    pub fn new(layout: &CacheLayout) -> Self {
        Self {
            dir: layout.data_dir(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, entity: &str) -> PathBuf {
        self.dir.join(artifact_file_name(entity))
    }

    /// Persist one entity; returns `false` when the artifact already holds
    /// exactly these bytes
    pub fn write(&self, record: &EntityRecord) -> Result<bool> {
        let path = self.artifact_path(&record.name);
        let bytes = serde_json::to_vec_pretty(record)?;
        if Checksum::of_file(&path) == Some(Checksum::from_bytes(&bytes)) {
            return Ok(false);
        }
        write_atomic(&path, &bytes)?;
        Ok(true)
    }

    pub fn read(&self, entity: &str) -> Result<Option<EntityRecord>> {
        let path = self.artifact_path(entity);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Rehydrate every artifact in the scope.
    ///
    /// A missing directory is an empty cache. Returns `None` when any artifact
    /// cannot be read or decoded, since a partial cache cannot be trusted.
    pub fn load_all(&self) -> Option<EntityMap> {
        let mut entities = EntityMap::new();
        if !self.dir.is_dir() {
            return Some(entities);
        }

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot list cache directory {}: {}", self.dir.display(), e);
                return None;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("cannot read cache directory entry: {}", e);
                    return None;
                }
            };
            if path.extension().map(|ext| ext != ARTIFACT_EXTENSION).unwrap_or(true) {
                continue;
            }

            let record: EntityRecord = match fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!("discarding cache, unreadable artifact {}: {}", path.display(), e);
                    return None;
                }
            };
            entities.insert(record.name.clone(), record);
        }

        Some(entities)
    }

    /// Persist every entity and delete artifacts of entities no longer present
    pub fn sync(&self, entities: &EntityMap) -> Result<StoreStats> {
        fs::create_dir_all(&self.dir)?;
        let mut stats = StoreStats::default();

        for record in entities.values() {
            if self.write(record)? {
                stats.written += 1;
            } else {
                stats.unchanged += 1;
            }
        }

        let keep: BTreeSet<String> = entities.keys().map(|name| artifact_file_name(name)).collect();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stale_temp = path.extension().map(|ext| ext == TEMP_EXTENSION).unwrap_or(false);
            let stale_artifact = path.extension().map(|ext| ext == ARTIFACT_EXTENSION).unwrap_or(false)
                && !keep.contains(&file_name);
            if stale_temp || stale_artifact {
                debug!("pruning {}", path.display());
                fs::remove_file(&path)?;
                if stale_artifact {
                    stats.pruned += 1;
                }
            }
        }

        Ok(stats)
    }
}
