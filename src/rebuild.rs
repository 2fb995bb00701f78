//! Cache rebuild
//!
//! Runs only after an invalidated pass. Artifacts are synced first, then the
//! entity-file index, and the file-time index last: the time index is the
//! commit point, so an interrupted rebuild leaves this run's files unstamped
//! and the next run simply re-parses them.

use crate::detect::ChangeSet;
use crate::entity::EntityMap;
use crate::error::Result;
use crate::layout::CacheLayout;
use crate::mapping::{EntityFileIndex, FileTimeIndex};
use crate::store::{EntityStore, StoreStats};

/// Outcome of a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub artifacts: StoreStats,
    pub indexed_files: usize,
    pub indexed_entities: usize,
}

/// Entity name -> contributing files, taken from the final result
pub fn entity_file_index(entities: &EntityMap) -> EntityFileIndex {
    let mut index = EntityFileIndex::default();
    for (name, record) in entities {
        index.insert(name.clone(), record.filenames.clone());
    }
    index
}

/// Persist the final result of a pass together with both indices
pub fn rebuild(
    layout: &CacheLayout,
    entities: &EntityMap,
    changes: &ChangeSet,
    mut file_times: FileTimeIndex,
) -> Result<RebuildStats> {
    layout.ensure_dirs()?;

    for removed in &changes.removed {
        file_times.remove(removed);
    }
    for (file, stamp) in &changes.files_to_read {
        file_times.insert(file.clone(), *stamp);
    }
    let entity_files = entity_file_index(entities);

    let artifacts = EntityStore::new(layout).sync(entities)?;
    entity_files.save(&layout.entity_to_files_path())?;
    file_times.save(&layout.file_to_time_path())?;

    Ok(RebuildStats {
        artifacts,
        indexed_files: file_times.len(),
        indexed_entities: entity_files.len(),
    })
}
