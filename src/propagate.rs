//! Invalidation propagation
//!
//! An entity's merged value can come from several files, so touching any one
//! of them invalidates the whole entity. For every changed or removed file the
//! entities it declares (or used to declare, per the entity-file index) are
//! evicted from the cached result and their other contributors are selected
//! for re-parse.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::debug;

use crate::detect::{record_stamp, ChangeSet};
use crate::entity::EntityMap;
use crate::error::Result;
use crate::mapping::EntityFileIndex;
use crate::merge::MergeCapability;
use crate::source::SourceFile;

/// How far invalidation follows co-contributing files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Only the co-contributors of entities in files that changed on disk.
    ///
    /// Lossy for chains: with X in A+B and Y in B+C, a change to A re-merges
    /// Y from B alone. That partial value replaces the cached one and is
    /// indexed under B only, so C's part of Y stays missing until C changes.
    SingleHop,
    /// Keep following co-contributors of pulled-in files until nothing new is reached
    #[default]
    Transitive,
}

/// What propagation added to a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationOutcome {
    /// Files selected only because they share an entity with a changed file
    pub pulled_in: BTreeSet<String>,
    /// Entities removed from the cached result
    pub evicted: BTreeSet<String>,
}

/// Extend `changes` with co-contributing files and evict touched entities from `cached`
pub fn propagate<M: MergeCapability>(
    merger: &M,
    files: &[SourceFile],
    changes: &mut ChangeSet,
    index: &EntityFileIndex,
    cached: &mut EntityMap,
    mode: Propagation,
    now: i64,
) -> Result<PropagationOutcome> {
    let candidates: HashMap<String, &SourceFile> = files.iter().map(|f| (f.key(), f)).collect();
    let mut outcome = PropagationOutcome::default();
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<String> = changes
        .changed
        .iter()
        .chain(changes.removed.iter())
        .cloned()
        .collect();

    while let Some(file) = queue.pop_front() {
        if !visited.insert(file.clone()) {
            continue;
        }

        let mut entities = index.entities_for_file(&file);
        if let Some(source) = candidates.get(&file).filter(|s| s.is_non_trivial()) {
            entities.extend(merger.prescan(&source.content, &file)?);
        }

        for entity in entities {
            cached.remove(&entity);
            outcome.evicted.insert(entity.clone());

            for other in index.files_for(&entity) {
                if *other == file {
                    continue;
                }
                // Contributors that no longer exist are handled as removed files
                let Some(source) = candidates.get(other) else {
                    continue;
                };
                if changes.select(other, record_stamp(source, now)) {
                    debug!("re-parsing {} for shared entity {}", other, entity);
                    outcome.pulled_in.insert(other.clone());
                    if mode == Propagation::Transitive {
                        queue.push_back(other.clone());
                    }
                }
            }
        }
    }

    Ok(outcome)
}
