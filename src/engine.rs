//! Incremental build of one scope
//!
//! ```text
//! LOAD_INDICES -> DETECT_CHANGES -> (nothing changed) RETURN_CACHED
//!                                -> PROPAGATE_INVALIDATION -> MERGE_CHANGED_FILES
//!                                -> VALIDATE -> COMBINE_WITH_CACHE
//!                                -> REBUILD_INDICES_AND_ARTIFACTS -> RETURN
//! ```
//!
//! Runs are synchronous and assume a single writer per cache root.

use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::EntityCacheConfig;
use crate::detect::{detect_changes, ChangeSet};
use crate::entity::{EntityMap, ScopeOutput};
use crate::error::Result;
use crate::layout::CacheLayout;
use crate::mapping::{EntityFileIndex, FileTimeIndex};
use crate::merge::{MergeCapability, XmlMerger};
use crate::propagate::{propagate, Propagation};
use crate::rebuild::{rebuild, RebuildStats};
use crate::scope::Scope;
use crate::source::SourceFile;
use crate::store::EntityStore;
use crate::validation::{DebugLevel, EntitySchema, ErrorCollector};

/// Persisted state of a scope as found at the start of a run
#[derive(Debug, Default)]
struct CachedState {
    file_times: FileTimeIndex,
    entity_files: EntityFileIndex,
    entities: EntityMap,
}

impl CachedState {
    /// Load indices and artifacts; any inconsistency yields an empty state
    fn load(layout: &CacheLayout) -> Self {
        let file_times = FileTimeIndex::load(&layout.file_to_time_path());
        let entity_files = EntityFileIndex::load(&layout.entity_to_files_path());
        let store = EntityStore::new(layout);

        // Every rebuild writes both of these, even when no entity exists
        if !file_times.is_empty()
            && (!layout.entity_to_files_path().is_file() || !store.dir().is_dir())
        {
            warn!(
                "cache for scope {} is missing its entity index or artifacts, rebuilding from scratch",
                layout.scope()
            );
            return Self::default();
        }

        let Some(entities) = store.load_all() else {
            warn!("cache for scope {} is unreadable, rebuilding from scratch", layout.scope());
            return Self::default();
        };
        if !entities.keys().map(String::as_str).eq(entity_files.entities()) {
            warn!(
                "cache for scope {} does not match its entity index, rebuilding from scratch",
                layout.scope()
            );
            return Self::default();
        }

        Self {
            file_times,
            entity_files,
            entities,
        }
    }
}

/// Everything a build did
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: ScopeOutput,
    pub cache_invalidated: bool,
    /// Files parsed and merged, in merge order
    pub parsed_files: Vec<String>,
    /// Files re-parsed only because they share an entity with a changed file
    pub pulled_in: BTreeSet<String>,
    /// Indexed files that disappeared since the previous run
    pub removed: BTreeSet<String>,
    /// Entities dropped from the cached result before merging
    pub evicted: BTreeSet<String>,
    pub rebuild: Option<RebuildStats>,
}

/// Incremental cache for one scope
#[derive(Debug)]
pub struct EntityCache<M: MergeCapability> {
    layout: CacheLayout,
    merger: M,
    debug_level: DebugLevel,
    propagation: Propagation,
}

impl EntityCache<XmlMerger> {
    /// Cache for `scope` set up from configuration
    pub fn from_config(config: &EntityCacheConfig, scope: Scope) -> Result<Self> {
        let schema = EntitySchema::load_or_builtin(scope, config.validation.schema_dir.as_deref())?;
        Ok(Self::new(config.cache_root(), XmlMerger::with_schema(schema))
            .with_debug_level(config.validation.debug_level)
            .with_propagation(config.cache.propagation))
    }
}

impl<M: MergeCapability> EntityCache<M> {
    pub fn new(cache_root: impl Into<PathBuf>, merger: M) -> Self {
        Self {
            layout: CacheLayout::new(cache_root, merger.scope()),
            merger,
            debug_level: DebugLevel::default(),
            propagation: Propagation::default(),
        }
    }

    pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
        self.debug_level = level;
        self
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Merged entities for the scope
    pub fn read_files(&self, files: &[SourceFile]) -> Result<ScopeOutput> {
        self.build(files).map(|report| report.output)
    }

    /// Run one incremental pass over `files`
    pub fn build(&self, files: &[SourceFile]) -> Result<BuildReport> {
        let scope = self.layout.scope();
        let now = Utc::now().timestamp();

        let CachedState {
            file_times,
            entity_files,
            mut entities,
        } = CachedState::load(&self.layout);

        let mut changes = detect_changes(files, &file_times, now);
        if !changes.cache_invalidated {
            info!("{}: no changes, {} cached entities", scope, entities.len());
            return Ok(BuildReport {
                output: ScopeOutput::new(scope, entities),
                cache_invalidated: false,
                parsed_files: Vec::new(),
                pulled_in: BTreeSet::new(),
                removed: BTreeSet::new(),
                evicted: BTreeSet::new(),
                rebuild: None,
            });
        }

        let propagated = propagate(
            &self.merger,
            files,
            &mut changes,
            &entity_files,
            &mut entities,
            self.propagation,
            now,
        )?;

        let (merged, parsed_files) = self.merge_selected(files, &changes)?;
        entities.extend(merged);

        let stats = rebuild(&self.layout, &entities, &changes, file_times)?;
        info!(
            "{}: parsed {} file(s), {} entities, {} artifact(s) written, {} pruned",
            scope,
            parsed_files.len(),
            entities.len(),
            stats.artifacts.written,
            stats.artifacts.pruned
        );

        Ok(BuildReport {
            output: ScopeOutput::new(scope, entities),
            cache_invalidated: true,
            parsed_files,
            pulled_in: propagated.pulled_in,
            removed: changes.removed,
            evicted: propagated.evicted,
            rebuild: Some(stats),
        })
    }

    /// Parse and merge every selected file, then flatten the merged document
    fn merge_selected(&self, files: &[SourceFile], changes: &ChangeSet) -> Result<(EntityMap, Vec<String>)> {
        let mut errors = ErrorCollector::new();
        let mut document: Option<M::Document> = None;
        let mut parsed = Vec::new();

        for file in files {
            let key = file.key();
            if !changes.contains(&key) {
                continue;
            }
            if !file.is_non_trivial() {
                debug!("skipping empty file {}", key);
                continue;
            }

            let merged = match document.take() {
                None => self.merger.parse(&file.content, &key, &mut errors)?,
                Some(mut doc) => {
                    self.merger.merge(&mut doc, &file.content, &key, &mut errors)?;
                    doc
                }
            };
            if self.debug_level == DebugLevel::Developer {
                self.merger.validate(&merged, Some(&key), &mut errors);
            }
            document = Some(merged);
            parsed.push(key);
        }

        if self.debug_level == DebugLevel::Default {
            if let Some(doc) = &document {
                self.merger.validate(doc, None, &mut errors);
            }
        }
        errors.finish()?;

        let entities = match &document {
            Some(doc) => self.merger.to_entity_mapping(doc)?,
            None => EntityMap::new(),
        };
        Ok((entities, parsed))
    }
}
