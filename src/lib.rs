//! Entity Cache
//!
//! An incremental merge cache for declarative XML test-entity definitions
//! (tests, pages, sections, data fixtures, action groups). Entities with the
//! same name are merged across files into one canonical record, and only the
//! files affected by a change are re-parsed on the next run.
//!
//! ## Features
//!
//! - **Change Detection**: Modification times are compared against the last recorded parse
//! - **Invalidation Propagation**: Touching one contributor of an entity re-parses all of them
//! - **Incremental Merge**: Fresh entities are combined with the untouched cached ones
//! - **Aggregated Validation**: Schema violations across all files are reported together
//! - **Atomic Persistence**: Artifacts and indices are replaced via temp-file rename
//!
//! ## Architecture
//!
//! ```text
//! _cache/
//! ├── TestToTime
//! ├── TestToFiles
//! ├── PageToTime
//! ├── PageToFiles
//! └── data/
//!     ├── test/
//!     │   ├── AdminLoginTest.json
//!     │   └── CheckoutTest.json
//!     └── page/
//!         └── AdminLoginPage.json
//! ```

pub mod checksum;
pub mod config;
pub mod detect;
pub mod engine;
pub mod entity;
pub mod error;
pub mod layout;
pub mod mapping;
pub mod merge;
pub mod propagate;
pub mod rebuild;
pub mod scope;
pub mod source;
pub mod store;
pub mod validation;
pub mod xml;

pub use checksum::Checksum;
pub use config::EntityCacheConfig;
pub use detect::ChangeSet;
pub use engine::{BuildReport, EntityCache};
pub use entity::{EntityMap, EntityRecord, ScopeOutput};
pub use error::{CacheError, Result};
pub use layout::CacheLayout;
pub use mapping::{EntityFileIndex, FileTimeIndex};
pub use merge::{MergeCapability, MergedDocument, XmlMerger};
pub use propagate::Propagation;
pub use scope::Scope;
pub use source::{collect_sources, ScanConfig, SourceFile};
pub use store::EntityStore;
pub use validation::{DebugLevel, ErrorCollector, ValidationErrors, ValidationIssue};
