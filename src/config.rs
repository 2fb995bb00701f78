//! Configuration management for the entity cache
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (entity-cache.toml)
//! - Environment variables (ENTITY_CACHE__*)
//!
//! ## Example config file (entity-cache.toml):
//! ```toml
//! [cache]
//! root = "dev/tests/acceptance/tests/_cache"
//! propagation = "transitive"
//!
//! [validation]
//! debug_level = "developer"
//! schema_dir = "etc/schemas"
//!
//! [sources]
//! root = "app/code"
//! extension = "xml"
//! skip_prefixes = ["vendor/", "_cache/"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::propagate::Propagation;
use crate::source::ScanConfig;
use crate::validation::DebugLevel;

/// Main configuration for the entity cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityCacheConfig {
    /// Cache location and invalidation settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Schema validation settings
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Source discovery settings
    #[serde(default)]
    pub sources: SourceSettings,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory holding index files and artifacts
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,

    /// How far invalidation follows shared entities
    #[serde(default)]
    pub propagation: Propagation,
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// When schema validation runs
    #[serde(default)]
    pub debug_level: DebugLevel,

    /// Directory of `<scope>.schema.json` files overriding the built-in schemas
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

/// Source discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Root of the definition tree
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Extension of definition files
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Relative path prefixes never collected
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,
}

// Default value functions
fn default_cache_root() -> PathBuf {
    PathBuf::from("_cache")
}

fn default_extension() -> String {
    ScanConfig::default().extension
}

fn default_skip_prefixes() -> Vec<String> {
    ScanConfig::default().skip_prefixes
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            propagation: Propagation::default(),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            root: None,
            extension: default_extension(),
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

impl EntityCacheConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "entity-cache.toml",
            ".entity-cache.toml",
            "config/entity-cache.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "entity-cache") {
            let xdg_config = config_dir.config_dir().join("entity-cache.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // ENTITY_CACHE__CACHE__ROOT, ENTITY_CACHE__VALIDATION__DEBUG_LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("ENTITY_CACHE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Cache root, resolved against the working directory when relative
    pub fn cache_root(&self) -> PathBuf {
        absolutize(&self.cache.root)
    }

    /// Source root, resolved against the working directory when relative
    pub fn source_root(&self) -> Option<PathBuf> {
        self.sources.root.as_deref().map(absolutize)
    }

    /// Scan settings for source collection
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            extension: self.sources.extension.clone(),
            skip_prefixes: self.sources.skip_prefixes.clone(),
        }
    }
}

fn absolutize(path: &std::path::Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
