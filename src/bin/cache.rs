//! Entity Cache CLI
//!
//! Builds, inspects and clears the incremental entity cache.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use entity_cache::{
    collect_sources, CacheLayout, DebugLevel, EntityCache, EntityCacheConfig, EntityFileIndex,
    EntityStore, FileTimeIndex, Propagation, Scope,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "entity-cache")]
#[command(about = "Incrementally merge and cache XML test entities")]
struct Cli {
    /// Path to a config file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse changed files of a scope and refresh its cache
    Build {
        /// Scope to build (test, page, section, data, action-group)
        #[arg(short, long)]
        scope: Scope,
        /// Root of the definition tree
        #[arg(long)]
        source: Option<PathBuf>,
        /// Validation level: none, default or developer
        #[arg(short, long)]
        debug_level: Option<DebugLevel>,
        /// Only follow shared entities one level deep
        #[arg(long)]
        single_hop: bool,
        /// Print the merged entities as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index and artifact counts
    Status {
        /// Scope to inspect (all scopes if omitted)
        #[arg(short, long)]
        scope: Option<Scope>,
    },

    /// Remove cached state
    Clean {
        /// Scope to clear (whole cache if omitted)
        #[arg(short, long)]
        scope: Option<Scope>,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        EntityCacheConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.cache_dir {
        config.cache.root = dir;
    }

    match cli.command {
        Commands::Build {
            scope,
            source,
            debug_level,
            single_hop,
            json,
        } => {
            if let Some(level) = debug_level {
                config.validation.debug_level = level;
            }
            if single_hop {
                config.cache.propagation = Propagation::SingleHop;
            }
            let Some(root) = source.or_else(|| config.source_root()) else {
                bail!("no source root given; pass --source or set [sources] root");
            };

            let files = collect_sources(&root, &config.scan_config())
                .with_context(|| format!("failed to collect sources under {}", root.display()))?;
            let cache = EntityCache::from_config(&config, scope)?;
            let report = cache.build(&files)?;

            if report.cache_invalidated {
                println!(
                    "🔄 {}: parsed {} of {} file(s), {} entities",
                    scope,
                    report.parsed_files.len(),
                    files.len(),
                    report.output.len()
                );
                if !report.pulled_in.is_empty() {
                    println!("   {} file(s) re-parsed for shared entities", report.pulled_in.len());
                }
                if !report.removed.is_empty() {
                    println!("   {} file(s) removed since last build", report.removed.len());
                }
                if let Some(stats) = report.rebuild {
                    println!(
                        "   artifacts: {} written, {} unchanged, {} pruned",
                        stats.artifacts.written, stats.artifacts.unchanged, stats.artifacts.pruned
                    );
                }
            } else {
                println!("✅ {}: cache up to date, {} entities", scope, report.output.len());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report.output.to_json()?)?);
            }
            Ok(())
        }

        Commands::Status { scope } => {
            let root = config.cache_root();
            let scopes = match scope {
                Some(scope) => vec![scope],
                None => Scope::ALL.to_vec(),
            };

            println!("📦 Cache at {}", root.display());
            for scope in scopes {
                let layout = CacheLayout::new(&root, scope);
                let files = FileTimeIndex::load(&layout.file_to_time_path());
                let entities = EntityFileIndex::load(&layout.entity_to_files_path());
                match EntityStore::new(&layout).load_all() {
                    Some(artifacts) => println!(
                        "  {:<12} {} file(s), {} indexed entities, {} artifact(s)",
                        scope.name(),
                        files.len(),
                        entities.len(),
                        artifacts.len()
                    ),
                    None => println!("  {:<12} ❌ unreadable artifacts", scope.name()),
                }
            }
            Ok(())
        }

        Commands::Clean { scope } => {
            let root = config.cache_root();
            match scope {
                Some(scope) => {
                    CacheLayout::new(&root, scope).clear()?;
                    println!("🗑  removed {} cache under {}", scope, root.display());
                }
                None => {
                    if root.exists() {
                        std::fs::remove_dir_all(&root)
                            .with_context(|| format!("failed to remove {}", root.display()))?;
                    }
                    println!("🗑  removed {}", root.display());
                }
            }
            Ok(())
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
            Ok(())
        }
    }
}
