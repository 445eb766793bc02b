//! mcat - media catalog command-line interface
//!
//! Opens the catalog under the resolved root folder, waits for load-time
//! rehydration, then runs one command.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcat_catalog::services::path_resolver;
use mcat_catalog::{CatalogSettings, CatalogStore, IngestSource, SortKey};
use mcat_common::config::{TomlConfig, ROOT_FOLDER_ENV};
use mcat_common::events::EventBus;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for mcat
#[derive(Parser, Debug)]
#[command(name = "mcat")]
#[command(about = "Media catalog with quota-gated ingestion")]
#[command(version)]
struct Args {
    /// Root folder holding the database and staging cache
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog items
    List {
        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add files to the catalog
    Add {
        /// File paths or file:// URLs
        #[arg(required = true)]
        paths: Vec<String>,
        /// Target collection
        #[arg(short, long, default_value = "default")]
        collection: String,
        /// Copy file contents into the staging cache instead of referencing them in place
        #[arg(long)]
        copy: bool,
    },
    /// Delete one item
    Delete { id: Uuid },
    /// Rename one item
    Rename { id: Uuid, name: String },
    /// Rename one item to its analysis suggestion
    AcceptRename { id: Uuid },
    /// Run analysis again for one item
    Reanalyze { id: Uuid },
    /// Remove every item
    Clear,
    /// Set the sort key (manual, name, created_at, size, mime_type)
    Sort { key: SortKey },
    /// Move items to the front in the given order
    Reorder {
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Show quota usage
    Quota,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default();

    init_tracing(&config)?;

    let settings = CatalogSettings::resolve(&config, args.root_folder.clone())
        .context("Failed to resolve configuration")?;
    info!("Root folder: {}", settings.root_folder.display());

    let store = settings
        .open_store(EventBus::new(256))
        .await
        .context("Failed to open catalog")?;
    let report = store
        .start_rehydration()
        .await
        .context("Rehydration task failed")??;
    if report.unrecoverable > 0 {
        eprintln!("warning: {} item(s) could not be restored", report.unrecoverable);
    }

    run(&store, args.command).await
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(store: &CatalogStore, command: Command) -> Result<()> {
    match command {
        Command::List { json } => {
            let items = store.items().await;
            if json {
                let rows: Vec<serde_json::Value> = items
                    .iter()
                    .map(|item| {
                        serde_json::json!({
                            "id": item.id,
                            "name": item.display_name(),
                            "durable_path": item.durable_path,
                            "mime_type": item.mime_type,
                            "size_bytes": item.size_bytes,
                            "created_at": item.created_at,
                            "collection_id": item.collection_id,
                            "live": item.is_live(),
                            "analysis": item.analysis,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for item in &items {
                    let path = item
                        .durable_path
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "<unrecoverable>".to_string());
                    println!(
                        "{}  {:<32}  {:>10}  {:<24}  {}",
                        item.id,
                        item.display_name(),
                        item.size_bytes,
                        item.mime_type,
                        path
                    );
                }
                println!("{} item(s), sorted by {}", items.len(), store.sort_key().await);
            }
        }
        Command::Add {
            paths,
            collection,
            copy,
        } => {
            let mut sources = Vec::with_capacity(paths.len());
            for reference in paths {
                if copy {
                    let path = path_resolver::require_durable(&reference)?;
                    let bytes = tokio::fs::read(path.as_path())
                        .await
                        .with_context(|| format!("Failed to read {}", path))?;
                    let name = path.file_name().unwrap_or_else(|| "file".to_string());
                    sources.push(IngestSource::bytes(bytes, name));
                } else {
                    sources.push(IngestSource::path(reference));
                }
            }

            let outcome = store.ingest(sources, &collection).await?;
            println!("Added {} item(s) to '{}'", outcome.admitted.len(), collection);
            for id in &outcome.admitted {
                println!("  {}", id);
            }
            if outcome.dropped_by_quota > 0 {
                println!("Dropped {} item(s): monthly quota reached", outcome.dropped_by_quota);
            }
            for failure in &outcome.failures {
                println!("Skipped {}: {}", failure.source, failure.error);
            }
        }
        Command::Delete { id } => {
            store.delete(id).await?;
            println!("Deleted {}", id);
        }
        Command::Rename { id, name } => {
            store.rename(id, &name).await?;
            println!("Renamed {} to '{}'", id, name.trim());
        }
        Command::AcceptRename { id } => match store.apply_suggested_rename(id).await? {
            Some(name) => println!("Renamed {} to '{}'", id, name),
            None => println!("No rename suggestion for {}", id),
        },
        Command::Reanalyze { id } => {
            store.reanalyze(id).await?;
            println!("Re-analyzed {}", id);
        }
        Command::Clear => {
            let removed = store.clear_all().await?;
            println!("Removed {} item(s)", removed);
        }
        Command::Sort { key } => {
            store.set_sort_key(key).await?;
            println!("Sorted by {}", key);
        }
        Command::Reorder { ids } => {
            store.reorder(&ids).await?;
            println!("Reordered {} item(s)", ids.len());
        }
        Command::Quota => {
            let quota = store.quota().await;
            let cap = quota
                .monthly_cap
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unlimited".to_string());
            let remaining = store
                .remaining_quota()
                .await
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unlimited".to_string());
            println!("Tier:      {:?}", quota.tier);
            println!("Cycle:     {} ({:?})", quota.cycle_start, quota.cycle_status);
            println!("Used:      {} / {}", quota.used, cap);
            println!("Remaining: {}", remaining);
        }
    }
    Ok(())
}
