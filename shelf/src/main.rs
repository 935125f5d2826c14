use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use shelf_core::cache::namespace;
use shelf_core::watcher::WatchEvent;
use shelf_core::{Entry, MetadataCache, Relation, ShelfCore};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const DEFAULT_NAMESPACES: &str = "filesystem|external|thumbnail|media";

#[derive(Parser, Debug)]
#[command(name = "shelf", version, about = "Inspect and watch cached file metadata")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print metadata for one or more paths as JSON
    Get {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Namespaces to fetch, separated by `|`
        #[arg(short, long, default_value = DEFAULT_NAMESPACES)]
        namespaces: String,

        /// Ask the providers again instead of using cached values
        #[arg(long)]
        refresh: bool,
    },
    /// Keep a directory's entries cached and report changes until Ctrl-C
    Watch {
        dir: PathBuf,

        #[arg(short, long, default_value = DEFAULT_NAMESPACES)]
        namespaces: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let core = ShelfCore::new().context("Failed to initialize shelf")?;

    match cli.command {
        Commands::Get {
            paths,
            namespaces,
            refresh,
        } => get(core.cache(), &paths, &namespaces, refresh).await,
        Commands::Watch { dir, namespaces } => watch(&core, &dir, &namespaces).await,
    }
}

fn entry_for(path: &Path) -> Result<Entry> {
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(Entry::from_path(&path)?)
}

async fn get(cache: &MetadataCache, paths: &[PathBuf], expr: &str, refresh: bool) -> Result<()> {
    let entries = paths
        .iter()
        .map(|p| entry_for(p))
        .collect::<Result<Vec<_>>>()?;

    let results = if refresh {
        cache.get_latest(&entries, expr).await
    } else {
        cache.get(&entries, expr).await
    };

    for (entry, metadata) in entries.iter().zip(results) {
        let mut object = Map::new();
        object.insert("url".to_string(), Value::String(entry.url().to_string()));
        object.insert("metadata".to_string(), serde_json::to_value(metadata)?);
        println!("{}", serde_json::to_string_pretty(&object)?);
    }

    Ok(())
}

async fn list_children(dir: &Path) -> Result<Vec<Entry>> {
    let mut children = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    while let Some(child) = read_dir.next_entry().await? {
        match Entry::from_path(&child.path()) {
            Ok(entry) => children.push(entry),
            Err(e) => tracing::warn!("Skipping {}: {}", child.path().display(), e),
        }
    }

    Ok(children)
}

async fn watch(core: &ShelfCore, dir: &Path, expr: &str) -> Result<()> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    let root = Entry::from_path(&dir)?;
    let cache = core.cache();

    let children = list_children(&dir).await?;
    cache.resize_by(children.len() as isize);
    cache.get(&children, expr).await;
    tracing::info!("Cached {} entries under {}", children.len(), root.url());

    let observers: Vec<_> = namespace::parse(expr)
        .into_iter()
        .map(|ns| {
            let label = ns.clone();
            cache.add_observer(&root, Relation::Children, &ns, move |entries, values| {
                for entry in entries {
                    let present = values.get(entry.url()).is_some_and(Option::is_some);
                    tracing::info!("{} changed for {} (present: {})", label, entry.url(), present);
                }
            })
        })
        .collect();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let invalidator = core.invalidator();
    invalidator.start(Some(tx))?;
    invalidator.watch(&dir)?;
    tracing::info!("Watching {} (Ctrl-C to stop)", dir.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                refetch(cache, &event, expr).await;
            }
        }
    }

    invalidator.stop();
    for id in observers {
        cache.remove_observer(id);
    }
    Ok(())
}

async fn refetch(cache: &MetadataCache, event: &WatchEvent, expr: &str) {
    for path in event.paths() {
        if !path.exists() {
            tracing::info!("{} is gone", path.display());
            continue;
        }

        match Entry::from_path(path) {
            Ok(entry) => {
                cache.get_one(&entry, expr).await;
            }
            Err(e) => tracing::warn!("Failed to refresh {}: {}", path.display(), e),
        }
    }
}
