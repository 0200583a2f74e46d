use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use statekeep::{
    BootstrapOutcome, Envelope, FileMarkerStore, FileStorageAdapter, MarkerStore, PersistOutcome,
    ReadOnlyMarkerStore, StateMap, StorageAdapter, StoreConfig, TracingSink, migrations,
    open_store,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "state-tool")]
#[command(about = "Developer tooling for statekeep state files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored schema version and controller names
    Inspect {
        #[arg(long)]
        store: PathBuf,
    },
    /// Bring a state file up to the latest schema version
    Migrate {
        #[arg(long)]
        store: PathBuf,
        /// Marker directory, defaults to `.markers` next to the store
        #[arg(long)]
        markers: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Report the migrated version without writing the store or any marker
        #[arg(long)]
        dry_run: bool,
    },
    /// List the registered migrations
    Versions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { store } => inspect(&store).await,
        Command::Migrate {
            store,
            markers,
            config,
            dry_run,
        } => migrate(&store, markers, config.as_deref(), dry_run).await,
        Command::Versions => versions(),
    }
}

async fn inspect(store: &Path) -> Result<()> {
    let adapter = FileStorageAdapter::new(store);
    let stored = adapter
        .get(None)
        .await
        .with_context(|| format!("Failed to read store '{}'", store.display()))?;

    if stored.is_empty() {
        println!("Store: {}", store.display());
        println!("No state stored");
        return Ok(());
    }

    let envelope = Envelope::from_storage_map(stored)
        .with_context(|| format!("Store '{}' is not a state envelope", store.display()))?;

    println!("Store: {}", store.display());
    println!("Schema version: {}", envelope.version());
    println!("Controllers ({}):", envelope.data.len());
    for name in envelope.data.keys() {
        println!("- {}", name);
    }
    Ok(())
}

async fn migrate(
    store: &Path,
    markers: Option<PathBuf>,
    config: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => StoreConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => StoreConfig::default(),
    }
    .write_back_after_migration(!dry_run);

    let markers_dir = markers.unwrap_or_else(|| {
        store
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".markers")
    });
    let markers: Arc<dyn MarkerStore> = if dry_run {
        Arc::new(ReadOnlyMarkerStore::new(FileMarkerStore::new(&markers_dir)))
    } else {
        Arc::new(FileMarkerStore::new(&markers_dir))
    };

    let mut orchestrator = open_store(
        Arc::new(FileStorageAdapter::new(store)),
        markers,
        Arc::new(TracingSink),
        migrations::default_registry()?,
        config,
        StateMap::new(),
    )
    .await;

    match orchestrator.bootstrap().await? {
        BootstrapOutcome::Fresh { version, .. } => {
            println!("No state stored, a fresh install starts at version {}", version);
        }
        BootstrapOutcome::Corrupted => {
            return Err(anyhow!(
                "State in '{}' is corrupted; recovery must be confirmed by the application",
                store.display()
            ));
        }
        BootstrapOutcome::Loaded { report, write_back } => {
            println!(
                "Migrated {} -> {} (applied: {:?})",
                report.from_version,
                report.envelope.version(),
                report.applied
            );
            for fault in &report.faults {
                println!("- fault at {}: {}", fault.version, fault.reason);
            }
            match write_back {
                Some(PersistOutcome::Written) => println!("Written back to {}", store.display()),
                Some(outcome) => return Err(anyhow!("Write back did not complete: {:?}", outcome)),
                None if dry_run && report.version_changed() => println!("Dry run, nothing written"),
                None => println!("Already up to date"),
            }
        }
    }
    Ok(())
}

fn versions() -> Result<()> {
    let registry = migrations::default_registry()?;
    println!("Latest schema version: {}", registry.current_version());
    for unit in registry.units() {
        println!("- {}: {}", unit.target_version(), unit.description());
    }
    Ok(())
}
