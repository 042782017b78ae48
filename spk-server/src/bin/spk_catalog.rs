//! spk-catalog - material catalog maintenance
//!
//! Offline housekeeping for `materials.json`: merge duplicate products,
//! report barcodes shared by differently coloured products, print
//! statistics. Run it while the server is stopped; the server keeps its
//! own copy of the catalog in memory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spk_common::config::{BootstrapConfig, CliOverrides};
use spk_common::models::CatalogEntry;
use spk_server::catalog::MaterialCatalog;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Command-line arguments for spk-catalog
#[derive(Parser, Debug)]
#[command(name = "spk-catalog")]
#[command(about = "Maintenance tasks for the SpoolKeeper material catalog")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SPK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Folder holding materials.json
    #[arg(short, long, env = "SPK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Catalog file to operate on (overrides the data folder)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collapse duplicate products, unioning their barcodes
    Merge {
        /// Report what would be merged without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List barcodes attached to products of different colours
    CheckEans,
    /// Print catalog statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = BootstrapConfig::resolve(&CliOverrides {
        config_file: args.config,
        data_dir: args.data_dir,
        bind: None,
    })
    .context("Failed to resolve configuration")?;
    let path = args.file.unwrap_or_else(|| config.materials_path());

    let catalog = MaterialCatalog::load(&path, config.color_threshold)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;

    match args.command {
        Command::Merge { dry_run } => merge(&catalog, dry_run).await?,
        Command::CheckEans => check_eans(&catalog).await,
        Command::Stats => stats(&catalog).await,
    }
    Ok(())
}

async fn merge(catalog: &MaterialCatalog, dry_run: bool) -> Result<()> {
    let before = catalog.len().await;
    if dry_run {
        let removed = count_duplicates(catalog).await;
        println!("{} of {} entries would be merged away", removed, before);
        return Ok(());
    }

    let removed = catalog.merge_duplicates().await.context("Failed to save catalog")?;
    println!(
        "Merged {} duplicate entries ({} -> {})",
        removed,
        before,
        catalog.len().await
    );
    Ok(())
}

/// Duplicates counted without touching disk
async fn count_duplicates(catalog: &MaterialCatalog) -> usize {
    let entries = catalog.all().await;
    let mut kept: Vec<&CatalogEntry> = Vec::new();
    for entry in &entries {
        if !kept.iter().any(|k| k.same_product(entry)) {
            kept.push(entry);
        }
    }
    entries.len() - kept.len()
}

async fn check_eans(catalog: &MaterialCatalog) {
    let conflicts = catalog.conflicting_eans().await;
    if conflicts.is_empty() {
        println!("No conflicting EANs");
        return;
    }

    for conflict in &conflicts {
        println!("EAN {}:", conflict.ean);
        for (name, colorname, color) in &conflict.products {
            println!("  {} - {} ({})", name, colorname, color);
        }
    }
    println!("{} conflicting EANs", conflicts.len());
    info!(conflicts = conflicts.len(), "EAN check complete");
}

async fn stats(catalog: &MaterialCatalog) {
    let entries = catalog.all().await;

    let mut by_manufacturer: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &entries {
        *by_manufacturer.entry(entry.manufacturer.as_str()).or_default() += 1;
    }
    let with_ean = entries.iter().filter(|e| !e.eans.is_empty()).count();
    let ean_total: usize = entries.iter().map(|e| e.eans.len()).sum();

    println!("Catalog: {}", catalog.path().display());
    println!("Entries: {}", entries.len());
    println!("Material types: {}", catalog.list_material_types().await.len());
    println!("Entries with EAN: {} ({} codes)", with_ean, ean_total);
    println!("By manufacturer:");
    for (manufacturer, count) in by_manufacturer {
        let manufacturer = if manufacturer.is_empty() { "(none)" } else { manufacturer };
        println!("  {:<24} {}", manufacturer, count);
    }
}
