//! mdharvest - Harvest metadata records from cultural-heritage
//! repositories.
//!
//! Selects a fetcher by the collection's registry harvest type, pulls
//! records to exhaustion, and writes validated objsets as JSON files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mdharvest_core::{HttpTransport, Transport};
use mdharvest_fetcher::registry::Collection;
use mdharvest_fetcher::{FetcherOptions, HarvestController, HarvestType, ObjsetDirSink};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "mdharvest")]
#[command(about = "Harvest metadata records from cultural-heritage repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./mdharvest.toml or ~/.config/mdharvest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest one collection
    Harvest(HarvestArgs),
    /// Show current configuration
    Config,
}

#[derive(clap::Args)]
struct HarvestArgs {
    /// Registry collection URL or numeric collection id
    #[arg(conflicts_with_all = ["harvest_type", "url_harvest"])]
    collection: Option<String>,

    /// Harvest type code (OAI, OAC, OAJ, NUX, ALX, MRC, SLR, SLC, SLQ)
    #[arg(long)]
    harvest_type: Option<String>,

    /// Source URL to harvest from
    #[arg(long)]
    url_harvest: Option<String>,

    /// Source-specific parameter (OAI set, Nuxeo path, Solr query)
    #[arg(long, default_value = "")]
    extra_data: String,

    /// Collection name used in synthesized record ids
    #[arg(long)]
    name: Option<String>,

    /// Directory to write harvested objsets into
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Page size override (rows / docsPerPage / maximumRecords)
    #[arg(long)]
    page_size: Option<usize>,

    /// X-NXDocumentProperties header for Nuxeo harvests
    #[arg(long)]
    nuxeo_properties: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    mdharvest_core::init_logging(cli.quiet, cli.debug);

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Harvest(args) => run_harvest(args, &config),
        Command::Config => {
            println!("save_dir         = {}", config.output.save_dir.display());
            println!("registry base    = {}", config.registry.base_url);
            println!(
                "page_size        = {}",
                config
                    .fetch
                    .page_size
                    .map_or("per-fetcher default".to_string(), |n| n.to_string())
            );
            println!(
                "nuxeo_properties = {}",
                config
                    .fetch
                    .nuxeo_properties
                    .as_deref()
                    .unwrap_or(mdharvest_fetcher::nuxeo::DEFAULT_DOCUMENT_PROPERTIES)
            );
            Ok(())
        }
    }
}

fn run_harvest(args: HarvestArgs, config: &Config) -> Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport);
    let collection = resolve_collection(&args, config, &transport)?;

    let save_root = args
        .save_dir
        .clone()
        .unwrap_or_else(|| config.output.save_dir.clone());
    // one output directory per run
    let started = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let save_dir = save_root.join(format!("{}-{}", collection.id(), started));
    let sink = ObjsetDirSink::new(&save_dir)
        .with_context(|| format!("creating save directory {}", save_dir.display()))?;
    log::info!("saving objsets to {}", save_dir.display());

    let options = FetcherOptions {
        page_size: args.page_size.or(config.fetch.page_size),
        nuxeo_properties: args
            .nuxeo_properties
            .clone()
            .or_else(|| config.fetch.nuxeo_properties.clone()),
    };

    let mut controller =
        HarvestController::new(collection, transport, Box::new(sink), &options)?;
    let count = controller.harvest()?;
    println!("{count} records harvested to {}", save_dir.display());
    Ok(())
}

/// The collection comes from the registry, or is assembled from the
/// direct --harvest-type/--url-harvest arguments.
fn resolve_collection(
    args: &HarvestArgs,
    config: &Config,
    transport: &Arc<dyn Transport>,
) -> Result<Collection> {
    if let Some(collection) = &args.collection {
        let url = if collection.chars().all(|c| c.is_ascii_digit()) {
            format!("{}{}/", config.registry.base_url, collection)
        } else {
            collection.clone()
        };
        return Collection::fetch(transport, &url)
            .with_context(|| format!("fetching collection {url}"));
    }

    let (Some(harvest_type), Some(url_harvest)) = (&args.harvest_type, &args.url_harvest) else {
        bail!("either a registry collection or both --harvest-type and --url-harvest are required");
    };
    if HarvestType::from_name(harvest_type).is_none() {
        bail!("unknown harvest type {harvest_type:?}");
    }
    let mut collection = Collection::default();
    collection.url = format!("local/{}", args.name.as_deref().unwrap_or("adhoc"));
    collection.name = args.name.clone().unwrap_or_else(|| "adhoc".to_string());
    collection.harvest_type = harvest_type.clone();
    collection.url_harvest = url_harvest.clone();
    collection.extra_data = args.extra_data.clone();
    Ok(collection)
}
