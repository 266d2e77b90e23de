//! Courtload - CourtListener bulk export loader

use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courtload_common::logging::{init_logging, LogConfig};
use courtload_ingest::pipeline::{open_input, IngestPipeline, RunSummary};
use courtload_ingest::quarantine::QuarantineSink;
use courtload_ingest::schema::{EntityKind, Reference};
use courtload_ingest::{ConfigOverrides, IngestConfig, PlaceholderCache, PgStore, RecordStore};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "courtload")]
#[command(author, version, about = "Load CourtListener bulk CSV exports into PostgreSQL")]
struct Cli {
    /// Kind of records in the export
    #[arg(value_enum)]
    kind: EntityKind,

    /// Export file (.csv, or .csv.gz)
    path: PathBuf,

    /// Parse and print records without connecting to the database
    #[arg(long)]
    no_db: bool,

    /// Records to print with --no-db
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Records per batch
    #[arg(long, value_name = "N")]
    batch: Option<usize>,

    /// Read window in bytes
    #[arg(long, value_name = "BYTES")]
    chunk: Option<usize>,

    /// Write rejected records and their reasons to this CSV file
    #[arg(long, value_name = "FILE")]
    bad_records: Option<PathBuf>,

    /// Database connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Seed the placeholder cache with existing parent keys
    #[arg(long)]
    preload_keys: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            database_url: self.database_url.clone(),
            parse_limit: self.limit,
            batch_records: self.batch,
            chunk_bytes: self.chunk,
            preload_keys: self.preload_keys,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so DATABASE_URL from .env reaches clap
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .file_prefix("courtload")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env()?.with_overrides(&cli.overrides())?;

    let input = open_input(&cli.path)?;
    let mut pipeline = IngestPipeline::new(input, cli.kind, config.pipeline_options())
        .with_context(|| format!("Failed to open {} export {}", cli.kind, cli.path.display()))?;

    if cli.no_db {
        info!(kind = %cli.kind, limit = config.parse_limit, "Parsing without database");
        let report = pipeline.parse_only(config.parse_limit)?;
        for record in &report.records {
            println!("{}", record);
        }
        return Ok(());
    }

    let summary = load(&cli, &config, &mut pipeline).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
    }

    Ok(())
}

async fn load(
    cli: &Cli,
    config: &IngestConfig,
    pipeline: &mut IngestPipeline<Box<dyn Read + Send>>,
) -> Result<RunSummary> {
    let mut sink = match &cli.bad_records {
        Some(path) => Some(QuarantineSink::create(path, pipeline.header())?),
        None => None,
    };

    let mut store = PgStore::connect(&config.database_url, config.connect_timeout())
        .await
        .context("Failed to connect to database")?;
    let mut cache = PlaceholderCache::new();

    let outcome = async {
        if config.preload_keys {
            preload_keys(&mut store, &mut cache, cli.kind).await?;
        }
        let summary = pipeline.run(&mut store, &mut cache, sink.as_mut()).await?;
        anyhow::Ok(summary)
    }
    .await;
    store.close().await;

    if let (Some(sink), Some(path)) = (&sink, &cli.bad_records) {
        info!(path = %path.display(), written = sink.written(), "Rejected records written");
    }
    outcome
}

/// Seed the cache with every key of the tables `kind` references
async fn preload_keys<S: RecordStore + ?Sized>(
    store: &mut S,
    cache: &mut PlaceholderCache,
    kind: EntityKind,
) -> Result<()> {
    let targets: BTreeSet<EntityKind> = kind
        .schema()
        .foreign_keys
        .iter()
        .filter_map(|fk| match fk.references {
            Reference::Entity(target) => Some(target),
            Reference::External(_) => None,
        })
        .collect();

    for target in targets {
        let keys = store
            .known_keys(target)
            .await
            .with_context(|| format!("Failed to preload {} keys", target))?;
        info!(kind = %target, keys = keys.len(), "Preloaded existing keys");
        cache.extend(target, keys);
    }
    Ok(())
}
