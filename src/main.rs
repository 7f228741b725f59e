//! Menu-Harvest main entry point
//!
//! This is the command-line interface for the Menu-Harvest store crawler.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use menu_harvest::config::{load_config_with_hash, load_seeds, Config, SinkKind};
use menu_harvest::crawler::{build_resolver, crawl};
use menu_harvest::output::{load_statistics, print_nearby, print_statistics};
use menu_harvest::record::{LabeledRecord, RawLabeledRecord};
use menu_harvest::storage::{
    open_sink, persist, DocumentStoreSink, NearestQuery, SinkError, DEFAULT_NEAREST_LIMIT,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Menu-Harvest: a food-delivery marketplace store crawler
///
/// Menu-Harvest walks a marketplace's city, category and store pages,
/// builds one record per store with its location, hours and menu, and
/// writes the records to per-city files or to a geo-indexed document store.
#[derive(Parser, Debug)]
#[command(name = "menu-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A food-delivery marketplace store crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show which seeds would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "near", "import"])]
    dry_run: bool,

    /// Show document store statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "near", "import"])]
    stats: bool,

    /// Find stored stores near a point, given as LAT,LON
    #[arg(long, value_name = "LAT,LON", value_parser = parse_point, requires = "radius")]
    near: Option<(f64, f64)>,

    /// Search radius for --near, in meters
    #[arg(long, value_name = "METERS", requires = "near")]
    radius: Option<f64>,

    /// Maximum number of --near results; 0 returns every match
    #[arg(long, default_value_t = DEFAULT_NEAREST_LIMIT)]
    limit: usize,

    /// Replay an NDJSON file of labeled records into the configured sink
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "near"])]
    import: Option<PathBuf>,
}

fn parse_point(value: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", value))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude '{}': {}", lat, e))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude '{}': {}", lon, e))?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: {},{}", lat, lon));
    }
    Ok((lat, lon))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let (Some((latitude, longitude)), Some(radius)) = (cli.near, cli.radius) {
        let query = NearestQuery::new(latitude, longitude, radius).with_limit(cli.limit);
        handle_near(&config, &query)
    } else if let Some(path) = &cli.import {
        handle_import(&config, path).await
    } else {
        handle_crawl(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("menu_harvest=info,warn"),
            1 => EnvFilter::new("menu_harvest=debug,info"),
            2 => EnvFilter::new("menu_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Menu-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  Retry backoff: {}ms", config.crawler.retry_backoff_ms);
    println!(
        "  Minimum request interval: {}ms",
        config.crawler.minimum_request_interval_ms
    );
    println!(
        "  Request timeout: {}s",
        config.crawler.request_timeout_secs
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nMarketplace: {}", config.api.base_url);

    println!("\nOutput:");
    match config.output.sink {
        SinkKind::Ndjson | SinkKind::JsonArray => println!(
            "  {:?} files under {}",
            config.output.sink,
            config.output.directory.as_deref().unwrap_or("-")
        ),
        SinkKind::DocumentStore => println!(
            "  Document store: {}",
            config.output.database_path.as_deref().unwrap_or("-")
        ),
    }
    if let Some(geocoder) = &config.geocoder {
        println!("  Geocoder fallback: {}", geocoder.endpoint);
    }
    if let Some(embedder) = &config.embedder {
        println!(
            "  Embeddings: {} via {} ({} words/item)",
            embedder.model, embedder.endpoint, embedder.word_budget
        );
    }

    let seeds = load_seeds(&config.seeds)?;
    println!("\nSeeds from {}:", config.seeds.path);
    println!("  Accepted: {}", seeds.accepted.len());
    for seed in &seeds.accepted {
        println!("    * {}", seed);
    }
    println!("  Skipped by region allow-list: {}", seeds.skipped.len());

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} city seeds",
        seeds.accepted.len()
    );

    Ok(())
}

fn open_document_store(config: &Config) -> anyhow::Result<DocumentStoreSink> {
    if config.output.sink != SinkKind::DocumentStore {
        bail!("this mode needs output.sink = \"document-store\"");
    }
    let Some(path) = config.output.database_path.as_deref() else {
        bail!("output.database-path is not set");
    };

    println!("Database: {}\n", path);
    DocumentStoreSink::open(Path::new(path), None)
        .with_context(|| format!("failed to open document store {}", path))
}

/// Handles the --stats mode: shows statistics from the document store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = open_document_store(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --near mode: prints the stores closest to a point
fn handle_near(config: &Config, query: &NearestQuery) -> anyhow::Result<()> {
    let store = open_document_store(config)?;
    let results = store.nearest(query)?;
    print_nearby(&results);
    Ok(())
}

/// Handles the --import mode: replays labeled records into the configured sink
///
/// Lines that are not labeled records are rejected and skipped.
async fn handle_import(config: &Config, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open import file {}", path.display()))?;
    let sink = open_sink(&config.output, Utc::now(), build_resolver(config)?)?;

    let (mut imported, mut rejected) = (0u64, 0u64);
    let mut result: anyhow::Result<()> = Ok(());
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                result = Err(e.into());
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str::<RawLabeledRecord>(&line)
            .map_err(|e| e.to_string())
            .and_then(|raw| LabeledRecord::try_from(raw).map_err(|e| e.to_string()));
        let mut record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Line {}: rejected: {}", index + 1, e);
                rejected += 1;
                continue;
            }
        };

        match persist(sink.as_ref(), &mut record).await {
            Ok(()) => imported += 1,
            Err(SinkError::Precondition(e)) => {
                tracing::warn!("Line {}: rejected: {}", index + 1, e);
                rejected += 1;
            }
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }

    sink.close().await?;
    result?;

    tracing::info!("Imported {} records, rejected {}", imported, rejected);
    println!("✓ Imported {} records ({} rejected)", imported, rejected);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} with up to {} concurrent requests",
        config.api.base_url,
        config.crawler.max_concurrent_requests
    );

    match crawl(config).await {
        Ok(summary) => {
            tracing::info!(
                "Crawl completed successfully: {} stores persisted",
                summary.records_persisted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("37.87,-122.27"), Ok((37.87, -122.27)));
        assert_eq!(parse_point(" 37.87 , -122.27 "), Ok((37.87, -122.27)));
        assert!(parse_point("37.87").is_err());
        assert!(parse_point("91,0").is_err());
        assert!(parse_point("abc,1").is_err());
    }

    #[test]
    fn test_cli_requires_radius_with_near() {
        assert!(Cli::try_parse_from(["menu-harvest", "c.toml", "--near", "37.8,-122.2"]).is_err());
        let cli = Cli::try_parse_from([
            "menu-harvest",
            "c.toml",
            "--near",
            "37.8,-122.2",
            "--radius",
            "500",
        ])
        .unwrap();
        assert_eq!(cli.near, Some((37.8, -122.2)));
        assert_eq!(cli.limit, DEFAULT_NEAREST_LIMIT);
    }
}
