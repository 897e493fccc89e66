//! Folio-Harvest main entry point
//!
//! This is the command-line interface for the Folio-Harvest manual harvester.

use anyhow::Context;
use clap::Parser;
use folio_harvest::config::{load_config_with_hash, validate, Config};
use folio_harvest::crawler::{crawl, CrawlOptions};
use folio_harvest::output::{load_statistics, print_statistics};
use folio_harvest::storage::SqliteStore;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Folio-Harvest: a polite, resumable manual harvester
///
/// Folio-Harvest crawls one language/version of a multi-language manual
/// site, skips navigation pages, scores every article and stores it in a
/// SQLite database. Interrupted runs resume from the last checkpoint.
#[derive(Parser, Debug)]
#[command(name = "folio-harvest")]
#[command(about = "A polite, resumable manual harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Language of the entry point to harvest
    #[arg(long, default_value = "en")]
    language: String,

    /// Manual version of the entry point to harvest
    #[arg(long = "version", default_value = "home")]
    manual_version: String,

    /// Maximum number of pages to fetch in this run (0 for no limit)
    #[arg(long, default_value_t = 1000)]
    max_pages: u64,

    /// Directory for the checkpoint and reports (overrides the config file)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Discard the previous checkpoint and start from the seeds
    #[arg(long)]
    reset_state: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the article database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (mut config, config_hash) = load(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.display().to_string();
    }

    let options = CrawlOptions {
        language: cli.language.clone(),
        version: cli.manual_version.clone(),
        max_pages: (cli.max_pages > 0).then_some(cli.max_pages),
        reset_state: cli.reset_state,
        config_hash,
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &options)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, options).await
    }
}

/// Loads the config file, or the built-in defaults when no path is given
fn load(path: Option<&Path>) -> anyhow::Result<(Config, Option<String>)> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok((config, Some(hash)))
        }
        None => {
            tracing::info!("No configuration file given; using built-in defaults");
            let config = Config::default();
            validate(&config).context("Built-in configuration is invalid")?;
            Ok((config, None))
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("folio_harvest=info,warn"),
            1 => EnvFilter::new("folio_harvest=debug,info"),
            2 => EnvFilter::new("folio_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config, options: &CrawlOptions) -> anyhow::Result<()> {
    let entry = config.entry_for(&options.language, &options.version)?;
    let seeds = entry.seed_urls()?;

    println!("=== Folio-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.max_workers);
    println!("  Default delay: {:.1}s", config.crawler.default_delay_secs);
    println!(
        "  Randomized delay: {} ({:.1}s to {:.1}s)",
        config.crawler.randomize_delay, config.crawler.delay_range.0, config.crawler.delay_range.1
    );
    println!("  Request timeout: {}s", config.crawler.timeout_secs);
    println!("  Max attempts: {}", config.retry.max_attempts);
    match options.max_pages {
        Some(max) => println!("  Page limit: {}", max),
        None => println!("  Page limit: none"),
    }

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.state_path().display());
    println!("  Reports: {}", config.output.report_path().display());
    println!("  Database: {}", config.output.database_path);

    println!("\nQuality:");
    println!(
        "  Mode: {:?} (minimum score {})",
        config.quality.mode, config.quality.min_score
    );

    println!("\nAllowed Origins ({}):", config.links.allowed_origins.len());
    for origin in &config.links.allowed_origins {
        match config.origin_policy(origin) {
            Some(policy) => println!(
                "  - {} (delay {:.1}s, {} concurrent)",
                origin, policy.delay_secs, policy.max_concurrent
            ),
            None => println!("  - {}", origin),
        }
    }

    println!("\nEntry {} / {} ({} seeds):", entry.language, entry.version, seeds.len());
    for seed in &seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the article database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = SqliteStore::open(Path::new(&config.output.database_path))
        .context("Failed to open article database")?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, options: CrawlOptions) -> anyhow::Result<()> {
    if options.reset_state {
        tracing::info!("Starting fresh harvest (discarding previous checkpoint)");
    } else {
        tracing::info!("Starting harvest (will resume from checkpoint if present)");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received; finishing in-flight pages");
            on_signal.cancel();
        }
    });

    match crawl(config, options, cancel).await {
        Ok(report) => {
            tracing::info!("Harvest finished: {}", report.stop_reason);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
