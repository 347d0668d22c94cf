//! Site-Harvest main entry point
//!
//! This is the command-line interface for the Site-Harvest page crawler.

use anyhow::Context;
use clap::Parser;
use site_harvest::config::{load_config_with_hash, Config};
use site_harvest::output::{print_statistics, write_markdown_summary};
use site_harvest::{Coordinator, CrawlOptions, FetchStrategy, SitePolicy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Site-Harvest: site-scoped page discovery and retrieval
///
/// Site-Harvest finds every crawlable page of one website by combining its
/// sitemap with link extraction, fetches each page once, and reports what
/// it found.
#[derive(Parser, Debug)]
#[command(name = "site-harvest")]
#[command(version)]
#[command(about = "Site-scoped page discovery and retrieval", long_about = None)]
struct Cli {
    /// Root URL of the site to crawl
    #[arg(value_name = "ROOT_URL")]
    root: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of pages to fetch
    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    /// Number of concurrent fetch workers
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Render pages in a headless browser
    #[arg(long)]
    render: bool,

    /// Do not follow links found on pages (sitemap and root only)
    #[arg(long)]
    no_links: bool,

    /// Write a markdown summary to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Validate config and root URL without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((config, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => Config::default(),
    };

    let options = apply_overrides(CrawlOptions::from_config(&config), &cli);
    let summary_path = cli.summary.clone().or_else(|| config.output.summary_path.clone());

    if cli.dry_run {
        handle_dry_run(&cli.root, &options, summary_path.as_ref())?;
    } else {
        handle_crawl(&cli.root, options, summary_path).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_harvest=info,warn"),
            1 => EnvFilter::new("site_harvest=debug,info"),
            2 => EnvFilter::new("site_harvest=trace,debug"),
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

/// Command-line flags win over file values
fn apply_overrides(mut options: CrawlOptions, cli: &Cli) -> CrawlOptions {
    if let Some(max_pages) = cli.max_pages {
        options.max_pages = max_pages.max(1);
    }
    if let Some(concurrency) = cli.concurrency {
        options.max_concurrent_fetches = concurrency.max(1);
    }
    if cli.render {
        options.strategy = FetchStrategy::Render;
    }
    if cli.no_links {
        options.follow_links = false;
    }
    options
}

/// Handles the --dry-run mode: validates the root and shows the effective options
fn handle_dry_run(
    root: &str,
    options: &CrawlOptions,
    summary_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    println!("=== Site-Harvest Dry Run ===\n");

    let policy = SitePolicy::from_root(root)?;
    println!("Site:");
    println!("  Root: {}", root);
    println!("  Host: {}", policy.site_host());
    println!("  Scheme: {}", policy.scheme().unwrap_or("https"));

    println!("\nCrawler Configuration:");
    println!("  Strategy: {}", options.strategy);
    println!("  Max pages: {}", options.max_pages);
    println!("  Concurrent fetches: {}", options.max_concurrent_fetches);
    println!("  Per-page timeout: {}ms", options.per_page_timeout.as_millis());
    println!("  Follow links: {}", options.follow_links);
    println!("  Respect robots.txt: {}", options.respect_robots);
    println!("  Max redirects: {}", options.max_redirects);
    println!("  Sitemap depth: {}", options.sitemap_max_depth);

    println!("\nRetry:");
    println!("  Attempts: {}", options.retry.max_attempts);
    println!("  Base delay: {}ms", options.retry.base_delay.as_millis());
    println!("  Max delay: {}ms", options.retry.max_delay.as_millis());

    println!("\nUser Agent: {}", options.user_agent);

    if let Some(path) = summary_path {
        println!("\nSummary: {}", path.display());
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    root: &str,
    options: CrawlOptions,
    summary_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let coordinator = match Coordinator::new(root, options).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("Cannot start crawl: {}", e);
            return Err(e.into());
        }
    };

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight fetches");
            cancel.cancel();
        }
    });

    let report = coordinator.run().await;

    println!();
    print_statistics(&report.statistics);

    if let Some(path) = summary_path {
        tracing::info!("Writing markdown summary...");
        write_markdown_summary(&report, &path)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        println!("\n✓ Summary written to: {}", path.display());
    }

    Ok(())
}
