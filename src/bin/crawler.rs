use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use web_crawler::config::CrawlerConfig;
use web_crawler::engine::CrawlEngine;

const REPORT_FILENAME: &str = "performance_report.txt";

/// Crawl the web from a seed list and persist extracted page text.
#[derive(Parser)]
#[command(name = "crawler")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    config: Option<PathBuf>,

    /// Seed list, one URL per line.
    #[arg(default_value = "links.txt")]
    links: PathBuf,
}

fn init_logging(config: &CrawlerConfig) -> Result<()> {
    let log_file = File::create(&config.log_filename)
        .with_context(|| format!("unable to open log file {}", config.log_filename))?;
    let level = if config.verbose_logging {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli
        .config
        .map(|path| CrawlerConfig::load_from_file(&path))
        .unwrap_or_default();
    init_logging(&config)?;

    tracing::info!(
        "Starting crawler with thread_count={} max_links={}",
        config.thread_count,
        config.max_links
    );

    let engine = CrawlEngine::new(config)?;
    let loaded = engine.load_seeds_from_file(&cli.links)?;
    if loaded == 0 {
        bail!("no seed links loaded from {}", cli.links.display());
    }

    let started = std::time::Instant::now();
    engine.run().await?;
    tracing::info!("Crawl finished in {:.2?}", started.elapsed());

    let metrics = engine.metrics();
    let mut stdout = std::io::stdout().lock();
    metrics.print_report(&mut stdout)?;
    stdout.flush()?;

    let mut report_file = File::create(REPORT_FILENAME)
        .with_context(|| format!("unable to write {REPORT_FILENAME}"))?;
    metrics.print_report(&mut report_file)?;

    Ok(())
}
