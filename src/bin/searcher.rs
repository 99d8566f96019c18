use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use web_crawler::storage::{Database, Mode};

/// Substring search over a store produced by the crawler.
#[derive(Parser)]
#[command(name = "searcher")]
struct Cli {
    /// Path to the page store.
    db: PathBuf,

    /// Text to look for in stored page content.
    query: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    if cli.query.trim().is_empty() {
        eprintln!("Search query is empty.");
        return ExitCode::FAILURE;
    }

    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .with_writer(std::io::stderr)
        .init();

    let db = Database::open(&cli.db, Mode::Searcher);
    for url in db.search(&cli.query) {
        println!("{url}");
    }
    ExitCode::SUCCESS
}
