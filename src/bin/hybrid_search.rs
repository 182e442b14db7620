//! Interactive hybrid search shell.
//!
//! Loads a persisted index (or builds one in memory from a chunk file),
//! then answers queries until `quit`/`exit`, printing results and the
//! cumulative timing report after each query.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use manual_search::commands::{open_engine, repl_run};
use manual_search::hybrid::{load_chunks, HybridSearchEngine};
use manual_search::metrics::CommandTimer;
use manual_search::Config;

#[derive(Parser)]
#[command(name = "hybrid_search")]
#[command(about = "Interactive vector + graph search over technical manual chunks")]
struct Cli {
    /// Index directory to load
    #[arg(short, long, env = "MANUAL_SEARCH_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Build an in-memory index from this chunk file instead of loading one
    #[arg(long)]
    chunks: Option<PathBuf>,

    /// How many results to display per query
    #[arg(short = 'n', long)]
    top_n: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("manual_search=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::new();
    let top_n = cli.top_n.unwrap_or(config.top_n);

    let engine = match cli.chunks {
        Some(path) => {
            info!("Building in-memory index from {}", path.display());
            let corpus = load_chunks(&path)?;
            HybridSearchEngine::build(&corpus, config.hybrid())?
        }
        None => open_engine(&config, cli.index_dir.as_deref())?,
    };

    if engine.is_empty() {
        warn!("Index is empty. Nothing to search.");
        return Ok(());
    }

    println!(
        "Loaded {} chunks. Type a query, or quit/exit to stop.",
        engine.len()
    );

    let timer = CommandTimer::start("hybrid_search");
    let result = repl_run(&engine, top_n, io::stdin().lock(), io::stdout());
    let elapsed = timer.finish(result.is_ok());

    let answered = result?;
    info!("Answered {} queries in {:.1}s", answered, elapsed.as_secs_f64());
    Ok(())
}
