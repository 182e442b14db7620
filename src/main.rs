//! Manual Search CLI - main entry point
//!
//! Unified CLI for building, querying and inspecting hybrid manual indexes.

use clap::{Parser, Subcommand};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use manual_search::commands::{self, BuildArgs, SearchArgs};
use manual_search::hybrid::NodeKind;
use manual_search::{metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "manual_search")]
#[command(about = "Hybrid vector + graph search over technical manuals", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index and relationship graph from extracted chunks
    Build {
        /// Chunk file (JSON array, all_chunks.json format)
        #[arg(short, long, env = "MANUAL_SEARCH_CHUNKS")]
        chunks: Option<PathBuf>,

        /// Directory to write the index into
        #[arg(short, long, env = "MANUAL_SEARCH_INDEX_DIR")]
        index_dir: Option<PathBuf>,

        /// Drop terms present in more than this fraction of chunks
        #[arg(long)]
        max_df: Option<f64>,

        /// Drop terms present in fewer than this many chunks
        #[arg(long)]
        min_df: Option<usize>,
    },

    /// Run a hybrid search query
    Search {
        /// Query text
        query: String,

        /// Number of results to return
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Index directory
        #[arg(short, long, env = "MANUAL_SEARCH_INDEX_DIR")]
        index_dir: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List graph neighbours of a node
    Neighbors {
        /// Node kind: chunk | section | signal | eco
        kind: NodeKind,

        /// Node id (e.g. ch_00042, 68.4.2, BOOST_LIMIT, ECO-0105)
        id: String,

        /// Only show neighbours of this kind
        #[arg(short, long)]
        filter: Option<NodeKind>,

        /// Index directory
        #[arg(short, long, env = "MANUAL_SEARCH_INDEX_DIR")]
        index_dir: Option<PathBuf>,
    },

    /// Interactive query loop (type quit or exit to stop)
    Repl {
        /// Number of results per query
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Index directory
        #[arg(short, long, env = "MANUAL_SEARCH_INDEX_DIR")]
        index_dir: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Build { .. } => "build",
            Commands::Search { .. } => "search",
            Commands::Neighbors { .. } => "neighbors",
            Commands::Repl { .. } => "repl",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("manual_search=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands) -> anyhow::Result<()> {
    let config = Config::new();

    match command {
        Commands::Build {
            chunks,
            index_dir,
            max_df,
            min_df,
        } => {
            let args = BuildArgs {
                chunks,
                index_dir,
                max_df,
                min_df,
            };
            let summary = commands::build_run(&config, &args)?;

            println!("✅ Index built");
            println!("   Chunks:      {}", summary.chunks);
            println!("   Vocabulary:  {}", summary.vocabulary);
            println!("   Graph nodes: {}", summary.nodes);
            println!("   Graph edges: {}", summary.edges);
            println!("   Saved to:    {}", summary.index_path.display());
        }
        Commands::Search {
            query,
            top_n,
            index_dir,
            json,
        } => {
            let args = SearchArgs {
                query,
                top_n,
                index_dir,
            };
            let response = commands::search_run(&config, &args)?;

            if json {
                println!("{}", commands::search::to_json(&response.results)?);
            } else {
                print!(
                    "{}",
                    commands::search::format_results(&args.query, &response.results)
                );
                if !response.skipped.is_empty() {
                    warn!(
                        "{} hits skipped (not in graph): {}",
                        response.skipped.len(),
                        response.skipped.join(", ")
                    );
                }
            }
        }
        Commands::Neighbors {
            kind,
            id,
            filter,
            index_dir,
        } => {
            let engine = commands::open_engine(&config, index_dir.as_deref())?;
            let neighbors = commands::neighbors_run(&engine, kind, &id, filter)?;

            if neighbors.is_empty() {
                println!("{}:{} has no neighbours", kind, id);
            }
            for neighbor in neighbors {
                println!("{}", neighbor);
            }
        }
        Commands::Repl { top_n, index_dir } => {
            let engine = commands::open_engine(&config, index_dir.as_deref())?;
            let top_n = top_n.unwrap_or(config.top_n);
            let stdin = io::stdin();
            commands::repl_run(&engine, top_n, stdin.lock(), io::stdout())?;
        }
    }

    Ok(())
}
