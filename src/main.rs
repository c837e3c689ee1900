//! # teamcontext CLI (`tcx`)
//!
//! The `tcx` binary drives the ingestion pipeline and answers questions
//! against the built index.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tcx init` | Create the index database |
//! | `tcx sources` | Show which sources are configured |
//! | `tcx sync <source>` | Ingest live from a provider (`all`, `jira`, `confluence`, `sharepoint`, `teams`) |
//! | `tcx load [--input FILE]` | Ingest an NDJSON extraction stream (stdin by default) |
//! | `tcx ask "<question>"` | Retrieve relevant chunks and print the assembled prompt |
//! | `tcx stats` | Show index statistics |
//!
//! ## Examples
//!
//! ```bash
//! tcx --config ./config/tcx.toml init
//! tcx --config ./config/tcx.toml sync jira
//! cat extracted.ndjson | tcx --config ./config/tcx.toml load
//! tcx --config ./config/tcx.toml ask "how do we roll back a deploy?"
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use teamcontext::config::{load_config, Config};
use teamcontext::embedding::create_embedder;
use teamcontext::ingest;
use teamcontext::models::RunSummary;
use teamcontext::retrieve;
use teamcontext::sources;
use teamcontext::stats;
use teamcontext::store::sqlite::SqliteStore;

/// teamcontext — incremental ingestion and retrieval for company
/// collaboration data.
#[derive(Parser)]
#[command(
    name = "tcx",
    about = "Ingest collaboration data into a vector index and ask questions against it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tcx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database. Idempotent.
    Init,

    /// Show which sources are configured.
    Sources,

    /// Ingest live from a provider's API.
    ///
    /// Runs each selected source's pipeline as an independent task; a
    /// failing source keeps its partial results and does not affect the
    /// others.
    Sync {
        /// `all`, or one of `jira`, `confluence`, `sharepoint`, `teams`.
        source: String,

        /// Maximum number of records to process per source.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ingest an NDJSON extraction stream.
    Load {
        /// Read from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Retrieve relevant chunks for a question and print the assembled
    /// prompt.
    Ask {
        question: String,

        /// Override the configured number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&config.db.path).await?;
            store.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Sources => {
            sources::run_sources(&config);
        }
        Commands::Sync { source, limit } => {
            let summary = ingest::run_sync(&config, &source, limit).await?;
            print_summary(&format!("sync {}", source), &summary);
        }
        Commands::Load { input } => {
            let summary = ingest::run_load(&config, input).await?;
            print_summary("load", &summary);
        }
        Commands::Ask { question, top_k } => {
            run_ask(&config, &question, top_k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&config).await?;
        }
    }

    Ok(())
}

fn print_summary(label: &str, summary: &RunSummary) {
    println!("{}", label);
    println!("  new:     {}", summary.new);
    println!("  updated: {}", summary.updated);
    println!("  skipped: {}", summary.skipped);
    println!("  failed:  {}", summary.failed);
    println!("ok");
}

async fn run_ask(config: &Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let mut retrieval = config.retrieval.clone();
    if let Some(k) = top_k {
        retrieval.top_k = k;
    }

    let store = SqliteStore::open(&config.db.path).await?;
    let embedder = create_embedder(&config.embedding)?;

    let result =
        retrieve::answer_context(question, &retrieval, &store, embedder.as_ref()).await?;

    if result.chunks.is_empty() {
        println!("No relevant chunks found.");
    } else {
        println!("Retrieved {} chunk(s):", result.chunks.len());
        for retrieved in &result.chunks {
            let metadata = &retrieved.chunk.metadata;
            println!(
                "  {:.4}  {}  [{} / {}]",
                retrieved.score,
                retrieved.chunk.chunk_id,
                metadata.get("source").map(String::as_str).unwrap_or("?"),
                metadata.get("title").map(String::as_str).unwrap_or("?"),
            );
        }
    }

    println!();
    println!("--- assembled prompt ---");
    println!("{}", result.assembled_prompt);

    store.close().await;
    Ok(())
}
