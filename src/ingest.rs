//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: connector pagination → normalization →
//! chunking → fingerprint-gated embedding → index writes. Two entry
//! points share the same downstream path:
//!
//! - [`run_sync`] pulls live from the configured provider APIs, running
//!   each source's pipeline as an independent task;
//! - [`run_load`] consumes the NDJSON extraction stream (stdin or file).
//!
//! Per-record and per-chunk failures are counted and skipped; a transport
//! failure aborts only the affected source (partial results are kept);
//! configuration and index-write failures abort the run.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunk::chunk_document;
use crate::client::ProviderClient;
use crate::config::{validate_credentials, ChunkingConfig, Config};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::fingerprint::{RunCounters, Upserter};
use crate::models::{RawRecord, RunSummary, Source};
use crate::normalize::normalize;
use crate::paginate::ScanOutcome;
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;
use crate::{connector_confluence, connector_jira, connector_sharepoint, connector_teams};

/// Normalize, chunk, and upsert a batch of raw records, adding to the
/// shared counters. Malformed records are logged and skipped; an empty
/// body yields zero chunks and zero index writes.
pub async fn process_records(
    records: &[RawRecord],
    chunking: &ChunkingConfig,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    batch_size: usize,
    counters: &RunCounters,
) -> Result<()> {
    let upserter = Upserter::new(store, embedder, batch_size);

    for record in records {
        let doc = match normalize(record) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(source = %record.source, error = %e, "skipping malformed record");
                continue;
            }
        };

        let chunks = chunk_document(&doc, chunking)?;
        if chunks.is_empty() {
            continue;
        }
        upserter.upsert_chunks(&chunks, counters).await?;
    }

    Ok(())
}

/// Ingest an NDJSON stream of serialized [`RawRecord`]s. Unparseable
/// lines are logged and skipped.
pub async fn load_stream(
    reader: impl BufRead,
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> Result<RunSummary> {
    let counters = RunCounters::new();
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::Configuration(format!("reading input: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping invalid NDJSON line");
            }
        }
    }

    info!(records = records.len(), "loaded extraction stream");
    process_records(
        &records,
        &config.chunking,
        store,
        embedder,
        config.embedding.batch_size,
        &counters,
    )
    .await?;

    Ok(counters.snapshot())
}

/// CLI entry: load an NDJSON extraction file (or stdin) into the index.
pub async fn run_load(config: &Config, input: Option<PathBuf>) -> Result<RunSummary> {
    validate_credentials_for_load(config)?;
    let store = SqliteStore::open(&config.db.path).await?;
    let embedder = create_embedder(&config.embedding)?;

    let summary = match input {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .map_err(|e| Error::Configuration(format!("opening {}: {}", path.display(), e)))?;
            load_stream(std::io::BufReader::new(file), config, &store, embedder.as_ref()).await?
        }
        None => {
            let stdin = std::io::stdin();
            let locked = stdin.lock();
            load_stream(locked, config, &store, embedder.as_ref()).await?
        }
    };

    store.close().await;
    Ok(summary)
}

fn validate_credentials_for_load(config: &Config) -> Result<()> {
    // Loading only needs the embedding credential, not provider ones.
    if config.embedding.provider == "openai" && std::env::var("OPENAI_API_KEY").is_err() {
        return Err(Error::Configuration(
            "missing environment credentials: OPENAI_API_KEY".into(),
        ));
    }
    Ok(())
}

/// CLI entry: sync one source (or `all`) live from the provider APIs.
///
/// Each selected source runs as its own task; the run counters are the
/// only shared mutable state. A source whose pagination aborts keeps the
/// records it already produced and does not affect the other sources.
pub async fn run_sync(
    config: &Config,
    selector: &str,
    limit: Option<usize>,
) -> Result<RunSummary> {
    validate_credentials(config)?;

    let sources = select_sources(config, selector)?;
    if sources.is_empty() {
        return Err(Error::Configuration(
            "no sources configured; add [sources.*] sections to the config".into(),
        ));
    }

    let store: Arc<SqliteStore> = Arc::new(SqliteStore::open(&config.db.path).await?);
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    let counters = Arc::new(RunCounters::new());
    let config = Arc::new(config.clone());

    let mut tasks = JoinSet::new();
    for source in sources {
        let config = Arc::clone(&config);
        let store = Arc::clone(&store);
        let embedder = Arc::clone(&embedder);
        let counters = Arc::clone(&counters);

        tasks.spawn(async move {
            let outcome = scan_source(source, &config).await;
            if let Some(ref e) = outcome.error {
                warn!(
                    source = %source,
                    error = %e,
                    kept = outcome.records.len(),
                    "source scan aborted; keeping partial results"
                );
            }
            let limited = match limit {
                Some(n) if outcome.records.len() > n => &outcome.records[..n],
                _ => &outcome.records[..],
            };
            info!(source = %source, records = limited.len(), "processing records");
            process_records(
                limited,
                &config.chunking,
                store.as_ref(),
                embedder.as_ref(),
                config.embedding.batch_size,
                &counters,
            )
            .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Error::IndexWrite(format!("ingestion task panicked: {}", e))),
        }
    }

    store.close().await;
    Ok(counters.snapshot())
}

fn select_sources(config: &Config, selector: &str) -> Result<Vec<Source>> {
    if selector == "all" {
        return Ok(config.sources.configured());
    }
    let source: Source = selector
        .parse()
        .map_err(Error::Configuration)?;
    if !config.sources.is_configured(source) {
        return Err(Error::Configuration(format!(
            "source '{}' is not configured",
            source
        )));
    }
    Ok(vec![source])
}

async fn scan_source(source: Source, config: &Config) -> ScanOutcome {
    let timeout = config.sources.timeout_secs;
    match source {
        Source::Jira => {
            let Some(jira) = config.sources.jira.as_ref() else {
                return ScanOutcome::default();
            };
            match ProviderClient::jira(&jira.base_url, timeout) {
                Ok(client) => connector_jira::scan(&client, jira, &config.sources).await,
                Err(e) => ScanOutcome::aborted(Vec::new(), e),
            }
        }
        Source::Confluence => {
            let Some(confluence) = config.sources.confluence.as_ref() else {
                return ScanOutcome::default();
            };
            match ProviderClient::confluence(&confluence.base_url, timeout) {
                Ok(client) => {
                    connector_confluence::scan(&client, confluence, &config.sources).await
                }
                Err(e) => ScanOutcome::aborted(Vec::new(), e),
            }
        }
        Source::Sharepoint => {
            let Some(sharepoint) = config.sources.sharepoint.as_ref() else {
                return ScanOutcome::default();
            };
            match ProviderClient::graph("sharepoint", timeout) {
                Ok(client) => {
                    connector_sharepoint::scan(&client, sharepoint, &config.sources).await
                }
                Err(e) => ScanOutcome::aborted(Vec::new(), e),
            }
        }
        Source::Teams => {
            let Some(teams) = config.sources.teams.as_ref() else {
                return ScanOutcome::default();
            };
            match ProviderClient::graph("teams", timeout) {
                Ok(client) => connector_teams::scan(&client, teams, &config.sources).await,
                Err(e) => ScanOutcome::aborted(Vec::new(), e),
            }
        }
    }
}
