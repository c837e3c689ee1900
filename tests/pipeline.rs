//! End-to-end pipeline tests: NDJSON stream → normalize → chunk →
//! fingerprint-gated upsert → retrieval, over both store backends.

use std::io::BufReader;

use async_trait::async_trait;
use serde_json::json;

use teamcontext::config::{ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig};
use teamcontext::embedding::Embedder;
use teamcontext::error::Result;
use teamcontext::ingest::load_stream;
use teamcontext::retrieve::{answer_context, NO_CONTEXT_MARKER};
use teamcontext::store::memory::MemoryStore;
use teamcontext::store::sqlite::SqliteStore;
use teamcontext::store::VectorStore;

/// Deterministic embedder: a stable pseudo-vector per text.
struct StubEmbedder {
    dims: usize,
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                (0..self.dims)
                    .map(|i| {
                        let byte = text.as_bytes().get(i % text.len().max(1)).copied().unwrap_or(0);
                        (byte as f32 + i as f32) / 256.0
                    })
                    .collect()
            })
            .collect())
    }
}

fn test_config(chunk_size: usize, chunk_overlap: usize) -> Config {
    Config {
        db: DbConfig {
            path: "/tmp/unused.sqlite".into(),
        },
        chunking: ChunkingConfig {
            chunk_size,
            chunk_overlap,
        },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        sources: Default::default(),
    }
}

fn sharepoint_line(id: &str, name: &str, content: &str) -> String {
    serde_json::to_string(&json!({
        "source": "sharepoint",
        "payload": {
            "id": id,
            "name": name,
            "webUrl": format!("https://contoso.sharepoint.com/files/{}", name),
            "content": content,
            "site_name": "Engineering",
        }
    }))
    .unwrap()
}

async fn load(ndjson: &str, config: &Config, store: &dyn VectorStore) -> teamcontext::models::RunSummary {
    let embedder = StubEmbedder { dims: 8 };
    load_stream(BufReader::new(ndjson.as_bytes()), config, store, &embedder)
        .await
        .unwrap()
}

#[tokio::test]
async fn rerunning_an_unchanged_ingestion_skips_everything() {
    let config = test_config(8, 2);
    let store = MemoryStore::new();

    let ndjson = format!(
        "{}\n{}\n",
        sharepoint_line("f-1", "runbook.md", "ABCDEFGHIJKLMNOP"),
        sharepoint_line("f-2", "oncall.md", "QRSTUVWX"),
    );

    let first = load(&ndjson, &config, &store).await;
    assert_eq!(first.updated, 0);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.failed, 0);
    let total = first.new;
    assert!(total > 0);

    let second = load(&ndjson, &config, &store).await;
    assert_eq!(second.new, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, total);
    assert_eq!(store.stats().await.unwrap().count, total);
}

#[tokio::test]
async fn editing_one_document_updates_only_its_changed_chunks() {
    let config = test_config(8, 2);
    let store = MemoryStore::new();

    // chunk_size=8, overlap=2 → windows at offsets 0, 6, 12:
    //   "ABCDEFGH", "GHIJKLMN", "MNOP"
    let original = sharepoint_line("f-1", "runbook.md", "ABCDEFGHIJKLMNOP");
    let sibling = sharepoint_line("f-2", "oncall.md", "QRSTUVWX");
    let first = load(&format!("{}\n{}\n", original, sibling), &config, &store).await;
    assert_eq!(first.new, 4);

    // Edit only the final character: the first two windows are untouched.
    let edited = sharepoint_line("f-1", "runbook.md", "ABCDEFGHIJKLMNOQ");
    let second = load(&format!("{}\n{}\n", edited, sibling), &config, &store).await;
    assert_eq!(second.updated, 1);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.new, 0);
}

#[tokio::test]
async fn new_skipped_updated_lifecycle_for_a_single_chunk() {
    let config = test_config(64, 8);
    let store = MemoryStore::new();

    let v1 = sharepoint_line("f-1", "notes.md", "deploys happen on tuesdays");
    assert_eq!(load(&format!("{}\n", v1), &config, &store).await.new, 1);

    assert_eq!(load(&format!("{}\n", v1), &config, &store).await.skipped, 1);

    let v2 = sharepoint_line("f-1", "notes.md", "deploys happen on wednesdays");
    let third = load(&format!("{}\n", v2), &config, &store).await;
    assert_eq!(third.updated, 1);
    assert_eq!(third.new, 0);
}

#[tokio::test]
async fn empty_body_produces_zero_chunks_and_zero_writes() {
    let config = test_config(8, 2);
    let store = MemoryStore::new();

    let summary = load(&format!("{}\n", sharepoint_line("f-1", "empty.md", "")), &config, &store).await;
    assert_eq!(summary.new + summary.updated + summary.skipped + summary.failed, 0);
    assert_eq!(store.stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn invalid_lines_and_malformed_records_are_skipped_not_fatal() {
    let config = test_config(64, 8);
    let store = MemoryStore::new();

    let ndjson = format!(
        "not json at all\n{}\n{}\n",
        // Missing id: normalization rejects it, the run continues.
        json!({"source": "sharepoint", "payload": {"name": "orphan.md", "content": "x"}}),
        sharepoint_line("f-1", "kept.md", "still ingested"),
    );

    let summary = load(&ndjson, &config, &store).await;
    assert_eq!(summary.new, 1);
    assert!(store
        .get("sharepoint-f-1-chunk-0")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sqlite_store_round_trips_the_whole_pipeline() {
    let config = test_config(64, 8);
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("tcx.sqlite")).await.unwrap();

    let ndjson = format!(
        "{}\n{}\n",
        sharepoint_line("f-1", "runbook.md", "rollback with helm rollback api"),
        sharepoint_line("f-2", "oncall.md", "page the secondary after ten minutes"),
    );
    let first = load(&ndjson, &config, &store).await;
    assert_eq!(first.new, 2);

    // Idempotence holds across the persisted backend too.
    let second = load(&ndjson, &config, &store).await;
    assert_eq!(second.skipped, 2);

    let embedder = StubEmbedder { dims: 8 };
    let retrieval = RetrievalConfig {
        top_k: 3,
        max_context_chars: 6000,
    };
    let result = answer_context("how do I roll back?", &retrieval, &store, &embedder)
        .await
        .unwrap();

    // k=3 over a 2-entry index returns exactly those 2, best first.
    assert_eq!(result.chunks.len(), 2);
    assert!(result.chunks[0].score >= result.chunks[1].score);
    assert!(!result.assembled_prompt.contains(NO_CONTEXT_MARKER));
    assert!(result.assembled_prompt.contains("Source: sharepoint"));

    store.close().await;
}
