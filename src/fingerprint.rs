//! Content fingerprints and the incremental upsert policy.
//!
//! Every chunk's text is hashed; the hash is compared against the persisted
//! index to decide whether the chunk is new, updated, or unchanged. Only
//! new and updated chunks reach the embedding provider, which is the
//! system's central cost invariant: at most one embedding call per chunk
//! whose content actually changed, zero for unchanged content, no matter
//! how often the pipeline reruns.
//!
//! The digest is a change-detection fingerprint, not a security boundary,
//! and must not be treated as a dedup key across adversarial input.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{Chunk, IndexEntry, RunSummary};
use crate::store::VectorStore;

/// SHA-256 hex digest of a chunk's text.
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shared run tally. Source pipelines run as independent tasks, so the
/// counters are atomics — the only shared mutable state in a run.
#[derive(Debug, Default)]
pub struct RunCounters {
    new: AtomicU64,
    updated: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_new(&self, n: u64) {
        self.new.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_updated(&self, n: u64) {
        self.updated.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            new: self.new.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    New,
    Updated,
}

/// Drives embedding calls and vector-store writes for one batch of chunks.
pub struct Upserter<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    batch_size: usize,
}

impl<'a> Upserter<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Classify every chunk against the index, embed the new/updated ones
    /// in bounded batches, and persist the results.
    ///
    /// Classification happens before any embedding call, so batch
    /// boundaries never affect the new/updated/skipped decision. An
    /// embedding failure marks that batch's chunks failed and processing
    /// continues; a store failure is fatal for the run.
    pub async fn upsert_chunks(&self, chunks: &[Chunk], counters: &RunCounters) -> Result<()> {
        let mut pending: Vec<(&Chunk, Decision)> = Vec::new();

        for chunk in chunks {
            match self.store.get(&chunk.chunk_id).await? {
                None => pending.push((chunk, Decision::New)),
                Some(existing) if existing.content_hash == chunk.content_hash => {
                    counters.add_skipped(1);
                }
                Some(_) => pending.push((chunk, Decision::Updated)),
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(c, _)| c.text.clone()).collect();

            let vectors = match self.embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    warn!(
                        expected = batch.len(),
                        got = vectors.len(),
                        "embedding provider returned a mismatched batch"
                    );
                    counters.add_failed(batch.len() as u64);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, chunks = batch.len(), "embedding batch failed");
                    counters.add_failed(batch.len() as u64);
                    continue;
                }
            };

            let now = chrono::Utc::now().timestamp();
            for ((chunk, decision), embedding) in batch.iter().zip(vectors) {
                let entry = IndexEntry {
                    chunk_id: chunk.chunk_id.clone(),
                    content_hash: chunk.content_hash.clone(),
                    embedding,
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                    updated_at: now,
                };
                self.store.upsert(entry).await?;
                match decision {
                    Decision::New => counters.add_new(1),
                    Decision::Updated => counters.add_updated(1),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::test_support::{FailingEmbedder, HashEmbedder};
    use crate::store::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            content_hash: digest(text),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        assert_eq!(digest("release notes"), digest("release notes"));
        assert_ne!(digest("release notes"), digest("release notes v2"));
    }

    #[tokio::test]
    async fn first_sighting_is_new_then_skipped_then_updated() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(4);
        let upserter = Upserter::new(&store, &embedder, 16);

        let counters = RunCounters::new();
        upserter
            .upsert_chunks(&[chunk("jira-1-chunk-0", "v1")], &counters)
            .await
            .unwrap();
        assert_eq!(counters.snapshot().new, 1);

        let counters = RunCounters::new();
        upserter
            .upsert_chunks(&[chunk("jira-1-chunk-0", "v1")], &counters)
            .await
            .unwrap();
        let summary = counters.snapshot();
        assert_eq!((summary.new, summary.updated, summary.skipped), (0, 0, 1));
        assert_eq!(embedder.calls(), 1, "unchanged content must not re-embed");

        let counters = RunCounters::new();
        upserter
            .upsert_chunks(&[chunk("jira-1-chunk-0", "v2")], &counters)
            .await
            .unwrap();
        assert_eq!(counters.snapshot().updated, 1);
        let entry = store.get("jira-1-chunk-0").await.unwrap().unwrap();
        assert_eq!(entry.content_hash, digest("v2"));
    }

    #[tokio::test]
    async fn batch_boundaries_do_not_change_classification() {
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("jira-1-chunk-{}", i), &format!("text {}", i)))
            .collect();

        for batch_size in [1, 2, 5] {
            let store = MemoryStore::new();
            let embedder = HashEmbedder::new(4);
            let upserter = Upserter::new(&store, &embedder, batch_size);

            let counters = RunCounters::new();
            upserter.upsert_chunks(&chunks, &counters).await.unwrap();
            assert_eq!(counters.snapshot().new, 5);

            let counters = RunCounters::new();
            upserter.upsert_chunks(&chunks, &counters).await.unwrap();
            assert_eq!(counters.snapshot().skipped, 5);
        }
    }

    #[tokio::test]
    async fn embedding_failure_marks_chunks_failed_and_continues() {
        let store = MemoryStore::new();
        let embedder = FailingEmbedder;
        let upserter = Upserter::new(&store, &embedder, 2);

        let counters = RunCounters::new();
        let chunks = vec![chunk("a-chunk-0", "x"), chunk("b-chunk-0", "y")];
        upserter.upsert_chunks(&chunks, &counters).await.unwrap();
        let summary = counters.snapshot();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.new, 0);
        assert!(store.get("a-chunk-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn editing_one_chunk_leaves_siblings_skipped() {
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(4);
        let upserter = Upserter::new(&store, &embedder, 16);

        let first = vec![chunk("doc-chunk-0", "alpha"), chunk("doc-chunk-1", "beta")];
        upserter
            .upsert_chunks(&first, &RunCounters::new())
            .await
            .unwrap();

        let second = vec![
            chunk("doc-chunk-0", "alpha"),
            chunk("doc-chunk-1", "beta edited"),
        ];
        let counters = RunCounters::new();
        upserter.upsert_chunks(&second, &counters).await.unwrap();
        let summary = counters.snapshot();
        assert_eq!((summary.skipped, summary.updated, summary.new), (1, 1, 0));
    }
}
