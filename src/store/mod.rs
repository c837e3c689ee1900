//! Vector index storage abstraction.
//!
//! The [`VectorStore`] trait defines the four operations the pipeline
//! needs — get, upsert, query, stats — enabling pluggable backends:
//! SQLite for the CLI, in-memory for tests.
//!
//! Upsert-by-key is atomic per entry; no cross-entry transaction is
//! required or assumed. Entries are never deleted automatically — stale
//! entries for documents removed upstream persist until an explicit
//! reconciliation pass.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::IndexEntry;

/// One nearest-neighbor hit.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub count: u64,
}

/// Abstract vector index backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Look up the entry for a chunk id, if any.
    async fn get(&self, chunk_id: &str) -> Result<Option<IndexEntry>>;

    /// Insert or overwrite the entry for `entry.chunk_id`.
    async fn upsert(&self, entry: IndexEntry) -> Result<()>;

    /// Return the `k` entries nearest to `vector` by cosine similarity,
    /// ordered by descending score with ascending `chunk_id` as the
    /// tie-break.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Shared ordering rule: descending score, then ascending chunk id so
/// results are deterministic under score ties.
pub(crate) fn sort_hits(hits: &mut [ScoredEntry]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
    });
}
