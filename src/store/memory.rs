//! In-memory vector store, primarily for tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::IndexEntry;

use super::{sort_hits, ScoredEntry, StoreStats, VectorStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn get(&self, chunk_id: &str) -> Result<Option<IndexEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::IndexWrite("memory store lock poisoned".into()))?;
        Ok(entries.get(chunk_id).cloned())
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::IndexWrite("memory store lock poisoned".into()))?;
        entries.insert(entry.chunk_id.clone(), entry);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::IndexWrite("memory store lock poisoned".into()))?;
        let mut hits: Vec<ScoredEntry> = entries
            .values()
            .map(|entry| ScoredEntry {
                score: cosine_similarity(vector, &entry.embedding),
                entry: entry.clone(),
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::IndexWrite("memory store lock poisoned".into()))?;
        Ok(StoreStats {
            count: entries.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn entry(chunk_id: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            content_hash: format!("hash-{}", chunk_id),
            embedding,
            text: format!("text for {}", chunk_id),
            metadata: Map::new(),
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_chunk_id() {
        let store = MemoryStore::new();
        store.upsert(entry("c1", vec![1.0, 0.0])).await.unwrap();
        let mut replacement = entry("c1", vec![0.0, 1.0]);
        replacement.content_hash = "hash-2".into();
        store.upsert(replacement).await.unwrap();

        let stored = store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.content_hash, "hash-2");
        assert_eq!(store.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn query_orders_by_score_then_chunk_id() {
        let store = MemoryStore::new();
        store.upsert(entry("b", vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("a", vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("c", vec![0.0, 1.0])).await.unwrap();

        let hits = store.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn query_with_k_above_count_returns_all() {
        let store = MemoryStore::new();
        store.upsert(entry("a", vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("b", vec![0.5, 0.5])).await.unwrap();
        let hits = store.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }
}
