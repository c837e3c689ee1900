//! SQLite-backed vector store.
//!
//! Entries live in a single `index_entries` table keyed by chunk id, with
//! the embedding as a little-endian f32 BLOB. Upserts are single
//! `INSERT ... ON CONFLICT` statements, so an entry can never be observed
//! with a mismatched hash and vector. Nearest-neighbor queries compute
//! cosine similarity in-process over all rows — the index sizes this
//! system targets do not justify an ANN structure.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::IndexEntry;

use super::{sort_hits, ScoredEntry, StoreStats, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::IndexWrite(format!("creating {}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::IndexWrite(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            chunk_id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn metadata_to_json(metadata: &BTreeMap<String, String>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}

fn metadata_from_json(json: &str) -> BTreeMap<String, String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> IndexEntry {
    let blob: Vec<u8> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    IndexEntry {
        chunk_id: row.get("chunk_id"),
        content_hash: row.get("content_hash"),
        embedding: blob_to_vec(&blob),
        text: row.get("text"),
        metadata: metadata_from_json(&metadata_json),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn get(&self, chunk_id: &str) -> Result<Option<IndexEntry>> {
        let row = sqlx::query(
            "SELECT chunk_id, content_hash, embedding, text, metadata_json, updated_at
             FROM index_entries WHERE chunk_id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_entry))
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_entries (chunk_id, content_hash, embedding, text, metadata_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                text = excluded.text,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.chunk_id)
        .bind(&entry.content_hash)
        .bind(vec_to_blob(&entry.embedding))
        .bind(&entry.text)
        .bind(metadata_to_json(&entry.metadata))
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            "SELECT chunk_id, content_hash, embedding, text, metadata_json, updated_at
             FROM index_entries",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<ScoredEntry> = rows
            .iter()
            .map(|row| {
                let entry = row_to_entry(row);
                ScoredEntry {
                    score: cosine_similarity(vector, &entry.embedding),
                    entry,
                }
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            count: count as u64,
        })
    }
}
