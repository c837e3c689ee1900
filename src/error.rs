//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Propagation policy: per-record and per-chunk failures are isolated and do
//! not abort a run; a transport failure aborts only the affected source's
//! pagination; configuration and index-write failures abort the whole run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking parameters, missing credentials, unparseable config.
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or auth failure reaching a provider. Aborts pagination for
    /// that source; records already yielded remain valid.
    #[error("transport error reaching {provider}: {reason}")]
    Transport { provider: String, reason: String },

    /// Normalization could not extract the minimum required fields from a
    /// record. The record is skipped and processing continues.
    #[error("malformed {source_name} record: {reason}")]
    MalformedRecord { source_name: String, reason: String },

    /// Embedding provider failure. Affected chunks are marked failed and
    /// processing continues with the remaining chunks.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The vector store is unavailable or rejected a write. Fatal for the
    /// run, since skip/new/updated decisions cannot be trusted afterwards.
    #[error("index write error: {0}")]
    IndexWrite(String),
}

impl Error {
    pub fn transport(provider: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Transport {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::MalformedRecord {
            source_name: source.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::IndexWrite(e.to_string())
    }
}
