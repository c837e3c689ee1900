//! Core data models used throughout teamcontext.
//!
//! These types represent the records, documents, and chunks that flow
//! through the ingestion pipeline and the entries persisted in the index.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The collaboration systems we ingest from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Jira,
    Confluence,
    Sharepoint,
    Teams,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Jira,
        Source::Confluence,
        Source::Sharepoint,
        Source::Teams,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Jira => "jira",
            Source::Confluence => "confluence",
            Source::Sharepoint => "sharepoint",
            Source::Teams => "teams",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jira" => Ok(Source::Jira),
            "confluence" => Ok(Source::Confluence),
            "sharepoint" => Ok(Source::Sharepoint),
            "teams" => Ok(Source::Teams),
            other => Err(format!(
                "unknown source '{}' (expected jira, confluence, sharepoint, or teams)",
                other
            )),
        }
    }
}

/// A provider-native record, opaque to everything but the normalizer.
///
/// One `RawRecord` serializes to one NDJSON line — the boundary contract
/// between the extraction and loading stages — and round-trips losslessly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub payload: serde_json::Value,
}

/// The provider-agnostic normalized representation of one source record.
///
/// `(source, external_id)` uniquely identifies a document across runs.
#[derive(Debug, Clone)]
pub struct CanonicalDocument {
    pub source: Source,
    pub external_id: String,
    pub title: String,
    /// Plain text with provider markup stripped.
    pub body: String,
    /// Attribution and threading metadata (author, url, timestamps,
    /// parent/thread ids). BTreeMap keeps iteration order deterministic.
    pub metadata: BTreeMap<String, String>,
    /// Absent means always-stale: the document is re-chunked and
    /// re-fingerprinted every run.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A bounded text window derived from a document — the unit of embedding
/// and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `"{source}-{external_id}-chunk-{index}"`, stable across runs.
    pub chunk_id: String,
    pub text: String,
    /// SHA-256 hex digest of `text`, used purely for change detection.
    pub content_hash: String,
    /// Inherited from the parent document, plus `chunk_index`.
    pub metadata: BTreeMap<String, String>,
}

/// One persisted row of the vector index.
///
/// Created on first sighting of a chunk id; overwritten only when the
/// incoming content hash differs; otherwise untouched. Entries are never
/// deleted automatically.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub updated_at: i64,
}

/// Final tally of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunSummary {
    pub fn total(&self) -> u64 {
        self.new + self.updated + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_str() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
    }

    #[test]
    fn raw_record_round_trips_through_ndjson() {
        let record = RawRecord {
            source: Source::Teams,
            payload: serde_json::json!({
                "id": "1694026",
                "body": {"content": "<p>release is out</p>"},
                "replies": [{"id": "1694027"}],
            }),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains('\n'));
        let back: RawRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.source, Source::Teams);
        assert_eq!(back.payload, record.payload);
    }

    #[test]
    fn unknown_source_is_rejected() {
        assert!("slack".parse::<Source>().is_err());
    }
}
