//! # teamcontext
//!
//! An incremental ingestion and retrieval pipeline for company
//! collaboration data.
//!
//! teamcontext pulls issues, wiki pages, files, and chat threads from
//! Jira, Confluence, SharePoint, and Teams, normalizes and chunks them,
//! and maintains a content-hash-gated vector index: unchanged chunks are
//! never re-embedded, no matter how often the pipeline reruns. Questions
//! are answered by retrieving the nearest chunks and assembling them into
//! an LLM prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌─────────┐   ┌─────────────┐
//! │  Connectors  │──▶│ Normalizer │──▶│ Chunker │──▶│ Fingerprint │
//! │ jira/conflu/ │   │ (markup →  │   │ (fixed  │   │  + Upsert   │
//! │ sharep/teams │   │   text)    │   │ windows)│   │ (hash gate) │
//! └──────────────┘   └────────────┘   └─────────┘   └──────┬──────┘
//!                                                          ▼
//!                                       ┌──────────┐   ┌────────┐
//!                                       │ Retrieve │◀──│ SQLite │
//!                                       │ + Prompt │   │ index  │
//!                                       └──────────┘   └────────┘
//! ```
//!
//! Each connector hides its provider's cursor protocol behind a common
//! pagination strategy (see [`paginate`]); everything downstream is
//! provider-agnostic.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`paginate`] | Cursor-advancement strategies and the lazy page puller |
//! | [`connector_jira`] | Jira issue search (token cursor) |
//! | [`connector_confluence`] | Confluence content (size threshold) |
//! | [`connector_sharepoint`] | SharePoint drive files (next link) |
//! | [`connector_teams`] | Teams channel messages (next link) |
//! | [`normalize`] | Raw record → canonical document |
//! | [`chunk`] | Deterministic overlapping windows |
//! | [`fingerprint`] | Content hashes and the incremental upserter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index backends (SQLite, in-memory) |
//! | [`ingest`] | Pipeline orchestration (live sync, NDJSON load) |
//! | [`retrieve`] | Top-k retrieval and prompt assembly |

pub mod chunk;
pub mod client;
pub mod config;
pub mod connector_confluence;
pub mod connector_jira;
pub mod connector_sharepoint;
pub mod connector_teams;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod paginate;
pub mod retrieve;
pub mod sources;
pub mod stats;
pub mod store;
