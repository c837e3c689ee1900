use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::models::Source;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be < chunk_size.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks fetched per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Total size budget for the assembled context block. Chunks that would
    /// overflow it are dropped whole from the tail.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Bound on every provider page fetch. A timed-out fetch aborts that
    /// source's pagination without affecting other sources.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Only ingest records updated within this many days, where the
    /// provider supports server-side filtering.
    #[serde(default)]
    pub lookback_days: Option<u32>,
    pub jira: Option<JiraConfig>,
    pub confluence: Option<ConfluenceConfig>,
    pub sharepoint: Option<SharepointConfig>,
    pub teams: Option<TeamsConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            lookback_days: None,
            jira: None,
            confluence: None,
            sharepoint: None,
            teams: None,
        }
    }
}

impl SourcesConfig {
    pub fn is_configured(&self, source: Source) -> bool {
        match source {
            Source::Jira => self.jira.is_some(),
            Source::Confluence => self.confluence.is_some(),
            Source::Sharepoint => self.sharepoint.is_some(),
            Source::Teams => self.teams.is_some(),
        }
    }

    pub fn configured(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_configured(*s))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JiraConfig {
    /// e.g. `https://your-company.atlassian.net`
    pub base_url: String,
    /// Empty means: discover all accessible projects.
    #[serde(default)]
    pub project_keys: Vec<String>,
    #[serde(default = "default_jira_page_size")]
    pub page_size: usize,
}

fn default_jira_page_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceConfig {
    pub base_url: String,
    /// Empty means: discover all accessible spaces.
    #[serde(default)]
    pub space_keys: Vec<String>,
    #[serde(default = "default_confluence_page_limit")]
    pub page_limit: usize,
}

fn default_confluence_page_limit() -> usize {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct SharepointConfig {
    pub site_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TeamsConfig {
    pub team_name: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> std::result::Result<(), Error> {
    if config.chunking.chunk_size == 0 {
        return Err(Error::Configuration(
            "chunking.chunk_size must be > 0".into(),
        ));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(Error::Configuration(format!(
            "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.chunk_overlap, config.chunking.chunk_size
        )));
    }
    if config.retrieval.top_k == 0 {
        return Err(Error::Configuration("retrieval.top_k must be >= 1".into()));
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            return Err(Error::Configuration(format!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            )));
        }
        match config.embedding.dims {
            None | Some(0) => {
                return Err(Error::Configuration(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                )));
            }
            Some(_) => {}
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => {
            return Err(Error::Configuration(format!(
                "unknown embedding provider '{}' (expected disabled or openai)",
                other
            )));
        }
    }

    Ok(())
}

/// Check that the credentials for every configured source are present in the
/// environment. Called at pipeline startup; a missing credential is fatal.
pub fn validate_credentials(config: &Config) -> std::result::Result<(), Error> {
    let mut missing = Vec::new();

    if config.sources.jira.is_some() {
        for var in ["JIRA_EMAIL", "JIRA_API_TOKEN"] {
            if std::env::var(var).is_err() {
                missing.push(var);
            }
        }
    }
    if config.sources.confluence.is_some() {
        for var in ["CONFLUENCE_EMAIL", "CONFLUENCE_API_TOKEN"] {
            if std::env::var(var).is_err() {
                missing.push(var);
            }
        }
    }
    if config.sources.sharepoint.is_some() || config.sources.teams.is_some() {
        if std::env::var("GRAPH_ACCESS_TOKEN").is_err() {
            missing.push("GRAPH_ACCESS_TOKEN");
        }
    }
    if config.embedding.provider == "openai" && std::env::var("OPENAI_API_KEY").is_err() {
        missing.push("OPENAI_API_KEY");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "missing environment credentials: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/tcx.sqlite"

[chunking]
chunk_size = 400
"#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.provider, "disabled");
        assert!(config.sources.configured().is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let bad = r#"
[db]
path = "./data/tcx.sqlite"

[chunking]
chunk_size = 50
chunk_overlap = 50
"#;
        let err = parse(bad).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let bad = r#"
[db]
path = "./data/tcx.sqlite"

[chunking]
chunk_size = 400

[embedding]
provider = "openai"
"#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn configured_sources_are_reported_in_order() {
        let toml_str = r#"
[db]
path = "./data/tcx.sqlite"

[chunking]
chunk_size = 400

[sources.jira]
base_url = "https://example.atlassian.net"
project_keys = ["ENG"]

[sources.teams]
team_name = "Platform"
"#;
        let config = parse(toml_str).unwrap();
        assert_eq!(config.sources.configured(), vec![Source::Jira, Source::Teams]);
        assert_eq!(config.sources.jira.as_ref().unwrap().page_size, 50);
    }
}
