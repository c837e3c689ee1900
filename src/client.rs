//! Provider HTTP client.
//!
//! A [`ProviderClient`] is constructed explicitly before first use and
//! injected into the connector that needs it — no lazy globals. It wraps a
//! `reqwest::Client` with the provider's base URL, credential, and request
//! timeout, so no page fetch can block indefinitely.
//!
//! OAuth/token exchange is out of scope: credentials arrive out-of-band
//! through environment variables (Basic email+token for Atlassian, a
//! ready-made bearer token for Microsoft Graph).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};
use crate::models::{RawRecord, Source};
use crate::paginate::{Page, PageRequest, PageTransport};

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Clone)]
enum Auth {
    Basic { user: String, token: String },
    Bearer(String),
}

impl Auth {
    fn header_value(&self) -> String {
        match self {
            Auth::Basic { user, token } => {
                format!("Basic {}", BASE64.encode(format!("{}:{}", user, token)))
            }
            Auth::Bearer(token) => format!("Bearer {}", token),
        }
    }
}

pub struct ProviderClient {
    client: reqwest::Client,
    provider: String,
    base_url: String,
    auth: Auth,
}

impl ProviderClient {
    fn new(provider: &str, base_url: &str, auth: Auth, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::transport(provider, e))?;

        Ok(Self {
            client,
            provider: provider.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Jira client using `JIRA_EMAIL` / `JIRA_API_TOKEN` Basic auth.
    pub fn jira(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let auth = basic_from_env("JIRA_EMAIL", "JIRA_API_TOKEN")?;
        Self::new("jira", base_url, auth, timeout_secs)
    }

    /// Confluence client using `CONFLUENCE_EMAIL` / `CONFLUENCE_API_TOKEN`.
    pub fn confluence(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let auth = basic_from_env("CONFLUENCE_EMAIL", "CONFLUENCE_API_TOKEN")?;
        Self::new("confluence", base_url, auth, timeout_secs)
    }

    /// Microsoft Graph client using a `GRAPH_ACCESS_TOKEN` bearer token.
    /// Serves both the SharePoint and Teams connectors.
    pub fn graph(provider: &str, timeout_secs: u64) -> Result<Self> {
        let token = std::env::var("GRAPH_ACCESS_TOKEN")
            .map_err(|_| Error::Configuration("GRAPH_ACCESS_TOKEN environment variable not set".into()))?;
        Self::new(provider, GRAPH_BASE_URL, Auth::Bearer(token), timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON document. `path_or_url` is either a path joined onto the
    /// base URL or an absolute URL (providers hand back absolute next
    /// links).
    pub async fn get_json(
        &self,
        path_or_url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let url = self.absolute(path_or_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth.header_value())
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| Error::transport(&self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(
                &self.provider,
                format!("{} from {}: {}", status, url, truncate(&body, 300)),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::transport(&self.provider, e))
    }

    /// GET a plain-text body (file content downloads).
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let url = self.absolute(url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth.header_value())
            .send()
            .await
            .map_err(|e| Error::transport(&self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(
                &self.provider,
                format!("{} from {}", status, url),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::transport(&self.provider, e))
    }

    fn absolute(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_url)
        }
    }
}

fn basic_from_env(user_var: &str, token_var: &str) -> Result<Auth> {
    let user = std::env::var(user_var)
        .map_err(|_| Error::Configuration(format!("{} environment variable not set", user_var)))?;
    let token = std::env::var(token_var)
        .map_err(|_| Error::Configuration(format!("{} environment variable not set", token_var)))?;
    Ok(Auth::Basic { user, token })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Link-style transport over any Microsoft Graph list endpoint: the
/// response carries `value` records and an optional `@odata.nextLink`.
pub struct ODataListTransport<'a> {
    client: &'a ProviderClient,
    first_url: String,
    source: Source,
}

impl<'a> ODataListTransport<'a> {
    pub fn new(client: &'a ProviderClient, first_url: impl Into<String>, source: Source) -> Self {
        Self {
            client,
            first_url: first_url.into(),
            source,
        }
    }
}

#[async_trait]
impl PageTransport for ODataListTransport<'_> {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let PageRequest::Link { next_link } = request else {
            return Err(Error::transport(
                self.source.as_str(),
                "odata transport requires link-style requests",
            ));
        };
        let url = next_link.as_deref().unwrap_or(&self.first_url);
        let json = self.client.get_json(url, &[]).await?;

        let records = json["value"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|payload| RawRecord {
                source: self.source,
                payload,
            })
            .collect();

        Ok(Page {
            records,
            next_link: json["@odata.nextLink"].as_str().map(String::from),
            ..Default::default()
        })
    }
}

/// RFC 3339 timestamp `days` days in the past, for provider-side
/// `lastModifiedDateTime` filters.
pub fn lookback_iso(days: u32) -> String {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);
    cutoff.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
