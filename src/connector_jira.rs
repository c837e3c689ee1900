//! Jira connector.
//!
//! Pages issues through the enhanced search endpoint
//! (`/rest/api/3/search/jql`), which speaks the token-cursor protocol: each
//! response carries an `isLast` flag and, until the last page, a
//! `nextPageToken`. The response also advertises a `total` on some
//! deployments — it is unreliable and never consulted.
//!
//! Project keys come from configuration; with none configured, all
//! accessible projects are discovered first.

use async_trait::async_trait;
use tracing::info;

use crate::client::ProviderClient;
use crate::config::{JiraConfig, SourcesConfig};
use crate::error::{Error, Result};
use crate::models::{RawRecord, Source};
use crate::paginate::{Page, PageRequest, PageStyle, PageTransport, Paginator, ScanOutcome};

const ISSUE_FIELDS: &str =
    "summary,description,comment,status,priority,reporter,assignee,issuetype,project,created,updated";

struct IssueSearchTransport<'a> {
    client: &'a ProviderClient,
    jql: String,
    page_size: usize,
}

#[async_trait]
impl PageTransport for IssueSearchTransport<'_> {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let PageRequest::Token { next_token } = request else {
            return Err(Error::transport(
                "jira",
                "issue search requires token-cursor requests",
            ));
        };

        let mut query = vec![
            ("jql", self.jql.clone()),
            ("maxResults", self.page_size.to_string()),
            ("fields", ISSUE_FIELDS.to_string()),
        ];
        if let Some(token) = next_token {
            query.push(("nextPageToken", token.clone()));
        }

        let json = self.client.get_json("/rest/api/3/search/jql", &query).await?;

        let records = json["issues"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|payload| RawRecord {
                source: Source::Jira,
                payload,
            })
            .collect();

        Ok(Page {
            records,
            is_last: json["isLast"].as_bool(),
            next_token: json["nextPageToken"].as_str().map(String::from),
            ..Default::default()
        })
    }
}

/// Fetch every issue from every target project.
pub async fn scan(
    client: &ProviderClient,
    config: &JiraConfig,
    sources: &SourcesConfig,
) -> ScanOutcome {
    let mut records = Vec::new();

    let projects = if config.project_keys.is_empty() {
        info!("no jira project keys configured, discovering accessible projects");
        match discover_projects(client).await {
            Ok(keys) => keys,
            Err(e) => return ScanOutcome::aborted(records, e),
        }
    } else {
        config.project_keys.clone()
    };

    for (i, project_key) in projects.iter().enumerate() {
        info!(
            project = %project_key,
            "[{}/{}] scanning jira project",
            i + 1,
            projects.len()
        );

        let transport = IssueSearchTransport {
            client,
            jql: build_jql(project_key, sources.lookback_days),
            page_size: config.page_size,
        };
        let mut paginator = Paginator::new(&transport, PageStyle::TokenCursor);

        loop {
            match paginator.next_page().await {
                Ok(Some(mut batch)) => records.append(&mut batch),
                Ok(None) => break,
                Err(e) => return ScanOutcome::aborted(records, e),
            }
        }
    }

    ScanOutcome::complete(records)
}

async fn discover_projects(client: &ProviderClient) -> Result<Vec<String>> {
    let json = client.get_json("/rest/api/3/project", &[]).await?;
    let keys: Vec<String> = json
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|p| p["key"].as_str().map(String::from))
        .collect();
    info!(count = keys.len(), "discovered jira projects");
    Ok(keys)
}

fn build_jql(project_key: &str, lookback_days: Option<u32>) -> String {
    let mut jql = format!("project = \"{}\"", project_key);
    if let Some(days) = lookback_days {
        jql.push_str(&format!(" AND updated >= \"-{}d\"", days));
    }
    jql.push_str(" ORDER BY updated DESC");
    jql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jql_includes_lookback_window_when_configured() {
        assert_eq!(
            build_jql("ENG", None),
            "project = \"ENG\" ORDER BY updated DESC"
        );
        assert_eq!(
            build_jql("ENG", Some(30)),
            "project = \"ENG\" AND updated >= \"-30d\" ORDER BY updated DESC"
        );
    }
}
