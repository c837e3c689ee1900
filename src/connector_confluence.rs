//! Confluence connector.
//!
//! The Confluence REST API pages with `start`/`limit` offsets and gives no
//! reliable last-page flag, so pagination uses the size-threshold rule: a
//! page shorter than the requested limit is the last one, and the offset
//! advances by what was actually returned.
//!
//! Each page's comments are fetched through the same protocol (the comment
//! endpoint caps `limit` at 100) and attached to the page payload under
//! `comments` before normalization.

use async_trait::async_trait;
use tracing::info;

use crate::client::ProviderClient;
use crate::config::{ConfluenceConfig, SourcesConfig};
use crate::error::{Error, Result};
use crate::models::{RawRecord, Source};
use crate::paginate::{Page, PageRequest, PageStyle, PageTransport, Paginator, ScanOutcome};

const PAGE_EXPAND: &str = "body.storage,version,history,space";
const COMMENT_EXPAND: &str = "body.storage,author,history";
const COMMENT_PAGE_LIMIT: usize = 100;

/// Offset-paged GET against one Confluence collection endpoint.
struct OffsetTransport<'a> {
    client: &'a ProviderClient,
    path: String,
    extra: Vec<(&'static str, String)>,
}

#[async_trait]
impl PageTransport for OffsetTransport<'_> {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let PageRequest::Offset {
            start_offset,
            page_size,
        } = request
        else {
            return Err(Error::transport(
                "confluence",
                "content listing requires offset-style requests",
            ));
        };

        let mut query = self.extra.clone();
        query.push(("start", start_offset.to_string()));
        query.push(("limit", page_size.to_string()));

        let json = self.client.get_json(&self.path, &query).await?;

        let records = json["results"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|payload| RawRecord {
                source: Source::Confluence,
                payload,
            })
            .collect();

        Ok(Page {
            records,
            ..Default::default()
        })
    }
}

/// Fetch every page (with comments) from every target space.
pub async fn scan(
    client: &ProviderClient,
    config: &ConfluenceConfig,
    sources: &SourcesConfig,
) -> ScanOutcome {
    let mut records = Vec::new();

    let spaces = if config.space_keys.is_empty() {
        info!("no confluence space keys configured, discovering accessible spaces");
        match discover_spaces(client).await {
            Ok(keys) => keys,
            Err(e) => return ScanOutcome::aborted(records, e),
        }
    } else {
        config.space_keys.clone()
    };

    for (i, space_key) in spaces.iter().enumerate() {
        info!(
            space = %space_key,
            "[{}/{}] scanning confluence space",
            i + 1,
            spaces.len()
        );

        let transport = content_transport(client, space_key, sources.lookback_days);
        let mut paginator = Paginator::new(
            &transport,
            PageStyle::SizeThreshold {
                page_size: config.page_limit,
            },
        );

        loop {
            match paginator.next_page().await {
                Ok(Some(batch)) => {
                    for mut record in batch {
                        if let Err(e) = attach_comments(client, &mut record).await {
                            return ScanOutcome::aborted(records, e);
                        }
                        records.push(record);
                    }
                }
                Ok(None) => break,
                Err(e) => return ScanOutcome::aborted(records, e),
            }
        }
    }

    ScanOutcome::complete(records)
}

fn content_transport<'a>(
    client: &'a ProviderClient,
    space_key: &str,
    lookback_days: Option<u32>,
) -> OffsetTransport<'a> {
    match lookback_days {
        // Date filtering needs the CQL search endpoint.
        Some(days) => OffsetTransport {
            client,
            path: "/rest/api/content/search".to_string(),
            extra: vec![
                (
                    "cql",
                    format!(
                        "space = \"{}\" AND type = \"page\" AND lastModified >= \"-{}d\"",
                        space_key, days
                    ),
                ),
                ("expand", PAGE_EXPAND.to_string()),
            ],
        },
        None => OffsetTransport {
            client,
            path: "/rest/api/content".to_string(),
            extra: vec![
                ("spaceKey", space_key.to_string()),
                ("type", "page".to_string()),
                ("expand", PAGE_EXPAND.to_string()),
            ],
        },
    }
}

/// Fetch all comments for one page and attach them to its payload.
async fn attach_comments(client: &ProviderClient, record: &mut RawRecord) -> Result<()> {
    let Some(page_id) = record.payload["id"].as_str().map(String::from) else {
        // Normalization will reject it; nothing to attach.
        return Ok(());
    };

    let transport = OffsetTransport {
        client,
        path: format!("/rest/api/content/{}/child/comment", page_id),
        extra: vec![("expand", COMMENT_EXPAND.to_string())],
    };
    let comments = Paginator::new(
        &transport,
        PageStyle::SizeThreshold {
            page_size: COMMENT_PAGE_LIMIT,
        },
    )
    .fetch_all()
    .await?;

    if !comments.is_empty() {
        record.payload["comments"] =
            serde_json::Value::Array(comments.into_iter().map(|c| c.payload).collect());
    }
    Ok(())
}

async fn discover_spaces(client: &ProviderClient) -> Result<Vec<String>> {
    let transport = OffsetTransport {
        client,
        path: "/rest/api/space".to_string(),
        extra: Vec::new(),
    };
    let spaces = Paginator::new(&transport, PageStyle::SizeThreshold { page_size: 50 })
        .fetch_all()
        .await?;

    let keys: Vec<String> = spaces
        .iter()
        .filter_map(|s| s.payload["key"].as_str().map(String::from))
        .collect();
    info!(count = keys.len(), "discovered confluence spaces");
    Ok(keys)
}
