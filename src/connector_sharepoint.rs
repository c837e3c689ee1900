//! SharePoint connector.
//!
//! Walks a site's default document drive through Microsoft Graph. Drive
//! listings page with an explicit `@odata.nextLink` — the link-style
//! protocol — and folders are traversed with a work queue rather than
//! recursion. Text-bearing files have their content downloaded and
//! attached to the payload under `content`; unsupported types ingest a
//! placeholder body instead of being dropped.

use std::collections::VecDeque;

use tracing::{info, warn};

use crate::client::{lookback_iso, ODataListTransport, ProviderClient};
use crate::config::{SharepointConfig, SourcesConfig};
use crate::error::Result;
use crate::models::{RawRecord, Source};
use crate::paginate::{PageStyle, Paginator, ScanOutcome};

/// MIME types whose bytes are ingested as text.
const TEXT_MIME_TYPES: [&str; 4] = [
    "text/plain",
    "text/markdown",
    "application/json",
    "application/xml",
];

/// Fetch every file in the configured site's document drive.
pub async fn scan(
    client: &ProviderClient,
    config: &SharepointConfig,
    sources: &SourcesConfig,
) -> ScanOutcome {
    let mut records = Vec::new();

    let (site_id, drive_id) = match resolve_drive(client, &config.site_name).await {
        Ok(ids) => ids,
        Err(e) => return ScanOutcome::aborted(records, e),
    };
    info!(site = %config.site_name, %site_id, %drive_id, "scanning sharepoint drive");

    // Breadth-first over folders; each folder listing is one paginated
    // link-style sequence.
    let mut folders: VecDeque<String> = VecDeque::from([String::new()]);

    while let Some(folder_path) = folders.pop_front() {
        let first_url = children_url(&drive_id, &folder_path, sources.lookback_days);
        let transport = ODataListTransport::new(client, first_url, Source::Sharepoint);
        let mut paginator = Paginator::new(&transport, PageStyle::LinkHeader);

        loop {
            match paginator.next_page().await {
                Ok(Some(batch)) => {
                    for mut record in batch {
                        if record.payload["folder"].is_object() {
                            let name = record.payload["name"].as_str().unwrap_or_default();
                            folders.push_back(join_path(&folder_path, name));
                            continue;
                        }
                        if record.payload["file"].is_object() {
                            attach_content(client, &mut record, &config.site_name).await;
                            records.push(record);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => return ScanOutcome::aborted(records, e),
            }
        }
    }

    ScanOutcome::complete(records)
}

async fn resolve_drive(client: &ProviderClient, site_name: &str) -> Result<(String, String)> {
    let search = client
        .get_json("/sites", &[("search", format!("'{}'", site_name))])
        .await?;

    let sites = search["value"].as_array().cloned().unwrap_or_default();
    let site_id = sites
        .iter()
        .find(|site| {
            let display = site["displayName"].as_str().unwrap_or_default();
            let name = site["name"].as_str().unwrap_or_default();
            display.eq_ignore_ascii_case(site_name) || name.eq_ignore_ascii_case(site_name)
        })
        .or_else(|| sites.first())
        .and_then(|site| site["id"].as_str())
        .map(String::from)
        .ok_or_else(|| {
            crate::error::Error::transport(
                "sharepoint",
                format!("no site matching '{}'", site_name),
            )
        })?;

    let drive = client
        .get_json(&format!("/sites/{}/drive", site_id), &[])
        .await?;
    let drive_id = drive["id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| crate::error::Error::transport("sharepoint", "site has no default drive"))?;

    Ok((site_id, drive_id))
}

fn children_url(drive_id: &str, folder_path: &str, lookback_days: Option<u32>) -> String {
    let mut url = if folder_path.is_empty() {
        format!("/drives/{}/root/children", drive_id)
    } else {
        format!("/drives/{}/root:/{}:/children", drive_id, folder_path)
    };
    if let Some(days) = lookback_days {
        url.push_str(&format!(
            "?$filter=lastModifiedDateTime ge {}",
            lookback_iso(days)
        ));
    }
    url
}

fn join_path(folder_path: &str, name: &str) -> String {
    if folder_path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder_path, name)
    }
}

/// Download the file body when the MIME type is text-bearing; otherwise
/// attach a placeholder so the file is still indexed by name and metadata.
/// A failed download degrades the same way rather than dropping the file.
async fn attach_content(client: &ProviderClient, record: &mut RawRecord, site_name: &str) {
    let mime = record.payload["file"]["mimeType"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let download_url = record.payload["@microsoft.graph.downloadUrl"]
        .as_str()
        .map(String::from);

    let content = match download_url {
        Some(url) if TEXT_MIME_TYPES.contains(&mime.as_str()) => {
            match client.get_text(&url).await {
                Ok(text) => text,
                Err(e) => {
                    let name = record.payload["name"].as_str().unwrap_or_default();
                    warn!(file = %name, error = %e, "could not download file content");
                    format!("[Error downloading content: {}]", e)
                }
            }
        }
        Some(_) => format!("[Content not extracted: unsupported MIME type {}]", mime),
        None => "[Content not available for download]".to_string(),
    };

    record.payload["content"] = serde_json::Value::String(content);
    record.payload["site_name"] = serde_json::Value::String(site_name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_url_shapes() {
        assert_eq!(
            children_url("d1", "", None),
            "/drives/d1/root/children"
        );
        assert_eq!(
            children_url("d1", "specs/2025", None),
            "/drives/d1/root:/specs/2025:/children"
        );
        assert!(children_url("d1", "", Some(7)).contains("$filter=lastModifiedDateTime ge "));
    }
}
