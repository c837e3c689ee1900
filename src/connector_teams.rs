//! Teams connector.
//!
//! Fetches channel messages for one team through Microsoft Graph, with
//! replies expanded onto each root message. Both the channel listing and
//! the message listing page link-style via `@odata.nextLink`.

use tracing::info;

use crate::client::{lookback_iso, ODataListTransport, ProviderClient};
use crate::config::{SourcesConfig, TeamsConfig};
use crate::error::{Error, Result};
use crate::models::{RawRecord, Source};
use crate::paginate::{PageStyle, Paginator, ScanOutcome};

/// Fetch every message thread from every channel of the configured team.
pub async fn scan(
    client: &ProviderClient,
    config: &TeamsConfig,
    sources: &SourcesConfig,
) -> ScanOutcome {
    let mut records = Vec::new();

    let team_id = match resolve_team_id(client, &config.team_name).await {
        Ok(id) => id,
        Err(e) => return ScanOutcome::aborted(records, e),
    };
    info!(team = %config.team_name, %team_id, "scanning teams channels");

    let channels = {
        let transport = ODataListTransport::new(
            client,
            format!("/teams/{}/channels", team_id),
            Source::Teams,
        );
        match Paginator::new(&transport, PageStyle::LinkHeader)
            .fetch_all()
            .await
        {
            Ok(channels) => channels,
            Err(e) => return ScanOutcome::aborted(records, e),
        }
    };

    for channel in &channels {
        let Some(channel_id) = channel.payload["id"].as_str() else {
            continue;
        };
        let channel_name = channel.payload["displayName"].as_str().unwrap_or_default();
        info!(channel = %channel_name, "fetching channel messages");

        let transport = ODataListTransport::new(
            client,
            messages_url(&team_id, channel_id, sources.lookback_days),
            Source::Teams,
        );
        let mut paginator = Paginator::new(&transport, PageStyle::LinkHeader);

        loop {
            match paginator.next_page().await {
                Ok(Some(batch)) => {
                    for mut record in batch {
                        tag_message(&mut record, &config.team_name, channel_name);
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

async fn resolve_team_id(client: &ProviderClient, team_name: &str) -> Result<String> {
    let filter = format!(
        "displayName eq '{}' and resourceProvisioningOptions/any(x:x eq 'Team')",
        team_name
    );
    let json = client
        .get_json(
            "/groups",
            &[("$filter", filter), ("$select", "id,displayName".to_string())],
        )
        .await?;

    json["value"]
        .as_array()
        .and_then(|groups| groups.first())
        .and_then(|group| group["id"].as_str())
        .map(String::from)
        .ok_or_else(|| Error::transport("teams", format!("no team named '{}'", team_name)))
}

fn messages_url(team_id: &str, channel_id: &str, lookback_days: Option<u32>) -> String {
    let mut url = format!(
        "/teams/{}/channels/{}/messages?$expand=replies",
        team_id, channel_id
    );
    if let Some(days) = lookback_days {
        url.push_str(&format!(
            "&$filter=lastModifiedDateTime ge {}",
            lookback_iso(days)
        ));
    }
    url
}

/// Attach the human-readable team and channel names; Graph only puts ids
/// in `channelIdentity`.
fn tag_message(record: &mut RawRecord, team_name: &str, channel_name: &str) {
    record.payload["team_name"] = serde_json::Value::String(team_name.to_string());
    record.payload["channel_name"] = serde_json::Value::String(channel_name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_url_expands_replies_and_applies_lookback() {
        let url = messages_url("t-1", "c-9", None);
        assert_eq!(url, "/teams/t-1/channels/c-9/messages?$expand=replies");
        assert!(messages_url("t-1", "c-9", Some(14)).contains("&$filter=lastModifiedDateTime ge "));
    }
}
