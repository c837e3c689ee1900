//! Record normalization.
//!
//! Maps each provider's raw payload to a [`CanonicalDocument`]: plain-text
//! body with provider markup stripped, enough metadata for attribution
//! (author, url, timestamps, thread ids), and a stable external id.
//!
//! Normalization never drops a record for cosmetic damage — malformed
//! fields degrade to empty strings or omitted metadata. Only a record
//! missing its provider id is rejected, and the caller skips it and
//! continues.
//!
//! Connectors enrich a few payloads before normalization: Confluence page
//! comments are attached under `comments`, SharePoint file content under
//! `content` (with `site_name`), and Teams messages carry `team_name` /
//! `channel_name`. Everything else is the provider's own shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{CanonicalDocument, RawRecord, Source};

pub fn normalize(record: &RawRecord) -> Result<CanonicalDocument> {
    match record.source {
        Source::Jira => normalize_jira(&record.payload),
        Source::Confluence => normalize_confluence(&record.payload),
        Source::Sharepoint => normalize_sharepoint(&record.payload),
        Source::Teams => normalize_teams(&record.payload),
    }
}

fn normalize_jira(payload: &Value) -> Result<CanonicalDocument> {
    let external_id = required_id(payload, "id", Source::Jira)?;
    let fields = &payload["fields"];

    let mut body = adf_to_text(&fields["description"]);
    for comment in fields["comment"]["comments"].as_array().into_iter().flatten() {
        let author = display_name(&comment["author"]);
        let created = str_or_empty(&comment["created"]);
        let text = adf_to_text(&comment["body"]);
        if !text.is_empty() {
            push_block(&mut body, &format!("Comment by {} on {}: {}", author, created, text));
        }
    }

    let mut metadata = BTreeMap::new();
    insert_if(&mut metadata, "url", str_or_empty(&payload["self"]));
    insert_if(&mut metadata, "issue_key", str_or_empty(&payload["key"]));
    insert_if(
        &mut metadata,
        "project_key",
        str_or_empty(&fields["project"]["key"]),
    );
    insert_if(&mut metadata, "status", str_or_empty(&fields["status"]["name"]));
    insert_if(
        &mut metadata,
        "priority",
        str_or_empty(&fields["priority"]["name"]),
    );
    insert_if(&mut metadata, "assignee", display_name(&fields["assignee"]));
    insert_if(&mut metadata, "author", display_name(&fields["reporter"]));
    insert_if(&mut metadata, "created_at", str_or_empty(&fields["created"]));
    insert_if(&mut metadata, "updated_at", str_or_empty(&fields["updated"]));

    Ok(CanonicalDocument {
        source: Source::Jira,
        external_id,
        title: str_or_empty(&fields["summary"]),
        body,
        metadata,
        updated_at: parse_timestamp(fields["updated"].as_str().unwrap_or_default()),
    })
}

fn normalize_confluence(payload: &Value) -> Result<CanonicalDocument> {
    let external_id = required_id(payload, "id", Source::Confluence)?;

    let mut body = strip_html(str_or_empty(&payload["body"]["storage"]["value"]).as_str());
    for comment in payload["comments"].as_array().into_iter().flatten() {
        let author = display_name(&comment["author"]);
        let created = str_or_empty(&comment["history"]["createdDate"]);
        let text = strip_html(str_or_empty(&comment["body"]["storage"]["value"]).as_str());
        if !text.is_empty() {
            push_block(&mut body, &format!("Comment by {} on {}: {}", author, created, text));
        }
    }

    let mut metadata = BTreeMap::new();
    insert_if(&mut metadata, "url", str_or_empty(&payload["_links"]["webui"]));
    insert_if(&mut metadata, "space_key", str_or_empty(&payload["space"]["key"]));
    insert_if(
        &mut metadata,
        "author",
        display_name(&payload["history"]["createdBy"]),
    );
    insert_if(
        &mut metadata,
        "last_updated_by",
        display_name(&payload["version"]["by"]),
    );
    insert_if(
        &mut metadata,
        "created_at",
        str_or_empty(&payload["history"]["createdDate"]),
    );
    insert_if(
        &mut metadata,
        "updated_at",
        str_or_empty(&payload["version"]["when"]),
    );

    Ok(CanonicalDocument {
        source: Source::Confluence,
        external_id,
        title: str_or_empty(&payload["title"]),
        body,
        metadata,
        updated_at: parse_timestamp(payload["version"]["when"].as_str().unwrap_or_default()),
    })
}

fn normalize_sharepoint(payload: &Value) -> Result<CanonicalDocument> {
    let external_id = required_id(payload, "id", Source::Sharepoint)?;

    let mut metadata = BTreeMap::new();
    insert_if(&mut metadata, "url", str_or_empty(&payload["webUrl"]));
    insert_if(&mut metadata, "site_name", str_or_empty(&payload["site_name"]));
    insert_if(
        &mut metadata,
        "path",
        str_or_empty(&payload["parentReference"]["path"]),
    );
    insert_if(
        &mut metadata,
        "mime_type",
        str_or_empty(&payload["file"]["mimeType"]),
    );
    if let Some(size) = payload["size"].as_u64() {
        metadata.insert("size".to_string(), size.to_string());
    }
    insert_if(
        &mut metadata,
        "author",
        display_name(&payload["lastModifiedBy"]["user"]),
    );
    insert_if(
        &mut metadata,
        "created_at",
        str_or_empty(&payload["createdDateTime"]),
    );
    insert_if(
        &mut metadata,
        "updated_at",
        str_or_empty(&payload["lastModifiedDateTime"]),
    );

    Ok(CanonicalDocument {
        source: Source::Sharepoint,
        external_id,
        title: str_or_empty(&payload["name"]),
        body: str_or_empty(&payload["content"]),
        metadata,
        updated_at: parse_timestamp(payload["lastModifiedDateTime"].as_str().unwrap_or_default()),
    })
}

fn normalize_teams(payload: &Value) -> Result<CanonicalDocument> {
    let external_id = required_id(payload, "id", Source::Teams)?;

    let channel_name = str_or_empty(&payload["channel_name"]);
    let title = match payload["subject"].as_str() {
        Some(subject) if !subject.is_empty() => subject.to_string(),
        _ if !channel_name.is_empty() => format!("Teams message in {}", channel_name),
        _ => "Teams message".to_string(),
    };

    let mut body = strip_html(str_or_empty(&payload["body"]["content"]).as_str());
    // Replies arrive expanded on the root message; fold them into the body
    // in thread order so the conversation reads top to bottom.
    for reply in payload["replies"].as_array().into_iter().flatten() {
        let author = message_author(reply);
        let created = str_or_empty(&reply["createdDateTime"]);
        let text = strip_html(str_or_empty(&reply["body"]["content"]).as_str());
        if !text.is_empty() {
            push_block(&mut body, &format!("Reply by {} on {}: {}", author, created, text));
        }
    }

    let mut metadata = BTreeMap::new();
    insert_if(&mut metadata, "author", message_author(payload));
    insert_if(&mut metadata, "team_name", str_or_empty(&payload["team_name"]));
    insert_if(&mut metadata, "channel_name", channel_name);
    insert_if(
        &mut metadata,
        "team_id",
        str_or_empty(&payload["channelIdentity"]["teamId"]),
    );
    insert_if(
        &mut metadata,
        "channel_id",
        str_or_empty(&payload["channelIdentity"]["channelId"]),
    );
    insert_if(
        &mut metadata,
        "message_type",
        str_or_empty(&payload["messageType"]),
    );
    // A standalone reply record keeps a reference to its parent so
    // conversation order can be reconstructed downstream.
    insert_if(&mut metadata, "parent_id", str_or_empty(&payload["replyToId"]));
    insert_if(
        &mut metadata,
        "created_at",
        str_or_empty(&payload["createdDateTime"]),
    );
    insert_if(
        &mut metadata,
        "updated_at",
        str_or_empty(&payload["lastModifiedDateTime"]),
    );

    Ok(CanonicalDocument {
        source: Source::Teams,
        external_id,
        title,
        body,
        metadata,
        updated_at: parse_timestamp(payload["lastModifiedDateTime"].as_str().unwrap_or_default()),
    })
}

/// Flatten an Atlassian Document Format tree into plain text.
pub fn adf_to_text(node: &Value) -> String {
    let mut out = String::new();
    collect_adf_text(node, &mut out);
    collapse_whitespace(&out)
}

fn collect_adf_text(node: &Value, out: &mut String) {
    match node {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("text") {
                if let Some(text) = map.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                    out.push(' ');
                }
            }
            if let Some(content) = map.get("content") {
                collect_adf_text(content, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_adf_text(item, out);
            }
        }
        Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        _ => {}
    }
}

/// Strip HTML tags and decode the common entities, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    collapse_whitespace(&decoded)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Parse provider timestamps; Atlassian emits `+0900`-style offsets that
/// plain RFC 3339 parsing rejects.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn required_id(payload: &Value, key: &str, source: Source) -> Result<String> {
    match &payload[key] {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::malformed(
            source.as_str(),
            format!("missing required field '{}'", key),
        )),
    }
}

fn str_or_empty(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn display_name(value: &Value) -> String {
    str_or_empty(&value["displayName"])
}

fn message_author(message: &Value) -> String {
    let from = &message["from"];
    let user = display_name(&from["user"]);
    if !user.is_empty() {
        return user;
    }
    let application = display_name(&from["application"]);
    if !application.is_empty() {
        return application;
    }
    "Unknown".to_string()
}

fn push_block(body: &mut String, block: &str) {
    if !body.is_empty() {
        body.push_str("\n\n");
    }
    body.push_str(block);
}

fn insert_if(metadata: &mut BTreeMap<String, String>, key: &str, value: String) {
    if !value.is_empty() {
        metadata.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jira_issue_with_adf_description_and_comments() {
        let record = RawRecord {
            source: Source::Jira,
            payload: json!({
                "id": "10001",
                "key": "ENG-42",
                "self": "https://example.atlassian.net/rest/api/3/issue/10001",
                "fields": {
                    "summary": "Login flaky on Safari",
                    "description": {
                        "type": "doc",
                        "content": [
                            {"type": "paragraph", "content": [
                                {"type": "text", "text": "Session cookie is dropped"},
                                {"type": "text", "text": "after redirect."}
                            ]}
                        ]
                    },
                    "project": {"key": "ENG"},
                    "status": {"name": "In Progress"},
                    "reporter": {"displayName": "Dana Ko"},
                    "updated": "2025-06-01T09:30:00.000+0900",
                    "comment": {"comments": [
                        {
                            "author": {"displayName": "Sam Ortiz"},
                            "created": "2025-06-02T10:00:00.000+0900",
                            "body": {"type": "doc", "content": [
                                {"type": "paragraph", "content": [
                                    {"type": "text", "text": "Reproduced on 17.4"}
                                ]}
                            ]}
                        }
                    ]}
                }
            }),
        };

        let doc = normalize(&record).unwrap();
        assert_eq!(doc.external_id, "10001");
        assert_eq!(doc.title, "Login flaky on Safari");
        assert!(doc.body.contains("Session cookie is dropped after redirect."));
        assert!(doc.body.contains("Comment by Sam Ortiz"));
        assert!(doc.body.contains("Reproduced on 17.4"));
        assert_eq!(doc.metadata["project_key"], "ENG");
        assert_eq!(doc.metadata["author"], "Dana Ko");
        assert!(doc.updated_at.is_some());
    }

    #[test]
    fn confluence_page_strips_storage_markup() {
        let record = RawRecord {
            source: Source::Confluence,
            payload: json!({
                "id": "98765",
                "title": "Release process",
                "body": {"storage": {"value": "<h1>Release</h1><p>Tag &amp; push.</p>"}},
                "space": {"key": "OPS"},
                "version": {"when": "2025-05-20T08:00:00.000Z", "by": {"displayName": "Lee"}},
                "history": {"createdBy": {"displayName": "Lee"}, "createdDate": "2025-01-01T00:00:00.000Z"},
                "_links": {"webui": "/spaces/OPS/pages/98765"}
            }),
        };

        let doc = normalize(&record).unwrap();
        assert_eq!(doc.body, "Release Tag & push.");
        assert_eq!(doc.metadata["space_key"], "OPS");
        assert!(doc.updated_at.is_some());
    }

    #[test]
    fn teams_replies_fold_into_body_and_keep_thread_refs() {
        let record = RawRecord {
            source: Source::Teams,
            payload: json!({
                "id": "1694026",
                "subject": null,
                "messageType": "message",
                "channel_name": "deploys",
                "team_name": "Platform",
                "channelIdentity": {"teamId": "t-1", "channelId": "c-9"},
                "from": {"user": {"displayName": "Priya N"}},
                "body": {"content": "<p>rollout starts at 14:00</p>"},
                "lastModifiedDateTime": "2025-07-01T12:00:00Z",
                "replies": [
                    {
                        "id": "1694027",
                        "from": {"application": {"displayName": "DeployBot"}},
                        "createdDateTime": "2025-07-01T12:05:00Z",
                        "body": {"content": "<p>canary green</p>"}
                    }
                ]
            }),
        };

        let doc = normalize(&record).unwrap();
        assert_eq!(doc.title, "Teams message in deploys");
        assert!(doc.body.starts_with("rollout starts at 14:00"));
        assert!(doc.body.contains("Reply by DeployBot"));
        assert_eq!(doc.metadata["channel_id"], "c-9");
        assert_eq!(doc.metadata["author"], "Priya N");
    }

    #[test]
    fn standalone_reply_carries_parent_reference() {
        let record = RawRecord {
            source: Source::Teams,
            payload: json!({
                "id": "1694027",
                "replyToId": "1694026",
                "from": {"user": {"displayName": "Sam"}},
                "body": {"content": "on it"}
            }),
        };
        let doc = normalize(&record).unwrap();
        assert_eq!(doc.metadata["parent_id"], "1694026");
        // No updated_at: the document is always-stale by contract.
        assert!(doc.updated_at.is_none());
    }

    #[test]
    fn malformed_fields_degrade_instead_of_failing() {
        let record = RawRecord {
            source: Source::Sharepoint,
            payload: json!({"id": "f-1", "name": 17, "content": null}),
        };
        let doc = normalize(&record).unwrap();
        assert_eq!(doc.title, "");
        assert_eq!(doc.body, "");
        assert!(doc.metadata.get("author").is_none());
    }

    #[test]
    fn missing_id_is_malformed() {
        let record = RawRecord {
            source: Source::Jira,
            payload: json!({"fields": {"summary": "orphan"}}),
        };
        let err = normalize(&record).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let record = RawRecord {
            source: Source::Confluence,
            payload: json!({"id": 4242, "title": "t", "body": {"storage": {"value": "x"}}}),
        };
        assert_eq!(normalize(&record).unwrap().external_id, "4242");
    }
}
