//! Configured-source overview for the CLI.

use crate::config::Config;
use crate::models::Source;

/// Print each known source and whether it is configured.
pub fn run_sources(config: &Config) {
    println!("sources");
    for source in Source::ALL {
        let status = if config.sources.is_configured(source) {
            "configured"
        } else {
            "not configured"
        };
        let detail = match source {
            Source::Jira => config
                .sources
                .jira
                .as_ref()
                .map(|j| format!("{} ({} projects)", j.base_url, target_count(&j.project_keys))),
            Source::Confluence => config
                .sources
                .confluence
                .as_ref()
                .map(|c| format!("{} ({} spaces)", c.base_url, target_count(&c.space_keys))),
            Source::Sharepoint => config
                .sources
                .sharepoint
                .as_ref()
                .map(|s| format!("site '{}'", s.site_name)),
            Source::Teams => config
                .sources
                .teams
                .as_ref()
                .map(|t| format!("team '{}'", t.team_name)),
        };
        match detail {
            Some(detail) => println!("  {:<12} {:<16} {}", source.as_str(), status, detail),
            None => println!("  {:<12} {}", source.as_str(), status),
        }
    }
}

fn target_count(keys: &[String]) -> String {
    if keys.is_empty() {
        "all".to_string()
    } else {
        keys.len().to_string()
    }
}
