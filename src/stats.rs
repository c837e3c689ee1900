//! Index statistics.
//!
//! A quick summary of what's in the vector index, used by `tcx stats` to
//! confirm that syncs are landing. Entry counts never shrink on their own:
//! stale entries for documents deleted upstream persist until an explicit
//! reconciliation pass, so drift is visible here.

use crate::config::Config;
use crate::error::Result;
use crate::store::sqlite::SqliteStore;
use crate::store::VectorStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db.path).await?;
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("teamcontext — index stats");
    println!("  database:  {}", config.db.path.display());
    println!("  size:      {}", format_bytes(db_size));
    println!("  entries:   {}", stats.count);

    store.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
