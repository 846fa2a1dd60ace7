//! Database statistics overview.
//!
//! Summarizes sources by processing status, chunk counts and grants by
//! tier. Used by `ragctl stats`.

use anyhow::Result;

use coach_rag_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = SqliteStore::new(pool.clone()).stats().await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Coach RAG Database Stats");
    println!("========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Sources:       {}", stats.sources);
    println!(
        "  Chunks:        {} ({} active)",
        stats.chunks, stats.active_chunks
    );

    if !stats.sources_by_status.is_empty() {
        println!();
        println!("  By status:");
        for (status, count) in &stats.sources_by_status {
            println!("    {:<12} {:>6}", status, count);
        }
    }

    if !stats.grants_by_tier.is_empty() {
        println!();
        println!("  Grants by tier:");
        for (tier, count) in &stats.grants_by_tier {
            println!("    {:<12} {:>6}", tier, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
