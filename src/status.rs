// System status display — queue depths, listener cursor, cache sizes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;
use crate::pipeline::adapter::LISTENER_CURSOR_KEY;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `ecp-notify init` to set up the database.");
        return Ok(());
    }

    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);

    let counts = db.queue_counts().await?;
    println!(
        "Comment jobs: {} pending, {} active, {} completed, {}",
        counts.pending,
        counts.active,
        counts.completed,
        if counts.failed > 0 {
            format!("{} failed", counts.failed).red().bold()
        } else {
            "0 failed".normal()
        }
    );
    println!("Notifications queued: {}", counts.notifications_pending);
    println!("Last job finished: {}", format_finished_at(counts.last_finished_at));

    match db.get_scan_state(LISTENER_CURSOR_KEY).await? {
        Some(block) => println!("Listener cursor: block {}", block),
        None => {
            println!("Listener cursor: {}", "never run".yellow());
            println!("  Run `ecp-notify listen` to start polling the chain");
        }
    }

    let (comments, profiles) = db.cache_sizes().await?;
    println!("Cache: {} comments, {} profiles", comments, profiles);

    Ok(())
}

fn format_finished_at(finished_at: Option<i64>) -> String {
    finished_at
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
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
