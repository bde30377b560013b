//! Database statistics and run history.
//!
//! Provides a quick summary of what has been scraped: message counts and
//! cursor state per target, plus the most recent runs from the audit log.
//! Used by `tgscrape stats` to confirm scrapes are making progress.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::parse_ts;

/// Number of runs listed by `tgscrape stats`.
const RECENT_RUNS: i64 = 10;

/// Per-target message counts and cursor state.
struct TargetStats {
    target_id: i64,
    name: String,
    message_count: i64,
    last_message_id: i64,
    last_scraped_at: Option<DateTime<Utc>>,
    newest_message_at: Option<DateTime<Utc>>,
}

struct RunRow {
    id: i64,
    started_at: Option<DateTime<Utc>>,
    mode: String,
    target_filter: Option<String>,
    targets_ok: i64,
    targets_failed: i64,
    messages_new: i64,
    flood_waits: i64,
    cancelled: bool,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let total_targets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM targets")
        .fetch_one(&pool)
        .await?;

    let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await?;

    let total_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_runs")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("tgscrape: Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Targets:     {}", total_targets);
    println!("  Messages:    {}", total_messages);
    println!("  Runs:        {}", total_runs);

    let target_rows = sqlx::query(
        r#"
        SELECT
            t.target_id,
            COALESCE(t.target_username, t.title, t.target_input) AS name,
            t.last_message_id,
            t.last_scraped_at,
            COUNT(m.message_id) AS message_count,
            MAX(m.date_utc) AS newest_message_at
        FROM targets t
        LEFT JOIN messages m ON m.target_id = t.target_id
        GROUP BY t.target_id
        ORDER BY message_count DESC, t.target_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut targets: Vec<TargetStats> = Vec::with_capacity(target_rows.len());
    for row in &target_rows {
        let last_scraped: Option<String> = row.get("last_scraped_at");
        let newest: Option<String> = row.get("newest_message_at");
        targets.push(TargetStats {
            target_id: row.get("target_id"),
            name: row.get("name"),
            message_count: row.get("message_count"),
            last_message_id: row.get("last_message_id"),
            last_scraped_at: last_scraped.as_deref().map(parse_ts).transpose()?,
            newest_message_at: newest.as_deref().map(parse_ts).transpose()?,
        });
    }

    if !targets.is_empty() {
        println!();
        println!("  By target:");
        println!(
            "  {:<24} {:>14} {:>9} {:>10}   {:<16} {}",
            "TARGET", "ID", "MESSAGES", "LAST ID", "LAST SCRAPE", "NEWEST MESSAGE"
        );
        println!("  {}", "-".repeat(96));

        for t in &targets {
            println!(
                "  {:<24} {:>14} {:>9} {:>10}   {:<16} {}",
                t.name,
                t.target_id,
                t.message_count,
                t.last_message_id,
                display_relative(t.last_scraped_at),
                t.newest_message_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    let run_rows = sqlx::query(
        r#"
        SELECT id, started_at, mode, target_filter, targets_ok, targets_failed,
               messages_new, flood_waits, cancelled
        FROM scrape_runs
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(RECENT_RUNS)
    .fetch_all(&pool)
    .await?;

    let mut runs: Vec<RunRow> = Vec::with_capacity(run_rows.len());
    for row in &run_rows {
        let started: String = row.get("started_at");
        runs.push(RunRow {
            id: row.get("id"),
            started_at: parse_ts(&started).ok(),
            mode: row.get("mode"),
            target_filter: row.get("target_filter"),
            targets_ok: row.get("targets_ok"),
            targets_failed: row.get("targets_failed"),
            messages_new: row.get("messages_new"),
            flood_waits: row.get("flood_waits"),
            cancelled: row.get("cancelled"),
        });
    }

    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:>5}  {:<16} {:<12} {:>4} {:>6} {:>8} {:>6}   {}",
            "RUN", "STARTED", "MODE", "OK", "FAILED", "NEW", "FLOOD", "TARGET"
        );
        println!("  {}", "-".repeat(82));

        for r in &runs {
            let mode = if r.cancelled {
                format!("{}*", r.mode)
            } else {
                r.mode.clone()
            };
            println!(
                "  {:>5}  {:<16} {:<12} {:>4} {:>6} {:>8} {:>6}   {}",
                r.id,
                display_relative(r.started_at),
                mode,
                r.targets_ok,
                r.targets_failed,
                r.messages_new,
                r.flood_waits,
                r.target_filter.as_deref().unwrap_or("all")
            );
        }
        if runs.iter().any(|r| r.cancelled) {
            println!("  (* cancelled before all targets ran)");
        }
    }

    println!();

    pool.close().await;
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

fn display_relative(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => format_relative(dt, Utc::now()),
        None => "never".to_string(),
    }
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
