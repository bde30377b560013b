use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create targets table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS targets (
            target_id INTEGER PRIMARY KEY,
            target_input TEXT NOT NULL,
            target_username TEXT,
            title TEXT,
            last_message_id INTEGER NOT NULL DEFAULT 0,
            backfill_cursor INTEGER NOT NULL DEFAULT 0,
            last_scraped_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before backfill resume lack the cursor column
    let has_backfill_cursor: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('targets') WHERE name = 'backfill_cursor'",
    )
    .fetch_one(pool)
    .await?;

    if !has_backfill_cursor {
        sqlx::query(
            "ALTER TABLE targets ADD COLUMN backfill_cursor INTEGER NOT NULL DEFAULT 0",
        )
        .execute(pool)
        .await?;
    }

    // Create messages table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            target_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            date_utc TEXT NOT NULL,
            sender_id INTEGER,
            sender_username TEXT,
            text TEXT,
            entities_json TEXT NOT NULL DEFAULT '[]',
            views INTEGER,
            forwards INTEGER,
            reply_to_msg_id INTEGER,
            media_type TEXT,
            media_metadata_json TEXT,
            scraped_at TEXT NOT NULL,
            PRIMARY KEY (target_id, message_id),
            FOREIGN KEY (target_id) REFERENCES targets(target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create run audit table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            mode TEXT NOT NULL,
            target_filter TEXT,
            targets_total INTEGER NOT NULL DEFAULT 0,
            targets_ok INTEGER NOT NULL DEFAULT 0,
            targets_failed INTEGER NOT NULL DEFAULT 0,
            messages_new INTEGER NOT NULL DEFAULT 0,
            flood_waits INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            cancelled INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_target_date ON messages(target_id, date_utc DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scrape_runs_started_at ON scrape_runs(started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
