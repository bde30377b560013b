//! SQLite-backed [`ScrapeStore`] implementation.
//!
//! Maps each [`ScrapeStore`] operation to a single SQL statement against
//! the schema created by [`crate::migrate`]. Timestamps are stored as
//! RFC 3339 text in UTC.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use tgscrape_core::models::{MessageRow, ResolvedTarget, RunSummary, Target};
use tgscrape_core::store::ScrapeStore;

/// SQLite implementation of the [`ScrapeStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load one target row with its cursor state.
    pub async fn target(&self, target_id: i64) -> Result<Option<Target>> {
        let row = sqlx::query(
            "SELECT target_id, target_input, target_username, title, last_message_id, \
             backfill_cursor, last_scraped_at, created_at, updated_at \
             FROM targets WHERE target_id = ?",
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let last_scraped_at: Option<String> = row.get("last_scraped_at");
        Ok(Some(Target {
            target_id: row.get("target_id"),
            target_input: row.get("target_input"),
            target_username: row.get("target_username"),
            title: row.get("title"),
            last_message_id: row.get("last_message_id"),
            backfill_cursor: row.get("backfill_cursor"),
            last_scraped_at: last_scraped_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        }))
    }
}

pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

#[async_trait]
impl ScrapeStore for SqliteStore {
    async fn upsert_target(&self, target: &ResolvedTarget, now: DateTime<Utc>) -> Result<()> {
        let now = format_ts(now);
        sqlx::query(
            r#"
            INSERT INTO targets (target_id, target_input, target_username, title,
                                 last_message_id, backfill_cursor, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 0, ?, ?)
            ON CONFLICT(target_id) DO UPDATE SET
                target_input = excluded.target_input,
                target_username = excluded.target_username,
                title = excluded.title,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(target.target_id)
        .bind(&target.target_input)
        .bind(&target.username)
        .bind(&target.title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_last_message_id(&self, target_id: i64) -> Result<i64> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT last_message_id FROM targets WHERE target_id = ?")
                .bind(target_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.unwrap_or(0))
    }

    async fn update_last_message_id(
        &self,
        target_id: i64,
        candidate: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let now = format_ts(now);
        sqlx::query(
            r#"
            UPDATE targets SET
                last_message_id = MAX(last_message_id, ?),
                last_scraped_at = ?,
                updated_at = ?
            WHERE target_id = ?
            "#,
        )
        .bind(candidate)
        .bind(&now)
        .bind(&now)
        .bind(target_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_backfill_cursor(&self, target_id: i64) -> Result<i64> {
        let cursor: Option<i64> =
            sqlx::query_scalar("SELECT backfill_cursor FROM targets WHERE target_id = ?")
                .bind(target_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor.unwrap_or(0))
    }

    async fn update_backfill_cursor(
        &self,
        target_id: i64,
        cursor: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if cursor <= 0 {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE targets SET backfill_cursor = ?, updated_at = ?
            WHERE target_id = ? AND (backfill_cursor <= 0 OR backfill_cursor > ?)
            "#,
        )
        .bind(cursor)
        .bind(format_ts(now))
        .bind(target_id)
        .bind(cursor)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_message(&self, row: &MessageRow) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO messages (target_id, message_id, date_utc, sender_id,
                                            sender_username, text, entities_json, views,
                                            forwards, reply_to_msg_id, media_type,
                                            media_metadata_json, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.target_id)
        .bind(row.message_id)
        .bind(format_ts(row.date_utc))
        .bind(row.sender_id)
        .bind(&row.sender_username)
        .bind(&row.text)
        .bind(&row.entities_json)
        .bind(row.views)
        .bind(row.forwards)
        .bind(row.reply_to_msg_id)
        .bind(&row.media_type)
        .bind(&row.media_metadata_json)
        .bind(format_ts(row.scraped_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_run(&self, summary: &RunSummary) -> Result<i64> {
        let errors_json = serde_json::to_string(&summary.failures)?;
        let result = sqlx::query(
            r#"
            INSERT INTO scrape_runs (started_at, finished_at, mode, target_filter,
                                     targets_total, targets_ok, targets_failed,
                                     messages_new, flood_waits, error_count,
                                     cancelled, errors_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_ts(summary.started_at))
        .bind(summary.finished_at.map(format_ts))
        .bind(summary.mode.as_str())
        .bind(&summary.target_filter)
        .bind(summary.targets_total as i64)
        .bind(summary.targets_ok as i64)
        .bind(summary.targets_failed as i64)
        .bind(summary.messages_new as i64)
        .bind(summary.flood_waits as i64)
        .bind(summary.error_count as i64)
        .bind(summary.cancelled)
        .bind(&errors_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
