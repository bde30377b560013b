//! Storage abstraction for tgscrape.
//!
//! The [`ScrapeStore`] trait defines every write and cursor read the scrape
//! engine performs, so the engine can run against SQLite in production and
//! against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must commit each write before the next call returns.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{MessageRow, ResolvedTarget, RunSummary};

/// Abstract storage backend for the scrape engine.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_target`](ScrapeStore::upsert_target) | Create or refresh a target row |
/// | [`get_last_message_id`](ScrapeStore::get_last_message_id) | Read the incremental cursor |
/// | [`update_last_message_id`](ScrapeStore::update_last_message_id) | Raise the incremental cursor |
/// | [`get_backfill_cursor`](ScrapeStore::get_backfill_cursor) | Read where backfill stopped |
/// | [`update_backfill_cursor`](ScrapeStore::update_backfill_cursor) | Lower the backfill cursor |
/// | [`insert_message`](ScrapeStore::insert_message) | Insert a message if absent |
/// | [`record_run`](ScrapeStore::record_run) | Append a run summary |
#[async_trait]
pub trait ScrapeStore: Send + Sync {
    /// Insert a target, or refresh its input, handle, and title.
    ///
    /// Never touches `last_message_id` or `backfill_cursor` of an existing row.
    async fn upsert_target(&self, target: &ResolvedTarget, now: DateTime<Utc>) -> Result<()>;

    /// The stored high-water mark, or `0` for unknown targets.
    async fn get_last_message_id(&self, target_id: i64) -> Result<i64>;

    /// Set `last_message_id = max(current, candidate)` and mark the target scraped.
    async fn update_last_message_id(
        &self,
        target_id: i64,
        candidate: i64,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// The oldest message id reached by backfill, or `0` when none ran.
    async fn get_backfill_cursor(&self, target_id: i64) -> Result<i64>;

    /// Lower the backfill cursor to `cursor`. Ignored unless `cursor` is
    /// positive and older than the stored value (or none is stored).
    async fn update_backfill_cursor(
        &self,
        target_id: i64,
        cursor: i64,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Insert a message keyed by `(target_id, message_id)`.
    ///
    /// Returns `true` only when a new row was written; a duplicate is a
    /// no-op that returns `false`.
    async fn insert_message(&self, row: &MessageRow) -> Result<bool>;

    /// Append a run summary to the audit log, returning its id.
    async fn record_run(&self, summary: &RunSummary) -> Result<i64>;
}

/// Backfill cursor after offering `candidate` against `current`.
pub fn lowered_backfill_cursor(current: i64, candidate: i64) -> i64 {
    if candidate <= 0 {
        current
    } else if current <= 0 {
        candidate
    } else {
        current.min(candidate)
    }
}
