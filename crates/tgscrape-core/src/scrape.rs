//! The scrape engine.
//!
//! [`Scraper::run`] walks the selected targets strictly in order. For each
//! target it resolves the identity, upserts the target row, reads the resume
//! cursor, and (unless dry-running) drives the paginated fetch loop:
//!
//! ```text
//! resolve ─▶ upsert ─▶ read cursor ─┬─▶ dry-run report
//!                                   └─▶ fetch page ─▶ filter/normalize ─▶ insert
//!                                          ▲                               │
//!                                          └──────── pace ◀────────────────┘
//!                                   ─▶ raise cursor ─▶ done | failed
//! ```
//!
//! Incremental mode pages forward from `last_message_id`; backfill pages
//! backward from the newest message, or from where the previous backfill
//! stopped. Any error inside one target is recorded in the summary and the
//! run moves on to the next target.
//!
//! # Retry Strategy
//!
//! - Flood wait → sleep the signalled time plus jitter, retry without limit
//! - Transient error → exponential backoff, at most `max_retries` attempts
//! - Fatal or resolution error → fail the target immediately

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::models::{
    DryRunItem, RawMessage, ResolvedTarget, RunMode, RunSummary, TargetFailure,
};
use crate::normalize;
use crate::policy::{self, Sleeper};
use crate::progress::{NoProgress, ScrapeProgressEvent, ScrapeProgressReporter};
use crate::source::{FetchDirection, MessageSource, SourceError};
use crate::store::ScrapeStore;

/// Tunables for one run. Validated by the caller before the engine starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSettings {
    /// Maximum messages fetched per target per run.
    pub limit_per_target: u64,
    /// Retention window; messages older than this are ignored.
    pub since_days: Option<u32>,
    pub sleep_min_ms: u64,
    pub sleep_max_ms: u64,
    pub include_media_metadata: bool,
    /// Page size requested from the source.
    pub batch_size: u64,
    /// Total attempts for a page fetch that keeps failing transiently.
    pub max_retries: u32,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            limit_per_target: 2000,
            since_days: None,
            sleep_min_ms: 600,
            sleep_max_ms: 1400,
            include_media_metadata: false,
            batch_size: 200,
            max_retries: 3,
        }
    }
}

/// Counters accumulated while scraping one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOutcome {
    pub new_messages: u64,
    pub processed: u64,
    pub flood_waits: u64,
    pub highest_message_id: i64,
}

/// Drives ingestion for a list of targets.
pub struct Scraper {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn ScrapeStore>,
    sleeper: Arc<dyn Sleeper>,
    progress: Arc<dyn ScrapeProgressReporter>,
    settings: ScrapeSettings,
    cancel: Arc<AtomicBool>,
}

impl Scraper {
    pub fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn ScrapeStore>,
        sleeper: Arc<dyn Sleeper>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            source,
            store,
            sleeper,
            progress: Arc::new(NoProgress),
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ScrapeProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Flag checked before each target; set it to stop the run early.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run over `targets`, or only `target_filter` when given.
    ///
    /// Inputs must already be normalized. Always returns a complete summary;
    /// per-target failures are counted, never propagated.
    pub async fn run(
        &self,
        targets: &[String],
        target_filter: Option<&str>,
        mode: RunMode,
    ) -> RunSummary {
        let mut summary = RunSummary::new(mode, target_filter.map(str::to_string));
        let selected: Vec<String> = match target_filter {
            Some(filter) => vec![filter.to_string()],
            None => targets.to_vec(),
        };
        summary.targets_total = selected.len() as u64;

        for (index, target) in selected.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(
                    event = "run.cancelled",
                    target_input = %target,
                    "Run cancelled before target"
                );
                summary.cancelled = true;
                break;
            }

            info!(
                event = "target.start",
                target_input = %target,
                index = index + 1,
                total = selected.len(),
                "Processing target"
            );
            self.progress.report(ScrapeProgressEvent::TargetStarted {
                target: target.clone(),
                index: index + 1,
                total: selected.len(),
            });

            let mut outcome = TargetOutcome::default();
            let result = self.process_target(target, mode, &mut outcome).await;

            // Rows written before a failure are real, so they count either way.
            summary.messages_new += outcome.new_messages;
            summary.flood_waits += outcome.flood_waits;

            let ok = match result {
                Ok(dry_run_item) => {
                    summary.targets_ok += 1;
                    if let Some(item) = dry_run_item {
                        summary.dry_run_items.push(item);
                    }
                    true
                }
                Err(err) => {
                    summary.targets_failed += 1;
                    summary.error_count += 1;
                    error!(
                        event = "target.error",
                        target_input = %target,
                        error = %format!("{:#}", err),
                        "Target processing failed"
                    );
                    summary.failures.push(TargetFailure {
                        target: target.clone(),
                        error: format!("{:#}", err),
                    });
                    false
                }
            };
            self.progress.report(ScrapeProgressEvent::TargetFinished {
                target: target.clone(),
                ok,
                new_messages: outcome.new_messages,
            });

            if index + 1 < selected.len() {
                self.pace().await;
            }
        }

        summary.finished_at = Some(Utc::now());
        summary
    }

    /// Scrape one target. Returns the dry-run report in dry-run mode.
    async fn process_target(
        &self,
        input: &str,
        mode: RunMode,
        outcome: &mut TargetOutcome,
    ) -> Result<Option<DryRunItem>> {
        let resolved = self
            .source
            .resolve_target(input)
            .await
            .with_context(|| format!("failed to resolve {}", input))?;
        self.store.upsert_target(&resolved, Utc::now()).await?;
        let last_message_id = self.store.get_last_message_id(resolved.target_id).await?;

        if mode == RunMode::DryRun {
            info!(
                event = "target.dry_run",
                target_input = %input,
                target_id = resolved.target_id,
                last_message_id,
                "Dry run target resolved"
            );
            return Ok(Some(DryRunItem {
                input_target: input.to_string(),
                resolved_target_id: resolved.target_id,
                resolved_username: resolved.username.clone(),
                resolved_title: resolved.title.clone(),
                last_message_id,
            }));
        }

        let backfill = mode == RunMode::Backfill;
        let start_cursor = if backfill {
            self.store.get_backfill_cursor(resolved.target_id).await?
        } else {
            last_message_id
        };

        outcome.highest_message_id = last_message_id;
        let end_cursor = self
            .fetch_messages(&resolved, input, last_message_id, start_cursor, backfill, outcome)
            .await?;

        let now = Utc::now();
        self.store
            .update_last_message_id(resolved.target_id, outcome.highest_message_id, now)
            .await?;
        if backfill {
            self.store
                .update_backfill_cursor(resolved.target_id, end_cursor, now)
                .await?;
        }

        info!(
            event = "target.complete",
            target_input = %input,
            target_id = resolved.target_id,
            new_messages = outcome.new_messages,
            highest_message_id = outcome.highest_message_id,
            "Target scrape complete"
        );
        Ok(None)
    }

    /// The paginated fetch loop. Returns the cursor it stopped at.
    async fn fetch_messages(
        &self,
        resolved: &ResolvedTarget,
        input: &str,
        last_message_id: i64,
        start_cursor: i64,
        backfill: bool,
        outcome: &mut TargetOutcome,
    ) -> Result<i64> {
        let settings = &self.settings;
        let since_cutoff = settings
            .since_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)));
        let direction = if backfill {
            FetchDirection::Backward
        } else {
            FetchDirection::Forward
        };

        let mut sender_cache: HashMap<i64, Option<String>> = HashMap::new();
        let mut remaining = settings.limit_per_target;
        let mut cursor = start_cursor;

        while remaining > 0 {
            let batch_limit = settings.batch_size.min(remaining);
            let page = self
                .fetch_page_with_retry(resolved, batch_limit, cursor, direction, outcome)
                .await?;
            if page.is_empty() {
                break;
            }

            let mut inserted = 0u64;
            let mut reached_cutoff = false;
            for message in &page {
                if message.id <= 0 {
                    continue;
                }
                if !backfill && message.id <= last_message_id {
                    continue;
                }
                if let Some(cutoff) = since_cutoff {
                    if message.date < cutoff {
                        if backfill {
                            reached_cutoff = true;
                            break;
                        }
                        continue;
                    }
                }

                if self.persist_message(resolved, message, &mut sender_cache).await? {
                    inserted += 1;
                }
                outcome.processed += 1;
                outcome.highest_message_id = outcome.highest_message_id.max(message.id);
            }
            outcome.new_messages += inserted;

            // Only well-formed ids move the cursor.
            let last_id = page
                .iter()
                .rev()
                .map(|m| m.id)
                .find(|id| *id > 0)
                .unwrap_or(cursor);
            cursor = if backfill { last_id } else { cursor.max(last_id) };
            remaining = remaining.saturating_sub(page.len() as u64);

            self.progress.report(ScrapeProgressEvent::PageFetched {
                target: input.to_string(),
                fetched: page.len() as u64,
                inserted,
                remaining,
            });

            if reached_cutoff {
                debug!(target_id = resolved.target_id, cursor, "Backfill reached retention cutoff");
                break;
            }
            if (page.len() as u64) < batch_limit {
                break;
            }
            if remaining > 0 {
                self.pace().await;
            }
        }

        info!(
            event = "target.messages_done",
            target_id = resolved.target_id,
            processed = outcome.processed,
            inserted = outcome.new_messages,
            highest_message_id = outcome.highest_message_id,
            "Target message loop completed"
        );
        Ok(cursor)
    }

    async fn persist_message(
        &self,
        resolved: &ResolvedTarget,
        message: &RawMessage,
        sender_cache: &mut HashMap<i64, Option<String>>,
    ) -> Result<bool> {
        let sender_username = self.sender_username(message.sender_id, sender_cache).await;
        let row = normalize::message_row(
            resolved.target_id,
            message,
            sender_username,
            self.settings.include_media_metadata,
            Utc::now(),
        )
        .with_context(|| format!("failed to normalize message {}", message.id))?;
        self.store.insert_message(&row).await
    }

    /// Fetch one page, absorbing flood waits and retrying transient failures.
    async fn fetch_page_with_retry(
        &self,
        resolved: &ResolvedTarget,
        limit: u64,
        cursor: i64,
        direction: FetchDirection,
        outcome: &mut TargetOutcome,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut attempt: u32 = 0;

        loop {
            let err = match self
                .source
                .fetch_page(resolved, limit, cursor, direction)
                .await
            {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };

            if let Some(seconds) = err.flood_wait() {
                outcome.flood_waits += 1;
                let delay = policy::flood_wait_delay(seconds);
                warn!(
                    event = "source.flood_wait",
                    target_id = resolved.target_id,
                    seconds,
                    sleep_ms = delay.as_millis() as u64,
                    "Flood wait signalled, sleeping"
                );
                self.sleeper.sleep(delay).await;
                continue;
            }
            if !err.is_retryable() {
                return Err(err);
            }

            attempt += 1;
            if attempt >= self.settings.max_retries {
                return Err(err);
            }
            let delay = policy::backoff(attempt);
            warn!(
                event = "source.retry",
                target_id = resolved.target_id,
                attempt,
                sleep_ms = delay.as_millis() as u64,
                error = %err,
                "Fetch failed, retrying with backoff"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    /// Resolve a sender handle through the per-target cache.
    ///
    /// A failed lookup is cached as `None` and never fails the message.
    async fn sender_username(
        &self,
        sender_id: Option<i64>,
        cache: &mut HashMap<i64, Option<String>>,
    ) -> Option<String> {
        let sender_id = sender_id?;
        if let Some(cached) = cache.get(&sender_id) {
            return cached.clone();
        }
        let username = match self.source.sender_username(sender_id).await {
            Ok(username) => username,
            Err(err) => {
                debug!(sender_id, error = %err, "Sender lookup failed");
                None
            }
        };
        cache.insert(sender_id, username.clone());
        username
    }

    async fn pace(&self) {
        let delay = policy::jittered_delay(self.settings.sleep_min_ms, self.settings.sleep_max_ms);
        if !delay.is_zero() {
            self.sleeper.sleep(delay).await;
        }
    }
}
