//! Scenario tests for the scrape engine.
//!
//! These drive [`Scraper`] end-to-end against a scripted message source,
//! the in-memory store, and a sleeper that records delays instead of
//! sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tgscrape_core::models::{MessageRow, RawMessage, ResolvedTarget, RunMode, RunSummary};
use tgscrape_core::policy::Sleeper;
use tgscrape_core::scrape::{ScrapeSettings, Scraper};
use tgscrape_core::source::{FetchDirection, MessageSource, SourceError};
use tgscrape_core::store::memory::InMemoryStore;
use tgscrape_core::store::ScrapeStore;

// ─── Scripted source ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct FetchCall {
    target_id: i64,
    limit: usize,
    cursor: i64,
    direction: FetchDirection,
}

#[derive(Default)]
struct ScriptedSource {
    targets: HashMap<String, ResolvedTarget>,
    /// Messages per target id, ascending by id.
    history: HashMap<i64, Vec<RawMessage>>,
    /// Errors returned, in order, before pages are served.
    queued_errors: Mutex<HashMap<i64, VecDeque<SourceError>>>,
    /// Error returned on every fetch for a target.
    always_fail: HashMap<i64, SourceError>,
    /// Forward pages include the cursor message itself.
    inclusive_forward: bool,
    senders: HashMap<i64, String>,
    calls: Mutex<Vec<FetchCall>>,
    resolve_calls: AtomicUsize,
    sender_calls: AtomicUsize,
}

impl ScriptedSource {
    fn with_target(mut self, input: &str, id: i64, messages: Vec<RawMessage>) -> Self {
        self.targets.insert(
            input.to_string(),
            ResolvedTarget {
                target_input: input.to_string(),
                target_id: id,
                username: Some(input.trim_start_matches('@').to_string()),
                title: Some(format!("Title {}", id)),
            },
        );
        self.history.insert(id, messages);
        self
    }

    fn queue_errors(self, target_id: i64, errors: Vec<SourceError>) -> Self {
        self.queued_errors
            .lock()
            .unwrap()
            .insert(target_id, errors.into_iter().collect());
        self
    }

    fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn resolve_target(&self, input: &str) -> Result<ResolvedTarget, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.targets
            .get(input)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(input.to_string()))
    }

    async fn fetch_page(
        &self,
        target: &ResolvedTarget,
        limit: usize,
        cursor: i64,
        direction: FetchDirection,
    ) -> Result<Vec<RawMessage>, SourceError> {
        self.calls.lock().unwrap().push(FetchCall {
            target_id: target.target_id,
            limit,
            cursor,
            direction,
        });

        if let Some(err) = self.always_fail.get(&target.target_id) {
            return Err(err.clone());
        }
        if let Some(queue) = self
            .queued_errors
            .lock()
            .unwrap()
            .get_mut(&target.target_id)
        {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }

        let history = self.history.get(&target.target_id).cloned().unwrap_or_default();
        let page = match direction {
            FetchDirection::Forward => history
                .into_iter()
                .filter(|m| {
                    if self.inclusive_forward {
                        m.id >= cursor
                    } else {
                        m.id > cursor
                    }
                })
                .take(limit)
                .collect(),
            FetchDirection::Backward => history
                .into_iter()
                .rev()
                .filter(|m| cursor == 0 || m.id < cursor)
                .take(limit)
                .collect(),
        };
        Ok(page)
    }

    async fn sender_username(&self, sender_id: i64) -> Result<Option<String>, SourceError> {
        self.sender_calls.fetch_add(1, Ordering::SeqCst);
        match self.senders.get(&sender_id) {
            Some(name) => Ok(Some(name.clone())),
            None => Err(SourceError::Transient("sender lookup failed".to_string())),
        }
    }
}

// ─── Recording sleeper ──────────────────────────────────────────────

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ─── Counting store ─────────────────────────────────────────────────

/// Wraps the in-memory store and counts writes.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    inserts: AtomicUsize,
    cursor_writes: AtomicUsize,
    cursor_reads: AtomicUsize,
}

#[async_trait]
impl ScrapeStore for CountingStore {
    async fn upsert_target(&self, target: &ResolvedTarget, now: DateTime<Utc>) -> Result<()> {
        self.inner.upsert_target(target, now).await
    }

    async fn get_last_message_id(&self, target_id: i64) -> Result<i64> {
        self.cursor_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_last_message_id(target_id).await
    }

    async fn update_last_message_id(
        &self,
        target_id: i64,
        candidate: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.cursor_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_last_message_id(target_id, candidate, now).await
    }

    async fn get_backfill_cursor(&self, target_id: i64) -> Result<i64> {
        self.inner.get_backfill_cursor(target_id).await
    }

    async fn update_backfill_cursor(
        &self,
        target_id: i64,
        cursor: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.cursor_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_backfill_cursor(target_id, cursor, now).await
    }

    async fn insert_message(&self, row: &MessageRow) -> Result<bool> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_message(row).await
    }

    async fn record_run(&self, summary: &RunSummary) -> Result<i64> {
        self.inner.record_run(summary).await
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn msg(id: i64, date: DateTime<Utc>) -> RawMessage {
    RawMessage {
        id,
        date,
        sender_id: None,
        text: Some(format!("message {}", id)),
        entities: Vec::new(),
        views: Some(id * 10),
        forwards: None,
        reply_to_msg_id: None,
        media: None,
    }
}

fn recent(ids: std::ops::RangeInclusive<i64>) -> Vec<RawMessage> {
    let now = Utc::now();
    ids.map(|id| msg(id, now - chrono::Duration::minutes(1000 - id)))
        .collect()
}

fn quiet_settings() -> ScrapeSettings {
    ScrapeSettings {
        limit_per_target: 1000,
        since_days: None,
        sleep_min_ms: 0,
        sleep_max_ms: 0,
        include_media_metadata: false,
        batch_size: 100,
        max_retries: 3,
    }
}

fn scraper(
    source: &Arc<ScriptedSource>,
    store: Arc<dyn ScrapeStore>,
    sleeper: &Arc<RecordingSleeper>,
    settings: ScrapeSettings,
) -> Scraper {
    Scraper::new(source.clone(), store, sleeper.clone(), settings)
}

fn targets(inputs: &[&str]) -> Vec<String> {
    inputs.iter().map(|s| s.to_string()).collect()
}

async fn seed_cursor(store: &InMemoryStore, source: &ScriptedSource, input: &str, cursor: i64) {
    let resolved = source.targets.get(input).unwrap();
    store.upsert_target(resolved, Utc::now()).await.unwrap();
    store
        .update_last_message_id(resolved.target_id, cursor, Utc::now())
        .await
        .unwrap();
}

// ─── Incremental ────────────────────────────────────────────────────

#[tokio::test]
async fn incremental_resume_inserts_exactly_the_new_messages() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=15)));
    let store = Arc::new(InMemoryStore::new());
    seed_cursor(&store, &source, "@news", 10).await;
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.messages_new, 5);
    assert_eq!(summary.targets_ok, 1);
    assert_eq!(store.message_ids(1), vec![11, 12, 13, 14, 15]);
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 15);
    let calls = source.calls();
    assert_eq!(calls[0].cursor, 10);
    assert_eq!(calls[0].direction, FetchDirection::Forward);
}

#[tokio::test]
async fn incremental_ignores_messages_at_or_below_cursor() {
    let mut scripted = ScriptedSource::default().with_target("@news", 1, recent(1..=8));
    scripted.inclusive_forward = true;
    let source = Arc::new(scripted);
    let store = Arc::new(InMemoryStore::new());
    seed_cursor(&store, &source, "@news", 5).await;
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.messages_new, 3);
    assert_eq!(store.message_ids(1), vec![6, 7, 8]);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=20)));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = scraper(&source, store.clone(), &sleeper, quiet_settings());

    let first = engine.run(&targets(&["@news"]), None, RunMode::Incremental).await;
    let second = engine.run(&targets(&["@news"]), None, RunMode::Incremental).await;

    assert_eq!(first.messages_new, 20);
    assert_eq!(second.messages_new, 0);
    assert_eq!(store.message_count(), 20);
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 20);
}

#[tokio::test]
async fn limit_per_target_bounds_page_sizes() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=50)));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        limit_per_target: 25,
        batch_size: 10,
        sleep_min_ms: 5,
        sleep_max_ms: 5,
        ..quiet_settings()
    };

    let summary = scraper(&source, store.clone(), &sleeper, settings)
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    let limits: Vec<usize> = source.calls().iter().map(|c| c.limit).collect();
    assert_eq!(limits, vec![10, 10, 5]);
    let cursors: Vec<i64> = source.calls().iter().map(|c| c.cursor).collect();
    assert_eq!(cursors, vec![0, 10, 20]);
    assert_eq!(summary.messages_new, 25);
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 25);
    // Paced between pages, not after the last one.
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(5); 2]);
}

#[tokio::test]
async fn incremental_skips_messages_before_cutoff_without_stopping() {
    let now = Utc::now();
    let history = vec![
        msg(1, now - chrono::Duration::days(30)),
        msg(2, now - chrono::Duration::days(1)),
        msg(3, now - chrono::Duration::days(20)),
        msg(4, now - chrono::Duration::hours(2)),
    ];
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, history));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        since_days: Some(7),
        ..quiet_settings()
    };

    let summary = scraper(&source, store.clone(), &sleeper, settings)
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.messages_new, 2);
    assert_eq!(store.message_ids(1), vec![2, 4]);
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 4);
}

#[tokio::test]
async fn malformed_ids_are_skipped() {
    let now = Utc::now();
    let history = vec![msg(-3, now), msg(0, now), msg(1, now), msg(2, now)];
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, history));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Backfill)
        .await;

    assert_eq!(summary.messages_new, 2);
    assert_eq!(store.message_ids(1), vec![1, 2]);
}

// ─── Backfill ───────────────────────────────────────────────────────

#[tokio::test]
async fn backfill_stops_after_page_crossing_cutoff() {
    let now = Utc::now();
    // id 30 is one hour old, each lower id one day older.
    let history: Vec<RawMessage> = (1..=30)
        .map(|id| msg(id, now - chrono::Duration::days(30 - id) - chrono::Duration::hours(1)))
        .collect();
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, history));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        since_days: Some(7),
        batch_size: 10,
        ..quiet_settings()
    };

    let summary = scraper(&source, store.clone(), &sleeper, settings)
        .run(&targets(&["@news"]), None, RunMode::Backfill)
        .await;

    let calls = source.calls();
    assert_eq!(calls.len(), 1, "fetched an older page: {:?}", calls);
    assert_eq!(calls[0].direction, FetchDirection::Backward);
    assert_eq!(calls[0].cursor, 0);
    assert_eq!(summary.messages_new, 7);
    assert_eq!(store.message_ids(1), (24..=30).collect::<Vec<_>>());
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 30);
}

#[tokio::test]
async fn backfill_resumes_where_previous_run_stopped() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=25)));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        limit_per_target: 10,
        batch_size: 10,
        ..quiet_settings()
    };
    let engine = scraper(&source, store.clone(), &sleeper, settings);

    let first = engine.run(&targets(&["@news"]), None, RunMode::Backfill).await;
    assert_eq!(first.messages_new, 10);
    assert_eq!(store.get_backfill_cursor(1).await.unwrap(), 16);

    let second = engine.run(&targets(&["@news"]), None, RunMode::Backfill).await;
    assert_eq!(second.messages_new, 10);
    assert_eq!(store.get_backfill_cursor(1).await.unwrap(), 6);

    let third = engine.run(&targets(&["@news"]), None, RunMode::Backfill).await;
    assert_eq!(third.messages_new, 5);
    assert_eq!(store.get_backfill_cursor(1).await.unwrap(), 1);

    let cursors: Vec<i64> = source.calls().iter().map(|c| c.cursor).collect();
    assert_eq!(cursors, vec![0, 16, 6]);
    assert_eq!(store.message_count(), 25);
    assert_eq!(store.get_last_message_id(1).await.unwrap(), 25);
}

#[tokio::test]
async fn backfill_never_lowers_incremental_cursor() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=10)));
    let store = Arc::new(InMemoryStore::new());
    seed_cursor(&store, &source, "@news", 40).await;
    let sleeper = Arc::new(RecordingSleeper::default());

    scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Backfill)
        .await;

    assert_eq!(store.get_last_message_id(1).await.unwrap(), 40);
    assert_eq!(store.message_count(), 10);
}

#[tokio::test]
async fn backfill_cursor_skips_malformed_page_tail() {
    let now = Utc::now();
    // Served newest first: [5, 4, 0], then older pages below id 4.
    let history = vec![msg(1, now), msg(2, now), msg(0, now), msg(4, now), msg(5, now)];
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, history));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        limit_per_target: 30,
        batch_size: 3,
        ..quiet_settings()
    };

    let summary = scraper(&source, store.clone(), &sleeper, settings)
        .run(&targets(&["@news"]), None, RunMode::Backfill)
        .await;

    let cursors: Vec<i64> = source.calls().iter().map(|c| c.cursor).collect();
    assert_eq!(cursors, vec![0, 4, 1]);
    assert_eq!(summary.messages_new, 4);
    assert_eq!(store.message_ids(1), vec![1, 2, 4, 5]);
    assert_eq!(store.get_backfill_cursor(1).await.unwrap(), 1);
}

// ─── Retry policy ───────────────────────────────────────────────────

#[tokio::test]
async fn flood_waits_do_not_consume_retry_budget() {
    let flood = vec![SourceError::FloodWait { seconds: 1 }; 10];
    let source = Arc::new(
        ScriptedSource::default()
            .with_target("@news", 1, recent(1..=3))
            .queue_errors(1, flood),
    );
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.targets_ok, 1);
    assert_eq!(summary.targets_failed, 0);
    assert_eq!(summary.flood_waits, 10);
    assert_eq!(summary.messages_new, 3);
    let delays = sleeper.delays();
    assert_eq!(delays.len(), 10);
    for d in delays {
        assert!(d >= Duration::from_millis(1500) && d <= Duration::from_secs(3));
    }
}

#[tokio::test]
async fn transient_errors_exhaust_retries_and_isolate_the_target() {
    let mut scripted = ScriptedSource::default()
        .with_target("@flaky", 1, recent(1..=5))
        .with_target("@solid", 2, recent(1..=4));
    scripted
        .always_fail
        .insert(1, SourceError::Transient("connection reset".to_string()));
    let source = Arc::new(scripted);
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@flaky", "@solid"]), None, RunMode::Incremental)
        .await;

    let flaky_calls = source.calls().iter().filter(|c| c.target_id == 1).count();
    assert_eq!(flaky_calls, 3);

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays[1] > delays[0]);
    assert!(delays[0] >= Duration::from_secs(1));

    assert_eq!(summary.targets_total, 2);
    assert_eq!(summary.targets_failed, 1);
    assert_eq!(summary.targets_ok, 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.failures[0].target, "@flaky");
    assert!(summary.failures[0].error.contains("connection reset"));
    assert_eq!(store.message_ids(2), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn transient_error_recovers_within_budget() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_target("@news", 1, recent(1..=3))
            .queue_errors(1, vec![SourceError::Transient("503".to_string()); 2]),
    );
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.targets_ok, 1);
    assert_eq!(summary.messages_new, 3);
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
    let mut scripted = ScriptedSource::default().with_target("@news", 1, recent(1..=3));
    scripted
        .always_fail
        .insert(1, SourceError::Fatal("permission revoked".to_string()));
    let source = Arc::new(scripted);
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::Incremental)
        .await;

    assert_eq!(source.calls().len(), 1);
    assert!(sleeper.delays().is_empty());
    assert_eq!(summary.targets_failed, 1);
}

// ─── Resolution and run driver ──────────────────────────────────────

#[tokio::test]
async fn every_target_failing_still_yields_a_summary() {
    let source = Arc::new(ScriptedSource::default());
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@ghost", "@missing"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.targets_total, 2);
    assert_eq!(summary.targets_ok, 0);
    assert_eq!(summary.targets_failed, 2);
    assert!(summary.is_degraded());
    assert!(summary.finished_at.is_some());
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn target_filter_selects_a_single_target() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_target("@a", 1, recent(1..=2))
            .with_target("@b", 2, recent(1..=3)),
    );
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@a"]), Some("@b"), RunMode::Incremental)
        .await;

    assert_eq!(summary.targets_total, 1);
    assert_eq!(summary.target_filter.as_deref(), Some("@b"));
    assert_eq!(store.message_ids(1), Vec::<i64>::new());
    assert_eq!(store.message_ids(2), vec![1, 2, 3]);
}

#[tokio::test]
async fn targets_are_paced_but_not_after_the_last() {
    let source = Arc::new(
        ScriptedSource::default()
            .with_target("@a", 1, Vec::new())
            .with_target("@b", 2, Vec::new())
            .with_target("@c", 3, Vec::new()),
    );
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let settings = ScrapeSettings {
        sleep_min_ms: 50,
        sleep_max_ms: 50,
        ..quiet_settings()
    };

    scraper(&source, store, &sleeper, settings)
        .run(&targets(&["@a", "@b", "@c"]), None, RunMode::Incremental)
        .await;

    assert_eq!(sleeper.delays(), vec![Duration::from_millis(50); 2]);
}

#[tokio::test]
async fn cancelled_run_stops_before_next_target() {
    let source = Arc::new(ScriptedSource::default().with_target("@a", 1, recent(1..=2)));
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = scraper(&source, store.clone(), &sleeper, quiet_settings());

    engine.cancel_handle().store(true, Ordering::SeqCst);
    let summary = engine.run(&targets(&["@a"]), None, RunMode::Incremental).await;

    assert!(summary.cancelled);
    assert_eq!(summary.targets_ok, 0);
    assert_eq!(source.resolve_calls.load(Ordering::SeqCst), 0);
}

// ─── Dry run ────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_reads_cursor_but_never_writes_messages_or_cursors() {
    let source = Arc::new(ScriptedSource::default().with_target("@news", 1, recent(1..=9)));
    let store = Arc::new(CountingStore::default());
    seed_cursor(&store.inner, &source, "@news", 4).await;
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@news"]), None, RunMode::DryRun)
        .await;

    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    assert_eq!(store.cursor_writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.cursor_reads.load(Ordering::SeqCst), 1);
    assert_eq!(source.resolve_calls.load(Ordering::SeqCst), 1);
    assert!(source.calls().is_empty());

    assert_eq!(summary.mode, RunMode::DryRun);
    assert_eq!(summary.targets_ok, 1);
    let item = &summary.dry_run_items[0];
    assert_eq!(item.input_target, "@news");
    assert_eq!(item.resolved_target_id, 1);
    assert_eq!(item.last_message_id, 4);
    assert_eq!(item.resolved_name(), "news");
}

// ─── Normalization through the engine ───────────────────────────────

#[tokio::test]
async fn sender_handles_are_cached_per_target() {
    let now = Utc::now();
    let history: Vec<RawMessage> = (1..=6)
        .map(|id| RawMessage {
            sender_id: Some(if id % 2 == 0 { 7 } else { 8 }),
            ..msg(id, now)
        })
        .collect();
    let mut scripted = ScriptedSource::default().with_target("@chat", 1, history);
    scripted.senders.insert(7, "alice".to_string());
    let source = Arc::new(scripted);
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());

    let summary = scraper(&source, store.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@chat"]), None, RunMode::Incremental)
        .await;

    assert_eq!(summary.targets_ok, 1);
    assert_eq!(source.sender_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        store.message(1, 2).unwrap().sender_username.as_deref(),
        Some("alice")
    );
    // Lookup for sender 8 fails: stored without a handle.
    assert_eq!(store.message(1, 1).unwrap().sender_username, None);
}

#[tokio::test]
async fn media_metadata_follows_settings() {
    use tgscrape_core::models::{FileInfo, Media};

    let now = Utc::now();
    let history = vec![RawMessage {
        media: Some(Media::Document {
            file: Some(FileInfo {
                size: Some(99),
                ..Default::default()
            }),
        }),
        ..msg(1, now)
    }];
    let source = Arc::new(ScriptedSource::default().with_target("@files", 1, history));
    let sleeper = Arc::new(RecordingSleeper::default());

    let without = Arc::new(InMemoryStore::new());
    scraper(&source, without.clone(), &sleeper, quiet_settings())
        .run(&targets(&["@files"]), None, RunMode::Incremental)
        .await;
    let row = without.message(1, 1).unwrap();
    assert_eq!(row.media_type.as_deref(), Some("MessageMediaDocument"));
    assert_eq!(row.media_metadata_json, None);

    let with = Arc::new(InMemoryStore::new());
    let settings = ScrapeSettings {
        include_media_metadata: true,
        ..quiet_settings()
    };
    scraper(&source, with.clone(), &sleeper, settings)
        .run(&targets(&["@files"]), None, RunMode::Incremental)
        .await;
    let row = with.message(1, 1).unwrap();
    assert_eq!(row.media_metadata_json.as_deref(), Some(r#"{"size":99}"#));
}
