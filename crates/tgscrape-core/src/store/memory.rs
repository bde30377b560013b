//! In-memory [`ScrapeStore`] implementation for tests.
//!
//! Uses `HashMap` and `BTreeMap` behind `std::sync::RwLock` for thread
//! safety. Mirrors the SQLite semantics: idempotent message inserts and
//! monotonic cursors.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{MessageRow, ResolvedTarget, RunSummary, Target};

use super::{lowered_backfill_cursor, ScrapeStore};

/// In-memory store for tests and tooling.
pub struct InMemoryStore {
    targets: RwLock<HashMap<i64, Target>>,
    messages: RwLock<BTreeMap<(i64, i64), MessageRow>>,
    runs: RwLock<Vec<RunSummary>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            messages: RwLock::new(BTreeMap::new()),
            runs: RwLock::new(Vec::new()),
        }
    }

    pub fn target(&self, target_id: i64) -> Option<Target> {
        self.targets.read().unwrap().get(&target_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Message ids stored for a target, ascending.
    pub fn message_ids(&self, target_id: i64) -> Vec<i64> {
        self.messages
            .read()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == target_id)
            .map(|(_, m)| *m)
            .collect()
    }

    pub fn message(&self, target_id: i64, message_id: i64) -> Option<MessageRow> {
        self.messages
            .read()
            .unwrap()
            .get(&(target_id, message_id))
            .cloned()
    }

    pub fn runs(&self) -> Vec<RunSummary> {
        self.runs.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScrapeStore for InMemoryStore {
    async fn upsert_target(&self, target: &ResolvedTarget, now: DateTime<Utc>) -> Result<()> {
        let mut targets = self.targets.write().unwrap();
        targets
            .entry(target.target_id)
            .and_modify(|t| {
                t.target_input = target.target_input.clone();
                t.target_username = target.username.clone();
                t.title = target.title.clone();
                t.updated_at = now;
            })
            .or_insert_with(|| Target {
                target_id: target.target_id,
                target_input: target.target_input.clone(),
                target_username: target.username.clone(),
                title: target.title.clone(),
                last_message_id: 0,
                backfill_cursor: 0,
                last_scraped_at: None,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn get_last_message_id(&self, target_id: i64) -> Result<i64> {
        Ok(self
            .targets
            .read()
            .unwrap()
            .get(&target_id)
            .map_or(0, |t| t.last_message_id))
    }

    async fn update_last_message_id(
        &self,
        target_id: i64,
        candidate: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(t) = self.targets.write().unwrap().get_mut(&target_id) {
            t.last_message_id = t.last_message_id.max(candidate);
            t.last_scraped_at = Some(now);
            t.updated_at = now;
        }
        Ok(())
    }

    async fn get_backfill_cursor(&self, target_id: i64) -> Result<i64> {
        Ok(self
            .targets
            .read()
            .unwrap()
            .get(&target_id)
            .map_or(0, |t| t.backfill_cursor))
    }

    async fn update_backfill_cursor(
        &self,
        target_id: i64,
        cursor: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(t) = self.targets.write().unwrap().get_mut(&target_id) {
            let lowered = lowered_backfill_cursor(t.backfill_cursor, cursor);
            if lowered != t.backfill_cursor {
                t.backfill_cursor = lowered;
                t.updated_at = now;
            }
        }
        Ok(())
    }

    async fn insert_message(&self, row: &MessageRow) -> Result<bool> {
        let mut messages = self.messages.write().unwrap();
        let key = (row.target_id, row.message_id);
        if messages.contains_key(&key) {
            return Ok(false);
        }
        messages.insert(key, row.clone());
        Ok(true)
    }

    async fn record_run(&self, summary: &RunSummary) -> Result<i64> {
        let mut runs = self.runs.write().unwrap();
        runs.push(summary.clone());
        Ok(runs.len() as i64)
    }
}
