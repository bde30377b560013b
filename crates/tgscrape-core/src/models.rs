//! Core data models used throughout tgscrape.
//!
//! These types represent the targets, raw messages, stored message rows,
//! and run summaries that flow through the ingestion engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A target as resolved by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    /// Normalized input the target was resolved from (e.g. `@channel`).
    pub target_input: String,
    /// Stable numeric identity assigned by the platform.
    pub target_id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

/// A tracked target row with its cursor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub target_id: i64,
    pub target_input: String,
    pub target_username: Option<String>,
    pub title: Option<String>,
    /// High-water mark for incremental mode. Never decreases.
    pub last_message_id: i64,
    /// Oldest message id reached by backfill, 0 when backfill never ran.
    pub backfill_cursor: i64,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A rich-text annotation attached to a message body.
///
/// Offsets and lengths are in UTF-16 code units, as the platform reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEntity {
    /// Entity class name (e.g. `MessageEntityUrl`, `MessageEntityBold`).
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
}

/// File attributes attached to photo and document media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

impl FileInfo {
    pub fn is_empty(&self) -> bool {
        *self == FileInfo::default()
    }
}

/// Media attached to a message, one variant per media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Media {
    Photo {
        #[serde(default)]
        file: Option<FileInfo>,
    },
    Document {
        #[serde(default)]
        file: Option<FileInfo>,
    },
    WebPage {
        #[serde(default)]
        url: Option<String>,
    },
    Geo,
    Contact,
    Poll,
    #[serde(other)]
    Unsupported,
}

impl Media {
    /// Media class name recorded in the `media_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Media::Photo { .. } => "MessageMediaPhoto",
            Media::Document { .. } => "MessageMediaDocument",
            Media::WebPage { .. } => "MessageMediaWebPage",
            Media::Geo => "MessageMediaGeo",
            Media::Contact => "MessageMediaContact",
            Media::Poll => "MessageMediaPoll",
            Media::Unsupported => "MessageMediaUnsupported",
        }
    }

    pub fn file(&self) -> Option<&FileInfo> {
        match self {
            Media::Photo { file } | Media::Document { file } => file.as_ref(),
            _ => None,
        }
    }
}

/// A message as returned by the message source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<TextEntity>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
    #[serde(default)]
    pub reply_to_msg_id: Option<i64>,
    #[serde(default)]
    pub media: Option<Media>,
}

/// A normalized message ready to be written to the `messages` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRow {
    pub target_id: i64,
    pub message_id: i64,
    pub date_utc: DateTime<Utc>,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub text: Option<String>,
    pub entities_json: String,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub reply_to_msg_id: Option<i64>,
    pub media_type: Option<String>,
    pub media_metadata_json: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// How a run treats each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Fetch messages newer than the stored high-water mark.
    Incremental,
    /// Walk history backward from the newest (or last backfilled) message.
    Backfill,
    /// Resolve targets and report cursors without fetching or writing messages.
    DryRun,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Incremental => "incremental",
            RunMode::Backfill => "backfill",
            RunMode::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one target reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunItem {
    pub input_target: String,
    pub resolved_target_id: i64,
    pub resolved_username: Option<String>,
    pub resolved_title: Option<String>,
    pub last_message_id: i64,
}

impl DryRunItem {
    pub fn resolved_name(&self) -> &str {
        self.resolved_username
            .as_deref()
            .or(self.resolved_title.as_deref())
            .unwrap_or(&self.input_target)
    }
}

/// A target that failed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Aggregate result of one engine invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub mode: RunMode,
    pub target_filter: Option<String>,
    pub targets_total: u64,
    pub targets_ok: u64,
    pub targets_failed: u64,
    pub messages_new: u64,
    pub flood_waits: u64,
    pub error_count: u64,
    /// Set when the run stopped early because cancellation was requested.
    pub cancelled: bool,
    pub dry_run_items: Vec<DryRunItem>,
    pub failures: Vec<TargetFailure>,
}

impl RunSummary {
    pub fn new(mode: RunMode, target_filter: Option<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            mode,
            target_filter,
            targets_total: 0,
            targets_ok: 0,
            targets_failed: 0,
            messages_new: 0,
            flood_waits: 0,
            error_count: 0,
            cancelled: false,
            dry_run_items: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True when at least one target failed.
    pub fn is_degraded(&self) -> bool {
        self.targets_failed > 0
    }
}
