//! The message source port.
//!
//! [`MessageSource`] is everything the engine needs from the platform
//! client: resolve a target to a stable identity and fetch one bounded page
//! of messages relative to a cursor. The real network client lives behind
//! this trait; tests substitute a scripted implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RawMessage, ResolvedTarget};

/// Page direction relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    /// Messages with id strictly greater than the cursor, oldest first.
    Forward,
    /// Messages with id strictly less than the cursor, newest first.
    /// A cursor of `0` means "start from the newest message".
    Backward,
}

impl FetchDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchDirection::Forward => "forward",
            FetchDirection::Backward => "backward",
        }
    }
}

/// Errors raised by a [`MessageSource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The target does not exist or cannot be identified.
    #[error("target not found: {0}")]
    NotFound(String),

    /// The target exists but this session may not read it.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Mandatory wait imposed by the platform's rate limiter.
    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    /// Network or remote fault that may succeed on retry.
    #[error("transient source error: {0}")]
    Transient(String),

    /// Non-recoverable failure, e.g. permission revoked mid-run.
    #[error("fatal source error: {0}")]
    Fatal(String),
}

impl SourceError {
    /// Whether the failure is retried with exponential backoff.
    ///
    /// Flood waits are handled separately and are not counted here.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The signalled wait in seconds, for flood-wait errors.
    #[must_use]
    pub const fn flood_wait(&self) -> Option<u64> {
        match self {
            Self::FloodWait { seconds } => Some(*seconds),
            _ => None,
        }
    }
}

/// Platform client contract consumed by the scrape engine.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resolve a normalized target input (e.g. `@channel`) to its identity.
    ///
    /// Must be side-effect free beyond the lookup itself.
    async fn resolve_target(&self, input: &str) -> Result<ResolvedTarget, SourceError>;

    /// Fetch at most `limit` messages relative to `cursor`.
    ///
    /// Returns fewer than `limit` messages only when the history in that
    /// direction is exhausted.
    async fn fetch_page(
        &self,
        target: &ResolvedTarget,
        limit: usize,
        cursor: i64,
        direction: FetchDirection,
    ) -> Result<Vec<RawMessage>, SourceError>;

    /// Look up a sender's handle. Sources that cannot do this return `None`.
    async fn sender_username(&self, _sender_id: i64) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}
