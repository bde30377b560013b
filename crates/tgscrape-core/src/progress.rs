//! Scrape progress events.
//!
//! The engine emits a [`ScrapeProgressEvent`] at each target boundary and
//! after every page. Reporters decide how (or whether) to show them; the
//! binary provides human and JSON reporters on stderr.

/// A single progress event for a scrape run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScrapeProgressEvent {
    /// Processing of a target began. `index` is 1-based.
    TargetStarted {
        target: String,
        index: usize,
        total: usize,
    },
    /// A page was fetched and persisted.
    PageFetched {
        target: String,
        fetched: u64,
        inserted: u64,
        remaining: u64,
    },
    /// A target finished, successfully or not.
    TargetFinished {
        target: String,
        ok: bool,
        new_messages: u64,
    },
}

/// Receives progress events from the engine.
pub trait ScrapeProgressReporter: Send + Sync {
    fn report(&self, event: ScrapeProgressEvent);
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ScrapeProgressReporter for NoProgress {
    fn report(&self, _event: ScrapeProgressEvent) {}
}
