//! Scrape progress reporting.
//!
//! Reports observable progress during `tgscrape scrape` so users see which
//! target is being processed and how many pages have landed. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use tgscrape_core::progress::{NoProgress, ScrapeProgressEvent, ScrapeProgressReporter};

/// Human-friendly progress on stderr: "scrape @news  page  200 new / 200 fetched  (1,800 left)".
pub struct StderrProgress;

impl ScrapeProgressReporter for StderrProgress {
    fn report(&self, event: ScrapeProgressEvent) {
        let line = match &event {
            ScrapeProgressEvent::TargetStarted {
                target,
                index,
                total,
            } => format!("scrape {}  [{}/{}]  starting\n", target, index, total),
            ScrapeProgressEvent::PageFetched {
                target,
                fetched,
                inserted,
                remaining,
            } => format!(
                "scrape {}  page  {} new / {} fetched  ({} left)\n",
                target,
                format_number(*inserted),
                format_number(*fetched),
                format_number(*remaining)
            ),
            ScrapeProgressEvent::TargetFinished {
                target,
                ok,
                new_messages,
            } => format!(
                "scrape {}  {}  {} new messages\n",
                target,
                if *ok { "done" } else { "FAILED" },
                format_number(*new_messages)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScrapeProgressReporter for JsonProgress {
    fn report(&self, event: ScrapeProgressEvent) {
        let obj = match &event {
            ScrapeProgressEvent::TargetStarted {
                target,
                index,
                total,
            } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "started",
                "index": index,
                "total": total
            }),
            ScrapeProgressEvent::PageFetched {
                target,
                fetched,
                inserted,
                remaining,
            } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "page",
                "fetched": fetched,
                "inserted": inserted,
                "remaining": remaining
            }),
            ScrapeProgressEvent::TargetFinished {
                target,
                ok,
                new_messages,
            } => serde_json::json!({
                "event": "progress",
                "target": target,
                "phase": "finished",
                "ok": ok,
                "new_messages": new_messages
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode to hand to the scrape engine.
    pub fn reporter(&self) -> Arc<dyn ScrapeProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
