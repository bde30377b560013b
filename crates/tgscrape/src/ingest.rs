//! Scrape run orchestration.
//!
//! Wires the configured bridge source, the SQLite store, and a tokio-backed
//! sleeper into the core [`Scraper`], runs it over the selected targets,
//! records the run summary, and prints it.
//!
//! Exit codes: `0` when every target succeeded, [`EXIT_DEGRADED`] when at
//! least one failed.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use tgscrape_core::models::{RunMode, RunSummary};
use tgscrape_core::policy::Sleeper;
use tgscrape_core::scrape::Scraper;
use tgscrape_core::store::ScrapeStore;
use tgscrape_core::target::normalize_target;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::progress::ProgressMode;
use crate::source_http::HttpMessageSource;
use crate::sqlite_store::SqliteStore;

/// Exit code for a run where at least one target failed.
pub const EXIT_DEGRADED: i32 = 2;

/// Non-blocking sleeper on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Options for one `tgscrape scrape` invocation.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Only scrape this target; it need not be in the config.
    pub target: Option<String>,
    pub backfill: bool,
    pub dry_run: bool,
    pub progress: ProgressMode,
}

impl ScrapeOptions {
    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.backfill {
            RunMode::Backfill
        } else {
            RunMode::Incremental
        }
    }
}

/// Run a scrape and return the process exit code.
pub async fn run_scrape(config: &Config, options: &ScrapeOptions) -> Result<i32> {
    let target_filter = options
        .target
        .as_deref()
        .map(normalize_target)
        .transpose()?;
    if target_filter.is_none() && config.targets.is_empty() {
        bail!("No targets configured. Add `targets = [...]` to the config or pass --target.");
    }

    let source = Arc::new(HttpMessageSource::from_config(&config.source)?);

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));

    let scraper = Scraper::new(
        source,
        store.clone(),
        Arc::new(TokioSleeper),
        config.scrape.to_settings(),
    )
    .with_progress(options.progress.reporter());

    let cancel = scraper.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current target");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mode = options.mode();
    info!(
        mode = %mode,
        targets = config.targets.len(),
        target_filter = ?target_filter,
        "Starting scrape run"
    );
    let summary = scraper
        .run(&config.targets, target_filter.as_deref(), mode)
        .await;
    ctrl_c.abort();

    let run_id = store.record_run(&summary).await?;
    info!(
        run_id,
        targets_ok = summary.targets_ok,
        targets_failed = summary.targets_failed,
        messages_new = summary.messages_new,
        "Scrape run recorded"
    );

    print_summary(&summary);

    pool.close().await;
    Ok(if summary.is_degraded() {
        EXIT_DEGRADED
    } else {
        0
    })
}

fn print_summary(summary: &RunSummary) {
    println!("scrape {}", summary.mode);
    println!(
        "  targets ok: {}/{}",
        summary.targets_ok, summary.targets_total
    );
    println!("  targets failed: {}", summary.targets_failed);
    println!("  new messages: {}", summary.messages_new);
    println!("  flood waits: {}", summary.flood_waits);
    println!("  started_at: {}", summary.started_at.to_rfc3339());
    if let Some(finished) = summary.finished_at {
        println!("  finished_at: {}", finished.to_rfc3339());
    }
    if summary.cancelled {
        println!("  cancelled: yes");
    }

    if !summary.failures.is_empty() {
        println!();
        println!("  failed targets:");
        for failure in &summary.failures {
            println!("    {}  {}", failure.target, failure.error);
        }
    }

    if summary.mode == RunMode::DryRun {
        println!();
        println!("  dry run target state:");
        for item in &summary.dry_run_items {
            println!(
                "    target={} resolved={} target_id={} last_message_id={}",
                item.input_target,
                item.resolved_name(),
                item.resolved_target_id,
                item.last_message_id
            );
        }
    }
}
