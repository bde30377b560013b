//! # tgscrape CLI
//!
//! The `tgscrape` binary scrapes message history for a list of targets into
//! a local SQLite database, resuming from where the previous run stopped.
//!
//! ## Usage
//!
//! ```bash
//! tgscrape --config ./config/tgscrape.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tgscrape init` | Create the SQLite database and schema |
//! | `tgscrape scrape` | Fetch new messages for every configured target |
//! | `tgscrape scrape --backfill` | Walk history backward instead |
//! | `tgscrape scrape --dry-run` | Resolve targets and show cursors only |
//! | `tgscrape stats` | Per-target counts and recent runs |
//! | `tgscrape export` | Dump all messages as JSON or CSV |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! tgscrape init
//!
//! # Incremental scrape of a single target
//! tgscrape scrape --target @durov
//!
//! # Export everything as CSV
//! tgscrape export --format csv --out ./exports/messages.csv
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tgscrape::config;
use tgscrape::export::{self, ExportFormat};
use tgscrape::ingest::{self, ScrapeOptions};
use tgscrape::migrate;
use tgscrape::progress::ProgressMode;
use tgscrape::stats;

/// Incremental and backfill scraping of channel history into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tgscrape.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tgscrape",
    about = "Incremental and backfill scraping of channel message history into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "TGSCRAPE_CONFIG",
        default_value = "./config/tgscrape.toml"
    )]
    config: PathBuf,

    /// Override the database path from the config.
    #[arg(long, global = true, env = "TGSCRAPE_DB")]
    db: Option<PathBuf>,

    /// Dotenv file with bridge credentials. Existing variables take precedence.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the targets, messages, and
    /// scrape_runs tables. Running it multiple times is safe.
    Init,

    /// Scrape messages for the configured targets.
    ///
    /// Incremental by default: fetches only messages newer than each
    /// target's stored cursor. Exits with status 2 when any target failed.
    Scrape {
        /// Scrape only this target (`@handle`, `handle`, or a t.me link).
        #[arg(long)]
        target: Option<String>,

        /// Walk history backward from the newest (or last backfilled) message.
        #[arg(long)]
        backfill: bool,

        /// Resolve targets and print their cursors without fetching or writing messages.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show per-target message counts and the most recent runs.
    Stats,

    /// Export all stored messages.
    Export {
        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file. Writes to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tgscrape=info,tgscrape_core=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    if cli.env_file.exists() {
        dotenvy::from_path(&cli.env_file)?;
    }

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(db) = cli.db {
        cfg.db.path = db;
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Scrape {
            target,
            backfill,
            dry_run,
            progress,
        } => {
            let options = ScrapeOptions {
                target,
                backfill,
                dry_run,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            let code = ingest::run_scrape(&cfg, &options).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { format, out } => {
            export::run_export(&cfg, format, out.as_deref()).await?;
        }
    }

    Ok(())
}
