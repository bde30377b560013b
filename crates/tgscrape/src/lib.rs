//! # tgscrape
//!
//! Pull-based ingestion of channel message history into SQLite.
//!
//! This crate is the application layer around [`tgscrape_core`]: it loads
//! configuration, owns the SQLite schema and store, talks to the message
//! bridge over HTTP, and implements the `tgscrape` CLI commands.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection management |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | [`tgscrape_core::store::ScrapeStore`] over SQLite |
//! | [`source_http`] | [`tgscrape_core::source::MessageSource`] over the HTTP bridge |
//! | [`ingest`] | Scrape run orchestration and exit codes |
//! | [`progress`] | Human and JSON progress on stderr |
//! | [`stats`] | Per-target counts and run history |
//! | [`export`] | JSON and CSV message export |

pub mod config;
pub mod db;
pub mod export;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod source_http;
pub mod sqlite_store;
pub mod stats;
