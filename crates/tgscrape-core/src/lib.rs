//! # tgscrape core
//!
//! Shared logic for tgscrape: data models, the message source port, the
//! rate/backoff policy, the store abstraction, and the scrape engine that
//! drives paginated ingestion.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Sleeping is
//! abstracted behind [`policy::Sleeper`] so the engine can be driven by a
//! real runtime or by a recording fake in tests.

pub mod models;
pub mod normalize;
pub mod policy;
pub mod progress;
pub mod scrape;
pub mod source;
pub mod store;
pub mod target;
