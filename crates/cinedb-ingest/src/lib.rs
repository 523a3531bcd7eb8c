//! CineDB Ingest Library
//!
//! Batch loader for the public movie datasets: titles, persons, ratings and
//! cast membership are streamed in bounded chunks, filtered, resolved
//! against what is already stored and committed in batches.
//!
//! # Pipeline
//!
//! - [`source`]: fetch and decode a source into typed row chunks
//! - [`filter`]: keep the rows the catalogue cares about
//! - [`resolver`]: committed identifiers and the genre dictionary
//! - [`associations`]: expand multi-value fields into association rows
//! - [`committer`]: buffered, transactional writes with per-chunk outcomes
//! - [`orchestrator`]: runs the stages in dependency order
//!
//! # Example
//!
//! ```no_run
//! use cinedb_ingest::{IngestConfig, MemoryStore, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let orchestrator = Orchestrator::new(store, IngestConfig::sample("test_small_db"))?;
//!     let report = orchestrator.run_default().await?;
//!     println!("{} rows committed", report.rows_committed());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod associations;
pub mod committer;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod source;
pub mod stages;
pub mod store;

pub use config::{CastSource, IngestConfig, SourceMode};
pub use error::{IngestError, IngestResult};
pub use orchestrator::{default_plan, Orchestrator, RunAborted, RunReport};
pub use stages::{StageKind, StageReport, StageState};
pub use store::{MemoryStore, PgStore, PgStoreConfig, Store};
