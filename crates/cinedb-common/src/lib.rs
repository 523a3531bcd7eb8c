//! CineDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by the CineDB workspace members:
//!
//! - **Error Handling**: the common error and result types
//! - **Environment**: typed lookups of `.env` / process variables
//! - **Logging**: tracing subscriber bootstrap for binaries
//!
//! # Example
//!
//! ```no_run
//! use cinedb_common::env;
//! use cinedb_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     env::load_dotenv();
//!     init_logging(&LogConfig::from_env()?)?;
//!     let chunk_rows: usize = env::parse_or("CINEDB_CHUNK_ROWS", 100_000)?;
//!     tracing::info!(chunk_rows, "configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
