//! Fatal error taxonomy for the ingestion pipeline
//!
//! Only errors that end a stage (or the whole run) live here. A rejected
//! commit is not an error at this level: it is reported as a failed
//! [`ChunkOutcome`](crate::committer::ChunkOutcome), and an unresolved
//! reference is just a counter on the stage report.

use thiserror::Error;

use crate::store::StoreError;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Remote fetch returned a non-success status, or a local file could not be read
    #[error("Source unavailable: {location} ({reason})")]
    SourceUnavailable { location: String, reason: String },

    /// Expected columns are missing from a source header
    #[error("Schema mismatch in {source_name}: missing columns {missing:?}")]
    SchemaMismatch {
        source_name: String,
        missing: Vec<String>,
    },

    /// Target store unreachable while building indexes or committing
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stage reads a table that a later stage in the plan writes
    #[error("Invalid stage plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn source_unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => IngestError::StoreUnavailable(reason),
            StoreError::Rejected(reason) => {
                IngestError::StoreUnavailable(format!("unexpected rejection: {}", reason))
            },
        }
    }
}

impl From<cinedb_common::CommonError> for IngestError {
    fn from(err: cinedb_common::CommonError) -> Self {
        IngestError::Config(err.to_string())
    }
}
