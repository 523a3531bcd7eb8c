//! Source reader
//!
//! Resolves a [`SourceKind`] to a location (remote archive or local fixture),
//! fetches it when remote, and hands back a [`ChunkReader`] that yields
//! bounded chunks of typed rows with canonical column names, coerced types
//! and the `\N` sentinel mapped to `None`.

pub mod fetch;
pub mod fields;
pub mod reader;
pub mod rows;

use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{IngestConfig, SourceMode};
use crate::error::{IngestError, IngestResult};

pub use reader::{Chunk, ChunkReader};
pub use rows::{PersonRow, PrincipalRow, RatingRow, TitleRow};

/// The four source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Titles,
    Persons,
    Ratings,
    Principals,
}

impl SourceKind {
    /// Columns that must be present in the header
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Titles => &[
                "tconst",
                "titleType",
                "primaryTitle",
                "originalTitle",
                "isAdult",
                "startYear",
                "endYear",
                "runtimeMinutes",
                "genres",
            ],
            SourceKind::Persons => &[
                "nconst",
                "primaryName",
                "birthYear",
                "deathYear",
                "primaryProfession",
                "knownForTitles",
            ],
            SourceKind::Ratings => &["tconst", "averageRating", "numVotes"],
            SourceKind::Principals => {
                &["tconst", "ordering", "nconst", "category", "job", "characters"]
            },
        }
    }

    pub fn remote_file(&self) -> &'static str {
        match self {
            SourceKind::Titles => "title.basics.tsv.gz",
            SourceKind::Persons => "name.basics.tsv.gz",
            SourceKind::Ratings => "title.ratings.tsv.gz",
            SourceKind::Principals => "title.principals.tsv.gz",
        }
    }

    pub fn fixture_file(&self) -> &'static str {
        match self {
            SourceKind::Titles => "test_title.csv",
            SourceKind::Persons => "test_name.csv",
            SourceKind::Ratings => "test_rating.csv",
            SourceKind::Principals => "test_played_in.csv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Titles => "title.basics",
            SourceKind::Persons => "name.basics",
            SourceKind::Ratings => "title.ratings",
            SourceKind::Principals => "title.principals",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote { url: String },
    Local { path: PathBuf },
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Remote { url } => f.write_str(url),
            SourceLocation::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Opens sources according to the run's mode
pub struct SourceReader {
    config: IngestConfig,
    client: reqwest::Client,
}

impl SourceReader {
    pub fn new(config: &IngestConfig) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub fn location(&self, kind: SourceKind) -> SourceLocation {
        match self.config.mode {
            SourceMode::Remote => SourceLocation::Remote {
                url: format!("{}/{}", self.config.base_url.trim_end_matches('/'), kind.remote_file()),
            },
            SourceMode::Sample => SourceLocation::Local {
                path: self.config.fixture_dir.join(kind.fixture_file()),
            },
        }
    }

    fn delimiter(&self) -> u8 {
        match self.config.mode {
            SourceMode::Remote => b'\t',
            SourceMode::Sample => b';',
        }
    }

    /// Fetch (when remote) and open `kind` for chunked reading.
    pub async fn open<T: DeserializeOwned>(&self, kind: SourceKind) -> IngestResult<ChunkReader<T>> {
        let path = match self.location(kind) {
            SourceLocation::Local { path } => path,
            SourceLocation::Remote { url } => {
                let dest = self.config.download_dir.join(kind.remote_file());
                fetch::download(&self.client, &url, &dest, self.config.reuse_downloads).await?
            },
        };

        ChunkReader::open(kind, &path, self.delimiter(), self.config.chunk_rows)
    }
}
