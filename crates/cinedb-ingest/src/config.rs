//! Ingestion configuration
//!
//! A run is either against the production remote datasets or against the
//! small local fixtures. The mode also picks the read chunk size and the
//! per-stage commit intervals.

use cinedb_common::env;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{IngestError, IngestResult};
use crate::stages::StageKind;

// ============================================================================
// Defaults
// ============================================================================

/// Public dataset host.
pub const DEFAULT_BASE_URL: &str = "https://datasets.imdbws.com";

/// Directory holding the small-sample fixtures.
pub const DEFAULT_FIXTURE_DIR: &str = "test_small_db";

/// Where remote archives are downloaded before decoding.
pub const DEFAULT_DOWNLOAD_DIR: &str = "./data/downloads";

/// Rows per read chunk against the remote sources.
pub const REMOTE_CHUNK_ROWS: usize = 100_000;

/// Rows per read chunk against the fixtures.
pub const SAMPLE_CHUNK_ROWS: usize = 3;

/// Remote downloads are large (the principals archive is several hundred MB).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 1800;

pub const DEFAULT_MIN_BIRTH_YEAR: i32 = 1940;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Compressed TSV files from the dataset host
    Remote,
    /// `;`-separated fixture files from `fixture_dir`
    Sample,
}

/// Where cast membership comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CastSource {
    /// `title.principals`: one row per credited person per title
    #[default]
    Principals,
    /// `knownForTitles` list on each person row
    KnownFor,
}

impl std::str::FromStr for CastSource {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "principals" => Ok(CastSource::Principals),
            "known-for" => Ok(CastSource::KnownFor),
            other => Err(IngestError::Config(format!("unknown cast source '{}'", other))),
        }
    }
}

/// Predicates applied by the row filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Title kind kept by the movies stage
    pub title_kind: String,
    /// Persons born before this year are dropped
    pub min_birth_year: i32,
    /// A person is kept when any of these appears in the profession list
    pub professions: Vec<String>,
    /// Principal categories treated as cast (case-insensitive)
    pub cast_categories: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            title_kind: "movie".to_string(),
            min_birth_year: DEFAULT_MIN_BIRTH_YEAR,
            professions: vec!["actor".to_string(), "actress".to_string()],
            cast_categories: vec!["actor".to_string(), "actress".to_string()],
        }
    }
}

/// Buffered rows before a commit, per stage. `0` commits every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIntervals {
    pub movies: usize,
    pub ratings: usize,
    pub actors: usize,
    pub cast: usize,
    pub known_for: usize,
}

impl CommitIntervals {
    pub fn remote() -> Self {
        Self {
            movies: 50_000,
            ratings: 100_000,
            actors: 100_000,
            cast: 0,
            known_for: 0,
        }
    }

    pub fn every_chunk() -> Self {
        Self {
            movies: 0,
            ratings: 0,
            actors: 0,
            cast: 0,
            known_for: 0,
        }
    }

    pub fn for_stage(&self, stage: StageKind) -> usize {
        match stage {
            StageKind::Movies => self.movies,
            StageKind::Ratings => self.ratings,
            StageKind::Actors => self.actors,
            StageKind::Cast => self.cast,
            StageKind::KnownFor => self.known_for,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub mode: SourceMode,
    pub base_url: String,
    pub fixture_dir: PathBuf,
    pub download_dir: PathBuf,
    /// Skip the download when the archive is already in `download_dir`
    pub reuse_downloads: bool,
    pub http_timeout_secs: u64,
    pub chunk_rows: usize,
    pub commit: CommitIntervals,
    pub filters: FilterConfig,
    pub cast_source: CastSource,
}

impl IngestConfig {
    /// Production datasets
    pub fn remote() -> Self {
        Self {
            mode: SourceMode::Remote,
            base_url: DEFAULT_BASE_URL.to_string(),
            fixture_dir: PathBuf::from(DEFAULT_FIXTURE_DIR),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            reuse_downloads: true,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            chunk_rows: REMOTE_CHUNK_ROWS,
            commit: CommitIntervals::remote(),
            filters: FilterConfig::default(),
            cast_source: CastSource::default(),
        }
    }

    /// Small local fixtures
    pub fn sample(fixture_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: SourceMode::Sample,
            fixture_dir: fixture_dir.into(),
            chunk_rows: SAMPLE_CHUNK_ROWS,
            commit: CommitIntervals::every_chunk(),
            ..Self::remote()
        }
    }

    /// Build from `CINEDB_*` variables (after loading `.env`).
    ///
    /// - `CINEDB_SAMPLE`: use the fixtures instead of the remote datasets
    /// - `CINEDB_BASE_URL`, `CINEDB_FIXTURE_DIR`, `CINEDB_DOWNLOAD_DIR`
    /// - `CINEDB_REUSE_DOWNLOADS`, `CINEDB_HTTP_TIMEOUT`
    /// - `CINEDB_CHUNK_ROWS`: override the mode's chunk size
    /// - `CINEDB_MIN_BIRTH_YEAR`, `CINEDB_PROFESSIONS`
    /// - `CINEDB_CAST_SOURCE`: `principals` or `known-for`
    pub fn from_env() -> IngestResult<Self> {
        env::load_dotenv();

        let mut config = if env::flag_or("CINEDB_SAMPLE", false)? {
            Self::sample(env::string_or("CINEDB_FIXTURE_DIR", DEFAULT_FIXTURE_DIR))
        } else {
            Self::remote()
        };

        config.base_url = env::string_or("CINEDB_BASE_URL", &config.base_url);
        config.download_dir = env::string_or("CINEDB_DOWNLOAD_DIR", DEFAULT_DOWNLOAD_DIR).into();
        config.reuse_downloads = env::flag_or("CINEDB_REUSE_DOWNLOADS", config.reuse_downloads)?;
        config.http_timeout_secs = env::parse_or("CINEDB_HTTP_TIMEOUT", config.http_timeout_secs)?;
        config.chunk_rows = env::parse_or("CINEDB_CHUNK_ROWS", config.chunk_rows)?;
        config.filters.min_birth_year =
            env::parse_or("CINEDB_MIN_BIRTH_YEAR", config.filters.min_birth_year)?;
        config.filters.professions = env::list_or("CINEDB_PROFESSIONS", &["actor", "actress"]);
        if let Some(source) = env::var("CINEDB_CAST_SOURCE") {
            config.cast_source = source.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_rows(mut self, rows: usize) -> Self {
        self.chunk_rows = rows;
        self
    }

    pub fn with_commit_intervals(mut self, commit: CommitIntervals) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_cast_source(mut self, source: CastSource) -> Self {
        self.cast_source = source;
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn commit_rows(&self, stage: StageKind) -> usize {
        self.commit.for_stage(stage)
    }

    pub fn is_sample(&self) -> bool {
        self.mode == SourceMode::Sample
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.chunk_rows == 0 {
            return Err(IngestError::Config("chunk_rows must be greater than 0".into()));
        }
        if self.mode == SourceMode::Remote && self.base_url.trim().is_empty() {
            return Err(IngestError::Config("base_url cannot be empty".into()));
        }
        if self.filters.title_kind.trim().is_empty() {
            return Err(IngestError::Config("title_kind cannot be empty".into()));
        }
        if self.filters.professions.is_empty() {
            tracing::warn!("No professions configured - the actors stage will keep nobody");
        }
        Ok(())
    }
}
