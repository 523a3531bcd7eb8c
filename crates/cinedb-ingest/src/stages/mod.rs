//! Load stages
//!
//! A stage is one pass Reader → Filter → Resolver → Builder → Committer for
//! one entity or association type. The generic driver below owns that
//! loop; each stage module only supplies its filter and its resolution
//! step through [`StageLoader`].
//!
//! Per chunk a stage walks
//! `Reading → Filtering → Resolving → Committing → Reading`, ends in `Done`
//! once the source is exhausted and the buffer flushed, and can drop into
//! `Failed` from anywhere on a fatal error. A rejected commit does not leave
//! the loop.

mod actors;
mod cast;
mod known_for;
mod movies;
mod ratings;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

use crate::associations::AssociationBuilder;
use crate::committer::{BatchCommitter, ChunkOutcome, CommitStats};
use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::filter::RowFilter;
use crate::models::Table;
use crate::progress;
use crate::resolver::{ReferenceIndex, ReferenceResolver};
use crate::source::{SourceKind, SourceReader};
use crate::store::{ChangeSet, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Movies,
    Ratings,
    Actors,
    Cast,
    KnownFor,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Movies => "movies",
            StageKind::Ratings => "ratings",
            StageKind::Actors => "actors",
            StageKind::Cast => "cast",
            StageKind::KnownFor => "known_for",
        }
    }

    pub fn descriptor(self) -> StageDescriptor {
        match self {
            StageKind::Movies => StageDescriptor {
                kind: self,
                source: SourceKind::Titles,
                reads: &[],
                writes: &[Table::Movies, Table::Genres, Table::MovieGenre],
                uses_tags: true,
            },
            StageKind::Ratings => StageDescriptor {
                kind: self,
                source: SourceKind::Ratings,
                reads: &[Table::Movies],
                writes: &[Table::MovieRatings],
                uses_tags: false,
            },
            StageKind::Actors => StageDescriptor {
                kind: self,
                source: SourceKind::Persons,
                reads: &[],
                writes: &[Table::Actors],
                uses_tags: false,
            },
            StageKind::Cast => StageDescriptor {
                kind: self,
                source: SourceKind::Principals,
                reads: &[Table::Actors, Table::Movies],
                writes: &[Table::PlayedIn],
                uses_tags: false,
            },
            StageKind::KnownFor => StageDescriptor {
                kind: self,
                source: SourceKind::Persons,
                reads: &[Table::Actors, Table::Movies],
                writes: &[Table::PlayedIn],
                uses_tags: false,
            },
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "movies" => Ok(StageKind::Movies),
            "ratings" => Ok(StageKind::Ratings),
            "actors" => Ok(StageKind::Actors),
            "cast" => Ok(StageKind::Cast),
            "known_for" => Ok(StageKind::KnownFor),
            other => Err(IngestError::InvalidPlan(format!("unknown stage '{}'", other))),
        }
    }
}

/// What a stage consumes and produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub source: SourceKind,
    /// Tables that must be loaded before this stage runs
    pub reads: &'static [Table],
    pub writes: &'static [Table],
    /// Needs the genre dictionary
    pub uses_tags: bool,
}

impl StageDescriptor {
    /// What the resolver loads: referenced tables, the stage's own keyed
    /// tables (for duplicate detection) and `played_in` when the stage
    /// writes cast pairs. `movie_genre` pairs only ever belong to movies new
    /// to the stage, so they are not loaded.
    pub fn index_tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.reads.to_vec();
        for table in self
            .writes
            .iter()
            .filter(|t| t.is_keyed() || **t == Table::PlayedIn)
        {
            if !tables.contains(table) {
                tables.push(*table);
            }
        }
        tables
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Reading,
    Filtering,
    Resolving,
    Committing,
    Done,
    Failed(String),
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Done | StageState::Failed(_))
    }

    pub fn can_transition_to(&self, next: &StageState) -> bool {
        use StageState::*;
        match (self, next) {
            (Done, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (NotStarted, Reading) => true,
            // Committing straight from Reading is the final flush
            (Reading, Filtering | Committing | Done) => true,
            (Filtering, Resolving) => true,
            (Resolving, Committing) => true,
            (Committing, Reading | Done) => true,
            _ => false,
        }
    }
}

/// Counters and final state of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub state: StageState,
    pub chunks: usize,
    pub rows_read: usize,
    pub rows_malformed: usize,
    /// Decoded rows the filter dropped
    pub rows_filtered: usize,
    /// Rows or list entries naming an identifier the store does not have
    pub rows_unresolved: usize,
    /// Primary rows already present, and association pairs already emitted
    pub rows_duplicate: usize,
    pub rows_committed: u64,
    pub rows_failed: u64,
    pub commits: usize,
    pub failed_commits: usize,
    pub tags_created: usize,
    pub associations: usize,
    pub failure_samples: Vec<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            state: StageState::NotStarted,
            chunks: 0,
            rows_read: 0,
            rows_malformed: 0,
            rows_filtered: 0,
            rows_unresolved: 0,
            rows_duplicate: 0,
            rows_committed: 0,
            rows_failed: 0,
            commits: 0,
            failed_commits: 0,
            tags_created: 0,
            associations: 0,
            failure_samples: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == StageState::Done
    }

    fn transition(&mut self, next: StageState) {
        if !self.state.can_transition_to(&next) {
            warn!(stage = %self.stage, from = ?self.state, to = ?next, "Unexpected stage transition");
        }
        trace!(stage = %self.stage, state = ?next, "Stage state");
        self.state = next;
    }

    fn sync(&mut self, cx: &StageContext, stats: &CommitStats) {
        self.rows_unresolved = cx.unresolved;
        self.rows_duplicate = cx.duplicates + cx.associations.duplicates();
        self.associations = cx.associations.emitted();
        self.tags_created = cx.resolver.tags_created();
        self.rows_committed = stats.rows_committed;
        self.rows_failed = stats.rows_failed;
        self.commits = stats.commits;
        self.failed_commits = stats.failed_commits;
        self.failure_samples = stats.samples.clone();
    }
}

/// Mutable state threaded through a stage's resolution steps
pub(crate) struct StageContext {
    pub resolver: ReferenceResolver,
    pub associations: AssociationBuilder,
    pub unresolved: usize,
    pub duplicates: usize,
}

impl StageContext {
    fn new(mut index: ReferenceIndex) -> Self {
        let associations = AssociationBuilder::with_existing_cast(index.take_cast());
        Self {
            resolver: ReferenceResolver::new(index),
            associations,
            unresolved: 0,
            duplicates: 0,
        }
    }

    /// Genres of a rejected set are retried on their own. If the store
    /// refuses them again they are forgotten, so later chunks neither carry
    /// nor reference them. The committer buffer is empty after a flush, so
    /// no buffered row points at a forgotten id.
    async fn settle(
        &mut self,
        outcome: ChunkOutcome,
        committer: &mut BatchCommitter,
    ) -> IngestResult<()> {
        if outcome.is_success() || outcome.returned_tags.is_empty() {
            return Ok(());
        }

        let tags = outcome.returned_tags;
        let retry = committer.commit_tags(tags.clone()).await?;
        if !retry.is_success() {
            warn!(
                genres = ?tags.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
                "Genres rejected on their own, dropping them"
            );
            self.resolver.forget_tags(&tags);
        }
        Ok(())
    }
}

/// The per-stage part of the loop
pub(crate) trait StageLoader {
    /// Decoded source row
    type Row: DeserializeOwned + Send + 'static;
    /// Row that survived the filter
    type Kept;

    fn filter(&self, filter: &RowFilter, rows: Vec<Self::Row>) -> Vec<Self::Kept>;

    /// Resolve references and build the rows to commit. New tags are
    /// collected from the resolver by the driver.
    fn resolve(&self, kept: Vec<Self::Kept>, cx: &mut StageContext) -> ChangeSet;
}

/// Run `report.stage` to completion, updating `report` as it goes.
///
/// On a fatal error `report` keeps the counts reached so far and ends in
/// `Failed`.
pub async fn run_stage(
    store: &Arc<dyn Store>,
    source: &SourceReader,
    config: &IngestConfig,
    report: &mut StageReport,
) -> IngestResult<()> {
    let started = Instant::now();
    info!(stage = %report.stage, "Stage started");

    let result = match report.stage {
        StageKind::Movies => drive(movies::MoviesLoader, store, source, config, report).await,
        StageKind::Ratings => drive(ratings::RatingsLoader, store, source, config, report).await,
        StageKind::Actors => drive(actors::ActorsLoader, store, source, config, report).await,
        StageKind::Cast => drive(cast::CastLoader, store, source, config, report).await,
        StageKind::KnownFor => {
            drive(known_for::KnownForLoader, store, source, config, report).await
        },
    };
    report.elapsed = started.elapsed();

    match &result {
        Ok(()) => info!(
            stage = %report.stage,
            elapsed_secs = report.elapsed.as_secs_f64(),
            rows_read = report.rows_read,
            rows_filtered = report.rows_filtered,
            rows_unresolved = report.rows_unresolved,
            rows_duplicate = report.rows_duplicate,
            rows_committed = report.rows_committed,
            rows_failed = report.rows_failed,
            "Stage complete"
        ),
        Err(e) => {
            report.transition(StageState::Failed(e.to_string()));
        },
    }

    result
}

async fn drive<L: StageLoader>(
    loader: L,
    store: &Arc<dyn Store>,
    source: &SourceReader,
    config: &IngestConfig,
    report: &mut StageReport,
) -> IngestResult<()> {
    let kind = report.stage;
    let descriptor = kind.descriptor();

    let index =
        ReferenceIndex::load(store.as_ref(), &descriptor.index_tables(), descriptor.uses_tags)
            .await?;
    let filter = RowFilter::new(&config.filters);
    let mut cx = StageContext::new(index);
    let mut committer = BatchCommitter::new(Arc::clone(store), config.commit_rows(kind));

    report.transition(StageState::Reading);
    let mut reader = source.open::<L::Row>(descriptor.source).await?;
    let spinner = progress::chunk_spinner(kind.as_str());

    loop {
        let chunk = match reader.read_chunk().await {
            Ok(Some((chunk, rest))) => {
                reader = rest;
                chunk
            },
            Ok(None) => break,
            Err(e) => {
                spinner.abandon();
                return Err(e);
            },
        };
        report.chunks += 1;
        report.rows_read += chunk.rows_read();
        report.rows_malformed += chunk.malformed;

        report.transition(StageState::Filtering);
        let decoded = chunk.rows.len();
        let kept = loader.filter(&filter, chunk.rows);
        report.rows_filtered += decoded - kept.len();

        report.transition(StageState::Resolving);
        let mut changes = loader.resolve(kept, &mut cx);
        changes.genres.extend(cx.resolver.take_pending_tags());

        report.transition(StageState::Committing);
        if let Some(outcome) = committer.push(changes).await? {
            cx.settle(outcome, &mut committer).await?;
        }
        report.sync(&cx, committer.stats());

        spinner.set_message(format!(
            "chunk {} | {} rows read | {} committed",
            chunk.index + 1,
            report.rows_read,
            report.rows_committed
        ));
        report.transition(StageState::Reading);
    }

    report.transition(StageState::Committing);
    if let Some(outcome) = committer.finish().await? {
        cx.settle(outcome, &mut committer).await?;
    }
    report.sync(&cx, committer.stats());
    spinner.finish_and_clear();

    report.transition(StageState::Done);
    Ok(())
}
