//! End-to-end runs over the small fixtures on the in-memory store

use async_trait::async_trait;
use cinedb_ingest::committer::BatchCommitter;
use cinedb_ingest::models::{Movie, MovieRating, PlayedIn, Table};
use cinedb_ingest::store::{ChangeSet, IntegrityReport, StoreError, StoreResult};
use cinedb_ingest::{
    CastSource, IngestConfig, IngestError, MemoryStore, Orchestrator, StageKind, StageState, Store,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FIXTURE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../test_small_db");

fn sample_config() -> IngestConfig {
    IngestConfig::sample(FIXTURE_DIR)
}

fn orchestrator(store: &Arc<MemoryStore>, config: IngestConfig) -> Orchestrator {
    Orchestrator::new(store.clone(), config).unwrap()
}

fn movie(id: &str) -> Movie {
    Movie {
        tconst: id.to_string(),
        primary_title: Some(format!("Title {}", id)),
        original_title: None,
        is_adult: Some(false),
        start_year: Some(2001),
        run_time_minutes: Some(100),
    }
}

#[tokio::test]
async fn test_full_run_loads_fixtures() {
    let store = Arc::new(MemoryStore::new());
    let report = orchestrator(&store, sample_config()).run_default().await.unwrap();

    assert_eq!(report.stages.len(), 4);
    assert!(report.stages.iter().all(|s| s.state == StageState::Done));
    assert!(!report.has_failures());

    // 3 movies out of 5 titles
    let movies = report.stage(StageKind::Movies).unwrap();
    assert_eq!(movies.rows_read, 5);
    assert_eq!(movies.rows_filtered, 2);
    assert_eq!(movies.tags_created, 3);
    assert_eq!(movies.chunks, 2);
    let ids: Vec<String> = store.movies().into_iter().map(|m| m.tconst).collect();
    assert_eq!(ids, vec!["tt0000002", "tt0000003", "tt0000005"]);

    // invalid runtime literal becomes null, the row is kept
    let groundhog = store.movies().into_iter().find(|m| m.tconst == "tt0000005").unwrap();
    assert_eq!(groundhog.run_time_minutes, None);
    assert_eq!(groundhog.is_adult, Some(false));

    // ratings for the short and the unknown title are dropped
    let ratings = report.stage(StageKind::Ratings).unwrap();
    assert_eq!(ratings.rows_unresolved, 2);
    assert_eq!(store.ratings().len(), 3);
    assert!(store.ratings().iter().all(|r| r.tconst != "tt9999999"));

    let actors = report.stage(StageKind::Actors).unwrap();
    assert_eq!(actors.rows_filtered, 3);
    let names: Vec<String> = store.actors().into_iter().map(|a| a.nconst).collect();
    assert_eq!(names, vec!["nm0000001", "nm0000002", "nm0000005"]);

    let cast = report.stage(StageKind::Cast).unwrap();
    assert_eq!(cast.rows_filtered, 1);
    assert_eq!(cast.rows_unresolved, 3);
    assert_eq!(cast.rows_duplicate, 1);
    assert_eq!(cast.associations, 3);
    assert_eq!(store.count(Table::PlayedIn).await.unwrap(), 3);
}

#[tokio::test]
async fn test_genres_are_created_once_and_reused() {
    let store = Arc::new(MemoryStore::new());
    orchestrator(&store, sample_config())
        .run(&[StageKind::Movies])
        .await
        .unwrap();

    let genres = store.genres();
    let names: HashSet<&str> = genres.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(genres.len(), 3);
    assert_eq!(names, HashSet::from(["Action", "Drama", "Comedy"]));

    let ids: HashSet<i32> = genres.iter().map(|g| g.id).collect();
    assert_eq!(ids.len(), 3);

    let drama = genres.iter().find(|g| g.name == "Drama").unwrap().id;
    let links = store.movie_genres();
    assert_eq!(links.len(), 4);
    let drama_movies: Vec<&str> = links
        .iter()
        .filter(|mg| mg.genre == drama)
        .map(|mg| mg.movie.as_str())
        .collect();
    assert_eq!(drama_movies, vec!["tt0000002", "tt0000003"]);

    // shorts contribute no genres
    assert!(!names.contains("Short"));
    assert!(!names.contains("Animation"));
}

#[tokio::test]
async fn test_known_for_cast_source() {
    let store = Arc::new(MemoryStore::new());
    let config = sample_config().with_cast_source(CastSource::KnownFor);
    let report = orchestrator(&store, config).run_default().await.unwrap();

    let known_for = report.stage(StageKind::KnownFor).unwrap();
    assert!(report.stage(StageKind::Cast).is_none());
    assert_eq!(known_for.associations, 4);
    assert_eq!(known_for.rows_unresolved, 1);
    assert_eq!(known_for.rows_duplicate, 1);

    let pairs: HashSet<PlayedIn> = store.played_in().into_iter().collect();
    assert!(pairs.contains(&PlayedIn {
        actor: "nm0000001".into(),
        movie: "tt0000005".into()
    }));
    assert_eq!(pairs.len(), 4);
}

#[tokio::test]
async fn test_no_dangling_references_after_run() {
    let store = Arc::new(MemoryStore::new());
    orchestrator(&store, sample_config()).run_default().await.unwrap();

    let integrity = store.integrity_report().await.unwrap();
    assert!(integrity.is_clean(), "{integrity:?}");

    let movies: HashSet<String> = store.movies().into_iter().map(|m| m.tconst).collect();
    let actors: HashSet<String> = store.actors().into_iter().map(|a| a.nconst).collect();
    assert!(store
        .played_in()
        .iter()
        .all(|p| movies.contains(&p.movie) && actors.contains(&p.actor)));
}

#[tokio::test]
async fn test_rerunning_a_stage_creates_no_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, sample_config());

    orchestrator.run(&[StageKind::Movies]).await.unwrap();
    let rerun = orchestrator.run(&[StageKind::Movies]).await.unwrap();

    let movies = rerun.stage(StageKind::Movies).unwrap();
    assert_eq!(movies.rows_duplicate, 3);
    assert_eq!(movies.rows_committed, 0);
    assert_eq!(movies.tags_created, 0);
    assert_eq!(movies.rows_failed, 0);
    assert_eq!(store.count(Table::Movies).await.unwrap(), 3);
    assert_eq!(store.count(Table::Genres).await.unwrap(), 3);
}

#[tokio::test]
async fn test_buffered_commits_match_per_chunk_commits() {
    let store = Arc::new(MemoryStore::new());
    let config = sample_config()
        .with_commit_intervals(cinedb_ingest::config::CommitIntervals::remote());
    let report = orchestrator(&store, config).run_default().await.unwrap();

    // the fixtures fit in one buffer; cast still commits every chunk
    for kind in [StageKind::Movies, StageKind::Ratings, StageKind::Actors] {
        assert_eq!(report.stage(kind).unwrap().commits, 1, "{kind}");
    }
    assert_eq!(report.stage(StageKind::Cast).unwrap().commits, 2);
    assert_eq!(store.count(Table::Movies).await.unwrap(), 3);
    assert_eq!(store.count(Table::MovieGenre).await.unwrap(), 4);
    assert_eq!(store.count(Table::PlayedIn).await.unwrap(), 3);
}

#[tokio::test]
async fn test_rejected_chunk_does_not_stop_the_stream() {
    let store = Arc::new(MemoryStore::new());
    let mut committer = BatchCommitter::new(store.clone(), 0);

    let chunk1 = ChangeSet {
        movies: vec![movie("tt1"), movie("tt2")],
        ..Default::default()
    };
    // rating for a movie that does not exist
    let chunk2 = ChangeSet {
        movies: vec![movie("tt3")],
        ratings: vec![MovieRating {
            tconst: "tt404".into(),
            average_rating: Some(4.2),
            num_votes: Some(10),
        }],
        ..Default::default()
    };
    let chunk3 = ChangeSet {
        movies: vec![movie("tt4")],
        ..Default::default()
    };

    let first = committer.push(chunk1).await.unwrap().unwrap();
    let second = committer.push(chunk2).await.unwrap().unwrap();
    let third = committer.push(chunk3).await.unwrap().unwrap();

    assert!(first.is_success());
    assert!(!second.is_success());
    assert!(third.is_success());

    let stats = committer.stats();
    assert_eq!(stats.rows_committed, 3);
    assert_eq!(stats.rows_failed, 2);
    assert_eq!(stats.failed_commits, 1);
    assert!(stats.samples.contains(&"movies(tt3)".to_string()));

    let ids: Vec<String> = store.movies().into_iter().map(|m| m.tconst).collect();
    assert_eq!(ids, vec!["tt1", "tt2", "tt4"]);
}

/// Rejects the writes `reject` picks (by call number and content),
/// delegates everything else
struct RejectingStore {
    inner: MemoryStore,
    reject: fn(usize, &ChangeSet) -> bool,
    applies: AtomicUsize,
}

impl RejectingStore {
    fn new(reject: fn(usize, &ChangeSet) -> bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject,
            applies: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for RejectingStore {
    async fn load_keys(&self, table: Table) -> StoreResult<HashSet<String>> {
        self.inner.load_keys(table).await
    }

    async fn load_tags(&self) -> StoreResult<HashMap<String, i32>> {
        self.inner.load_tags().await
    }

    async fn load_cast(&self) -> StoreResult<HashSet<PlayedIn>> {
        self.inner.load_cast().await
    }

    async fn apply(&self, changes: &ChangeSet) -> StoreResult<u64> {
        let call = self.applies.fetch_add(1, Ordering::SeqCst);
        if (self.reject)(call, changes) {
            return Err(StoreError::Rejected("value too long for type".into()));
        }
        self.inner.apply(changes).await
    }

    async fn count(&self, table: Table) -> StoreResult<u64> {
        self.inner.count(table).await
    }

    async fn integrity_report(&self) -> StoreResult<IntegrityReport> {
        self.inner.integrity_report().await
    }
}

#[tokio::test]
async fn test_genres_from_rejected_commit_are_retried_on_their_own() {
    let store = Arc::new(RejectingStore::new(|call, _| call == 0));

    // chunk 1 (Heat, The Piano) is rejected, its genres land in a retry,
    // chunk 2 (Groundhog Day) lands
    let report = Orchestrator::new(store.clone(), sample_config())
        .unwrap()
        .run(&[StageKind::Movies])
        .await
        .unwrap();

    let movies = report.stage(StageKind::Movies).unwrap();
    assert_eq!(movies.failed_commits, 1);
    assert_eq!(movies.commits, 2);
    assert_eq!(movies.state, StageState::Done);
    // 2 movies + 3 movie_genre rows lost; Action and Drama counted once, as committed
    assert_eq!(movies.rows_failed, 5);
    assert_eq!(movies.rows_committed, 5);

    let ids: Vec<String> = store.inner.movies().into_iter().map(|m| m.tconst).collect();
    assert_eq!(ids, vec!["tt0000005"]);

    let names: HashSet<String> = store.inner.genres().into_iter().map(|g| g.name).collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains("Drama"));
    assert_eq!(store.inner.movie_genres().len(), 1);
    assert!(store.integrity_report().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_refused_genre_only_costs_its_own_chunk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("test_title.csv"),
        "tconst;titleType;primaryTitle;originalTitle;isAdult;startYear;endYear;runtimeMinutes;genres\n\
         tt1;movie;A;A;0;2000;\\N;90;Bad\n\
         tt2;movie;B;B;0;2000;\\N;90;\\N\n\
         tt3;movie;C;C;0;2000;\\N;90;\\N\n\
         tt4;movie;D;D;0;2000;\\N;90;Drama\n",
    )
    .unwrap();

    let store = Arc::new(RejectingStore::new(|_, changes| {
        changes.genres.iter().any(|g| g.name == "Bad")
    }));
    let config = IngestConfig::sample(dir.path()).with_chunk_rows(1);
    let report = Orchestrator::new(store.clone(), config)
        .unwrap()
        .run(&[StageKind::Movies])
        .await
        .unwrap();

    let movies = report.stage(StageKind::Movies).unwrap();
    assert_eq!(movies.chunks, 4);
    // chunk 1 and the genre retry
    assert_eq!(movies.failed_commits, 2);
    assert_eq!(movies.rows_failed, 3);
    assert_eq!(movies.commits, 3);
    assert_eq!(movies.rows_committed, 5);

    let ids: Vec<String> = store.inner.movies().into_iter().map(|m| m.tconst).collect();
    assert_eq!(ids, vec!["tt2", "tt3", "tt4"]);
    let genres = store.inner.genres();
    assert_eq!(genres.len(), 1);
    assert_eq!(genres[0].name, "Drama");
    assert!(store.integrity_report().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_known_for_after_cast_skips_committed_pairs() {
    let store = Arc::new(MemoryStore::new());
    let report = orchestrator(&store, sample_config())
        .run(&[
            StageKind::Movies,
            StageKind::Ratings,
            StageKind::Actors,
            StageKind::Cast,
            StageKind::KnownFor,
        ])
        .await
        .unwrap();

    let known_for = report.stage(StageKind::KnownFor).unwrap();
    assert_eq!(known_for.failed_commits, 0);
    assert_eq!(known_for.associations, 1);
    // three pairs from the cast stage, one repeated within the list
    assert_eq!(known_for.rows_duplicate, 4);
    assert!(!report.has_failures());

    let pairs: HashSet<PlayedIn> = store.played_in().into_iter().collect();
    assert_eq!(pairs.len(), 4);
    assert!(pairs.contains(&PlayedIn {
        actor: "nm0000001".into(),
        movie: "tt0000005".into()
    }));
}

#[tokio::test]
async fn test_store_outage_aborts_remaining_stages() {
    let store = Arc::new(MemoryStore::new());
    store.set_available(false);

    let aborted = orchestrator(&store, sample_config()).run_default().await.unwrap_err();

    assert_eq!(aborted.stage, Some(StageKind::Movies));
    assert!(matches!(aborted.error, IngestError::StoreUnavailable(_)));
    assert_eq!(aborted.report.stages.len(), 1);
    assert!(matches!(aborted.report.stages[0].state, StageState::Failed(_)));
}

#[tokio::test]
async fn test_invalid_plan_is_rejected_before_running() {
    let store = Arc::new(MemoryStore::new());
    let aborted = orchestrator(&store, sample_config())
        .run(&[StageKind::Cast, StageKind::Movies])
        .await
        .unwrap_err();

    assert!(matches!(aborted.error, IngestError::InvalidPlan(_)));
    assert!(aborted.report.stages.is_empty());
    assert_eq!(store.count(Table::Movies).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_fixture_is_source_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let config = IngestConfig::sample("/nonexistent/fixtures");
    let aborted = orchestrator(&store, config).run_default().await.unwrap_err();

    assert!(matches!(aborted.error, IngestError::SourceUnavailable { .. }));
    assert_eq!(aborted.stage, Some(StageKind::Movies));
}

#[tokio::test]
async fn test_run_report_serializes() {
    let store = Arc::new(MemoryStore::new());
    let report = orchestrator(&store, sample_config()).run_default().await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stages"][0]["stage"], "movies");
    assert_eq!(json["stages"][3]["state"], "done");
    assert!(json["run_id"].is_string());
}
