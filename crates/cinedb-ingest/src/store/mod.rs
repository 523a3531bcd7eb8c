//! Target store
//!
//! The relational contract (four base tables, two association tables) sits
//! behind the [`Store`] trait. The pipeline only ever reads key sets, cast
//! pairs and the genre dictionary, and writes whole [`ChangeSet`]s, each one
//! transaction.
//!
//! - [`PgStore`]: Postgres through sqlx, the production target
//! - [`MemoryStore`]: same constraints in process, for tests and dry runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::models::{Actor, Genre, Movie, MovieGenre, MovieRating, PlayedIn, Table};

pub use memory::MemoryStore;
pub use postgres::{PgStore, PgStoreConfig};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, pool or transport failure. Fatal to the run.
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// The store refused the write (constraint or data error). The commit
    /// unit is skipped and the run continues.
    #[error("write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Rejected(_))
    }
}

/// Rows written together in one transaction.
///
/// Stores insert the tables in dependency order: genres, movies, actors,
/// ratings, then the association tables, so a set may carry new genres
/// alongside the `movie_genre` rows that reference them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub genres: Vec<Genre>,
    pub movies: Vec<Movie>,
    pub actors: Vec<Actor>,
    pub ratings: Vec<MovieRating>,
    pub movie_genres: Vec<MovieGenre>,
    pub played_in: Vec<PlayedIn>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.genres.len()
            + self.movies.len()
            + self.actors.len()
            + self.ratings.len()
            + self.movie_genres.len()
            + self.played_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, mut other: ChangeSet) {
        self.genres.append(&mut other.genres);
        self.movies.append(&mut other.movies);
        self.actors.append(&mut other.actors);
        self.ratings.append(&mut other.ratings);
        self.movie_genres.append(&mut other.movie_genres);
        self.played_in.append(&mut other.played_in);
    }

    /// Short descriptions of the first `limit` rows, for failure logs
    pub fn sample(&self, limit: usize) -> Vec<String> {
        let genres = self.genres.iter().map(|g| format!("genres({}, {})", g.id, g.name));
        let movies = self.movies.iter().map(|m| format!("movies({})", m.tconst));
        let actors = self.actors.iter().map(|a| format!("actors({})", a.nconst));
        let ratings = self.ratings.iter().map(|r| format!("movie_ratings({})", r.tconst));
        let movie_genres = self
            .movie_genres
            .iter()
            .map(|mg| format!("movie_genre({}, {})", mg.movie, mg.genre));
        let played_in = self
            .played_in
            .iter()
            .map(|p| format!("played_in({}, {})", p.actor, p.movie));

        genres
            .chain(movies)
            .chain(actors)
            .chain(ratings)
            .chain(movie_genres)
            .chain(played_in)
            .take(limit)
            .collect()
    }
}

/// Result of the anti-join checks: rows whose reference has no target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub played_in_missing_actor: u64,
    pub played_in_missing_movie: u64,
    pub movie_genre_missing_movie: u64,
    pub movie_genre_missing_genre: u64,
    pub ratings_missing_movie: u64,
}

impl IntegrityReport {
    pub fn dangling(&self) -> u64 {
        self.played_in_missing_actor
            + self.played_in_missing_movie
            + self.movie_genre_missing_movie
            + self.movie_genre_missing_genre
            + self.ratings_missing_movie
    }

    pub fn is_clean(&self) -> bool {
        self.dangling() == 0
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Identifiers already present in a keyed table
    async fn load_keys(&self, table: Table) -> StoreResult<HashSet<String>>;

    /// Genre name -> id
    async fn load_tags(&self) -> StoreResult<HashMap<String, i32>>;

    /// Person/title pairs already in `played_in`
    async fn load_cast(&self) -> StoreResult<HashSet<PlayedIn>>;

    /// Write `changes` atomically; returns the number of rows written
    async fn apply(&self, changes: &ChangeSet) -> StoreResult<u64>;

    async fn count(&self, table: Table) -> StoreResult<u64>;

    async fn integrity_report(&self) -> StoreResult<IntegrityReport>;
}

pub(crate) fn not_keyed(table: Table) -> StoreError {
    StoreError::Rejected(format!("{} has no natural key", table))
}
