//! In-process store with the same constraints as the Postgres schema
//!
//! Each [`apply`](Store::apply) validates against a copy of the tables and
//! swaps it in only when every row passes, which gives the same
//! all-or-nothing behaviour as a rolled back transaction.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{not_keyed, ChangeSet, IntegrityReport, Store, StoreError, StoreResult};
use crate::models::{Actor, Genre, Movie, MovieGenre, MovieRating, PlayedIn, Table};

#[derive(Debug, Clone, Default)]
struct Tables {
    movies: BTreeMap<String, Movie>,
    actors: BTreeMap<String, Actor>,
    ratings: BTreeMap<String, MovieRating>,
    genres: BTreeMap<i32, Genre>,
    genre_names: HashMap<String, i32>,
    movie_genre: BTreeSet<MovieGenre>,
    played_in: BTreeSet<PlayedIn>,
}

impl Tables {
    fn insert(&mut self, changes: &ChangeSet) -> StoreResult<()> {
        for genre in &changes.genres {
            if self.genres.contains_key(&genre.id) {
                return Err(violation("genres_pkey", &genre.id.to_string()));
            }
            if self.genre_names.contains_key(&genre.name) {
                return Err(violation("genres_name_key", &genre.name));
            }
            self.genre_names.insert(genre.name.clone(), genre.id);
            self.genres.insert(genre.id, genre.clone());
        }

        for movie in &changes.movies {
            if self.movies.contains_key(&movie.tconst) {
                return Err(violation("movies_pkey", &movie.tconst));
            }
            self.movies.insert(movie.tconst.clone(), movie.clone());
        }

        for actor in &changes.actors {
            if self.actors.contains_key(&actor.nconst) {
                return Err(violation("actors_pkey", &actor.nconst));
            }
            self.actors.insert(actor.nconst.clone(), actor.clone());
        }

        for rating in &changes.ratings {
            if !self.movies.contains_key(&rating.tconst) {
                return Err(missing("movie_ratings_tconst_fkey", &rating.tconst));
            }
            if self.ratings.contains_key(&rating.tconst) {
                return Err(violation("movie_ratings_pkey", &rating.tconst));
            }
            self.ratings.insert(rating.tconst.clone(), rating.clone());
        }

        for link in &changes.movie_genres {
            if !self.movies.contains_key(&link.movie) {
                return Err(missing("movie_genre_movie_fkey", &link.movie));
            }
            if !self.genres.contains_key(&link.genre) {
                return Err(missing("movie_genre_genre_fkey", &link.genre.to_string()));
            }
            if !self.movie_genre.insert(link.clone()) {
                return Err(violation(
                    "movie_genre_pkey",
                    &format!("{}, {}", link.movie, link.genre),
                ));
            }
        }

        for link in &changes.played_in {
            if !self.actors.contains_key(&link.actor) {
                return Err(missing("played_in_actor_fkey", &link.actor));
            }
            if !self.movies.contains_key(&link.movie) {
                return Err(missing("played_in_movie_fkey", &link.movie));
            }
            if !self.played_in.insert(link.clone()) {
                return Err(violation(
                    "played_in_pkey",
                    &format!("{}, {}", link.actor, link.movie),
                ));
            }
        }

        Ok(())
    }
}

fn violation(constraint: &str, key: &str) -> StoreError {
    StoreError::Rejected(format!(
        "duplicate key value violates unique constraint \"{}\" ({})",
        constraint, key
    ))
}

fn missing(constraint: &str, key: &str) -> StoreError {
    StoreError::Rejected(format!(
        "insert violates foreign key constraint \"{}\" ({} is not present)",
        constraint, key
    ))
}

/// In-memory [`Store`]
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn movies(&self) -> Vec<Movie> {
        self.snapshot(|t| t.movies.values().cloned().collect())
    }

    pub fn actors(&self) -> Vec<Actor> {
        self.snapshot(|t| t.actors.values().cloned().collect())
    }

    pub fn ratings(&self) -> Vec<MovieRating> {
        self.snapshot(|t| t.ratings.values().cloned().collect())
    }

    pub fn genres(&self) -> Vec<Genre> {
        self.snapshot(|t| t.genres.values().cloned().collect())
    }

    pub fn movie_genres(&self) -> Vec<MovieGenre> {
        self.snapshot(|t| t.movie_genre.iter().cloned().collect())
    }

    pub fn played_in(&self) -> Vec<PlayedIn> {
        self.snapshot(|t| t.played_in.iter().cloned().collect())
    }

    /// Read access for inspection; ignores the availability switch
    fn snapshot<T: Default>(&self, read: impl FnOnce(&Tables) -> T) -> T {
        match self.tables.lock() {
            Ok(tables) => read(&tables),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_keys(&self, table: Table) -> StoreResult<HashSet<String>> {
        let tables = self.lock()?;
        let keys = match table {
            Table::Movies => tables.movies.keys().cloned().collect(),
            Table::Actors => tables.actors.keys().cloned().collect(),
            Table::MovieRatings => tables.ratings.keys().cloned().collect(),
            other => return Err(not_keyed(other)),
        };
        Ok(keys)
    }

    async fn load_tags(&self) -> StoreResult<HashMap<String, i32>> {
        Ok(self.lock()?.genre_names.clone())
    }

    async fn load_cast(&self) -> StoreResult<HashSet<PlayedIn>> {
        Ok(self.lock()?.played_in.iter().cloned().collect())
    }

    async fn apply(&self, changes: &ChangeSet) -> StoreResult<u64> {
        let mut tables = self.lock()?;
        let mut staged = tables.clone();
        staged.insert(changes)?;
        *tables = staged;
        Ok(changes.len() as u64)
    }

    async fn count(&self, table: Table) -> StoreResult<u64> {
        let tables = self.lock()?;
        let n = match table {
            Table::Movies => tables.movies.len(),
            Table::Actors => tables.actors.len(),
            Table::MovieRatings => tables.ratings.len(),
            Table::Genres => tables.genres.len(),
            Table::MovieGenre => tables.movie_genre.len(),
            Table::PlayedIn => tables.played_in.len(),
        };
        Ok(n as u64)
    }

    async fn integrity_report(&self) -> StoreResult<IntegrityReport> {
        let tables = self.lock()?;
        let count = |n: usize| n as u64;

        Ok(IntegrityReport {
            played_in_missing_actor: count(
                tables
                    .played_in
                    .iter()
                    .filter(|p| !tables.actors.contains_key(&p.actor))
                    .count(),
            ),
            played_in_missing_movie: count(
                tables
                    .played_in
                    .iter()
                    .filter(|p| !tables.movies.contains_key(&p.movie))
                    .count(),
            ),
            movie_genre_missing_movie: count(
                tables
                    .movie_genre
                    .iter()
                    .filter(|mg| !tables.movies.contains_key(&mg.movie))
                    .count(),
            ),
            movie_genre_missing_genre: count(
                tables
                    .movie_genre
                    .iter()
                    .filter(|mg| !tables.genres.contains_key(&mg.genre))
                    .count(),
            ),
            ratings_missing_movie: count(
                tables
                    .ratings
                    .keys()
                    .filter(|id| !tables.movies.contains_key(*id))
                    .count(),
            ),
        })
    }
}
