//! Postgres store
//!
//! Every [`ChangeSet`] is written inside one transaction with multi-row
//! `INSERT`s built by [`QueryBuilder`]. Any statement failure rolls the
//! whole set back.

use async_trait::async_trait;
use cinedb_common::env;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

use super::{not_keyed, ChangeSet, IntegrityReport, Store, StoreError, StoreResult};
use crate::models::{Actor, Genre, Movie, MovieGenre, MovieRating, PlayedIn, Table};

/// Rows bound per `INSERT` statement (Postgres caps bind parameters at 65535)
const INSERT_BATCH_ROWS: usize = 1_000;

const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/cinedb";

#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

impl PgStoreConfig {
    /// `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_CONNECT_TIMEOUT`
    pub fn from_env() -> cinedb_common::Result<Self> {
        env::load_dotenv();
        let defaults = Self::default();

        Ok(Self {
            url: env::string_or("DATABASE_URL", &defaults.url),
            max_connections: env::parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            connect_timeout_secs: env::parse_or(
                "DB_CONNECT_TIMEOUT",
                defaults.connect_timeout_secs,
            )?,
        })
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &PgStoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!(max_connections = config.max_connections, "Database connection pool created");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {}", e)))?;
        info!("Schema migrations applied");
        Ok(())
    }

    /// Empty every table the pipeline writes
    pub async fn reset(&self) -> StoreResult<()> {
        sqlx::query(
            "TRUNCATE played_in, movie_genre, movie_ratings, genres, actors, movies",
        )
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        info!("All tables truncated");
        Ok(())
    }

    async fn write(&self, changes: &ChangeSet) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for batch in changes.genres.chunks(INSERT_BATCH_ROWS) {
            insert_genres(&mut tx, batch).await?;
        }
        for batch in changes.movies.chunks(INSERT_BATCH_ROWS) {
            insert_movies(&mut tx, batch).await?;
        }
        for batch in changes.actors.chunks(INSERT_BATCH_ROWS) {
            insert_actors(&mut tx, batch).await?;
        }
        for batch in changes.ratings.chunks(INSERT_BATCH_ROWS) {
            insert_ratings(&mut tx, batch).await?;
        }
        for batch in changes.movie_genres.chunks(INSERT_BATCH_ROWS) {
            insert_movie_genres(&mut tx, batch).await?;
        }
        for batch in changes.played_in.chunks(INSERT_BATCH_ROWS) {
            insert_played_in(&mut tx, batch).await?;
        }

        tx.commit().await
    }

    async fn scalar(&self, sql: &str) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(n.max(0) as u64)
    }
}

async fn insert_genres(tx: &mut Transaction<'_, Postgres>, rows: &[Genre]) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO genres (id, name) ");
    qb.push_values(rows, |mut b, g| {
        b.push_bind(g.id).push_bind(&g.name);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_movies(tx: &mut Transaction<'_, Postgres>, rows: &[Movie]) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO movies (tconst, primary_title, original_title, is_adult, start_year, run_time_minutes) ",
    );
    qb.push_values(rows, |mut b, m| {
        b.push_bind(&m.tconst)
            .push_bind(&m.primary_title)
            .push_bind(&m.original_title)
            .push_bind(m.is_adult)
            .push_bind(m.start_year)
            .push_bind(m.run_time_minutes);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_actors(tx: &mut Transaction<'_, Postgres>, rows: &[Actor]) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO actors (nconst, primary_name, birth_year, death_year) ");
    qb.push_values(rows, |mut b, a| {
        b.push_bind(&a.nconst)
            .push_bind(&a.primary_name)
            .push_bind(a.birth_year)
            .push_bind(a.death_year);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_ratings(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[MovieRating],
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO movie_ratings (tconst, average_rating, num_votes) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(&r.tconst)
            .push_bind(r.average_rating)
            .push_bind(r.num_votes);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_movie_genres(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[MovieGenre],
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO movie_genre (movie, genre) ");
    qb.push_values(rows, |mut b, mg| {
        b.push_bind(&mg.movie).push_bind(mg.genre);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_played_in(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[PlayedIn],
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO played_in (actor, movie) ");
    qb.push_values(rows, |mut b, p| {
        b.push_bind(&p.actor).push_bind(&p.movie);
    });
    qb.build().execute(&mut **tx).await?;
    Ok(())
}

/// Split driver errors into "this write is bad" and "the store is gone".
///
/// SQLSTATE class 22 (data exception) and 23 (integrity constraint
/// violation) reject the write; every other failure makes the store
/// unavailable.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let class = db.code().map(|c| c.chars().take(2).collect::<String>());
            match class.as_deref() {
                Some("22") | Some("23") => StoreError::Rejected(db.message().to_string()),
                _ => StoreError::Unavailable(err.to_string()),
            }
        },
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Rejected(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn load_keys(&self, table: Table) -> StoreResult<HashSet<String>> {
        let sql = match table {
            Table::Movies => "SELECT tconst FROM movies",
            Table::Actors => "SELECT nconst FROM actors",
            Table::MovieRatings => "SELECT tconst FROM movie_ratings",
            other => return Err(not_keyed(other)),
        };

        let keys: Vec<String> = sqlx::query_scalar(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        debug!(table = %table, keys = keys.len(), "Loaded key index");
        Ok(keys.into_iter().collect())
    }

    async fn load_tags(&self) -> StoreResult<HashMap<String, i32>> {
        let rows: Vec<(String, i32)> = sqlx::query_as("SELECT name, id FROM genres")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        Ok(rows.into_iter().collect())
    }

    async fn load_cast(&self) -> StoreResult<HashSet<PlayedIn>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT actor, movie FROM played_in")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        debug!(pairs = rows.len(), "Loaded cast pairs");
        Ok(rows
            .into_iter()
            .map(|(actor, movie)| PlayedIn { actor, movie })
            .collect())
    }

    async fn apply(&self, changes: &ChangeSet) -> StoreResult<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        self.write(changes).await.map_err(classify)?;
        Ok(changes.len() as u64)
    }

    async fn count(&self, table: Table) -> StoreResult<u64> {
        // Table names come from a closed enum.
        self.scalar(&format!("SELECT COUNT(*) FROM {}", table.as_str()))
            .await
    }

    async fn integrity_report(&self) -> StoreResult<IntegrityReport> {
        Ok(IntegrityReport {
            played_in_missing_actor: self
                .scalar(
                    "SELECT COUNT(*) FROM played_in p \
                     LEFT JOIN actors a ON a.nconst = p.actor WHERE a.nconst IS NULL",
                )
                .await?,
            played_in_missing_movie: self
                .scalar(
                    "SELECT COUNT(*) FROM played_in p \
                     LEFT JOIN movies m ON m.tconst = p.movie WHERE m.tconst IS NULL",
                )
                .await?,
            movie_genre_missing_movie: self
                .scalar(
                    "SELECT COUNT(*) FROM movie_genre mg \
                     LEFT JOIN movies m ON m.tconst = mg.movie WHERE m.tconst IS NULL",
                )
                .await?,
            movie_genre_missing_genre: self
                .scalar(
                    "SELECT COUNT(*) FROM movie_genre mg \
                     LEFT JOIN genres g ON g.id = mg.genre WHERE g.id IS NULL",
                )
                .await?,
            ratings_missing_movie: self
                .scalar(
                    "SELECT COUNT(*) FROM movie_ratings r \
                     LEFT JOIN movies m ON m.tconst = r.tconst WHERE m.tconst IS NULL",
                )
                .await?,
        })
    }
}
