//! Records persisted by the pipeline and the tables they land in

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tables of the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Movies,
    Actors,
    MovieRatings,
    Genres,
    MovieGenre,
    PlayedIn,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Movies,
        Table::Actors,
        Table::MovieRatings,
        Table::Genres,
        Table::MovieGenre,
        Table::PlayedIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Movies => "movies",
            Table::Actors => "actors",
            Table::MovieRatings => "movie_ratings",
            Table::Genres => "genres",
            Table::MovieGenre => "movie_genre",
            Table::PlayedIn => "played_in",
        }
    }

    /// Tables keyed by a natural string identifier
    pub fn is_keyed(&self) -> bool {
        matches!(self, Table::Movies | Table::Actors | Table::MovieRatings)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary entity: a feature film (`movies`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub tconst: String,
    pub primary_title: Option<String>,
    pub original_title: Option<String>,
    pub is_adult: Option<bool>,
    pub start_year: Option<i32>,
    pub run_time_minutes: Option<i32>,
}

/// Primary entity: a performer (`actors`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub nconst: String,
    pub primary_name: Option<String>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
}

/// Dependent fact keyed one-to-one by `movies.tconst` (`movie_ratings`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRating {
    pub tconst: String,
    pub average_rating: Option<f64>,
    pub num_votes: Option<i64>,
}

/// Derived tag entity (`genres`); ids are assigned by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

/// Association movie <-> genre (`movie_genre`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MovieGenre {
    pub movie: String,
    pub genre: i32,
}

/// Association actor <-> movie (`played_in`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayedIn {
    pub actor: String,
    pub movie: String,
}
