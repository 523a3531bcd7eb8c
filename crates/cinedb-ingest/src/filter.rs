//! Row filter
//!
//! Pure, order-preserving predicates per source. Kept rows are narrowed to
//! the shape the next step needs; nothing else about them changes.

use crate::config::FilterConfig;
use crate::models::{Actor, Movie, MovieRating};
use crate::source::{PersonRow, PrincipalRow, RatingRow, TitleRow};

/// A title that passed the kind check, with its raw genre list
#[derive(Debug, Clone, PartialEq)]
pub struct MovieCandidate {
    pub movie: Movie,
    pub genres: Option<String>,
}

/// A person that passed the birth year and profession checks
#[derive(Debug, Clone, PartialEq)]
pub struct ActorCandidate {
    pub actor: Actor,
    pub known_for: Option<String>,
}

/// A principal credited in one of the cast categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastCandidate {
    pub tconst: String,
    pub nconst: String,
}

#[derive(Debug, Clone)]
pub struct RowFilter {
    title_kind: String,
    min_birth_year: i32,
    professions: Vec<String>,
    cast_categories: Vec<String>,
}

impl RowFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            title_kind: config.title_kind.trim().to_string(),
            min_birth_year: config.min_birth_year,
            professions: config.professions.iter().map(|p| p.trim().to_ascii_lowercase()).collect(),
            cast_categories: config
                .cast_categories
                .iter()
                .map(|c| c.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Titles of the configured kind; drops `titleType` and `endYear`
    pub fn titles(&self, rows: Vec<TitleRow>) -> Vec<MovieCandidate> {
        rows.into_iter()
            .filter(|row| row.title_type.as_deref() == Some(self.title_kind.as_str()))
            .map(|row| MovieCandidate {
                movie: Movie {
                    tconst: row.tconst,
                    primary_title: row.primary_title,
                    original_title: row.original_title,
                    is_adult: row.is_adult,
                    start_year: row.start_year,
                    run_time_minutes: row.runtime_minutes,
                },
                genres: row.genres,
            })
            .collect()
    }

    /// Persons born in or after the threshold year whose profession list
    /// mentions one of the configured professions. Unknown birth years fail
    /// the threshold.
    pub fn persons(&self, rows: Vec<PersonRow>) -> Vec<ActorCandidate> {
        rows.into_iter()
            .filter(|row| row.birth_year.is_some_and(|year| year >= self.min_birth_year))
            .filter(|row| self.has_profession(row.primary_profession.as_deref()))
            .map(|row| ActorCandidate {
                actor: Actor {
                    nconst: row.nconst,
                    primary_name: row.primary_name,
                    birth_year: row.birth_year,
                    death_year: row.death_year,
                },
                known_for: row.known_for_titles,
            })
            .collect()
    }

    /// Ratings carry no predicate; they are only re-shaped
    pub fn ratings(&self, rows: Vec<RatingRow>) -> Vec<MovieRating> {
        rows.into_iter()
            .map(|row| MovieRating {
                tconst: row.tconst,
                average_rating: row.average_rating,
                num_votes: row.num_votes,
            })
            .collect()
    }

    pub fn principals(&self, rows: Vec<PrincipalRow>) -> Vec<CastCandidate> {
        rows.into_iter()
            .filter(|row| {
                row.category
                    .as_deref()
                    .is_some_and(|c| self.cast_categories.iter().any(|k| k.eq_ignore_ascii_case(c)))
            })
            .map(|row| CastCandidate {
                tconst: row.tconst,
                nconst: row.nconst,
            })
            .collect()
    }

    fn has_profession(&self, list: Option<&str>) -> bool {
        let Some(list) = list else {
            return false;
        };
        list.split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .any(|p| self.professions.contains(&p))
    }
}
