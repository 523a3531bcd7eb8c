//! Association builder
//!
//! Expands delimited multi-value fields into association rows. Pairs are
//! deduplicated for the lifetime of the builder, so one builder per stage
//! emits each pair at most once no matter how many chunks repeat it. Cast
//! pairs already committed (by an earlier stage or run) are seeded in and
//! never emitted again.

use std::collections::HashSet;

use crate::models::{MovieGenre, PlayedIn, Table};
use crate::resolver::ReferenceResolver;

const VALUE_DELIMITER: char = ',';

/// Trimmed, non-empty entries of a delimited field
pub fn split_values(field: Option<&str>) -> impl Iterator<Item = &str> {
    field
        .unwrap_or_default()
        .split(VALUE_DELIMITER)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Result of expanding an identifier list
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub links: Vec<PlayedIn>,
    /// Entries that named an unknown title
    pub unresolved: usize,
}

/// Outcome of linking one cast credit
#[derive(Debug, PartialEq, Eq)]
pub enum Link {
    Created(PlayedIn),
    Unresolved,
    Duplicate,
}

#[derive(Debug, Default)]
pub struct AssociationBuilder {
    seen_tags: HashSet<MovieGenre>,
    seen_cast: HashSet<PlayedIn>,
    emitted: usize,
    duplicates: usize,
}

impl AssociationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder that treats `existing` cast pairs as already emitted
    pub fn with_existing_cast(existing: HashSet<PlayedIn>) -> Self {
        Self {
            seen_cast: existing,
            ..Self::default()
        }
    }

    /// One `movie_genre` row per distinct tag in `field`, creating tag ids
    /// on first sight
    pub fn expand_tags(
        &mut self,
        movie: &str,
        field: Option<&str>,
        resolver: &mut ReferenceResolver,
    ) -> Vec<MovieGenre> {
        let mut links = Vec::new();
        for name in split_values(field) {
            let pair = MovieGenre {
                movie: movie.to_string(),
                genre: resolver.resolve_or_create_tag(name),
            };
            if let Some(pair) = self.admit_tag(pair) {
                links.push(pair);
            }
        }
        links
    }

    /// One `played_in` row per title in `field` that is already a movie.
    /// Unknown titles are dropped and counted.
    pub fn expand_references(
        &mut self,
        actor: &str,
        field: Option<&str>,
        resolver: &ReferenceResolver,
    ) -> Expansion {
        let mut expansion = Expansion::default();
        for movie in split_values(field) {
            if !resolver.resolve_primary(Table::Movies, movie) {
                expansion.unresolved += 1;
                continue;
            }
            let pair = PlayedIn {
                actor: actor.to_string(),
                movie: movie.to_string(),
            };
            if let Some(pair) = self.admit_cast(pair) {
                expansion.links.push(pair);
            }
        }
        expansion
    }

    /// Link a single credit when both sides are known
    pub fn link_cast(&mut self, actor: &str, movie: &str, resolver: &ReferenceResolver) -> Link {
        if !resolver.resolve_primary(Table::Actors, actor)
            || !resolver.resolve_primary(Table::Movies, movie)
        {
            return Link::Unresolved;
        }
        let pair = PlayedIn {
            actor: actor.to_string(),
            movie: movie.to_string(),
        };
        match self.admit_cast(pair) {
            Some(pair) => Link::Created(pair),
            None => Link::Duplicate,
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Pairs dropped because they were already emitted
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    fn admit_tag(&mut self, pair: MovieGenre) -> Option<MovieGenre> {
        if self.seen_tags.insert(pair.clone()) {
            self.emitted += 1;
            Some(pair)
        } else {
            self.duplicates += 1;
            None
        }
    }

    fn admit_cast(&mut self, pair: PlayedIn) -> Option<PlayedIn> {
        if self.seen_cast.insert(pair.clone()) {
            self.emitted += 1;
            Some(pair)
        } else {
            self.duplicates += 1;
            None
        }
    }
}
