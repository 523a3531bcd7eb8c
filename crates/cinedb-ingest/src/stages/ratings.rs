//! Ratings of loaded movies

use super::{StageContext, StageLoader};
use crate::filter::RowFilter;
use crate::models::{MovieRating, Table};
use crate::source::RatingRow;
use crate::store::ChangeSet;

pub(crate) struct RatingsLoader;

impl StageLoader for RatingsLoader {
    type Row = RatingRow;
    type Kept = MovieRating;

    fn filter(&self, filter: &RowFilter, rows: Vec<RatingRow>) -> Vec<MovieRating> {
        filter.ratings(rows)
    }

    fn resolve(&self, kept: Vec<MovieRating>, cx: &mut StageContext) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for rating in kept {
            if !cx.resolver.resolve_primary(Table::Movies, &rating.tconst) {
                cx.unresolved += 1;
                continue;
            }
            if !cx.resolver.claim(Table::MovieRatings, &rating.tconst) {
                cx.duplicates += 1;
                continue;
            }
            changes.ratings.push(rating);
        }

        changes
    }
}
