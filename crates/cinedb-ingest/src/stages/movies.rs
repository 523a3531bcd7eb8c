//! Movies with their genres

use super::{StageContext, StageLoader};
use crate::filter::{MovieCandidate, RowFilter};
use crate::models::Table;
use crate::source::TitleRow;
use crate::store::ChangeSet;

pub(crate) struct MoviesLoader;

impl StageLoader for MoviesLoader {
    type Row = TitleRow;
    type Kept = MovieCandidate;

    fn filter(&self, filter: &RowFilter, rows: Vec<TitleRow>) -> Vec<MovieCandidate> {
        filter.titles(rows)
    }

    fn resolve(&self, kept: Vec<MovieCandidate>, cx: &mut StageContext) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for candidate in kept {
            if !cx.resolver.claim(Table::Movies, &candidate.movie.tconst) {
                cx.duplicates += 1;
                continue;
            }
            let links = cx.associations.expand_tags(
                &candidate.movie.tconst,
                candidate.genres.as_deref(),
                &mut cx.resolver,
            );
            changes.movie_genres.extend(links);
            changes.movies.push(candidate.movie);
        }

        changes
    }
}
