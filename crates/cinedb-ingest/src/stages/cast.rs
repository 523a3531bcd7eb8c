//! Cast membership from the principals file

use super::{StageContext, StageLoader};
use crate::associations::Link;
use crate::filter::{CastCandidate, RowFilter};
use crate::source::PrincipalRow;
use crate::store::ChangeSet;

pub(crate) struct CastLoader;

impl StageLoader for CastLoader {
    type Row = PrincipalRow;
    type Kept = CastCandidate;

    fn filter(&self, filter: &RowFilter, rows: Vec<PrincipalRow>) -> Vec<CastCandidate> {
        filter.principals(rows)
    }

    fn resolve(&self, kept: Vec<CastCandidate>, cx: &mut StageContext) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for credit in kept {
            match cx.associations.link_cast(&credit.nconst, &credit.tconst, &cx.resolver) {
                Link::Created(pair) => changes.played_in.push(pair),
                Link::Unresolved => cx.unresolved += 1,
                // counted by the builder
                Link::Duplicate => {},
            }
        }

        changes
    }
}
