//! Cast membership from each actor's known-for titles
//!
//! Alternative to the principals-based cast stage: re-reads the persons
//! file, keeps the same actors as the actors stage, and links every listed
//! title that is a loaded movie.

use super::{StageContext, StageLoader};
use crate::filter::{ActorCandidate, RowFilter};
use crate::models::Table;
use crate::source::PersonRow;
use crate::store::ChangeSet;

pub(crate) struct KnownForLoader;

impl StageLoader for KnownForLoader {
    type Row = PersonRow;
    type Kept = ActorCandidate;

    fn filter(&self, filter: &RowFilter, rows: Vec<PersonRow>) -> Vec<ActorCandidate> {
        filter.persons(rows)
    }

    fn resolve(&self, kept: Vec<ActorCandidate>, cx: &mut StageContext) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for candidate in kept {
            let actor = candidate.actor.nconst;
            if !cx.resolver.resolve_primary(Table::Actors, &actor) {
                cx.unresolved += 1;
                continue;
            }
            let expansion =
                cx.associations
                    .expand_references(&actor, candidate.known_for.as_deref(), &cx.resolver);
            cx.unresolved += expansion.unresolved;
            changes.played_in.extend(expansion.links);
        }

        changes
    }
}
