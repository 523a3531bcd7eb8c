use super::{StageContext, StageLoader};
use crate::filter::{ActorCandidate, RowFilter};
use crate::models::Table;
use crate::source::PersonRow;
use crate::store::ChangeSet;

pub(crate) struct ActorsLoader;

impl StageLoader for ActorsLoader {
    type Row = PersonRow;
    type Kept = ActorCandidate;

    fn filter(&self, filter: &RowFilter, rows: Vec<PersonRow>) -> Vec<ActorCandidate> {
        filter.persons(rows)
    }

    fn resolve(&self, kept: Vec<ActorCandidate>, cx: &mut StageContext) -> ChangeSet {
        let mut changes = ChangeSet::default();
        for candidate in kept {
            if cx.resolver.claim(Table::Actors, &candidate.actor.nconst) {
                changes.actors.push(candidate.actor);
            } else {
                cx.duplicates += 1;
            }
        }
        changes
    }
}
