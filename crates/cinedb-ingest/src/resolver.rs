//! Reference resolver
//!
//! A [`ReferenceIndex`] is loaded from the store at the start of every stage
//! and owned by that stage's [`ReferenceResolver`]. Nothing is shared
//! between stages or runs; each stage sees exactly what earlier stages
//! committed.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::IngestResult;
use crate::models::{Genre, PlayedIn, Table};
use crate::store::Store;

/// Snapshot of committed identifiers, cast pairs and the genre dictionary
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    keys: HashMap<Table, HashSet<String>>,
    tags: HashMap<String, i32>,
    cast: HashSet<PlayedIn>,
}

impl ReferenceIndex {
    /// Load the key sets of `tables`, plus the genre dictionary when
    /// `with_tags` is set. Listing `played_in` loads its existing pairs
    /// instead of a key set.
    ///
    /// A store failure here is fatal to the run.
    pub async fn load(store: &dyn Store, tables: &[Table], with_tags: bool) -> IngestResult<Self> {
        let mut keys = HashMap::with_capacity(tables.len());
        let mut cast = HashSet::new();
        for &table in tables {
            if table == Table::PlayedIn {
                cast = store.load_cast().await?;
                debug!(pairs = cast.len(), "Cast pairs loaded");
                continue;
            }
            let set = store.load_keys(table).await?;
            debug!(table = %table, keys = set.len(), "Reference keys loaded");
            keys.insert(table, set);
        }

        let tags = if with_tags {
            store.load_tags().await?
        } else {
            HashMap::new()
        };

        Ok(Self { keys, tags, cast })
    }

    /// Hand the committed cast pairs to the association builder
    pub fn take_cast(&mut self) -> HashSet<PlayedIn> {
        std::mem::take(&mut self.cast)
    }

    pub fn with_keys(mut self, table: Table, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keys
            .entry(table)
            .or_default()
            .extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, id: i32) -> Self {
        self.tags.insert(name.into(), id);
        self
    }

    pub fn key_count(&self, table: Table) -> usize {
        self.keys.get(&table).map_or(0, HashSet::len)
    }
}

#[derive(Debug)]
pub struct ReferenceResolver {
    index: ReferenceIndex,
    next_tag_id: i32,
    pending_tags: Vec<Genre>,
    tags_created: usize,
}

impl ReferenceResolver {
    pub fn new(index: ReferenceIndex) -> Self {
        let next_tag_id = index.tags.values().copied().max().unwrap_or(0) + 1;
        Self {
            index,
            next_tag_id,
            pending_tags: Vec::new(),
            tags_created: 0,
        }
    }

    /// Is `id` a known identifier of `table`, either committed before the
    /// stage started or claimed during it
    pub fn resolve_primary(&self, table: Table, id: &str) -> bool {
        self.index.keys.get(&table).is_some_and(|set| set.contains(id))
    }

    /// Record `id` as a new row of `table`. Returns `false` when the id is
    /// already known, in which case the row is a duplicate and must be
    /// dropped.
    pub fn claim(&mut self, table: Table, id: &str) -> bool {
        let set = self.index.keys.entry(table).or_default();
        if set.contains(id) {
            return false;
        }
        set.insert(id.to_string())
    }

    /// Existing id for `name`, or the next free id. A new mapping is visible
    /// to every later lookup immediately and is queued for the next commit.
    pub fn resolve_or_create_tag(&mut self, name: &str) -> i32 {
        if let Some(&id) = self.index.tags.get(name) {
            return id;
        }

        let id = self.next_tag_id;
        self.next_tag_id += 1;
        self.index.tags.insert(name.to_string(), id);
        self.pending_tags.push(Genre {
            id,
            name: name.to_string(),
        });
        self.tags_created += 1;
        id
    }

    /// New tags not yet handed to the committer
    pub fn take_pending_tags(&mut self) -> Vec<Genre> {
        std::mem::take(&mut self.pending_tags)
    }

    /// Unmap tags the store refused. A later sighting of the same name gets
    /// a fresh id; ids are never reused.
    pub fn forget_tags(&mut self, tags: &[Genre]) {
        for tag in tags {
            if self.index.tags.get(&tag.name) == Some(&tag.id) {
                self.index.tags.remove(&tag.name);
            }
        }
        self.pending_tags.retain(|p| !tags.contains(p));
        debug!(tags = tags.len(), "Forgot rejected genres");
    }

    pub fn tags_created(&self) -> usize {
        self.tags_created
    }

    pub fn tag_id(&self, name: &str) -> Option<i32> {
        self.index.tags.get(name).copied()
    }
}
