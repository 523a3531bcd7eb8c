//! Batch committer
//!
//! Buffers resolved rows and writes them as one store transaction once the
//! buffer reaches the stage's commit interval (or on every push when the
//! interval is `0`). A rejected write is a failed [`ChunkOutcome`]; only an
//! unavailable store ends the stage. New genres of a rejected set are not
//! counted as failed: they are handed back for a retry through
//! [`BatchCommitter::commit_tags`], which counts them once either way.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{IngestError, IngestResult};
use crate::models::Genre;
use crate::store::{ChangeSet, Store, StoreError};

/// Failing rows quoted per rejected commit
const FAILURE_SAMPLE_ROWS: usize = 3;

/// Failure samples kept per stage
const MAX_STORED_SAMPLES: usize = 10;

/// Result of one commit attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Zero-based commit number within the stage
    pub sequence: usize,
    pub committed: u64,
    /// Rows lost with the rejected set, returned genres excluded
    pub failed: u64,
    pub sample: Vec<String>,
    pub reason: Option<String>,
    /// New genres that were part of the rejected set, to be retried
    pub returned_tags: Vec<Genre>,
}

impl ChunkOutcome {
    pub fn is_success(&self) -> bool {
        self.reason.is_none()
    }
}

/// Commit outcomes aggregated over a stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub commits: usize,
    pub failed_commits: usize,
    pub rows_committed: u64,
    pub rows_failed: u64,
    pub samples: Vec<String>,
}

impl CommitStats {
    pub fn record(&mut self, outcome: &ChunkOutcome) {
        if outcome.is_success() {
            self.commits += 1;
            self.rows_committed += outcome.committed;
        } else {
            self.failed_commits += 1;
            self.rows_failed += outcome.failed;
            let room = MAX_STORED_SAMPLES.saturating_sub(self.samples.len());
            self.samples.extend(outcome.sample.iter().take(room).cloned());
        }
    }
}

pub struct BatchCommitter {
    store: Arc<dyn Store>,
    commit_every: usize,
    buffer: ChangeSet,
    sequence: usize,
    stats: CommitStats,
}

impl BatchCommitter {
    pub fn new(store: Arc<dyn Store>, commit_every: usize) -> Self {
        Self {
            store,
            commit_every,
            buffer: ChangeSet::default(),
            sequence: 0,
            stats: CommitStats::default(),
        }
    }

    /// Buffer `changes`; commits when the interval is reached
    pub async fn push(&mut self, changes: ChangeSet) -> IngestResult<Option<ChunkOutcome>> {
        self.buffer.append(changes);
        if self.buffer.is_empty() {
            return Ok(None);
        }
        if self.commit_every == 0 || self.buffer.len() >= self.commit_every {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Commit whatever is still buffered
    pub async fn finish(&mut self) -> IngestResult<Option<ChunkOutcome>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.flush().await.map(Some)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &CommitStats {
        &self.stats
    }

    /// Write genres handed back by a rejected commit as their own set.
    /// A rejection here counts them as failed.
    pub async fn commit_tags(&mut self, tags: Vec<Genre>) -> IngestResult<ChunkOutcome> {
        let batch = ChangeSet {
            genres: tags,
            ..Default::default()
        };
        self.commit(batch, false).await
    }

    async fn flush(&mut self) -> IngestResult<ChunkOutcome> {
        let batch = std::mem::take(&mut self.buffer);
        self.commit(batch, true).await
    }

    async fn commit(&mut self, batch: ChangeSet, return_tags: bool) -> IngestResult<ChunkOutcome> {
        let sequence = self.sequence;
        self.sequence += 1;

        let outcome = match self.store.apply(&batch).await {
            Ok(written) => {
                debug!(sequence, rows = written, "Commit succeeded");
                ChunkOutcome {
                    sequence,
                    committed: written,
                    failed: 0,
                    sample: Vec::new(),
                    reason: None,
                    returned_tags: Vec::new(),
                }
            },
            Err(StoreError::Rejected(reason)) => {
                let sample = batch.sample(FAILURE_SAMPLE_ROWS);
                error!(
                    sequence,
                    rows = batch.len(),
                    sample = ?sample,
                    reason = %reason,
                    "Commit rejected, skipping chunk"
                );
                let returned_tags = if return_tags {
                    batch.genres.clone()
                } else {
                    Vec::new()
                };
                ChunkOutcome {
                    sequence,
                    committed: 0,
                    failed: (batch.len() - returned_tags.len()) as u64,
                    sample,
                    reason: Some(reason),
                    returned_tags,
                }
            },
            Err(StoreError::Unavailable(reason)) => {
                return Err(IngestError::StoreUnavailable(reason));
            },
        };

        self.stats.record(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Movie, MovieRating, Table};
    use crate::store::MemoryStore;

    fn movies(ids: &[&str]) -> ChangeSet {
        ChangeSet {
            movies: ids
                .iter()
                .map(|id| Movie {
                    tconst: id.to_string(),
                    primary_title: None,
                    original_title: None,
                    is_adult: None,
                    start_year: None,
                    run_time_minutes: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_buffers_until_interval() {
        let store = Arc::new(MemoryStore::new());
        let mut committer = BatchCommitter::new(store.clone(), 3);

        assert!(committer.push(movies(&["tt1", "tt2"])).await.unwrap().is_none());
        assert_eq!(committer.buffered(), 2);
        assert_eq!(store.count(Table::Movies).await.unwrap(), 0);

        let outcome = committer.push(movies(&["tt3"])).await.unwrap().unwrap();
        assert_eq!(outcome.committed, 3);

        committer.push(movies(&["tt4"])).await.unwrap();
        let last = committer.finish().await.unwrap().unwrap();
        assert_eq!(last.sequence, 1);
        assert!(committer.finish().await.unwrap().is_none());

        assert_eq!(store.count(Table::Movies).await.unwrap(), 4);
        assert_eq!(committer.stats().commits, 2);
    }

    #[tokio::test]
    async fn test_rejected_commit_is_counted_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut committer = BatchCommitter::new(store.clone(), 0);

        committer.push(movies(&["tt1"])).await.unwrap();
        let bad = ChangeSet {
            ratings: vec![MovieRating {
                tconst: "tt404".into(),
                average_rating: Some(1.0),
                num_votes: Some(1),
            }],
            ..Default::default()
        };
        let outcome = committer.push(bad).await.unwrap().unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.sample, vec!["movie_ratings(tt404)"]);

        committer.push(movies(&["tt2"])).await.unwrap();

        let stats = committer.stats();
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.failed_commits, 1);
        assert_eq!(stats.rows_committed, 2);
        assert_eq!(stats.rows_failed, 1);
        assert_eq!(store.count(Table::Movies).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejected_genres_are_returned_not_failed() {
        let store = Arc::new(MemoryStore::new());
        let mut committer = BatchCommitter::new(store.clone(), 0);

        let mut bad = movies(&["tt1"]);
        bad.genres.push(Genre {
            id: 1,
            name: "Drama".into(),
        });
        bad.ratings.push(MovieRating {
            tconst: "tt404".into(),
            average_rating: None,
            num_votes: None,
        });

        let outcome = committer.push(bad).await.unwrap().unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.returned_tags.len(), 1);

        let retry = committer.commit_tags(outcome.returned_tags).await.unwrap();
        assert!(retry.is_success());
        assert_eq!(retry.committed, 1);

        let stats = committer.stats();
        assert_eq!(stats.rows_failed, 2);
        assert_eq!(stats.rows_committed, 1);
        assert_eq!(store.count(Table::Genres).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refused_genre_retry_counts_as_failed() {
        let store = Arc::new(MemoryStore::new());
        store
            .apply(&ChangeSet {
                genres: vec![Genre {
                    id: 9,
                    name: "Drama".into(),
                }],
                ..Default::default()
            })
            .await
            .unwrap();
        let mut committer = BatchCommitter::new(store, 0);

        // same name under another id violates the unique name
        let retry = committer
            .commit_tags(vec![Genre {
                id: 1,
                name: "Drama".into(),
            }])
            .await
            .unwrap();

        assert!(!retry.is_success());
        assert_eq!(retry.failed, 1);
        assert!(retry.returned_tags.is_empty());
        assert_eq!(committer.stats().failed_commits, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let mut committer = BatchCommitter::new(store, 0);

        let err = committer.push(movies(&["tt1"])).await.unwrap_err();
        assert!(matches!(err, IngestError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_push_does_not_commit() {
        let store = Arc::new(MemoryStore::new());
        let mut committer = BatchCommitter::new(store, 0);

        assert!(committer.push(ChangeSet::default()).await.unwrap().is_none());
        assert_eq!(committer.stats().commits, 0);
    }
}
