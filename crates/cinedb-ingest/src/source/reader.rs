//! Chunked, schema-checked decoding of delimiter-separated files

use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use super::SourceKind;
use crate::error::{IngestError, IngestResult};

/// Malformed rows logged individually before switching to debug level
const MALFORMED_WARN_LIMIT: usize = 10;

/// One bounded unit of input rows
#[derive(Debug, Clone)]
pub struct Chunk<T> {
    /// Zero-based position in the source
    pub index: usize,
    pub rows: Vec<T>,
    /// Rows in this chunk that could not be decoded at all
    pub malformed: usize,
}

impl<T> Chunk<T> {
    /// Input rows consumed by this chunk, decoded or not
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.malformed
    }
}

type Records<T> = csv::DeserializeRecordsIntoIter<Box<dyn Read + Send>, T>;

/// Lazy sequence of row chunks over one source file.
///
/// Restartable only by opening the source again.
pub struct ChunkReader<T> {
    kind: SourceKind,
    records: Records<T>,
    chunk_rows: usize,
    next_index: usize,
    malformed_total: usize,
    finished: bool,
}

impl<T: DeserializeOwned> ChunkReader<T> {
    /// Open `path` (gzip when the name ends in `.gz`) and verify the header
    /// carries every column `kind` needs.
    pub fn open(
        kind: SourceKind,
        path: &Path,
        delimiter: u8,
        chunk_rows: usize,
    ) -> IngestResult<Self> {
        let location = path.display().to_string();
        let file = File::open(path).map_err(|e| IngestError::source_unavailable(&location, e))?;

        let input: Box<dyn Read + Send> = if is_gzip(path) {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        // The datasets never quote fields but do contain stray `"` inside titles.
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quoting(false)
            .has_headers(true)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| IngestError::source_unavailable(&location, e))?
            .clone();
        check_columns(kind, headers.iter())?;

        debug!(source = %kind, path = %location, columns = headers.len(), "Source opened");

        Ok(Self {
            kind,
            records: reader.into_deserialize(),
            chunk_rows: chunk_rows.max(1),
            next_index: 0,
            malformed_total: 0,
            finished: false,
        })
    }
}

impl<T: DeserializeOwned + Send + 'static> ChunkReader<T> {
    /// Decode the next chunk on the blocking pool, handing the reader back
    /// with it. `None` once the source is exhausted.
    pub async fn read_chunk(mut self) -> IngestResult<Option<(Chunk<T>, Self)>> {
        let kind = self.kind;
        let (next, reader) = tokio::task::spawn_blocking(move || {
            let next = self.next();
            (next, self)
        })
        .await
        .map_err(|e| IngestError::source_unavailable(kind.to_string(), e))?;

        match next {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok(chunk)) => Ok(Some((chunk, reader))),
        }
    }
}

impl<T: DeserializeOwned> Iterator for ChunkReader<T> {
    type Item = IngestResult<Chunk<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_rows.min(8_192));
        let mut malformed = 0;

        while rows.len() + malformed < self.chunk_rows {
            match self.records.next() {
                None => {
                    self.finished = true;
                    break;
                },
                Some(Ok(row)) => rows.push(row),
                Some(Err(e)) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    self.finished = true;
                    return Some(Err(IngestError::source_unavailable(self.kind.to_string(), e)));
                },
                Some(Err(e)) => {
                    malformed += 1;
                    self.malformed_total += 1;
                    if self.malformed_total <= MALFORMED_WARN_LIMIT {
                        warn!(source = %self.kind, error = %e, "Skipping malformed row");
                    } else {
                        debug!(source = %self.kind, error = %e, "Skipping malformed row");
                    }
                },
            }
        }

        if rows.is_empty() && malformed == 0 {
            return None;
        }

        let chunk = Chunk {
            index: self.next_index,
            rows,
            malformed,
        };
        self.next_index += 1;
        Some(Ok(chunk))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// `SchemaMismatch` listing every expected column absent from `headers`
pub fn check_columns<'a>(
    kind: SourceKind,
    headers: impl IntoIterator<Item = &'a str>,
) -> IngestResult<()> {
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let missing: Vec<String> = kind
        .columns()
        .iter()
        .filter(|col| !present.contains(col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::SchemaMismatch {
            source_name: kind.to_string(),
            missing,
        })
    }
}
