//! Source reader against a mock dataset host and local files

use cinedb_ingest::source::{Chunk, PersonRow, RatingRow, SourceKind, SourceReader, TitleRow};
use cinedb_ingest::{IngestConfig, IngestError, IngestResult, MemoryStore, Orchestrator, StageKind};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gzip(body: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn remote_config(server: &MockServer, download_dir: &std::path::Path) -> IngestConfig {
    IngestConfig::remote()
        .with_base_url(server.uri())
        .with_download_dir(download_dir)
        .with_chunk_rows(2)
}

#[tokio::test]
async fn test_non_success_status_is_source_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/title.ratings.tsv.gz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let reader = SourceReader::new(&remote_config(&server, dir.path())).unwrap();

    let err = reader.open::<RatingRow>(SourceKind::Ratings).await.err().unwrap();
    match err {
        IngestError::SourceUnavailable { location, reason } => {
            assert!(location.ends_with("/title.ratings.tsv.gz"));
            assert!(reason.contains("404"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
    // nothing left behind
    assert!(!dir.path().join("title.ratings.tsv.gz").exists());
}

#[tokio::test]
async fn test_remote_gzip_tsv_is_decoded_in_chunks() {
    let server = MockServer::start().await;
    let tsv = "tconst\taverageRating\tnumVotes\n\
               tt0000001\t5.7\t1971\n\
               tt0000002\t\\N\t264\n\
               tt0000003\t6.5\t\\N\n";
    Mock::given(method("GET"))
        .and(path("/title.ratings.tsv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(tsv)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let reader = SourceReader::new(&remote_config(&server, dir.path())).unwrap();

    let chunks: Vec<Chunk<RatingRow>> = reader
        .open::<RatingRow>(SourceKind::Ratings)
        .await
        .unwrap()
        .collect::<IngestResult<_>>()
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].rows[0].average_rating, Some(5.7));
    assert_eq!(chunks[0].rows[1].average_rating, None);
    assert_eq!(chunks[1].rows[0].num_votes, None);
    assert!(dir.path().join("title.ratings.tsv.gz").exists());

    // the second open reuses the downloaded archive (the mock expects one hit)
    let again: Vec<Chunk<RatingRow>> = reader
        .open::<RatingRow>(SourceKind::Ratings)
        .await
        .unwrap()
        .collect::<IngestResult<_>>()
        .unwrap();
    assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn test_schema_mismatch_on_remote_header() {
    let server = MockServer::start().await;
    let tsv = "nconst\tprimaryName\tbirthYear\nnm1\tSomeone\t1970\n";
    Mock::given(method("GET"))
        .and(path("/name.basics.tsv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(tsv)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let reader = SourceReader::new(&remote_config(&server, dir.path())).unwrap();

    let err = reader.open::<PersonRow>(SourceKind::Persons).await.err().unwrap();
    match err {
        IngestError::SchemaMismatch { source_name, missing } => {
            assert_eq!(source_name, "name.basics");
            assert_eq!(
                missing,
                vec!["deathYear", "primaryProfession", "knownForTitles"]
            );
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_schema_mismatch_in_fixture_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("test_title.csv"),
        "tconst;titleType;primaryTitle\ntt1;movie;Heat\n",
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let aborted = Orchestrator::new(store, IngestConfig::sample(dir.path()))
        .unwrap()
        .run(&[StageKind::Movies])
        .await
        .unwrap_err();

    assert!(matches!(aborted.error, IngestError::SchemaMismatch { .. }));
    assert_eq!(aborted.stage, Some(StageKind::Movies));
}

#[tokio::test]
async fn test_fixture_titles_decode_with_sentinels() {
    let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/../../test_small_db");
    let reader = SourceReader::new(&IngestConfig::sample(fixtures).with_chunk_rows(10)).unwrap();

    let chunk: Chunk<TitleRow> = reader
        .open::<TitleRow>(SourceKind::Titles)
        .await
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(chunk.rows.len(), 5);
    assert_eq!(chunk.malformed, 0);
    assert!(chunk.rows.iter().all(|r| r.end_year.is_none()));
    assert_eq!(chunk.rows[1].genres.as_deref(), Some("Action,Drama"));
    assert_eq!(chunk.rows[4].runtime_minutes, None);
}
