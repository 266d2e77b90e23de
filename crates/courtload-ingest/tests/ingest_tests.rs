//! Loading through the pipeline and batch ingestor against the in-memory store

use std::io::Cursor;

use courtload_ingest::entities::{Citation, OpinionCited};
use courtload_ingest::pipeline::{IngestPipeline, PipelineOptions};
use courtload_ingest::quarantine::QuarantineSink;
use courtload_ingest::schema::EntityKind;
use courtload_ingest::store::{Violation, ViolationKind};
use courtload_ingest::{BatchIngestor, IngestError, MemoryStore, PlaceholderCache, TypedRecord};

fn citation(id: i64, cluster_id: i64) -> TypedRecord {
    TypedRecord::Citation(Citation {
        id,
        volume: 410,
        reporter: "U.S.".to_string(),
        page: (100 + id).to_string(),
        citation_type: 1,
        cluster_id,
    })
}

fn cited(id: i64, cited_opinion_id: i64, citing_opinion_id: i64) -> TypedRecord {
    TypedRecord::Cited(OpinionCited {
        id,
        depth: 1,
        cited_opinion_id,
        citing_opinion_id,
    })
}

fn options(batch_records: usize) -> PipelineOptions {
    PipelineOptions {
        chunk_bytes: 64,
        batch_records,
        failure_samples: 5,
    }
}

// ============================================================================
// PLACEHOLDER RESOLUTION
// ============================================================================

#[tokio::test]
async fn test_missing_parent_gets_one_placeholder() {
    let mut store = MemoryStore::new().with_rows(EntityKind::Cluster, [1]);
    let mut cache = PlaceholderCache::new();
    let mut ingestor = BatchIngestor::new(&mut store, &mut cache);

    let first = ingestor
        .ingest_batch(vec![citation(1, 1), citation(2, 999), citation(3, 1)])
        .await;
    assert_eq!(first.inserted(), 3);
    assert_eq!(first.rejected(), 0);
    assert_eq!(first.stats.placeholders_created, 1);

    let second = ingestor
        .ingest_batch(vec![citation(4, 999), citation(5, 999)])
        .await;
    assert_eq!(second.inserted(), 2);
    assert_eq!(second.stats.placeholders_created, 0);
    drop(ingestor);

    assert_eq!(store.placeholder_calls_for(EntityKind::Cluster, 999), 1);
    assert_eq!(store.calls().placeholders, 1);
    assert!(store.contains(EntityKind::Citation, 2));
}

#[tokio::test]
async fn test_placeholder_created_once_per_key_across_run() {
    let mut store = MemoryStore::new().with_rows(EntityKind::Cluster, [1]);
    let mut cache = PlaceholderCache::new();
    let mut ingestor = BatchIngestor::new(&mut store, &mut cache);

    let batch: Vec<TypedRecord> = (1..=20).map(|id| cited(id, 50, 51)).collect();
    let report = ingestor.ingest_batch(batch).await;
    assert_eq!(report.inserted(), 20);
    assert_eq!(report.stats.retried, 1);
    drop(ingestor);

    assert_eq!(store.placeholder_calls_for(EntityKind::Opinion, 50), 1);
    assert_eq!(store.placeholder_calls_for(EntityKind::Opinion, 51), 1);
    assert_eq!(store.calls().placeholders, 2);
}

#[tokio::test]
async fn test_stale_cache_entry_is_recreated() {
    // The cache claims cluster 7 exists but the store has never seen it
    let mut store = MemoryStore::new();
    let mut cache = PlaceholderCache::seeded([(EntityKind::Cluster, 7)]);
    let mut ingestor = BatchIngestor::new(&mut store, &mut cache);

    let report = ingestor.ingest_batch(vec![citation(1, 7)]).await;
    assert_eq!(report.inserted(), 1);
    assert_eq!(report.stats.placeholders_created, 1);
    drop(ingestor);

    assert!(store.contains(EntityKind::Cluster, 7));
    assert!(cache.contains(EntityKind::Cluster, 7));
}

#[tokio::test]
async fn test_parenthetical_placeholders_use_bootstrap_rows() {
    let input = "id,text,score,described_opinion_id,describing_opinion_id,group_id\n\
                 1,\"cited for \"\"x\"\"\",0.5,10,11,20\n\
                 2,text,0.1,10,12,21\n";
    let mut store = MemoryStore::new();
    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(input), EntityKind::Parenthetical, options(10)).unwrap();

    let summary = pipeline.run(&mut store, &mut cache, None).await.unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.placeholders_created, 6);
    assert_eq!(summary.placeholder_keys[&EntityKind::Opinion], vec![10, 11, 12]);
    assert_eq!(
        summary.placeholder_keys[&EntityKind::ParentheticalGroup],
        vec![20, 21]
    );
    assert_eq!(store.calls().bootstraps, 1);
    assert!(store.contains(EntityKind::ParentheticalGroup, 1));

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["placeholder_keys"]["parenthetical-group"][1], 21);
}

#[tokio::test]
async fn test_real_rows_do_not_replace_reject_or_ignore_placeholders() {
    let mut store = MemoryStore::new().with_rows(EntityKind::Cluster, [1]);
    let mut cache = PlaceholderCache::new();
    let mut ingestor = BatchIngestor::new(&mut store, &mut cache);
    let report = ingestor
        .ingest_batch(vec![cited(1, 10, 11), citation(1, 999)])
        .await;
    assert_eq!(report.inserted(), 2);
    drop(ingestor);

    let opinion_before = store.row(EntityKind::Opinion, 10).unwrap().to_vec();
    let cluster_before = store.row(EntityKind::Cluster, 999).unwrap().to_vec();

    // Opinions reject on conflict, so the real row bounces off the placeholder
    let opinions = "id,date_created,cluster_id\n10,2020-01-01,1\n";
    let mut pipeline =
        IngestPipeline::new(Cursor::new(opinions), EntityKind::Opinion, options(10)).unwrap();
    let summary = pipeline.run(&mut store, &mut cache, None).await.unwrap();
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.violations.unique, 1);
    assert_eq!(store.row(EntityKind::Opinion, 10).unwrap(), opinion_before.as_slice());

    // Clusters ignore a conflicting id, so the placeholder stays as it was
    let clusters = "id,date_created,date_modified,judges,date_filed,case_name\n\
                    999,2020-01-01 00:00:00+00,2020-01-01 00:00:00+00,Smith,1999-05-01,A v. B\n";
    let mut pipeline =
        IngestPipeline::new(Cursor::new(clusters), EntityKind::Cluster, options(10)).unwrap();
    let summary = pipeline.run(&mut store, &mut cache, None).await.unwrap();
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.malformed, 0);
    assert_eq!(store.row(EntityKind::Cluster, 999).unwrap(), cluster_before.as_slice());
}

// ============================================================================
// IDEMPOTENCE
// ============================================================================

const CITATIONS: &str = "id,volume,reporter,page,type,cluster_id\n\
                         1,410,U.S.,113,1,1\n\
                         2,410,U.S.,114,1,2\n\
                         3,410,U.S.,115,1,2\n";

#[tokio::test]
async fn test_loading_twice_leaves_same_state() {
    let mut store = MemoryStore::new();

    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(CITATIONS), EntityKind::Citation, options(2)).unwrap();
    let first = pipeline.run(&mut store, &mut cache, None).await.unwrap();
    let after_first = store.snapshot();

    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(CITATIONS), EntityKind::Citation, options(2)).unwrap();
    let second = pipeline.run(&mut store, &mut cache, None).await.unwrap();

    assert_eq!(store.snapshot(), after_first);
    assert_eq!(first.inserted, 3);
    assert_eq!(second.inserted, 3);
    assert_eq!(second.rejected, 0);
    assert_eq!(second.placeholders_created, 0);
    assert_eq!(store.row_count(EntityKind::Citation), 3);
}

#[tokio::test]
async fn test_duplicate_opinions_are_rejected() {
    let input = "id,date_created,cluster_id\n1,2020-01-01,1\n1,2020-01-02,1\n";
    let mut store = MemoryStore::new().with_rows(EntityKind::Cluster, [1]);
    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(input), EntityKind::Opinion, options(10)).unwrap();

    let summary = pipeline.run(&mut store, &mut cache, None).await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.violations.unique, 1);
    assert!(summary.failure_samples[0]
        .message
        .starts_with("Duplicate key violation"));
}

// ============================================================================
// QUARANTINE AND ABORT
// ============================================================================

#[tokio::test]
async fn test_rejections_are_quarantined() {
    let input = "id,volume,reporter,page,type,cluster_id\n\
                 1,410,U.S.,113,1,5\n\
                 2,410,U.S.,114,1,5,extra\n\
                 3,x,U.S.,115,1,5\n\
                 4,410,\"U.S., 2d\",116,1,5\n";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("citation_bad.csv");

    let mut store = MemoryStore::new().fail_key(
        EntityKind::Citation,
        4,
        Violation::new(ViolationKind::NotNull, "null value in column type"),
    );
    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(input), EntityKind::Citation, options(10)).unwrap();
    let mut sink = QuarantineSink::create(&path, pipeline.header()).unwrap();

    let summary = pipeline
        .run(&mut store, &mut cache, Some(&mut sink))
        .await
        .unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.malformed, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.violations.not_null, 1);
    assert_eq!(summary.placeholders_created, 1);
    assert_eq!(sink.written(), 3);
    drop(sink);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "id,volume,reporter,page,type,cluster_id,reason",
            "2,410,U.S.,114,1,\"5,extra\",Malformed row: row has 7 columns but the header has 6",
            "3,x,U.S.,115,1,5,Malformed row: invalid value for 'volume': 'x' is not a valid integer",
            "4,410,\"U.S., 2d\",116,1,5,DB error: null value in column type",
        ]
    );
}

#[tokio::test]
async fn test_quarantine_reason_column_holds_reason_for_every_row() {
    let input = "id,volume,reporter,page,type,cluster_id\n\
                 1,410\n\
                 2,410,U.S.,114,1,5,extra,more\n\
                 3,x,U.S.,115,1,5\n";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("citation_bad.csv");

    let mut store = MemoryStore::new();
    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(input), EntityKind::Citation, options(10)).unwrap();
    let mut sink = QuarantineSink::create(&path, pipeline.header()).unwrap();

    let summary = pipeline
        .run(&mut store, &mut cache, Some(&mut sink))
        .await
        .unwrap();
    assert_eq!(summary.malformed, 3);
    drop(sink);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let reason_idx = headers.iter().position(|h| h == "reason").unwrap();
    assert_eq!(reason_idx, 6);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.len(), headers.len());
        assert!(row[reason_idx].starts_with("Malformed row:"), "{:?}", row);
    }
    assert_eq!(&rows[0][1], "410");
    assert_eq!(&rows[0][2], "");
    assert_eq!(&rows[1][5], "5,extra,more");
}

#[tokio::test]
async fn test_connection_loss_aborts_run_and_keeps_committed_batches() {
    let input = "id,volume,reporter,page,type,cluster_id\n\
                 1,410,U.S.,1,1,1\n\
                 2,410,U.S.,2,1,1\n\
                 3,410,U.S.,3,1,1\n\
                 4,410,U.S.,4,1,1\n\
                 5,410,U.S.,5,1,1\n";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("citation_bad.csv");

    let mut store = MemoryStore::new()
        .with_rows(EntityKind::Cluster, [1])
        .sever_after(3);
    let mut cache = PlaceholderCache::new();
    let mut pipeline =
        IngestPipeline::new(Cursor::new(input), EntityKind::Citation, options(2)).unwrap();
    let mut sink = QuarantineSink::create(&path, pipeline.header()).unwrap();

    let result = pipeline.run(&mut store, &mut cache, Some(&mut sink)).await;
    assert!(matches!(result, Err(IngestError::Connection(_))));
    assert_eq!(sink.written(), 1);
    drop(sink);

    assert_eq!(store.row_count(EntityKind::Citation), 3);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text
        .lines()
        .nth(1)
        .is_some_and(|line| line.starts_with("4,410,U.S.,4,1,1,Connection error:")));
}
