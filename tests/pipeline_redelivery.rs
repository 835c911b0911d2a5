// tests/pipeline_redelivery.rs
//
// Delivery guarantees of the processing round: records are marked only
// after the sink accepted them, so a failed export re-delivers the
// whole batch next round, and a record that cannot be transformed
// never blocks the rest.

use idea_inspiration_pipeline::export::MockSink;
use idea_inspiration_pipeline::{
    process_unprocessed, Error, IdeaInspiration, IdeaSink, NewRecord, RecordStore, Transformer,
};

struct FailingSink;

#[async_trait::async_trait]
impl IdeaSink for FailingSink {
    async fn export(&self, _ideas: &[IdeaInspiration]) -> anyhow::Result<()> {
        anyhow::bail!("downstream unavailable")
    }
}

async fn mem_store() -> RecordStore {
    RecordStore::connect("sqlite::memory:").await.expect("store")
}

#[tokio::test]
async fn failed_export_keeps_records_unprocessed() {
    let store = mem_store().await;
    store
        .upsert(&NewRecord::new("hackernews_frontpage", "1", "A story"))
        .await
        .expect("insert");

    let err = process_unprocessed(&store, &Transformer::new(), &FailingSink, 10)
        .await
        .expect_err("sink failure propagates");
    assert!(matches!(err, Error::Export(_)));
    assert_eq!(store.count_unprocessed().await.unwrap(), 1);

    // Once the sink recovers the same record goes out.
    let sink = MockSink::new();
    let report = process_unprocessed(&store, &Transformer::new(), &sink, 10)
        .await
        .expect("recovered round");
    assert_eq!(report.emitted, 1);
    assert_eq!(sink.delivered().len(), 1);
    assert_eq!(sink.delivered()[0].source_id, "1");
    assert_eq!(store.count_unprocessed().await.unwrap(), 0);
}

#[tokio::test]
async fn untransformable_record_is_skipped_not_fatal() {
    let store = mem_store().await;
    store
        .upsert(&NewRecord::new("reddit_rising", "good", "Fine post"))
        .await
        .expect("insert");
    // A title that is only whitespace passes storage but not transform.
    store
        .upsert(&NewRecord::new("reddit_rising", "bad", "   "))
        .await
        .expect("insert");

    let sink = MockSink::new();
    let report = process_unprocessed(&store, &Transformer::new(), &sink, 10)
        .await
        .expect("round");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.emitted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(sink.delivered().len(), 1);
    assert_eq!(sink.delivered()[0].source_id, "good");

    // The bad record stays unprocessed and keeps being skipped, with
    // no sink call for an empty batch.
    assert_eq!(store.count_unprocessed().await.unwrap(), 1);
    let again = process_unprocessed(&store, &Transformer::new(), &sink, 10)
        .await
        .expect("round");
    assert_eq!(again.fetched, 1);
    assert_eq!(again.emitted, 0);
    assert_eq!(again.skipped, 1);
    assert_eq!(sink.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_limit_bounds_one_round() {
    let store = mem_store().await;
    for i in 0..5 {
        store
            .upsert(&NewRecord::new("tiktok_trending", format!("v{i}"), "Clip"))
            .await
            .expect("insert");
    }

    let sink = MockSink::new();
    let first = process_unprocessed(&store, &Transformer::new(), &sink, 2)
        .await
        .expect("round");
    assert_eq!(first.fetched, 2);
    assert_eq!(store.count_unprocessed().await.unwrap(), 3);

    // Oldest rows drain first.
    let delivered = sink.delivered();
    assert_eq!(delivered[0].source_id, "v0");
    assert_eq!(delivered[1].source_id, "v1");

    let second = process_unprocessed(&store, &Transformer::new(), &sink, 10)
        .await
        .expect("round");
    assert_eq!(second.fetched, 3);
    assert_eq!(store.count_unprocessed().await.unwrap(), 0);
}
