// src/pipeline.rs
//
// Batch orchestration over the two pipeline halves: raw items are
// normalized and upserted, then persisted records are transformed and
// handed to the sink. One bad item, record, or provider never aborts
// the rest of its batch; storage failures do.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::export::IdeaSink;
use crate::normalize::{self, SourceFamily};
use crate::sources::{RawItem, RawItemSource};
use crate::store::{NewRecord, RecordStore, UpsertOutcome};
use crate::transform::Transformer;

/// One-time metrics registration (so series show up on exporters).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_items_seen_total", "Raw items handed to ingest.");
        describe_counter!(
            "pipeline_records_inserted_total",
            "Upserts that created a new record."
        );
        describe_counter!(
            "pipeline_records_updated_total",
            "Upserts that refreshed an existing record."
        );
        describe_counter!(
            "pipeline_items_skipped_total",
            "Raw items dropped during ingest (no identity, no title, unmappable)."
        );
        describe_counter!(
            "pipeline_provider_errors_total",
            "Source collect failures."
        );
        describe_counter!(
            "pipeline_ideas_emitted_total",
            "Ideas delivered to the sink."
        );
        describe_counter!(
            "pipeline_records_skipped_total",
            "Stored records that failed transformation."
        );
    });
}

/// Outcome counts for one ingest batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Outcome counts for one processing round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub fetched: usize,
    pub emitted: usize,
    pub skipped: usize,
}

/// Tags arrive either as a JSON array or as an already comma-joined
/// string; the stored form is always the comma-joined string.
fn canonical_tags(item: &RawItem) -> Option<String> {
    match item.get("tags") {
        Some(Value::Array(values)) => {
            let tags: Vec<&str> = values
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if tags.is_empty() {
                None
            } else {
                Some(tags.join(","))
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Normalizes and upserts one collected batch under the given feed
/// label. Items without an identity or title are skipped with a
/// warning; a storage failure aborts the batch.
pub async fn ingest_batch(
    store: &RecordStore,
    family: SourceFamily,
    source_label: &str,
    items: Vec<RawItem>,
    now: DateTime<Utc>,
) -> Result<IngestReport> {
    ensure_metrics_described();

    let mut report = IngestReport {
        seen: items.len(),
        ..IngestReport::default()
    };
    let mapper = family.mapper();

    for item in &items {
        // Identity and title are the only hard requirements.
        let Some(source_id) = normalize::native_id(family, item) else {
            warn!(source = source_label, "item without identity, skipping");
            report.skipped += 1;
            continue;
        };
        let Some(title) = item.str_field("title").map(str::trim).filter(|t| !t.is_empty())
        else {
            warn!(source = source_label, source_id = %source_id, "item without title, skipping");
            report.skipped += 1;
            continue;
        };

        let metrics = match normalize::normalize_at(family, item, now) {
            Ok(m) => m,
            Err(e) => {
                warn!(source = source_label, source_id = %source_id, error = %e, "normalization failed, skipping");
                report.skipped += 1;
                continue;
            }
        };
        let score = mapper.record_score(&metrics);
        let blob = match serde_json::to_string(&metrics) {
            Ok(b) => b,
            Err(e) => {
                warn!(source = source_label, source_id = %source_id, error = %e, "metrics not serializable, skipping");
                report.skipped += 1;
                continue;
            }
        };

        let mut record = NewRecord::new(source_label, source_id, title)
            .score(score)
            .metrics_blob(blob);
        record.description = item.str_field("description").map(str::to_string);
        record.tags = canonical_tags(item);

        match store.upsert(&record).await? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }
    }

    counter!("pipeline_items_seen_total").increment(report.seen as u64);
    counter!("pipeline_records_inserted_total").increment(report.inserted as u64);
    counter!("pipeline_records_updated_total").increment(report.updated as u64);
    counter!("pipeline_items_skipped_total").increment(report.skipped as u64);
    info!(
        source = source_label,
        seen = report.seen,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        "ingest batch complete"
    );
    Ok(report)
}

/// Collects from every provider and ingests each batch. A provider
/// that fails to collect is logged and counted; the others still run.
pub async fn run_sources(
    store: &RecordStore,
    providers: &[Box<dyn RawItemSource>],
) -> Result<Vec<(String, IngestReport)>> {
    ensure_metrics_described();

    let mut reports = Vec::with_capacity(providers.len());
    for provider in providers {
        match provider.collect().await {
            Ok(items) => {
                let report =
                    ingest_batch(store, provider.family(), provider.source(), items, Utc::now())
                        .await?;
                reports.push((provider.source().to_string(), report));
            }
            Err(e) => {
                warn!(error = ?e, source = provider.source(), "provider error");
                counter!("pipeline_provider_errors_total").increment(1);
            }
        }
    }
    Ok(reports)
}

/// One processing round: fetch up to `limit` unprocessed records,
/// transform them, deliver the ideas, then mark the delivered records.
/// Marking happens only after the sink accepted the batch, each mark
/// its own statement, so a failure anywhere re-delivers next round.
pub async fn process_unprocessed<S: IdeaSink>(
    store: &RecordStore,
    transformer: &Transformer,
    sink: &S,
    limit: i64,
) -> Result<ProcessReport> {
    ensure_metrics_described();

    let records = store.get_unprocessed(limit).await?;
    let mut report = ProcessReport {
        fetched: records.len(),
        ..ProcessReport::default()
    };
    if records.is_empty() {
        debug!("no unprocessed records");
        return Ok(report);
    }

    let mut ideas = Vec::with_capacity(records.len());
    let mut delivered_ids = Vec::with_capacity(records.len());
    for record in &records {
        match transformer.transform(record) {
            Ok(idea) => {
                ideas.push(idea);
                delivered_ids.push(record.id);
            }
            Err(e) => {
                warn!(record_id = record.id, error = %e, "transform failed, skipping record");
                report.skipped += 1;
            }
        }
    }

    if !ideas.is_empty() {
        sink.export(&ideas).await.map_err(Error::Export)?;
        for id in delivered_ids {
            if !store.mark_processed(id).await? {
                debug!(record_id = id, "record was already marked processed");
            }
        }
        report.emitted = ideas.len();
    }

    counter!("pipeline_ideas_emitted_total").increment(report.emitted as u64);
    counter!("pipeline_records_skipped_total").increment(report.skipped as u64);
    info!(
        fetched = report.fetched,
        emitted = report.emitted,
        skipped = report.skipped,
        "processing round complete"
    );
    Ok(report)
}
