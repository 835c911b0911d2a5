// src/lib.rs
// Public library surface for integration tests (and embedders).

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod transform;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::{Error, Result};
pub use crate::export::{IdeaSink, JsonlSink};
pub use crate::normalize::{normalize, normalize_at, SourceFamily, UniversalMetrics};
pub use crate::pipeline::{
    ingest_batch, process_unprocessed, run_sources, IngestReport, ProcessReport,
};
pub use crate::sources::{RawItem, RawItemSource};
pub use crate::store::{NewRecord, OrderBy, RecordStore, SourceRecord, UpsertOutcome};
pub use crate::transform::{ContentType, IdeaInspiration, Transformer};
