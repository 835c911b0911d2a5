// src/sources.rs
use anyhow::Result;
use serde_json::{Map, Value};

use crate::normalize::SourceFamily;

/// One raw item as handed over by a collector: a JSON object with the
/// well-known keys `source_id`, `title`, `description`, `tags` and a
/// nested `metrics` map of platform-native telemetry.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RawItem(pub Map<String, Value>);

impl RawItem {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wraps a JSON value, returning `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String identifiers may arrive as JSON numbers (HackerNews item
    /// ids do); both shapes are accepted.
    pub fn id_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Counter accessor: accepts numbers and numeric strings, treats
    /// anything negative or unparsable as absent.
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s
                .trim()
                .parse::<u64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64)),
            _ => None,
        }
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn map_field(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Nested view over an object field, for mappers that read
    /// `stats.playCount` style payloads.
    pub fn submap(&self, key: &str) -> Option<RawItem> {
        self.map_field(key).cloned().map(RawItem)
    }

    /// The platform telemetry payload: the nested `metrics` object
    /// when the collector separated it out, the item itself otherwise.
    pub fn telemetry(&self) -> RawItem {
        self.submap("metrics").unwrap_or_else(|| self.clone())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Contract for external collectors (scrapers, API pollers, fixture
/// feeds). Implementations live outside this crate; the pipeline only
/// consumes their output.
#[async_trait::async_trait]
pub trait RawItemSource: Send + Sync {
    /// Fetch the current batch of raw items for this feed.
    async fn collect(&self) -> Result<Vec<RawItem>>;

    /// Platform family every item of this feed belongs to.
    fn family(&self) -> SourceFamily;

    /// Feed label persisted as the record `source`,
    /// e.g. "hackernews_frontpage".
    fn source(&self) -> &str;
}
