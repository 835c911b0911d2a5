// src/config.rs
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::store::OrderBy;

/// Runtime settings, passed in by the embedder. There is no implicit
/// discovery: no environment variables, no well-known paths. Callers
/// who want a file use `from_path` explicitly.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQLite URL, e.g. `sqlite://data/pipeline.s3db?mode=rwc` or
    /// `sqlite::memory:`.
    pub database_url: String,
    /// How many unprocessed records one processing round may take.
    pub process_batch_size: i64,
    /// Default LIMIT for listing queries.
    pub list_limit: i64,
    /// Listing order column; unknown names fall back to `score`.
    pub order_by: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            process_batch_size: 100,
            list_limit: 50,
            order_by: "score".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn order_by(&self) -> OrderBy {
        OrderBy::parse(&self.order_by)
    }

    /// Loads settings from a TOML or JSON file, decided by extension.
    /// Fields absent from the file keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display()))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display()))),
            other => Err(Error::Config(format!(
                "unsupported config format `{other}` for {}",
                path.display()
            ))),
        }
    }
}
