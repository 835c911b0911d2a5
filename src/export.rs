// src/export.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::transform::IdeaInspiration;

/// Downstream consumer of transformed ideas. The pipeline marks a
/// record processed only after `export` returns Ok, so a sink that
/// fails leaves its batch to be re-delivered.
#[async_trait::async_trait]
pub trait IdeaSink: Send + Sync {
    async fn export(&self, ideas: &[IdeaInspiration]) -> Result<()>;
}

/// File sink: one JSON object per line, appended. Suited to repeated
/// pipeline rounds feeding the same output file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl IdeaSink for JsonlSink {
    async fn export(&self, ideas: &[IdeaInspiration]) -> Result<()> {
        if ideas.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for idea in ideas {
            let line = serde_json::to_string(idea)
                .with_context(|| format!("serializing idea {}", idea.source_id))?;
            buf.push_str(&line);
            buf.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// --- Test helper ---
pub struct MockSink {
    pub calls: std::sync::Mutex<Vec<Vec<IdeaInspiration>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(vec![]),
        }
    }

    /// Every idea delivered so far, flattened across calls.
    pub fn delivered(&self) -> Vec<IdeaInspiration> {
        self.calls.lock().unwrap().iter().flatten().cloned().collect()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdeaSink for MockSink {
    async fn export(&self, ideas: &[IdeaInspiration]) -> Result<()> {
        self.calls.lock().unwrap().push(ideas.to_vec());
        Ok(())
    }
}
