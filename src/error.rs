// src/error.rs
use thiserror::Error;

use crate::normalize::SourceFamily;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Storage backend failed or is unreachable. Fatal for the current
    /// operation; batch runners surface it instead of retrying.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A raw item lacks the identifier its family requires.
    #[error("{family} item is missing required raw field `{field}`")]
    MissingRawField {
        family: SourceFamily,
        field: &'static str,
    },

    /// A stored record cannot be transformed into an idea.
    #[error("record {id} is missing required field `{field}`")]
    MissingField { id: i64, field: &'static str },

    /// The idea sink rejected a delivery. Records stay unprocessed and
    /// are re-delivered on the next round.
    #[error("export failed: {0}")]
    Export(anyhow::Error),
}
