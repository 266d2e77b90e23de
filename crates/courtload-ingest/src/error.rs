//! Error types for the ingestion pipeline
//!
//! Only [`IngestError`] ever terminates a run. Row-shape problems ([`RowError`])
//! and store outcomes are recorded per record and the pipeline moves on.

use std::path::PathBuf;

use courtload_common::CommonError;
use thiserror::Error;

use crate::schema::EntityKind;

/// Result type alias for fatal pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal, run-terminating conditions
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input has no header record")]
    MissingHeader,

    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Failed to write quarantine output: {0}")]
    Quarantine(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CommonError> for IngestError {
    fn from(err: CommonError) -> Self {
        IngestError::Config(err.to_string())
    }
}

/// Why a decoded row could not become a typed record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("row has {found} columns but the header has {expected}")]
    TooManyColumns { expected: usize, found: usize },

    #[error("mandatory column '{0}' is missing")]
    MissingColumn(String),

    #[error("mandatory column '{0}' is empty")]
    EmptyColumn(String),

    #[error("invalid value for '{column}': '{value}' is not a valid {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("{0} records are not loaded from exports")]
    UnsupportedKind(EntityKind),
}
