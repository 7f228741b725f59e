//! Sink trait and error types
//!
//! This module defines the interface every persistence destination implements
//! and the errors it can report.

use crate::record::{LabeledRecord, RecordError};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while persisting records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Rejected record: {0}")]
    Precondition(#[from] RecordError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink is closed; cannot write label {0}")]
    Closed(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// A persistence destination for labeled records
///
/// Implementations must accept concurrent writes. Sinks may decorate the
/// record they are given (assigned id, derived geo) so the caller sees the
/// persisted form.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persists one record
    async fn write(&self, record: &mut LabeledRecord) -> SinkResult<()>;

    /// Flushes and releases every destination; later writes fail
    async fn close(&self) -> SinkResult<()>;
}
