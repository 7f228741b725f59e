//! Storage module for persisting crawl output
//!
//! This module owns every persistence destination a run can write to:
//! - Per-label NDJSON and JSON-array files in a timestamped run directory
//! - A SQLite document store keyed by store id with a geospatial index
//!
//! All of them implement `RecordSink`; `open_sink` selects one from config.

mod document;
mod file;
mod geo;
mod schema;
mod traits;

pub use document::{
    DocumentStoreSink, NearbyDocument, NearestQuery, StoredDocument, DEFAULT_NEAREST_LIMIT,
};
pub use file::{label_file_stem, FileLayout, JsonArrayFileSink, LabeledFileSink, NdjsonFileSink};
pub use geo::{bounding_box, derive_geo, haversine_meters};
pub use traits::{RecordSink, SinkError, SinkResult};

use crate::config::{OutputConfig, SinkKind};
use crate::enrich::GeoResolver;
use crate::record::{LabeledRecord, RecordData};
use crate::ConfigError;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Timestamped per-run subdirectory of `base`
pub fn run_directory(base: &Path, started_at: DateTime<Utc>) -> PathBuf {
    base.join(started_at.format("%Y%m%dT%H%M%SZ").to_string())
}

/// Opens the sink selected by the output configuration
///
/// File sinks write into a fresh timestamped subdirectory of the configured
/// directory. The resolver is only consulted by the document store.
///
/// # Arguments
///
/// * `config` - Output section of the run configuration
/// * `started_at` - Run start, used to name the run directory
/// * `resolver` - Address lookup for stores without coordinates
pub fn open_sink(
    config: &OutputConfig,
    started_at: DateTime<Utc>,
    resolver: Option<Arc<dyn GeoResolver>>,
) -> Result<Arc<dyn RecordSink>, HarvestError> {
    let sink: Arc<dyn RecordSink> = match config.sink {
        SinkKind::Ndjson | SinkKind::JsonArray => {
            let base = config.directory.as_deref().ok_or_else(|| {
                ConfigError::Validation("output.directory is required for file sinks".to_string())
            })?;
            let dir = run_directory(Path::new(base), started_at);
            tracing::info!("Writing output files to {}", dir.display());

            if config.sink == SinkKind::Ndjson {
                Arc::new(NdjsonFileSink::new(&dir)?)
            } else {
                Arc::new(JsonArrayFileSink::new(&dir)?)
            }
        }
        SinkKind::DocumentStore => {
            let path = config.database_path.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "output.database-path is required for the document store".to_string(),
                )
            })?;
            tracing::info!("Writing stores to document store at {}", path);
            Arc::new(DocumentStoreSink::open(Path::new(path), resolver)?)
        }
    };
    Ok(sink)
}

/// Validates a record, assigns a missing store id, then hands it to the sink
///
/// The record is decorated in place, so after a successful call it holds the
/// persisted form.
pub async fn persist(sink: &dyn RecordSink, record: &mut LabeledRecord) -> SinkResult<()> {
    record.validate()?;

    if let RecordData::Restaurant(restaurant) = &mut record.data {
        if restaurant.id.is_none() {
            restaurant.id = Some(uuid::Uuid::new_v4().to_string());
        }
    }

    sink.write(record).await
}
