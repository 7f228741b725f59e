//! Per-label file sinks
//!
//! Each label gets its own file, opened lazily on its first record. Writes to
//! one file are serialized; different files proceed independently. Labels that
//! sanitize to the same file name share that file's writer. Every file is
//! finished and flushed on `close`, and on drop if `close` never ran.

use crate::record::LabeledRecord;
use crate::storage::traits::{RecordSink, SinkError, SinkResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// On-disk layout of a label file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// One JSON object per line
    Ndjson,
    /// A single top-level JSON array, closed on shutdown
    JsonArray,
}

impl FileLayout {
    fn extension(&self) -> &'static str {
        match self {
            Self::Ndjson => "ndjson",
            Self::JsonArray => "json",
        }
    }
}

/// Open destination for one label
struct LabelWriter {
    out: BufWriter<File>,
    layout: FileLayout,
    wrote_any: bool,
    finished: bool,
}

impl LabelWriter {
    fn open(path: &Path, layout: FileLayout) -> std::io::Result<Self> {
        let mut options = OpenOptions::new();
        match layout {
            FileLayout::Ndjson => options.create(true).append(true),
            // A half-written array cannot be appended to
            FileLayout::JsonArray => options.create(true).write(true).truncate(true),
        };

        Ok(Self {
            out: BufWriter::new(options.open(path)?),
            layout,
            wrote_any: false,
            finished: false,
        })
    }

    fn write_entry(&mut self, json: &[u8]) -> std::io::Result<()> {
        match self.layout {
            FileLayout::Ndjson => {
                self.out.write_all(json)?;
                self.out.write_all(b"\n")?;
            }
            FileLayout::JsonArray => {
                self.out
                    .write_all(if self.wrote_any { b",\n" } else { b"[\n" })?;
                self.out.write_all(json)?;
            }
        }
        self.wrote_any = true;
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.layout == FileLayout::JsonArray {
            if !self.wrote_any {
                self.out.write_all(b"[")?;
            }
            self.out.write_all(b"\n]\n")?;
        }
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for LabelWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::error!("Failed to finish output file: {}", e);
        }
    }
}

/// Replaces characters that are unsafe in file names
pub fn label_file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File sink shared by both layouts
pub struct LabeledFileSink {
    directory: PathBuf,
    layout: FileLayout,
    writers: Mutex<HashMap<PathBuf, Arc<Mutex<LabelWriter>>>>,
    closed: AtomicBool,
}

impl LabeledFileSink {
    /// Creates the sink, creating `directory` if needed
    pub fn new(directory: &Path, layout: FileLayout) -> SinkResult<Self> {
        std::fs::create_dir_all(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            layout,
            writers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `label`'s records
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.directory.join(format!(
            "{}.{}",
            label_file_stem(label),
            self.layout.extension()
        ))
    }

    fn writer_for(&self, label: &str) -> SinkResult<Arc<Mutex<LabelWriter>>> {
        let path = self.path_for(label);
        let mut writers = self.writers.lock().map_err(|_| SinkError::Poisoned)?;
        if let Some(writer) = writers.get(&path) {
            return Ok(Arc::clone(writer));
        }

        tracing::debug!("Opening {} for label {}", path.display(), label);
        let writer = Arc::new(Mutex::new(LabelWriter::open(&path, self.layout)?));
        writers.insert(path, Arc::clone(&writer));
        Ok(writer)
    }

    fn write_record(&self, record: &LabeledRecord) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed(record.label.clone()));
        }

        let json = serde_json::to_vec(record)?;
        let writer = self.writer_for(&record.label)?;
        let mut writer = writer.lock().map_err(|_| SinkError::Poisoned)?;
        if writer.finished {
            return Err(SinkError::Closed(record.label.clone()));
        }
        writer.write_entry(&json)?;
        Ok(())
    }

    fn close_all(&self) -> SinkResult<()> {
        self.closed.store(true, Ordering::Release);

        let writers: Vec<_> = {
            let mut writers = self.writers.lock().map_err(|_| SinkError::Poisoned)?;
            writers.drain().collect()
        };

        let mut first_error = None;
        for (path, writer) in writers {
            let mut writer = writer.lock().map_err(|_| SinkError::Poisoned)?;
            if let Err(e) = writer.finish() {
                tracing::error!("Failed to close {}: {}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Appends one JSON line per record to `<label>.ndjson`
pub struct NdjsonFileSink(LabeledFileSink);

impl NdjsonFileSink {
    pub fn new(directory: &Path) -> SinkResult<Self> {
        LabeledFileSink::new(directory, FileLayout::Ndjson).map(Self)
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.0.path_for(label)
    }
}

#[async_trait]
impl RecordSink for NdjsonFileSink {
    async fn write(&self, record: &mut LabeledRecord) -> SinkResult<()> {
        self.0.write_record(record)
    }

    async fn close(&self) -> SinkResult<()> {
        self.0.close_all()
    }
}

/// Writes each label as one JSON array in `<label>.json`
pub struct JsonArrayFileSink(LabeledFileSink);

impl JsonArrayFileSink {
    pub fn new(directory: &Path) -> SinkResult<Self> {
        LabeledFileSink::new(directory, FileLayout::JsonArray).map(Self)
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.0.path_for(label)
    }
}

#[async_trait]
impl RecordSink for JsonArrayFileSink {
    async fn write(&self, record: &mut LabeledRecord) -> SinkResult<()> {
        self.0.write_record(record)
    }

    async fn close(&self) -> SinkResult<()> {
        self.0.close_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FailureRecord, Location, Restaurant};
    use chrono::Utc;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(label: &str, id: &str) -> LabeledRecord {
        LabeledRecord::restaurant(
            label,
            Restaurant {
                id: Some(id.to_string()),
                name: format!("Store {}", id),
                location: Location::default(),
                categories: vec![],
                hours: vec![],
                sections: vec![],
                reviews: vec![],
                menu: BTreeMap::new(),
                store_url: None,
                crawl_time: Utc::now(),
                geo: None,
            },
        )
    }

    #[test]
    fn test_label_file_stem() {
        assert_eq!(label_file_stem("berkeley-ca"), "berkeley-ca");
        assert_eq!(label_file_stem("../etc/passwd"), ".._etc_passwd");
        assert_eq!(label_file_stem("san francisco-ca"), "san_francisco-ca");
    }

    #[tokio::test]
    async fn test_ndjson_groups_by_label() {
        let dir = TempDir::new().unwrap();
        let sink = NdjsonFileSink::new(dir.path()).unwrap();

        sink.write(&mut record("berkeley-ca", "1")).await.unwrap();
        sink.write(&mut record("austin-tx", "2")).await.unwrap();
        sink.write(&mut record("berkeley-ca", "3")).await.unwrap();
        sink.close().await.unwrap();

        let berkeley = std::fs::read_to_string(sink.path_for("berkeley-ca")).unwrap();
        let lines: Vec<LabeledRecord> = berkeley
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_restaurant().unwrap().id.as_deref(), Some("3"));

        let austin = std::fs::read_to_string(sink.path_for("austin-tx")).unwrap();
        assert_eq!(austin.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_json_array_is_valid_after_close() {
        let dir = TempDir::new().unwrap();
        let sink = JsonArrayFileSink::new(dir.path()).unwrap();

        sink.write(&mut record("berkeley-ca", "1")).await.unwrap();
        sink.write(&mut record("berkeley-ca", "2")).await.unwrap();
        sink.write(&mut LabeledRecord::failure(FailureRecord {
            stage: "store".to_string(),
            reason: "application".to_string(),
            url: None,
            body: None,
            identifier: Some("9".to_string()),
            attempts: 3,
            message: "status failure".to_string(),
        }))
        .await
        .unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path_for("berkeley-ca")).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);

        let failures = std::fs::read_to_string(sink.path_for("failure")).unwrap();
        let parsed: Value = serde_json::from_str(&failures).unwrap();
        assert_eq!(parsed[0]["data"]["identifier"], "9");
    }

    #[tokio::test]
    async fn test_json_array_finished_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let sink = JsonArrayFileSink::new(dir.path()).unwrap();
            sink.write(&mut record("berkeley-ca", "1")).await.unwrap();
            sink.path_for("berkeley-ca")
        };

        let content = std::fs::read_to_string(path).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_labels_with_same_file_name_share_one_array() {
        let dir = TempDir::new().unwrap();
        let sink = JsonArrayFileSink::new(dir.path()).unwrap();
        assert_eq!(
            sink.path_for("san francisco-ca"),
            sink.path_for("san_francisco-ca")
        );

        sink.write(&mut record("san francisco-ca", "1")).await.unwrap();
        sink.write(&mut record("san_francisco-ca", "2")).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path_for("san_francisco-ca")).unwrap();
        let parsed: Vec<LabeledRecord> = serde_json::from_str(&content).unwrap();
        let ids: Vec<_> = parsed
            .iter()
            .map(|r| r.as_restaurant().unwrap().id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(parsed[0].label, "san francisco-ca");
        assert_eq!(parsed[1].label, "san_francisco-ca");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let sink = NdjsonFileSink::new(dir.path()).unwrap();
        sink.close().await.unwrap();

        let result = sink.write(&mut record("berkeley-ca", "1")).await;
        assert!(matches!(result, Err(SinkError::Closed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_label_stay_line_delimited() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(NdjsonFileSink::new(dir.path()).unwrap());

        let mut handles = Vec::new();
        for task in 0..8 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let mut r = record("berkeley-ca", &format!("{}-{}", task, i));
                    sink.write(&mut r).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path_for("berkeley-ca")).unwrap();
        let count = content
            .lines()
            .map(|l| serde_json::from_str::<LabeledRecord>(l).unwrap())
            .count();
        assert_eq!(count, 200);
    }
}
