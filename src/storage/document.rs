//! SQLite-backed document store
//!
//! Stores are upserted by id, so re-crawling a store replaces its document
//! instead of duplicating it. Each document carries a derived `geo` point
//! that backs nearest-store queries.

use crate::enrich::GeoResolver;
use crate::record::{FailureRecord, GeoPoint, LabeledRecord, RecordData, RecordError, Restaurant};
use crate::storage::geo::{bounding_box, derive_geo, haversine_meters};
use crate::storage::schema::{ensure_geo_index, initialize_schema};
use crate::storage::traits::{RecordSink, SinkError, SinkResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Result limit applied when a query does not specify one
pub const DEFAULT_NEAREST_LIMIT: usize = 10;

/// Parameters of a nearest-store query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    /// Maximum number of results; `0` returns every match
    pub limit: usize,
}

impl NearestQuery {
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_meters,
            limit: DEFAULT_NEAREST_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A stored store document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub label: String,
    pub restaurant: Restaurant,
}

/// A query hit, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyDocument {
    pub label: String,
    pub restaurant: Restaurant,
    pub distance_meters: f64,
}

/// Document store sink
pub struct DocumentStoreSink {
    conn: Mutex<Connection>,
    resolver: Option<Arc<dyn GeoResolver>>,
    closed: AtomicBool,
}

impl DocumentStoreSink {
    /// Opens or creates the store at `path` and makes sure the geo index exists
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `resolver` - Address lookup used when a store reports no coordinates
    pub fn open(path: &Path, resolver: Option<Arc<dyn GeoResolver>>) -> SinkResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        Self::from_connection(conn, resolver)
    }

    /// Creates a store that lives only as long as the sink
    pub fn open_in_memory(resolver: Option<Arc<dyn GeoResolver>>) -> SinkResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, resolver)
    }

    fn from_connection(
        conn: Connection,
        resolver: Option<Arc<dyn GeoResolver>>,
    ) -> SinkResult<Self> {
        initialize_schema(&conn)?;
        ensure_geo_index(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            resolver,
            closed: AtomicBool::new(false),
        })
    }

    fn conn(&self) -> SinkResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SinkError::Poisoned)
    }

    /// Creates the geospatial index if it is missing
    pub fn ensure_geo_index(&self) -> SinkResult<()> {
        let conn = self.conn()?;
        ensure_geo_index(&conn)?;
        Ok(())
    }

    /// Inserts the store, or replaces every field of the existing document with the same id
    ///
    /// A store without a derived `geo` point is indexed at `[0, 0]`.
    pub fn upsert(&self, label: &str, restaurant: &Restaurant) -> SinkResult<()> {
        let id = restaurant
            .id
            .as_deref()
            .ok_or(SinkError::Precondition(RecordError::MissingField("id")))?;
        let geo = restaurant.geo.unwrap_or_else(GeoPoint::origin);
        let document = serde_json::to_string(restaurant)?;

        self.conn()?.execute(
            "INSERT INTO restaurants
                (id, label, name, document, geo_longitude, geo_latitude, crawl_time, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                name = excluded.name,
                document = excluded.document,
                geo_longitude = excluded.geo_longitude,
                geo_latitude = excluded.geo_latitude,
                crawl_time = excluded.crawl_time,
                updated_at = excluded.updated_at",
            params![
                id,
                label,
                restaurant.name,
                document,
                geo.longitude(),
                geo.latitude(),
                restaurant.crawl_time.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_failure(&self, failure: &FailureRecord) -> SinkResult<()> {
        let context = serde_json::to_string(failure)?;
        self.conn()?.execute(
            "INSERT INTO failures (stage, reason, context, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![failure.stage, failure.reason, context, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Looks up one store by id
    pub fn get(&self, id: &str) -> SinkResult<Option<StoredDocument>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT label, document FROM restaurants WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((label, document)) => Ok(Some(StoredDocument {
                label,
                restaurant: serde_json::from_str(&document)?,
            })),
            None => Ok(None),
        }
    }

    /// Number of stored stores
    pub fn count(&self) -> SinkResult<u64> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM restaurants", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Store counts per label, ordered by label
    pub fn count_by_label(&self) -> SinkResult<Vec<(String, u64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT label, COUNT(*) FROM restaurants GROUP BY label ORDER BY label")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Number of recorded failures
    pub fn count_failures(&self) -> SinkResult<u64> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM failures", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Stores within `radius_meters` of a point, nearest first
    pub fn nearest(&self, query: &NearestQuery) -> SinkResult<Vec<NearbyDocument>> {
        let center = GeoPoint::new(query.longitude, query.latitude);
        let (min_lat, max_lat, min_lon, max_lon) = bounding_box(&center, query.radius_meters);

        let candidates = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT label, document, geo_longitude, geo_latitude FROM restaurants
                 WHERE geo_latitude BETWEEN ?1 AND ?2
                   AND geo_longitude BETWEEN ?3 AND ?4",
            )?;
            let rows = stmt
                .query_map(params![min_lat, max_lat, min_lon, max_lon], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        GeoPoint::new(row.get(2)?, row.get(3)?),
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut hits = Vec::new();
        for (label, document, geo) in candidates {
            let distance_meters = haversine_meters(&center, &geo);
            if distance_meters > query.radius_meters {
                continue;
            }
            hits.push(NearbyDocument {
                label,
                restaurant: serde_json::from_str(&document)?,
                distance_meters,
            });
        }

        hits.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        if query.limit > 0 {
            hits.truncate(query.limit);
        }
        Ok(hits)
    }
}

#[async_trait]
impl RecordSink for DocumentStoreSink {
    async fn write(&self, record: &mut LabeledRecord) -> SinkResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed(record.label.clone()));
        }

        match &mut record.data {
            RecordData::Restaurant(restaurant) => {
                if restaurant.id.is_none() {
                    restaurant.id = Some(uuid::Uuid::new_v4().to_string());
                }
                let geo = derive_geo(&restaurant.location, self.resolver.as_deref()).await;
                restaurant.geo = Some(geo);
                self.upsert(&record.label, restaurant)
            }
            RecordData::Failure(failure) => self.insert_failure(failure),
        }
    }

    async fn close(&self) -> SinkResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.conn()?.execute_batch("PRAGMA optimize;")?;
        tracing::debug!("Document store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::GeoError;
    use crate::record::Location;
    use serde_json::Map;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn store(id: Option<&str>, name: &str, lat: Option<f64>, lon: Option<f64>) -> Restaurant {
        Restaurant {
            id: id.map(str::to_string),
            name: name.to_string(),
            location: Location {
                address: Some(format!("{} street", name)),
                latitude: lat,
                longitude: lon,
                extra: Map::new(),
            },
            categories: vec![],
            hours: vec![],
            sections: vec![],
            reviews: vec![],
            menu: BTreeMap::new(),
            store_url: None,
            crawl_time: Utc::now(),
            geo: None,
        }
    }

    struct FixedResolver(GeoPoint);

    #[async_trait]
    impl GeoResolver for FixedResolver {
        async fn resolve(&self, _address: &str) -> Result<Option<GeoPoint>, GeoError> {
            Ok(Some(self.0))
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_document() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();

        let mut first = LabeledRecord::restaurant(
            "berkeley-ca",
            store(Some("abc"), "Old Name", Some(37.87), Some(-122.27)),
        );
        sink.write(&mut first).await.unwrap();

        let mut second = LabeledRecord::restaurant(
            "berkeley-ca",
            store(Some("abc"), "New Name", Some(37.87), Some(-122.27)),
        );
        sink.write(&mut second).await.unwrap();

        assert_eq!(sink.count().unwrap(), 1);
        let stored = sink.get("abc").unwrap().unwrap();
        assert_eq!(stored.restaurant.name, "New Name");
        assert_eq!(stored.restaurant.geo.unwrap().coordinates, [-122.27, 37.87]);
    }

    #[tokio::test]
    async fn test_missing_id_is_assigned() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        let mut record = LabeledRecord::restaurant("berkeley-ca", store(None, "Anon", None, None));
        sink.write(&mut record).await.unwrap();

        let id = record.as_restaurant().unwrap().id.clone().unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert!(sink.get(&id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_geo_falls_back_to_resolver_then_origin() {
        let resolver: Arc<dyn GeoResolver> = Arc::new(FixedResolver(GeoPoint::new(-122.0, 37.0)));
        let sink = DocumentStoreSink::open_in_memory(Some(resolver)).unwrap();

        let mut record = LabeledRecord::restaurant("x-ca", store(Some("a"), "A", None, None));
        sink.write(&mut record).await.unwrap();
        assert_eq!(
            sink.get("a").unwrap().unwrap().restaurant.geo,
            Some(GeoPoint::new(-122.0, 37.0))
        );

        let plain = DocumentStoreSink::open_in_memory(None).unwrap();
        let mut record = LabeledRecord::restaurant("x-ca", store(Some("b"), "B", None, None));
        plain.write(&mut record).await.unwrap();
        assert_eq!(
            plain.get("b").unwrap().unwrap().restaurant.geo,
            Some(GeoPoint::origin())
        );
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance_and_respects_radius() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        for (id, lat, lon) in [
            ("near", 37.871, -122.271),
            ("mid", 37.80, -122.27),
            ("far", 34.05, -118.24),
        ] {
            let mut record =
                LabeledRecord::restaurant("test-ca", store(Some(id), id, Some(lat), Some(lon)));
            sink.write(&mut record).await.unwrap();
        }

        let hits = sink
            .nearest(&NearestQuery::new(37.87, -122.27, 20_000.0))
            .unwrap();
        let ids: Vec<_> = hits
            .iter()
            .map(|h| h.restaurant.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].distance_meters < hits[1].distance_meters);

        let limited = sink
            .nearest(&NearestQuery::new(37.87, -122.27, 1_000_000.0).with_limit(1))
            .unwrap();
        assert_eq!(limited.len(), 1);

        let unlimited = sink
            .nearest(&NearestQuery::new(37.87, -122.27, 1_000_000.0).with_limit(0))
            .unwrap();
        assert_eq!(unlimited.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_kept_apart_from_stores() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        let mut record = LabeledRecord::failure(FailureRecord {
            stage: "feed".to_string(),
            reason: "transport".to_string(),
            url: Some("https://example.com/api/getSeoFeedV1".to_string()),
            body: None,
            identifier: None,
            attempts: 3,
            message: "connection reset".to_string(),
        });
        sink.write(&mut record).await.unwrap();

        assert_eq!(sink.count().unwrap(), 0);
        assert_eq!(sink.count_failures().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_label() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        for (label, id) in [("b-ca", "1"), ("a-ca", "2"), ("b-ca", "3")] {
            let mut record = LabeledRecord::restaurant(label, store(Some(id), id, None, None));
            sink.write(&mut record).await.unwrap();
        }

        assert_eq!(
            sink.count_by_label().unwrap(),
            vec![("a-ca".to_string(), 1), ("b-ca".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/stores.db");

        {
            let sink = DocumentStoreSink::open(&path, None).unwrap();
            let mut record = LabeledRecord::restaurant("a-ca", store(Some("1"), "One", None, None));
            sink.write(&mut record).await.unwrap();
            sink.close().await.unwrap();
        }

        let sink = DocumentStoreSink::open(&path, None).unwrap();
        sink.ensure_geo_index().unwrap();
        assert_eq!(sink.count().unwrap(), 1);
    }

    #[test]
    fn test_ensure_geo_index_is_repeatable() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        sink.ensure_geo_index().unwrap();
        sink.ensure_geo_index().unwrap();
        assert_eq!(sink.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let sink = DocumentStoreSink::open_in_memory(None).unwrap();
        sink.close().await.unwrap();
        let mut record = LabeledRecord::restaurant("a-ca", store(Some("1"), "One", None, None));
        assert!(matches!(
            sink.write(&mut record).await,
            Err(SinkError::Closed(_))
        ));
    }
}
