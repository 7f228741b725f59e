//! Document store schema definitions
//!
//! Store documents are kept as JSON with their identity and derived location
//! lifted into columns so they can be upserted by id and queried by position.

/// SQL schema for the document store
pub const SCHEMA_SQL: &str = r#"
-- One document per store, keyed by store id
CREATE TABLE IF NOT EXISTS restaurants (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    name TEXT NOT NULL,
    document TEXT NOT NULL,
    geo_longitude REAL NOT NULL,
    geo_latitude REAL NOT NULL,
    crawl_time TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_restaurants_label ON restaurants(label);

-- Diagnostic records for dropped requests and unusable payloads
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage TEXT NOT NULL,
    reason TEXT NOT NULL,
    context TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// Index backing nearest-store queries on the derived `geo` point
pub const GEO_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_restaurants_geo ON restaurants(geo_latitude, geo_longitude);";

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Creates the geospatial index if it does not exist yet
///
/// Safe to call any number of times.
pub fn ensure_geo_index(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(GEO_INDEX_SQL)
}
