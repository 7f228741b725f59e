//! Canonical store records
//!
//! This module defines the data that flows from discovery to persistence:
//! - `Restaurant`: one store, keyed by its stable identifier
//! - `MenuItem` / `MenuSection`: the store's catalog
//! - `LabeledRecord`: the unit handed to a `RecordSink`
//! - `GeoPoint`: the derived location written by the document store

mod builder;

pub use builder::{BuildError, RecordBuilder};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Label used for diagnostic records emitted when a request is dropped
pub const FAILURE_LABEL: &str = "failure";

/// One store as persisted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    /// Store identifier; the persistence key. Assigned before persistence when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub location: Location,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub hours: Vec<Value>,

    #[serde(default)]
    pub sections: Vec<Value>,

    #[serde(default)]
    pub reviews: Vec<Value>,

    /// Menu-section-group id → ordered sections
    #[serde(default)]
    pub menu: BTreeMap<String, Vec<MenuSection>>,

    /// Canonical store URL taken from the payload's embedded `metaJson`
    #[serde(rename = "storeURL", default)]
    pub store_url: Option<String>,

    #[serde(default = "Utc::now")]
    pub crawl_time: DateTime<Utc>,

    /// Derived at persistence time by the document store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
}

impl Restaurant {
    /// Iterates every menu item across all section groups
    pub fn menu_items(&self) -> impl Iterator<Item = &MenuItem> {
        self.menu
            .values()
            .flat_map(|sections| sections.iter())
            .flat_map(|section| section.items.iter())
    }

    pub fn menu_items_mut(&mut self) -> impl Iterator<Item = &mut MenuItem> {
        self.menu
            .values_mut()
            .flat_map(|sections| sections.iter_mut())
            .flat_map(|section| section.items.iter_mut())
    }
}

/// Store location as reported by the marketplace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Remaining location fields (city, postal code, ...) kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A titled group of menu items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuSection {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub image_url: String,

    /// Present only when enrichment ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoKind {
    Point,
}

/// GeoJSON point; `coordinates` is `[longitude, latitude]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: GeoKind,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: GeoKind::Point,
            coordinates: [longitude, latitude],
        }
    }

    /// `[0, 0]`, used when a store's location cannot be determined
    pub fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }
}

/// Diagnostic context for a dropped request or an unusable payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that gave up: `discover`, `feed` or `store`
    pub stage: String,

    /// `application`, `transport` or `malformed`
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    pub attempts: u32,

    pub message: String,
}

/// Payload of a labeled record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordData {
    Restaurant(Box<Restaurant>),
    Failure(FailureRecord),
}

/// The unit passed from discovery to persistence
///
/// `label` groups output (by city) and routes it to a destination; it carries
/// no uniqueness guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub label: String,
    pub data: RecordData,
}

impl LabeledRecord {
    pub fn restaurant(label: impl Into<String>, restaurant: Restaurant) -> Self {
        Self {
            label: label.into(),
            data: RecordData::Restaurant(Box::new(restaurant)),
        }
    }

    pub fn failure(failure: FailureRecord) -> Self {
        Self {
            label: FAILURE_LABEL.to_string(),
            data: RecordData::Failure(failure),
        }
    }

    pub fn as_restaurant(&self) -> Option<&Restaurant> {
        match &self.data {
            RecordData::Restaurant(restaurant) => Some(restaurant),
            RecordData::Failure(_) => None,
        }
    }

    /// Rejects records that must never reach a sink
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.label.trim().is_empty() {
            return Err(RecordError::MissingField("label"));
        }
        Ok(())
    }
}

/// A labeled record as read from untrusted input (e.g. an NDJSON import)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLabeledRecord {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub data: Option<Value>,
}

/// Precondition violations on a labeled record
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is missing `{0}`")]
    MissingField(&'static str),

    #[error("record data is neither a store nor a failure record: {0}")]
    InvalidData(#[from] serde_json::Error),
}

impl TryFrom<RawLabeledRecord> for LabeledRecord {
    type Error = RecordError;

    fn try_from(raw: RawLabeledRecord) -> Result<Self, Self::Error> {
        let label = raw
            .label
            .filter(|label| !label.trim().is_empty())
            .ok_or(RecordError::MissingField("label"))?;
        let data = match raw.data {
            None | Some(Value::Null) => return Err(RecordError::MissingField("data")),
            Some(data) => serde_json::from_value(data)?,
        };
        Ok(Self { label, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn restaurant() -> Restaurant {
        Restaurant {
            id: Some("1111".to_string()),
            name: "Test Cafe".to_string(),
            location: Location::default(),
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

    #[test]
    fn test_geo_point_serializes_as_geojson() {
        let value = serde_json::to_value(GeoPoint::new(-122.3, 37.8)).unwrap();
        assert_eq!(value, json!({"type": "Point", "coordinates": [-122.3, 37.8]}));
    }

    #[test]
    fn test_restaurant_field_names() {
        let mut store = restaurant();
        store.store_url = Some("https://example.com/store/1111".to_string());
        let value = serde_json::to_value(&store).unwrap();

        assert_eq!(value["id"], "1111");
        assert_eq!(value["name"], "Test Cafe");
        assert_eq!(value["storeURL"], "https://example.com/store/1111");
        assert!(value.get("crawlTime").is_some());
        assert!(value.get("geo").is_none());
    }

    #[test]
    fn test_record_data_distinguishes_failures() {
        let record = LabeledRecord::failure(FailureRecord {
            stage: "store".to_string(),
            reason: "application".to_string(),
            url: None,
            body: None,
            identifier: Some("abc".to_string()),
            attempts: 3,
            message: "status failure".to_string(),
        });
        let line = serde_json::to_string(&record).unwrap();
        let parsed: LabeledRecord = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.label, FAILURE_LABEL);
        assert!(parsed.as_restaurant().is_none());
    }

    #[test]
    fn test_raw_record_requires_label_and_data() {
        let missing_label = RawLabeledRecord {
            label: None,
            data: Some(json!({"name": "x"})),
        };
        assert!(matches!(
            LabeledRecord::try_from(missing_label),
            Err(RecordError::MissingField("label"))
        ));

        let missing_data = RawLabeledRecord {
            label: Some("berkeley-ca".to_string()),
            data: None,
        };
        assert!(matches!(
            LabeledRecord::try_from(missing_data),
            Err(RecordError::MissingField("data"))
        ));

        let ok = RawLabeledRecord {
            label: Some("berkeley-ca".to_string()),
            data: Some(json!({"id": "1", "name": "Cafe"})),
        };
        let record = LabeledRecord::try_from(ok).unwrap();
        assert_eq!(record.as_restaurant().unwrap().name, "Cafe");
    }

    #[test]
    fn test_blank_label_fails_validation() {
        let record = LabeledRecord::restaurant("  ", restaurant());
        assert!(record.validate().is_err());
    }
}
