//! Maps a raw store-detail payload into a `Restaurant`
//!
//! Identity fields (`uuid`, `title`) are required; everything else is
//! tolerated with a default when missing or malformed.

use crate::record::{Location, MenuItem, MenuSection, Restaurant};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that make a single store payload unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("store payload is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("store payload is not a JSON object")]
    NotAnObject,
}

/// Builds canonical records from store-detail payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder;

impl RecordBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Maps the `data` object of a store-detail response
    ///
    /// # Arguments
    ///
    /// * `payload` - The store-detail `data` object
    /// * `crawl_time` - When the fetch completed
    pub fn build(&self, payload: &Value, crawl_time: DateTime<Utc>) -> Result<Restaurant, BuildError> {
        let object = payload.as_object().ok_or(BuildError::NotAnObject)?;

        let id = required_string(payload, "uuid")?;
        let name = required_string(payload, "title")?;

        let location = match object.get("location") {
            Some(value) if !value.is_null() => serde_json::from_value::<Location>(value.clone())
                .unwrap_or_else(|e| {
                    tracing::warn!("Store {} has malformed location: {}", id, e);
                    Location::default()
                }),
            _ => Location::default(),
        };

        Ok(Restaurant {
            store_url: extract_store_url(&id, object.get("metaJson")),
            categories: extract_categories(object.get("categories")),
            hours: array_field(object.get("hours")),
            sections: array_field(object.get("sections")),
            reviews: array_field(object.get("storeReviews")),
            menu: extract_menu(object.get("catalogSectionsMap")),
            id: Some(id),
            name,
            location,
            crawl_time,
            geo: None,
        })
    }
}

fn required_string(payload: &Value, field: &'static str) -> Result<String, BuildError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(BuildError::MissingField(field))
}

fn array_field(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// `metaJson` is itself a JSON document encoded as a string; its `@id` is the store URL
///
/// A string that fails to parse leaves the URL unset; the rest of the record is still valid.
fn extract_store_url(id: &str, meta_json: Option<&Value>) -> Option<String> {
    let encoded = meta_json?.as_str()?;
    match serde_json::from_str::<Value>(encoded) {
        Ok(meta) => meta.get("@id").and_then(Value::as_str).map(str::to_string),
        Err(e) => {
            tracing::warn!("Store {} has unparsable metaJson: {}", id, e);
            None
        }
    }
}

/// Categories arrive as plain strings or as objects carrying a `title`/`name`
fn extract_categories(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(label) => Some(label.clone()),
            Value::Object(fields) => fields
                .get("title")
                .or_else(|| fields.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn extract_menu(value: Option<&Value>) -> BTreeMap<String, Vec<MenuSection>> {
    let Some(Value::Object(groups)) = value else {
        return BTreeMap::new();
    };

    groups
        .iter()
        .map(|(group_id, sections)| {
            let sections = match sections {
                Value::Array(sections) => sections.iter().map(extract_section).collect(),
                _ => Vec::new(),
            };
            (group_id.clone(), sections)
        })
        .collect()
}

fn extract_section(section: &Value) -> MenuSection {
    // Sections wrap their items in `payload.standardItemsPayload`
    let body = section
        .pointer("/payload/standardItemsPayload")
        .unwrap_or(section);

    let title = body
        .pointer("/title/text")
        .or_else(|| body.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let items = match body.get("catalogItems") {
        Some(Value::Array(items)) => items.iter().filter_map(extract_item).collect(),
        _ => Vec::new(),
    };

    MenuSection { title, items }
}

fn extract_item(item: &Value) -> Option<MenuItem> {
    let id = item.get("uuid").and_then(Value::as_str)?;
    let title = item.get("title").and_then(Value::as_str).unwrap_or_default();

    let description = item
        .get("itemDescription")
        .or_else(|| item.get("description"))
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Some(MenuItem {
        id: id.to_string(),
        title: title.to_string(),
        description,
        image_url: item
            .get("imageUrl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        embedding: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "uuid": "11111111-1111-1111-1111-111111111111",
            "title": "Test Cafe",
            "location": {
                "address": "2000 Shattuck Ave, Berkeley, CA",
                "latitude": 37.87,
                "longitude": -122.27,
                "city": "Berkeley"
            },
            "hours": [{"dayRange": "Every Day"}],
            "categories": ["Cafe", {"title": "Breakfast"}, 7],
            "sections": [{"title": "Menu"}],
            "storeReviews": [{"rating": 5}],
            "catalogSectionsMap": {
                "group-1": [{
                    "payload": {"standardItemsPayload": {
                        "title": {"text": "Popular"},
                        "catalogItems": [
                            {"uuid": "item-1", "title": "Latte", "itemDescription": "Hot", "imageUrl": "https://img/1"},
                            {"uuid": "item-2", "title": "Bagel", "itemDescription": ""},
                            {"title": "No id"}
                        ]
                    }}
                }]
            },
            "metaJson": "{\"@id\": \"https://www.ubereats.com/store/test-cafe/abc\"}"
        })
    }

    #[test]
    fn test_build_maps_fields() {
        let now = Utc::now();
        let store = RecordBuilder::new().build(&payload(), now).unwrap();

        assert_eq!(store.id.as_deref(), Some("11111111-1111-1111-1111-111111111111"));
        assert_eq!(store.name, "Test Cafe");
        assert_eq!(store.location.latitude, Some(37.87));
        assert_eq!(store.location.longitude, Some(-122.27));
        assert_eq!(store.location.extra["city"], "Berkeley");
        assert_eq!(store.categories, vec!["Cafe", "Breakfast"]);
        assert_eq!(store.hours.len(), 1);
        assert_eq!(store.reviews.len(), 1);
        assert_eq!(
            store.store_url.as_deref(),
            Some("https://www.ubereats.com/store/test-cafe/abc")
        );
        assert_eq!(store.crawl_time, now);

        let sections = &store.menu["group-1"];
        assert_eq!(sections[0].title.as_deref(), Some("Popular"));
        assert_eq!(sections[0].items.len(), 2);
        assert_eq!(sections[0].items[0].description.as_deref(), Some("Hot"));
        assert_eq!(sections[0].items[1].description, None);
        assert_eq!(sections[0].items[1].image_url, "");
    }

    #[test]
    fn test_unparsable_meta_json_is_not_fatal() {
        let mut raw = payload();
        raw["metaJson"] = json!("{not json");

        let store = RecordBuilder::new().build(&raw, Utc::now()).unwrap();
        assert_eq!(store.store_url, None);
        assert_eq!(store.name, "Test Cafe");
    }

    #[test]
    fn test_missing_identity_is_fatal() {
        let mut raw = payload();
        raw.as_object_mut().unwrap().remove("uuid");
        assert_eq!(
            RecordBuilder::new().build(&raw, Utc::now()),
            Err(BuildError::MissingField("uuid"))
        );

        let mut raw = payload();
        raw["title"] = json!("");
        assert_eq!(
            RecordBuilder::new().build(&raw, Utc::now()),
            Err(BuildError::MissingField("title"))
        );
    }

    #[test]
    fn test_minimal_payload_defaults() {
        let raw = json!({"uuid": "abc", "title": "Bare"});
        let store = RecordBuilder::new().build(&raw, Utc::now()).unwrap();

        assert_eq!(store.location, Location::default());
        assert!(store.menu.is_empty());
        assert!(store.categories.is_empty());
        assert_eq!(store.store_url, None);
    }
}
