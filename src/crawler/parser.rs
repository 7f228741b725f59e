//! Extraction of discovery data from city pages and feed responses
//!
//! Both extraction points are positional and follow the marketplace's current
//! page and payload layout:
//! - City pages list their category links under the fourth `div` of `#main-content`,
//!   preceded by one non-category link
//! - Feed responses carry their store cards in `data.elements[4].feedItems`

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// Selector for the link block on a city page
pub const CATEGORY_LINK_SELECTOR: &str = "#main-content > div:nth-of-type(4) a[href]";

/// Position of the non-category link that leads the category block
pub const CATEGORY_SENTINEL_INDEX: usize = 0;

/// Position of the store-card element in a feed response's `data.elements`
pub const FEED_ELEMENT_INDEX: usize = 4;

/// Extracts category paths from a city page
///
/// Returns `None` when the link block is missing or empty, which means the
/// page layout no longer matches. Absolute links are reduced to their path.
///
/// # Example
///
/// ```
/// use menu_harvest::crawler::extract_category_paths;
///
/// let html = r#"<div id="main-content"><div></div><div></div><div></div>
///     <div><a href="/city/berkeley-ca/all">All</a><a href="/category/berkeley-ca/pizza">Pizza</a></div>
/// </div>"#;
/// let paths = extract_category_paths(html).unwrap();
/// assert_eq!(paths, vec!["/category/berkeley-ca/pizza"]);
/// ```
pub fn extract_category_paths(html: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(CATEGORY_LINK_SELECTOR).ok()?;
    let document = Html::parse_document(html);

    let hrefs: Vec<&str> = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .collect();

    if hrefs.is_empty() {
        return None;
    }

    Some(
        hrefs
            .into_iter()
            .enumerate()
            .filter(|(index, _)| *index != CATEGORY_SENTINEL_INDEX)
            .filter_map(|(_, href)| category_path(href))
            .collect(),
    )
}

fn category_path(href: &str) -> Option<String> {
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    if href.starts_with('/') {
        return Some(href.to_string());
    }

    let url = Url::parse(href).ok()?;
    match url.query() {
        Some(query) => Some(format!("{}?{}", url.path(), query)),
        None => Some(url.path().to_string()),
    }
}

/// Extracts candidate store identifiers from a feed response, in feed order
///
/// Returns `None` when the store-card element is missing. Cards without a
/// `uuid` are skipped.
pub fn extract_store_ids(response: &Value) -> Option<Vec<String>> {
    let items = response
        .get("data")?
        .get("elements")?
        .get(FEED_ELEMENT_INDEX)?
        .get("feedItems")?
        .as_array()?;

    Some(
        items
            .iter()
            .filter_map(|item| item.get("uuid").and_then(Value::as_str))
            .filter(|uuid| !uuid.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
