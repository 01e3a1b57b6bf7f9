//! Reconciles the inference service's response shapes into [`SearchResult`]s.
//!
//! Accepted bodies:
//!
//! | Shape                   | Example                              |
//! |-------------------------|--------------------------------------|
//! | bare array              | `[{...}, {...}]`                     |
//! | `products`              | `{"products": [...]}`                |
//! | `detectedItems`         | `{"detectedItems": [...]}`           |
//! | `items`                 | `{"items": [...]}`                   |
//!
//! Anything else is zero results, not an error.

use serde_json::{Map, Value};
use visual_search_core::{DetectedItem, SearchResult};

/// The recognized shape of a response body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    Array(&'a [Value]),
    Products(&'a [Value]),
    DetectedItems(&'a [Value]),
    Items(&'a [Value]),
    Unrecognized,
}

impl<'a> ResponseShape<'a> {
    /// The list of raw items, empty for unrecognized bodies.
    #[must_use]
    pub const fn entries(&self) -> &'a [Value] {
        match self {
            Self::Array(v) | Self::Products(v) | Self::DetectedItems(v) | Self::Items(v) => v,
            Self::Unrecognized => &[],
        }
    }
}

/// What a search response means to the drawer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    /// A flat list of matching products.
    Results(Vec<SearchResult>),
    /// Sub-items detected in the image, each with its own products.
    Detected(Vec<DetectedItem>),
}

impl Analysis {
    /// Every product, in order. For detected items, their union.
    #[must_use]
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            Self::Results(results) => results,
            Self::Detected(items) => items.into_iter().flat_map(|i| i.products).collect(),
        }
    }
}

/// Identify which accepted shape `body` has.
///
/// Object keys are checked in order `products`, `detectedItems`, `items`;
/// a key whose value is not an array does not match.
#[must_use]
pub fn classify(body: &Value) -> ResponseShape<'_> {
    match body {
        Value::Array(items) => ResponseShape::Array(items),
        Value::Object(map) => {
            if let Some(items) = array_field(map, "products") {
                ResponseShape::Products(items)
            } else if let Some(items) = array_field(map, "detectedItems") {
                ResponseShape::DetectedItems(items)
            } else if let Some(items) = array_field(map, "items") {
                ResponseShape::Items(items)
            } else {
                ResponseShape::Unrecognized
            }
        }
        _ => ResponseShape::Unrecognized,
    }
}

/// Flatten any accepted body into an ordered result list.
///
/// One result per entry; entries that are not objects are skipped.
#[must_use]
pub fn normalize(body: &Value) -> Vec<SearchResult> {
    let shape = classify(body);
    if shape == ResponseShape::Unrecognized {
        tracing::debug!("Unrecognized search response shape, treating as no results");
    }
    normalize_entries(shape.entries())
}

/// Interpret a body for the drawer.
///
/// A non-empty `detectedItems` list whose every entry carries a nested
/// `products` array is an item-detection result; everything else is a flat
/// result list as produced by [`normalize`].
#[must_use]
pub fn analyze(body: &Value) -> Analysis {
    if let ResponseShape::DetectedItems(entries) = classify(body)
        && !entries.is_empty()
        && entries
            .iter()
            .all(|e| e.get("products").is_some_and(Value::is_array))
    {
        let items = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| DetectedItem {
                label: detected_label(entry, index),
                products: entry
                    .get("products")
                    .and_then(Value::as_array)
                    .map(|p| normalize_entries(p))
                    .unwrap_or_default(),
            })
            .collect();
        return Analysis::Detected(items);
    }
    Analysis::Results(normalize(body))
}

fn array_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a [Value]> {
    map.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

fn normalize_entries(entries: &[Value]) -> Vec<SearchResult> {
    entries.iter().filter_map(normalize_item).collect()
}

/// `{ image|src, title|name, price, url? }` → [`SearchResult`].
fn normalize_item(entry: &Value) -> Option<SearchResult> {
    let item = entry.as_object()?;
    let image_url = first_string(item, &["image", "src", "imageUrl", "image_url"]);
    let title = first_string(item, &["title", "name"]);
    let price = item.get("price").map(price_text).unwrap_or_default();
    let url = first_string(item, &["url"]);

    let result = SearchResult::new(image_url, title, price);
    Some(if url.is_empty() {
        result
    } else {
        result.with_url(url)
    })
}

fn first_string(item: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn price_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn detected_label(entry: &Value, index: usize) -> String {
    ["label", "name", "category"]
        .iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| format!("Item {}", index + 1), str::to_string)
}
