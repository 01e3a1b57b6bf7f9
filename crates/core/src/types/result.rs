//! Canonical search result types.
//!
//! The inference service answers in several shapes; the widget reconciles
//! them into these types at the API boundary so nothing downstream has to
//! care which shape arrived.

use serde::{Deserialize, Serialize};

/// A product-like record shown as one card in the result grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchResult {
    /// Product image URL.
    pub image_url: String,
    /// Display title.
    pub title: String,
    /// Price as formatted by the service (e.g. `"$10.00"`).
    pub price: String,
    /// Product page URL, when the service provides one.
    pub url: Option<String>,
}

impl SearchResult {
    /// Create a result without a destination URL.
    #[must_use]
    pub fn new(
        image_url: impl Into<String>,
        title: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            title: title.into(),
            price: price.into(),
            url: None,
        }
    }

    /// Attach a destination URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A sub-item the service detected in the query image (e.g. "shoes").
///
/// Each detected item carries the products matched for it alone, so the
/// drawer can narrow results to a chosen subset without a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DetectedItem {
    /// Human-readable label shown on the item's chip.
    pub label: String,
    /// Products matched for this item.
    pub products: Vec<SearchResult>,
}
