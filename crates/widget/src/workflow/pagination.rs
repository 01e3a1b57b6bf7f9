//! Client-side paging over the full result list.

use visual_search_core::SearchResult;

use crate::dom::ScrollMetrics;

/// Holds every result and tracks how many pages are on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginator {
    results: Vec<SearchResult>,
    page_size: usize,
    pages: usize,
}

impl Paginator {
    /// A page size of zero is treated as one.
    #[must_use]
    pub fn new(results: Vec<SearchResult>, page_size: usize) -> Self {
        Self {
            results,
            page_size: page_size.max(1),
            pages: 0,
        }
    }

    /// Render the first page (again, if already rendered).
    pub fn first_page(&mut self) -> &[SearchResult] {
        self.pages = 0;
        self.next_page().unwrap_or_default()
    }

    /// Take the next unrendered page, if any.
    pub fn next_page(&mut self) -> Option<&[SearchResult]> {
        let start = self.rendered();
        if start >= self.results.len() && self.pages > 0 {
            return None;
        }
        self.pages += 1;
        let end = self.rendered();
        self.results.get(start..end)
    }

    /// Number of results on screen: `min(pages × page size, total)`.
    #[must_use]
    pub fn rendered(&self) -> usize {
        self.pages.saturating_mul(self.page_size).min(self.results.len())
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub const fn pages_rendered(&self) -> usize {
        self.pages
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.rendered() < self.results.len()
    }

    #[must_use]
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Whether the scroll position is close enough to the end to load more.
    #[must_use]
    pub fn should_load_more(&self, metrics: &ScrollMetrics, threshold: f64) -> bool {
        self.has_more() && metrics.distance_to_bottom() <= threshold
    }

    /// `"Showing X of Y"`.
    #[must_use]
    pub fn status_text(&self) -> String {
        format!("Showing {} of {}", self.rendered(), self.total())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn results(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult::new(format!("{i}.jpg"), format!("Item {i}"), "$1"))
            .collect()
    }

    #[test]
    fn test_pages_cover_every_item_once_in_order() {
        for (n, p) in [(0, 12), (1, 12), (12, 12), (13, 12), (30, 12), (7, 3), (5, 1)] {
            let mut paginator = Paginator::new(results(n), p);
            let mut seen: Vec<SearchResult> = paginator.first_page().to_vec();
            assert_eq!(paginator.rendered(), n.min(p));
            while let Some(page) = paginator.next_page() {
                seen.extend_from_slice(page);
                assert_eq!(
                    paginator.rendered(),
                    (paginator.pages_rendered() * p).min(n),
                    "n={n} p={p}"
                );
            }
            assert_eq!(seen, results(n), "n={n} p={p}");
            assert!(!paginator.has_more());
            assert_eq!(paginator.status_text(), format!("Showing {n} of {n}"));
        }
    }

    #[test]
    fn test_status_text_after_first_page() {
        let mut paginator = Paginator::new(results(30), 12);
        paginator.first_page();
        assert_eq!(paginator.status_text(), "Showing 12 of 30");
        paginator.next_page();
        assert_eq!(paginator.status_text(), "Showing 24 of 30");
    }

    #[test]
    fn test_should_load_more() {
        let mut paginator = Paginator::new(results(20), 12);
        paginator.first_page();
        let near = ScrollMetrics {
            scroll_top: 700.0,
            scroll_height: 1200.0,
            client_height: 400.0,
        };
        let far = ScrollMetrics {
            scroll_top: 0.0,
            ..near
        };
        assert!(paginator.should_load_more(&near, 200.0));
        assert!(!paginator.should_load_more(&far, 200.0));

        paginator.next_page();
        assert!(!paginator.should_load_more(&near, 200.0));
    }

    #[test]
    fn test_zero_page_size() {
        let mut paginator = Paginator::new(results(2), 0);
        assert_eq!(paginator.first_page().len(), 1);
    }
}
