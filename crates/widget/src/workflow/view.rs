//! DOM structure of the drawer.

use visual_search_core::{DetectedItem, NodeId, SearchResult, SessionId};

use super::DrawerState;
use super::zindex::DRAWER_Z_INDEX;
use crate::config::WidgetConfig;
use crate::dom::{Document, DomError, SelectorList};

/// Element id of the drawer root.
pub const DRAWER_ID: &str = "vs-drawer";

pub(crate) const CLOSE_CLASS: &str = "vs-drawer__close";
pub(crate) const BACKDROP_CLASS: &str = "vs-drawer__backdrop";
pub(crate) const FILE_BUTTON_CLASS: &str = "vs-upload__file";
pub(crate) const CAMERA_BUTTON_CLASS: &str = "vs-upload__camera";
pub(crate) const URL_BUTTON_CLASS: &str = "vs-upload__url";
pub(crate) const ANALYZE_CLASS: &str = "vs-analyze";
pub(crate) const CHIP_CLASS: &str = "vs-chip";
pub(crate) const SEARCH_ALL_CLASS: &str = "vs-search-all";
pub(crate) const SEARCH_SELECTED_CLASS: &str = "vs-search-selected";
pub(crate) const CARD_CLASS: &str = "vs-card";
pub(crate) const CARD_IMAGE_CLASS: &str = "vs-card__image";
pub(crate) const SKELETON_CLASS: &str = "vs-skeleton";
pub(crate) const UPLOAD_ANOTHER_CLASS: &str = "vs-upload-another";

/// Handles to the drawer's parts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DrawerView {
    pub root: NodeId,
    pub backdrop: NodeId,
    pub title: NodeId,
    pub count: NodeId,
    pub close: NodeId,
    pub upload: NodeId,
    pub file_input: NodeId,
    pub camera_input: NodeId,
    pub preview: NodeId,
    pub preview_image: NodeId,
    pub items: NodeId,
    pub chips: NodeId,
    pub search_selected: NodeId,
    pub results: NodeId,
    pub grid: NodeId,
    pub upload_another: NodeId,
}

fn element(
    document: &Document,
    parent: NodeId,
    tag: &str,
    class: &str,
) -> Result<NodeId, DomError> {
    let node = document.create_element(tag);
    document.set_attribute(node, "class", class)?;
    document.append_child(parent, node)?;
    Ok(node)
}

fn button(document: &Document, parent: NodeId, class: &str, label: &str) -> Result<NodeId, DomError> {
    let node = element(document, parent, "button", class)?;
    document.set_attribute(node, "type", "button")?;
    document.set_text(node, label)?;
    Ok(node)
}

impl DrawerView {
    /// Build a detached drawer and attach it to `<body>`.
    pub fn build(
        document: &Document,
        config: &WidgetConfig,
        session: SessionId,
    ) -> Result<Self, DomError> {
        let root = document.create_element("div");
        document.set_attribute(root, "id", DRAWER_ID)?;
        document.set_attribute(root, "class", "vs-drawer")?;
        document.set_attribute(root, "role", "dialog")?;
        document.set_attribute(root, "aria-modal", "true")?;
        document.set_attribute(root, "data-vs-session", &session.to_string())?;
        document.set_style(root, "position", "fixed")?;
        document.set_style(root, "z-index", &DRAWER_Z_INDEX.to_string())?;
        document.set_style(root, "--vs-primary-color", &config.theme.primary_color)?;

        let backdrop = element(document, root, "div", BACKDROP_CLASS)?;
        let panel = element(document, root, "div", "vs-drawer__panel")?;

        let header = element(document, panel, "div", "vs-drawer__header")?;
        let title = element(document, header, "h2", "vs-drawer__title")?;
        let count = element(document, header, "p", "vs-drawer__count")?;
        let close = button(document, header, CLOSE_CLASS, "Close")?;
        document.set_attribute(close, "aria-label", "Close visual search")?;

        let body = element(document, panel, "div", "vs-drawer__body")?;

        let upload = element(document, body, "div", "vs-upload")?;
        button(document, upload, FILE_BUTTON_CLASS, "Upload a photo")?;
        button(document, upload, CAMERA_BUTTON_CLASS, "Take a photo")?;
        button(document, upload, URL_BUTTON_CLASS, "Paste image URL")?;
        let accept = config.accept_attribute();
        let file_input = element(document, upload, "input", "vs-file-input")?;
        document.set_attribute(file_input, "type", "file")?;
        document.set_attribute(file_input, "accept", &accept)?;
        document.set_attribute(file_input, "hidden", "")?;
        let camera_input = element(document, upload, "input", "vs-camera-input")?;
        document.set_attribute(camera_input, "type", "file")?;
        document.set_attribute(camera_input, "accept", &accept)?;
        document.set_attribute(camera_input, "capture", "environment")?;
        document.set_attribute(camera_input, "hidden", "")?;

        let preview = element(document, body, "div", "vs-preview")?;
        let preview_image = element(document, preview, "img", "vs-preview__image")?;
        document.set_attribute(preview_image, "alt", "Your photo")?;
        element(document, preview, "div", "vs-crop")?;
        button(document, preview, ANALYZE_CLASS, "Search")?;

        let items = element(document, body, "div", "vs-items")?;
        let chips = element(document, items, "div", "vs-items__chips")?;
        let actions = element(document, items, "div", "vs-items__actions")?;
        button(document, actions, SEARCH_ALL_CLASS, "Search all")?;
        let search_selected = button(document, actions, SEARCH_SELECTED_CLASS, "Search selected")?;

        let results = element(document, body, "div", "vs-results")?;
        document.set_style(results, "overflow-y", "auto")?;
        let grid = element(document, results, "div", "vs-grid")?;
        let upload_another = button(document, body, UPLOAD_ANOTHER_CLASS, "Upload another")?;

        document.append_child(document.body(), root)?;

        let view = Self {
            root,
            backdrop,
            title,
            count,
            close,
            upload,
            file_input,
            camera_input,
            preview,
            preview_image,
            items,
            chips,
            search_selected,
            results,
            grid,
            upload_another,
        };
        view.set_state(document, DrawerState::UploadPending)?;
        view.set_disabled(document, search_selected, true)?;
        Ok(view)
    }

    /// Show the sections relevant to `state`.
    pub fn set_state(&self, document: &Document, state: DrawerState) -> Result<(), DomError> {
        use DrawerState::{
            Analyzing, Closed, ImagePreview, ItemsDetected, ResultsDisplayed, Searching,
            UploadPending,
        };
        document.set_attribute(self.root, "data-state", state.as_str())?;
        document.set_attribute(self.root, "aria-busy", if state.is_loading() { "true" } else { "false" })?;

        let (upload, preview, items, results, another) = match state {
            UploadPending => (true, false, false, false, false),
            ImagePreview => (true, true, false, false, false),
            Analyzing => (false, true, false, true, false),
            ItemsDetected => (false, true, true, false, true),
            Searching => (false, true, true, true, false),
            ResultsDisplayed => (false, true, false, true, true),
            Closed => (false, false, false, false, false),
        };
        for (node, visible) in [
            (self.upload, upload),
            (self.preview, preview),
            (self.items, items),
            (self.results, results),
            (self.upload_another, another),
        ] {
            if visible {
                document.remove_attribute(node, "hidden");
            } else {
                document.set_attribute(node, "hidden", "")?;
            }
        }
        Ok(())
    }

    pub fn set_header(&self, document: &Document, text: &str) -> Result<(), DomError> {
        document.set_text(self.title, text)
    }

    pub fn set_count(&self, document: &Document, text: &str) -> Result<(), DomError> {
        document.set_text(self.count, text)
    }

    pub fn header(&self, document: &Document) -> String {
        document.text_content(self.title)
    }

    pub fn count_text(&self, document: &Document) -> String {
        document.text_content(self.count)
    }

    pub fn set_preview(&self, document: &Document, src: Option<&str>) -> Result<(), DomError> {
        match src {
            Some(src) => document.set_attribute(self.preview_image, "src", src),
            None => {
                document.remove_attribute(self.preview_image, "src");
                Ok(())
            }
        }
    }

    pub fn clear_grid(&self, document: &Document) {
        for child in document.children(self.grid) {
            document.remove(child);
        }
    }

    /// Replace the grid with `count` placeholders.
    pub fn show_skeletons(&self, document: &Document, count: usize) -> Result<(), DomError> {
        self.clear_grid(document);
        for _ in 0..count {
            let skeleton = element(document, self.grid, "div", SKELETON_CLASS)?;
            document.set_attribute(skeleton, "aria-hidden", "true")?;
        }
        Ok(())
    }

    /// Remove placeholders, leaving any cards.
    pub fn clear_skeletons(&self, document: &Document) {
        if let Ok(selector) = SelectorList::parse(&format!(".{SKELETON_CLASS}")) {
            for skeleton in document.query_all_within(self.grid, &selector) {
                document.remove(skeleton);
            }
        }
    }

    /// Append one card per result, numbered from `first_index`.
    pub fn append_cards(
        &self,
        document: &Document,
        results: &[SearchResult],
        first_index: usize,
    ) -> Result<(), DomError> {
        for (offset, result) in results.iter().enumerate() {
            let card = element(document, self.grid, "div", CARD_CLASS)?;
            document.set_attribute(card, "data-index", &(first_index + offset).to_string())?;
            if let Some(url) = &result.url {
                document.set_attribute(card, "data-url", url)?;
            }
            let image = element(document, card, "img", CARD_IMAGE_CLASS)?;
            document.set_attribute(image, "src", &result.image_url)?;
            document.set_attribute(image, "alt", &result.title)?;
            document.set_attribute(image, "title", "Search with this image")?;
            let title = element(document, card, "div", "vs-card__title")?;
            document.set_text(title, &result.title)?;
            let price = element(document, card, "div", "vs-card__price")?;
            document.set_text(price, &result.price)?;
        }
        Ok(())
    }

    pub fn render_chips(&self, document: &Document, items: &[DetectedItem]) -> Result<(), DomError> {
        for child in document.children(self.chips) {
            document.remove(child);
        }
        for (index, item) in items.iter().enumerate() {
            let chip = button(document, self.chips, CHIP_CLASS, &item.label)?;
            document.set_attribute(chip, "data-index", &index.to_string())?;
            document.set_attribute(chip, "aria-pressed", "false")?;
        }
        self.set_disabled(document, self.search_selected, true)
    }

    pub fn update_chip(
        &self,
        document: &Document,
        index: usize,
        selected: bool,
        any_selected: bool,
    ) -> Result<(), DomError> {
        if let Some(chip) = document.children(self.chips).get(index).copied() {
            document.set_attribute(chip, "aria-pressed", if selected { "true" } else { "false" })?;
            if selected {
                document.add_class(chip, "is-selected")?;
            } else {
                document.remove_class(chip, "is-selected");
            }
        }
        self.set_disabled(document, self.search_selected, !any_selected)
    }

    pub fn set_disabled(&self, document: &Document, node: NodeId, disabled: bool) -> Result<(), DomError> {
        if disabled {
            document.set_attribute(node, "disabled", "")?;
            document.add_class(node, "is-disabled")
        } else {
            document.remove_attribute(node, "disabled");
            document.remove_class(node, "is-disabled");
            Ok(())
        }
    }

    /// Number of cards and placeholders in the grid.
    pub fn grid_counts(&self, document: &Document) -> (usize, usize) {
        let mut cards = 0;
        let mut skeletons = 0;
        for child in document.children(self.grid) {
            if document.has_class(child, CARD_CLASS) {
                cards += 1;
            } else if document.has_class(child, SKELETON_CLASS) {
                skeletons += 1;
            }
        }
        (cards, skeletons)
    }

    /// The `data-index` of the closest ancestor (or self) with `class`.
    pub fn indexed_ancestor(&self, document: &Document, node: NodeId, class: &str) -> Option<usize> {
        let selector = SelectorList::parse(&format!(".{class}")).ok()?;
        let found = document.closest(node, &selector)?;
        if !document.contains(self.root, found) {
            return None;
        }
        document.attribute(found, "data-index")?.parse().ok()
    }

    /// Whether `node` lies inside an element of `class` within the drawer.
    pub fn within(&self, document: &Document, node: NodeId, class: &str) -> bool {
        SelectorList::parse(&format!(".{class}"))
            .ok()
            .and_then(|selector| document.closest(node, &selector))
            .is_some_and(|found| document.contains(self.root, found))
    }
}
