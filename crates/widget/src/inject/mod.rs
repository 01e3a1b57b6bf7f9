//! Search input discovery and affordance injection.
//!
//! Themes are not under our control, so inputs are found with an ordered
//! selector list run as one combined query. Each qualifying input gets
//! exactly one affordance, tracked by a marker attribute on the input that
//! is set before anything is inserted.

pub mod watcher;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use visual_search_core::{ListenerId, NodeId};

use crate::config::{ConfigHandle, IconPosition};
use crate::dom::{Document, DomError, EventKind, EventTarget, SelectorList, parse_px};

/// Candidate search input selectors, most specific first.
pub const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type=\"search\"]",
    "input[name=\"q\"]",
    "input[role=\"searchbox\"]",
    "input[name*=\"search\" i]",
    "input[id*=\"search\" i]",
    "input[class*=\"search\" i]",
    "input[placeholder*=\"search\" i]",
    "predictive-search input",
    ".search__input",
    ".search-form__input",
    ".header__search input[type=\"text\"]",
];

/// Markers a theme renders when the merchant placed the app block.
pub const APP_BLOCK_SELECTORS: &[&str] = &[
    "[data-visual-search-block]",
    ".visual-search-app-block",
    "[data-block-handle=\"visual-search\"]",
    "[id^=\"shopify-block-\"][id*=\"visual_search\"]",
];

/// Ancestors treated as the input's container for the duplicate guard.
const CONTAINER_SELECTORS: &[&str] = &[
    "form",
    "predictive-search",
    "[role=\"search\"]",
    ".search-modal",
    ".header__search",
];

/// Marker attribute set on an input once it has been claimed.
pub const INJECTED_ATTR: &str = "data-vs-injected";

/// Class of the injected affordance.
pub const AFFORDANCE_CLASS: &str = "vs-affordance";

/// Attribute linking an affordance to its input.
pub const AFFORDANCE_FOR_ATTR: &str = "data-vs-for";

/// Gap between the affordance and the input text, in pixels.
const AFFORDANCE_MARGIN: f64 = 8.0;

/// Affordance size as a share of the input's rendered height.
const HEIGHT_RATIO: f64 = 0.6;

/// Find the app-block markers on the page.
#[must_use]
pub fn detect_app_blocks(document: &Document) -> Vec<NodeId> {
    SelectorList::from_parts(APP_BLOCK_SELECTORS)
        .map(|selectors| document.query_all(&selectors))
        .unwrap_or_default()
}

/// Outcome of one injection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Inputs that received an affordance in this pass.
    pub injected: Vec<NodeId>,
    /// Inputs marked but missing their affordance, now repaired.
    pub repaired: usize,
    /// Inputs skipped because they already have one or are not rendered.
    pub skipped: usize,
}

#[derive(Debug)]
struct Affordance {
    node: NodeId,
    listeners: Vec<ListenerId>,
}

/// Attaches affordances to search inputs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

#[derive(Debug)]
struct InjectorInner {
    document: Document,
    config: ConfigHandle,
    inputs: SelectorList,
    containers: SelectorList,
    affordance: SelectorList,
    registry: Mutex<HashMap<NodeId, Affordance>>,
}

impl Injector {
    /// Create an injector using [`SEARCH_INPUT_SELECTORS`].
    ///
    /// # Errors
    ///
    /// Fails only if the built-in selectors do not parse.
    pub fn new(document: Document, config: ConfigHandle) -> Result<Self, DomError> {
        let inputs = SelectorList::from_parts(SEARCH_INPUT_SELECTORS)?;
        Self::with_selectors(document, config, inputs)
    }

    /// Create an injector with a custom input selector list.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in container selectors do not parse.
    pub fn with_selectors(
        document: Document,
        config: ConfigHandle,
        inputs: SelectorList,
    ) -> Result<Self, DomError> {
        Ok(Self {
            inner: Arc::new(InjectorInner {
                document,
                config,
                inputs,
                containers: SelectorList::from_parts(CONTAINER_SELECTORS)?,
                affordance: SelectorList::parse(&format!(".{AFFORDANCE_CLASS}"))?,
                registry: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The search input selector list.
    #[must_use]
    pub fn selectors(&self) -> &SelectorList {
        &self.inner.inputs
    }

    /// Candidate inputs in document order.
    #[must_use]
    pub fn discover(&self) -> Vec<NodeId> {
        self.inner.document.query_all(&self.inner.inputs)
    }

    /// Run discovery and inject into every qualifying input.
    #[instrument(skip(self))]
    pub fn inject_all(&self) -> InjectionReport {
        let mut report = InjectionReport::default();
        for input in self.discover() {
            let was_marked = self.inner.document.has_attribute(input, INJECTED_ATTR);
            match self.inject_into(input) {
                Ok(Some(_)) if was_marked => {
                    report.repaired += 1;
                    report.injected.push(input);
                }
                Ok(Some(_)) => report.injected.push(input),
                Ok(None) => report.skipped += 1,
                Err(e) => warn!(input = %input, error = %e, "Failed to inject affordance"),
            }
        }
        if !report.injected.is_empty() {
            info!(
                injected = report.injected.len(),
                repaired = report.repaired,
                "Injected visual search affordances"
            );
        }
        report
    }

    /// Inject an affordance next to `input` unless it already has one or
    /// is not rendered. Returns the new affordance.
    ///
    /// # Errors
    ///
    /// Fails if the input vanished or has no parent.
    pub fn inject_into(&self, input: NodeId) -> Result<Option<NodeId>, DomError> {
        let document = &self.inner.document;

        if document.has_attribute(input, INJECTED_ATTR) {
            if self.affordance_for(input).is_some() {
                return Ok(None);
            }
            warn!(input = %input, "Input marked but missing its affordance, re-injecting");
            self.forget(input);
            document.remove_attribute(input, INJECTED_ATTR);
        } else if let Some(container) = self.container_of(input)
            && !document
                .query_all_within(container, &self.inner.affordance)
                .is_empty()
        {
            debug!(input = %input, "Container already has an affordance");
            return Ok(None);
        }

        if !document.is_rendered(input) {
            return Ok(None);
        }

        let parent = document.parent(input).ok_or(DomError::MissingNode(input))?;

        // Claim the input before touching the tree.
        document.set_attribute(input, INJECTED_ATTR, "true")?;

        match self.place(input, parent) {
            Ok(affordance) => Ok(Some(affordance)),
            Err(e) => {
                document.remove_attribute(input, INJECTED_ATTR);
                Err(e)
            }
        }
    }

    /// The live affordance attached to `input`.
    #[must_use]
    pub fn affordance_for(&self, input: NodeId) -> Option<NodeId> {
        let selector =
            SelectorList::parse(&format!(".{AFFORDANCE_CLASS}[{AFFORDANCE_FOR_ATTR}=\"{}\"]", input.as_u64()))
                .ok()?;
        self.inner
            .document
            .query(&selector)
            .filter(|node| self.inner.document.is_connected(*node))
    }

    /// The input an affordance (or any node inside it) belongs to.
    #[must_use]
    pub fn input_for(&self, node: NodeId) -> Option<NodeId> {
        let document = &self.inner.document;
        let affordance = document.closest(node, &self.inner.affordance)?;
        let id = document
            .attribute(affordance, AFFORDANCE_FOR_ATTR)?
            .parse::<u64>()
            .ok()?;
        let input = NodeId::new(id);
        document.exists(input).then_some(input)
    }

    /// Number of affordances currently in the page.
    #[must_use]
    pub fn affordance_count(&self) -> usize {
        self.inner.document.query_all(&self.inner.affordance).len()
    }

    /// Remove every affordance, marker and listener this injector created.
    pub fn remove_all(&self) {
        let drained: Vec<(NodeId, Affordance)> = self.inner.registry.lock().drain().collect();
        let document = &self.inner.document;
        for (input, affordance) in drained {
            for listener in affordance.listeners {
                document.remove_listener(listener);
            }
            document.remove(affordance.node);
            document.remove_attribute(input, INJECTED_ATTR);
        }
    }

    fn container_of(&self, input: NodeId) -> Option<NodeId> {
        let document = &self.inner.document;
        document
            .closest(input, &self.inner.containers)
            .or_else(|| document.parent(input))
    }

    fn forget(&self, input: NodeId) {
        if let Some(stale) = self.inner.registry.lock().remove(&input) {
            for listener in stale.listeners {
                self.inner.document.remove_listener(listener);
            }
        }
    }

    fn place(&self, input: NodeId, parent: NodeId) -> Result<NodeId, DomError> {
        let document = &self.inner.document;
        let (theme, min, max) = self
            .inner
            .config
            .read(|c| (c.theme.clone(), c.icon_size_min, c.icon_size_max));

        if document.computed_style(parent, "position") == "static" {
            document.set_style(parent, "position", "relative")?;
        }

        let height = document.rendered_height(input);
        let base = if height > 0.0 {
            (height * HEIGHT_RATIO).clamp(min, max)
        } else {
            max
        };
        let size = (base * theme.icon_size_multiplier).round();

        let side = match theme.icon_position {
            IconPosition::Left => "left",
            IconPosition::Right => "right",
        };
        let padding_property = format!("padding-{side}");
        let existing = parse_px(&document.computed_style(input, &padding_property)).unwrap_or(0.0);
        let inset = existing.max(theme.icon_offset);
        let padding = inset + size + AFFORDANCE_MARGIN;

        let affordance = document.create_element("button");
        document.set_attribute(affordance, "type", "button")?;
        document.set_attribute(
            affordance,
            "class",
            &format!("{AFFORDANCE_CLASS} {AFFORDANCE_CLASS}--{side}"),
        )?;
        document.set_attribute(affordance, AFFORDANCE_FOR_ATTR, &input.as_u64().to_string())?;
        document.set_attribute(affordance, "aria-label", "Search by image")?;
        document.set_attribute(affordance, "data-vs-icon", &theme.icon_style)?;
        document.set_style(affordance, "position", "absolute")?;
        document.set_style(affordance, "top", "50%")?;
        document.set_style(affordance, "transform", "translateY(-50%)")?;
        document.set_style(affordance, side, &format!("{inset}px"))?;
        document.set_style(affordance, "width", &format!("{size}px"))?;
        document.set_style(affordance, "height", &format!("{size}px"))?;
        document.set_style(affordance, "color", &theme.icon_color)?;

        document.set_style(input, &padding_property, &format!("{padding}px"))?;
        document.insert_after(input, affordance)?;

        let listeners = vec![
            document.add_listener(EventTarget::Node(affordance), EventKind::Click),
            document.add_listener(EventTarget::Node(affordance), EventKind::KeyDown),
        ];
        self.inner.registry.lock().insert(
            input,
            Affordance {
                node: affordance,
                listeners,
            },
        );

        debug!(input = %input, size, side, "Affordance placed");
        Ok(affordance)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::config::{ThemePatch, WidgetConfig};

    fn setup() -> (Injector, Document) {
        let document = Document::new(Url::parse("https://shop.example.com/").unwrap());
        let injector =
            Injector::new(document.clone(), ConfigHandle::new(WidgetConfig::default())).unwrap();
        (injector, document)
    }

    fn search_input(document: &Document, parent: NodeId, name: &str) -> NodeId {
        let form = document.create_element("form");
        document.append_child(parent, form).unwrap();
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.set_attribute(input, "name", name).unwrap();
        document.set_rendered_height(input, 40.0).unwrap();
        document.append_child(form, input).unwrap();
        input
    }

    #[test]
    fn test_selectors_parse() {
        assert!(SelectorList::from_parts(SEARCH_INPUT_SELECTORS).is_ok());
        assert!(SelectorList::from_parts(APP_BLOCK_SELECTORS).is_ok());
        assert!(SelectorList::from_parts(CONTAINER_SELECTORS).is_ok());
    }

    #[test]
    fn test_discover_matches_theme_inputs() {
        let (injector, document) = setup();
        let body = document.body();
        let a = search_input(&document, body, "q");
        let b = document.create_element("input");
        document.set_attribute(b, "class", "Header-SearchField").unwrap();
        document.append_child(body, b).unwrap();
        let other = document.create_element("input");
        document.set_attribute(other, "name", "email").unwrap();
        document.append_child(body, other).unwrap();

        assert_eq!(injector.discover(), vec![a, b]);
    }

    #[test]
    fn test_exactly_one_affordance_per_input_across_passes() {
        let (injector, document) = setup();
        let inputs: Vec<_> = (0..3)
            .map(|i| search_input(&document, document.body(), &format!("q{i}")))
            .collect();

        let first = injector.inject_all();
        assert_eq!(first.injected, inputs);
        for _ in 0..5 {
            let report = injector.inject_all();
            assert!(report.injected.is_empty());
            assert_eq!(report.skipped, 3);
        }
        assert_eq!(injector.affordance_count(), 3);
        for input in inputs {
            let affordance = injector.affordance_for(input).unwrap();
            assert_eq!(injector.input_for(affordance), Some(input));
            assert_eq!(document.attribute(input, INJECTED_ATTR).as_deref(), Some("true"));
        }
    }

    #[test]
    fn test_hidden_inputs_are_skipped_until_rendered() {
        let (injector, document) = setup();
        let input = search_input(&document, document.body(), "q");
        let form = document.parent(input).unwrap();
        document.set_style(form, "display", "none").unwrap();

        assert_eq!(injector.inject_into(input).unwrap(), None);
        assert!(!document.has_attribute(input, INJECTED_ATTR));

        document.remove_style(form, "display");
        assert!(injector.inject_into(input).unwrap().is_some());
    }

    #[test]
    fn test_container_with_affordance_is_skipped() {
        let (injector, document) = setup();
        let first = search_input(&document, document.body(), "q");
        let form = document.parent(first).unwrap();
        let second = document.create_element("input");
        document.set_attribute(second, "type", "search").unwrap();
        document.append_child(form, second).unwrap();

        let report = injector.inject_all();
        assert_eq!(report.injected, vec![first]);
        assert_eq!(injector.affordance_count(), 1);
    }

    #[test]
    fn test_marked_input_missing_affordance_is_repaired() {
        let (injector, document) = setup();
        let input = search_input(&document, document.body(), "q");
        injector.inject_all();
        let listeners = document.total_listeners();

        // A theme script re-rendered the form contents and dropped our button.
        let affordance = injector.affordance_for(input).unwrap();
        document.remove(affordance);

        let report = injector.inject_all();
        assert_eq!(report.repaired, 1);
        assert_eq!(injector.affordance_count(), 1);
        assert_eq!(document.total_listeners(), listeners);
    }

    #[test]
    fn test_placement_sizes_and_pads() {
        let (injector, document) = setup();
        let input = search_input(&document, document.body(), "q");
        let affordance = injector.inject_into(input).unwrap().unwrap();
        let form = document.parent(input).unwrap();

        assert_eq!(document.inline_style(form, "position").as_deref(), Some("relative"));
        // 40px * 0.6 = 24px, within [16, 32].
        assert_eq!(document.inline_style(affordance, "width").as_deref(), Some("24px"));
        assert_eq!(document.inline_style(affordance, "right").as_deref(), Some("10px"));
        // offset 10 + size 24 + margin 8
        assert_eq!(document.inline_style(input, "padding-right").as_deref(), Some("42px"));
        assert_eq!(document.children(form), vec![input, affordance]);
    }

    #[test]
    fn test_placement_respects_author_position_and_existing_padding() {
        let document = Document::new(Url::parse("https://shop.example.com/").unwrap());
        let config = ConfigHandle::new(WidgetConfig::default());
        config.update_theme(&ThemePatch {
            icon_position: Some("left".to_string()),
            icon_size_multiplier: Some(1.5),
            ..ThemePatch::default()
        });
        let injector = Injector::new(document.clone(), config).unwrap();

        let input = search_input(&document, document.body(), "q");
        document.set_rendered_height(input, 100.0).unwrap();
        let form = document.parent(input).unwrap();
        document.set_author_style(form, "position", "absolute").unwrap();
        document.set_author_style(input, "padding-left", "44px").unwrap();

        let affordance = injector.inject_into(input).unwrap().unwrap();
        assert_eq!(document.inline_style(form, "position"), None);
        // clamp(60, 16, 32) * 1.5 = 48
        assert_eq!(document.inline_style(affordance, "width").as_deref(), Some("48px"));
        assert_eq!(document.inline_style(affordance, "left").as_deref(), Some("44px"));
        assert_eq!(document.inline_style(input, "padding-left").as_deref(), Some("100px"));
    }

    #[test]
    fn test_remove_all() {
        let (injector, document) = setup();
        let input = search_input(&document, document.body(), "q");
        injector.inject_all();
        injector.remove_all();
        assert_eq!(injector.affordance_count(), 0);
        assert_eq!(document.total_listeners(), 0);
        assert!(!document.has_attribute(input, INJECTED_ATTR));
    }

    #[test]
    fn test_detect_app_blocks() {
        let document = Document::new(Url::parse("https://shop.example.com/").unwrap());
        assert!(detect_app_blocks(&document).is_empty());
        let block = document.create_element("div");
        document
            .set_attribute(block, "id", "shopify-block-visual_search_abc123")
            .unwrap();
        document.append_child(document.body(), block).unwrap();
        assert_eq!(detect_app_blocks(&document), vec![block]);
    }
}
