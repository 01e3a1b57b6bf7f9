//! In-process model of the host page's DOM.
//!
//! The widget runs inside storefront themes it does not control. Everything it
//! does to the page (finding inputs, inserting affordances, building the
//! drawer, lowering z-indices, registering listeners, minting object URLs)
//! goes through [`Document`], so the policies can be exercised without a
//! browser. A browser binding mirrors this surface one call at a time.
//!
//! [`Document`] is a cheaply cloneable handle; all clones see the same tree.

pub mod selector;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;
use visual_search_core::{ListenerId, NodeId};

pub use selector::{SelectorError, SelectorList};
use selector::SelectorContext;

/// Errors raised by tree operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node {0} does not exist")]
    MissingNode(NodeId),
    #[error("cannot insert node {child} under its own descendant {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    #[error("invalid selector: {0}")]
    Selector(#[from] SelectorError),
}

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Window,
    Document,
    Node(NodeId),
}

/// The event types the widget listens for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    KeyDown,
    Scroll,
    Change,
    Resize,
    Unload,
    Custom(String),
}

/// Scroll geometry of a scrollable element.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Pixels left between the bottom of the viewport and the end of content.
    #[must_use]
    pub fn distance_to_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

/// A structural change, as a `MutationObserver` would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    ChildAdded { parent: NodeId, child: NodeId },
    ChildRemoved { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    inline_style: BTreeMap<String, String>,
    author_style: BTreeMap<String, String>,
    text: String,
    height: f64,
    scroll: ScrollMetrics,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            inline_style: BTreeMap::new(),
            author_style: BTreeMap::new(),
            text: String::new(),
            height: 0.0,
            scroll: ScrollMetrics::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct Listener {
    target: EventTarget,
    kind: EventKind,
}

struct Tree {
    location: Url,
    next_node: u64,
    nodes: HashMap<NodeId, Element>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    mutations: Vec<Mutation>,
    observers: usize,
    next_listener: u64,
    listeners: BTreeMap<ListenerId, Listener>,
    next_object_url: u64,
    object_urls: HashMap<String, Bytes>,
}

impl SelectorContext for Tree {
    fn tag_of(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|e| e.tag.as_str())
    }

    fn attribute_of(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&node)
            .and_then(|e| e.attributes.get(name))
            .map(String::as_str)
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|e| e.parent)
    }
}

impl Tree {
    fn new(location: Url) -> Self {
        let mut tree = Self {
            location,
            next_node: 1,
            nodes: HashMap::new(),
            root: NodeId::new(0),
            head: NodeId::new(0),
            body: NodeId::new(0),
            mutations: Vec::new(),
            observers: 0,
            next_listener: 1,
            listeners: BTreeMap::new(),
            next_object_url: 1,
            object_urls: HashMap::new(),
        };
        let root = tree.alloc("html");
        let head = tree.alloc("head");
        let body = tree.alloc("body");
        tree.link(root, head, None);
        tree.link(root, body, None);
        tree.root = root;
        tree.head = head;
        tree.body = body;
        tree
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Element::new(tag));
        id
    }

    fn get(&self, node: NodeId) -> Result<&Element, DomError> {
        self.nodes.get(&node).ok_or(DomError::MissingNode(node))
    }

    fn get_mut(&mut self, node: NodeId) -> Result<&mut Element, DomError> {
        self.nodes.get_mut(&node).ok_or(DomError::MissingNode(node))
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent_of(n);
        }
        false
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent_of(node) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(e) = self.nodes.get_mut(&node) {
            e.parent = None;
        }
        self.record(Mutation::ChildRemoved {
            parent,
            child: node,
        });
    }

    /// Records are only kept while someone is observing.
    fn record(&mut self, mutation: Mutation) {
        if self.observers > 0 {
            self.mutations.push(mutation);
        }
    }

    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            let index = index.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    fn insert(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.get(parent)?;
        self.get(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        self.detach(child);
        let index = before.and_then(|reference| {
            self.nodes
                .get(&parent)
                .and_then(|p| p.children.iter().position(|c| *c == reference))
        });
        self.link(parent, child, index);
        self.record(Mutation::ChildAdded { parent, child });
        Ok(())
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(&root)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(e) = self.nodes.get(&node) {
                stack.extend(e.children.iter().rev().copied());
            }
        }
        out
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node) && self.is_ancestor_or_self(self.root, node)
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        let element = self.nodes.get(&node)?;
        if let Some(value) = element
            .inline_style
            .get(property)
            .or_else(|| element.author_style.get(property))
        {
            return Some(value.clone());
        }
        // Custom properties inherit.
        if property.starts_with("--") {
            return element
                .parent
                .and_then(|parent| self.computed_style(parent, property));
        }
        Some(default_style(&element.tag, property).to_string())
    }

    fn is_rendered(&self, node: NodeId) -> bool {
        if !self.is_connected(node) {
            return false;
        }
        let mut current = Some(node);
        while let Some(n) = current {
            let hidden = self.attribute_of(n, "hidden").is_some()
                || self.computed_style(n, "display").as_deref() == Some("none");
            if hidden {
                return false;
            }
            current = self.parent_of(n);
        }
        true
    }
}

fn default_style(tag: &str, property: &str) -> &'static str {
    match property {
        "position" => "static",
        "z-index" => "auto",
        "display" => match tag {
            "head" | "script" | "style" | "link" | "template" | "meta" => "none",
            "input" | "span" | "a" | "button" | "img" | "label" | "svg" => "inline",
            _ => "block",
        },
        p if p.starts_with("padding") || p.starts_with("margin") => "0px",
        _ => "",
    }
}

/// Parse a CSS pixel length such as `"12px"` or `"12"`.
#[must_use]
pub fn parse_px(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Handle to the host page.
#[derive(Clone)]
pub struct Document {
    tree: Arc<Mutex<Tree>>,
    changed: Arc<Notify>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.lock();
        f.debug_struct("Document")
            .field("location", &tree.location.as_str())
            .field("nodes", &tree.nodes.len())
            .field("listeners", &tree.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty page (`<html><head/><body/></html>`) at `location`.
    #[must_use]
    pub fn new(location: Url) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new(location))),
            changed: Arc::new(Notify::new()),
        }
    }

    // =========================================================================
    // Location
    // =========================================================================

    /// The current page URL.
    #[must_use]
    pub fn location(&self) -> Url {
        self.tree.lock().location.clone()
    }

    /// Change the URL without a reload, like `history.pushState`.
    ///
    /// Deliberately produces no mutation record: client-side navigation is
    /// only observable by polling the location.
    pub fn push_state(&self, url: Url) {
        self.tree.lock().location = url;
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// The `<html>` element.
    #[must_use]
    pub fn document_element(&self) -> NodeId {
        self.tree.lock().root
    }

    /// The `<head>` element.
    #[must_use]
    pub fn head(&self) -> NodeId {
        self.tree.lock().head
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.tree.lock().body
    }

    /// Create a detached element.
    #[must_use]
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree.lock().alloc(tag)
    }

    /// Append `child` as the last child of `parent`, moving it if attached.
    ///
    /// # Errors
    ///
    /// Fails if either node is missing or `parent` lies inside `child`.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.tree.lock().insert(parent, child, None)?;
        self.changed.notify_one();
        Ok(())
    }

    /// Insert `child` into `parent` before `reference` (or last if `None`).
    ///
    /// # Errors
    ///
    /// Fails if either node is missing or `parent` lies inside `child`.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.tree.lock().insert(parent, child, reference)?;
        self.changed.notify_one();
        Ok(())
    }

    /// Insert `child` as the next sibling of `reference`.
    ///
    /// # Errors
    ///
    /// Fails if `reference` has no parent or the insert is invalid.
    pub fn insert_after(&self, reference: NodeId, child: NodeId) -> Result<(), DomError> {
        {
            let mut tree = self.tree.lock();
            let parent = tree
                .parent_of(reference)
                .ok_or(DomError::MissingNode(reference))?;
            let next = tree.get(parent).ok().and_then(|p| {
                let index = p.children.iter().position(|c| *c == reference)?;
                p.children.get(index + 1).copied()
            });
            tree.insert(parent, child, next)?;
        }
        self.changed.notify_one();
        Ok(())
    }

    /// Detach `node` and drop it and its subtree from the page.
    ///
    /// Returns `false` if the node did not exist.
    pub fn remove(&self, node: NodeId) -> bool {
        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(&node) {
            return false;
        }
        tree.detach(node);
        let mut doomed = tree.descendants(node);
        doomed.push(node);
        for n in doomed {
            tree.nodes.remove(&n);
        }
        true
    }

    /// Whether the node still exists (attached or not).
    #[must_use]
    pub fn exists(&self, node: NodeId) -> bool {
        self.tree.lock().nodes.contains_key(&node)
    }

    /// Whether the node is attached to the document.
    #[must_use]
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.tree.lock().is_connected(node)
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().parent_of(node)
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .lock()
            .nodes
            .get(&node)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.tree.lock().nodes.get(&node).map(|e| e.tag.clone())
    }

    /// All descendants of `root` in document order (excluding `root`).
    #[must_use]
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        self.tree.lock().descendants(root)
    }

    /// Whether `node` is `ancestor` or lies beneath it.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.lock().is_ancestor_or_self(ancestor, node)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Set an attribute.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.tree
            .lock()
            .get_mut(node)?
            .attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree
            .lock()
            .attribute_of(node, &name.to_ascii_lowercase())
            .map(ToString::to_string)
    }

    #[must_use]
    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree
            .lock()
            .nodes
            .get_mut(&node)
            .and_then(|e| e.attributes.remove(&name.to_ascii_lowercase()))
    }

    /// Add a class name if not already present.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn add_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        let element = tree.get_mut(node)?;
        let current = element.attributes.entry("class".to_string()).or_default();
        if !current.split_ascii_whitespace().any(|c| c == class) {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(class);
        }
        Ok(())
    }

    /// Remove a class name if present.
    pub fn remove_class(&self, node: NodeId, class: &str) {
        let mut tree = self.tree.lock();
        if let Some(current) = tree
            .nodes
            .get_mut(&node)
            .and_then(|e| e.attributes.get_mut("class"))
        {
            *current = current
                .split_ascii_whitespace()
                .filter(|c| *c != class)
                .collect::<Vec<_>>()
                .join(" ");
        }
    }

    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|name| name == class))
    }

    // =========================================================================
    // Style & layout
    // =========================================================================

    /// Set an inline style property (the element's `style` attribute).
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_style(&self, node: NodeId, property: &str, value: &str) -> Result<(), DomError> {
        self.tree
            .lock()
            .get_mut(node)?
            .inline_style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    /// Remove an inline style property, returning its previous value.
    pub fn remove_style(&self, node: NodeId, property: &str) -> Option<String> {
        self.tree
            .lock()
            .nodes
            .get_mut(&node)
            .and_then(|e| e.inline_style.remove(property))
    }

    /// The inline value of a style property, if set.
    #[must_use]
    pub fn inline_style(&self, node: NodeId, property: &str) -> Option<String> {
        self.tree
            .lock()
            .nodes
            .get(&node)
            .and_then(|e| e.inline_style.get(property).cloned())
    }

    /// Apply a rule from the host theme's stylesheets to one element.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_author_style(
        &self,
        node: NodeId,
        property: &str,
        value: &str,
    ) -> Result<(), DomError> {
        self.tree
            .lock()
            .get_mut(node)?
            .author_style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    /// The computed value: inline, then author stylesheet, then UA default.
    /// Custom properties (`--*`) inherit from ancestors.
    #[must_use]
    pub fn computed_style(&self, node: NodeId, property: &str) -> String {
        self.tree
            .lock()
            .computed_style(node, property)
            .unwrap_or_default()
    }

    /// Whether the element takes part in layout (connected, no `display:none`
    /// on it or any ancestor, no `hidden` attribute).
    #[must_use]
    pub fn is_rendered(&self, node: NodeId) -> bool {
        self.tree.lock().is_rendered(node)
    }

    /// Record the element's laid-out height in CSS pixels.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_rendered_height(&self, node: NodeId, height: f64) -> Result<(), DomError> {
        self.tree.lock().get_mut(node)?.height = height;
        Ok(())
    }

    #[must_use]
    pub fn rendered_height(&self, node: NodeId) -> f64 {
        self.tree
            .lock()
            .nodes
            .get(&node)
            .map_or(0.0, |e| e.height)
    }

    /// Record the element's scroll geometry.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_scroll(&self, node: NodeId, metrics: ScrollMetrics) -> Result<(), DomError> {
        self.tree.lock().get_mut(node)?.scroll = metrics;
        Ok(())
    }

    #[must_use]
    pub fn scroll(&self, node: NodeId) -> ScrollMetrics {
        self.tree
            .lock()
            .nodes
            .get(&node)
            .map(|e| e.scroll)
            .unwrap_or_default()
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Replace the element's own text.
    ///
    /// # Errors
    ///
    /// Fails if the node does not exist.
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.tree.lock().get_mut(node)?.text = text.to_string();
        Ok(())
    }

    /// Own text followed by descendants' text, in document order.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.tree.lock();
        let mut out = tree
            .nodes
            .get(&node)
            .map(|e| e.text.clone())
            .unwrap_or_default();
        for d in tree.descendants(node) {
            if let Some(e) = tree.nodes.get(&d) {
                out.push_str(&e.text);
            }
        }
        out
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// `document.querySelectorAll`: matching elements in document order.
    #[must_use]
    pub fn query_all(&self, selectors: &SelectorList) -> Vec<NodeId> {
        let tree = self.tree.lock();
        let root = tree.root;
        std::iter::once(root)
            .chain(tree.descendants(root))
            .filter(|n| selectors.matches(&*tree, *n))
            .collect()
    }

    /// `element.querySelectorAll`: matching descendants of `root`.
    #[must_use]
    pub fn query_all_within(&self, root: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        let tree = self.tree.lock();
        tree.descendants(root)
            .into_iter()
            .filter(|n| selectors.matches(&*tree, *n))
            .collect()
    }

    /// `document.querySelector`: the first match in document order.
    #[must_use]
    pub fn query(&self, selectors: &SelectorList) -> Option<NodeId> {
        self.query_all(selectors).into_iter().next()
    }

    #[must_use]
    pub fn matches(&self, node: NodeId, selectors: &SelectorList) -> bool {
        selectors.matches(&*self.tree.lock(), node)
    }

    /// `element.closest`: the node itself or its nearest matching ancestor.
    #[must_use]
    pub fn closest(&self, node: NodeId, selectors: &SelectorList) -> Option<NodeId> {
        let tree = self.tree.lock();
        let mut current = Some(node);
        while let Some(n) = current {
            if selectors.matches(&*tree, n) {
                return Some(n);
            }
            current = tree.parent_of(n);
        }
        None
    }

    /// The first element with the given `id` attribute.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let tree = self.tree.lock();
        let root = tree.root;
        std::iter::once(root)
            .chain(tree.descendants(root))
            .find(|n| tree.attribute_of(*n, "id") == Some(id))
    }

    // =========================================================================
    // Mutation observation
    // =========================================================================

    /// Start keeping mutation records. Observers nest; each call must be
    /// paired with [`Self::unobserve_mutations`].
    pub fn observe_mutations(&self) {
        self.tree.lock().observers += 1;
    }

    /// Drop one observer. The log is cleared once none remain.
    pub fn unobserve_mutations(&self) {
        let mut tree = self.tree.lock();
        tree.observers = tree.observers.saturating_sub(1);
        if tree.observers == 0 {
            tree.mutations = Vec::new();
        }
    }

    /// Drain the mutation records accumulated since the last call.
    pub fn take_mutations(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.tree.lock().mutations)
    }

    /// Signal fired after every insertion; pairs with [`Self::take_mutations`].
    #[must_use]
    pub fn mutation_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener and return its handle.
    pub fn add_listener(&self, target: EventTarget, kind: EventKind) -> ListenerId {
        let mut tree = self.tree.lock();
        let id = ListenerId::new(tree.next_listener);
        tree.next_listener += 1;
        tree.listeners.insert(id, Listener { target, kind });
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.tree.lock().listeners.remove(&id).is_some()
    }

    /// Number of listeners on `target`, optionally restricted to one kind.
    #[must_use]
    pub fn listener_count(&self, target: EventTarget, kind: Option<&EventKind>) -> usize {
        self.tree
            .lock()
            .listeners
            .values()
            .filter(|l| l.target == target && kind.is_none_or(|k| &l.kind == k))
            .count()
    }

    /// Number of listeners registered anywhere on the page.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.tree.lock().listeners.len()
    }

    // =========================================================================
    // Object URLs
    // =========================================================================

    /// `URL.createObjectURL`: mint a `blob:` URL backed by `data`.
    pub fn create_object_url(&self, data: Bytes) -> String {
        let mut tree = self.tree.lock();
        let url = format!(
            "blob:{}/{}",
            tree.location.origin().ascii_serialization(),
            tree.next_object_url
        );
        tree.next_object_url += 1;
        tree.object_urls.insert(url.clone(), data);
        url
    }

    /// Resolve a live `blob:` URL to its data.
    #[must_use]
    pub fn object_url_data(&self, url: &str) -> Option<Bytes> {
        self.tree.lock().object_urls.get(url).cloned()
    }

    /// `URL.revokeObjectURL`. Returns `false` if the URL was not live.
    pub fn revoke_object_url(&self, url: &str) -> bool {
        self.tree.lock().object_urls.remove(url).is_some()
    }

    /// Number of object URLs not yet revoked.
    #[must_use]
    pub fn live_object_urls(&self) -> usize {
        self.tree.lock().object_urls.len()
    }
}
