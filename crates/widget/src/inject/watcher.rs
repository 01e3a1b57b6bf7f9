//! Rescan triggers: DOM mutations, client-side navigation and theme editor
//! events.
//!
//! The host page offers no change notification richer than "nodes were
//! added" and "the URL differs", so the watcher combines three sources:
//!
//! 1. A debounced mutation signal. Rescans only when an added subtree
//!    contains something matching the search input selectors.
//! 2. A location poll that catches `history.pushState` navigation.
//! 3. Theme editor section events (`shopify:section:*`), forwarded by the
//!    host binding through [`DomWatcher::platform_event`].
//!
//! The policy (intervals, event names) lives in [`RescanPolicy`] so it can be
//! tuned and tested without a browser.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;
use visual_search_core::ListenerId;

use super::Injector;
use crate::config::Timing;
use crate::dom::{Document, EventKind, EventTarget, Mutation, SelectorList};

/// Theme editor events that re-render sections.
pub const PLATFORM_EVENTS: [&str; 3] = [
    "shopify:section:load",
    "shopify:section:reorder",
    "shopify:section:select",
];

/// When and how often to rescan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanPolicy {
    /// Quiet period after the last mutation before rescanning.
    pub debounce: Duration,
    /// Interval of the location check.
    pub poll_interval: Duration,
    /// Host events that force a rescan.
    pub platform_events: Vec<String>,
}

impl RescanPolicy {
    #[must_use]
    pub fn from_timing(timing: &Timing) -> Self {
        Self {
            debounce: timing.mutation_debounce,
            poll_interval: timing.url_poll_interval,
            platform_events: PLATFORM_EVENTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for RescanPolicy {
    fn default() -> Self {
        Self::from_timing(&Timing::default())
    }
}

/// Why a rescan ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescanReason {
    Mutation,
    Navigation,
    Platform(String),
}

/// Rescan counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub mutation_rescans: u64,
    pub navigation_rescans: u64,
    pub platform_rescans: u64,
}

/// Whether any added subtree contains a node matching `selectors`.
///
/// Removals never trigger a rescan; detached additions are ignored.
#[must_use]
pub fn mutations_affect_search_inputs(
    document: &Document,
    mutations: &[Mutation],
    selectors: &SelectorList,
) -> bool {
    mutations.iter().any(|mutation| match mutation {
        Mutation::ChildAdded { child, .. } => {
            document.is_connected(*child)
                && (document.matches(*child, selectors)
                    || !document.query_all_within(*child, selectors).is_empty())
        }
        Mutation::ChildRemoved { .. } => false,
    })
}

/// Detects client-side navigation by comparing the page URL.
#[derive(Debug, Clone)]
pub struct UrlWatcher {
    last: Url,
}

impl UrlWatcher {
    #[must_use]
    pub const fn new(initial: Url) -> Self {
        Self { last: initial }
    }

    /// Record `current`; `true` if it differs from the last seen URL.
    pub fn check(&mut self, current: &Url) -> bool {
        if &self.last == current {
            return false;
        }
        debug!(from = %self.last, to = %current, "Location changed");
        self.last = current.clone();
        true
    }

    #[must_use]
    pub const fn last(&self) -> &Url {
        &self.last
    }
}

struct Running {
    task: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    events: mpsc::UnboundedSender<String>,
    listeners: Vec<ListenerId>,
}

/// Process-wide rescan driver. Started at most once; stopped on unload.
#[derive(Clone)]
pub struct DomWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    injector: Injector,
    document: Document,
    policy: RescanPolicy,
    running: Mutex<Option<Running>>,
    mutation_rescans: AtomicU64,
    navigation_rescans: AtomicU64,
    platform_rescans: AtomicU64,
}

impl std::fmt::Debug for DomWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomWatcher")
            .field("policy", &self.inner.policy)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DomWatcher {
    #[must_use]
    pub fn new(injector: Injector, document: Document, policy: RescanPolicy) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                injector,
                document,
                policy,
                running: Mutex::new(None),
                mutation_rescans: AtomicU64::new(0),
                navigation_rescans: AtomicU64::new(0),
                platform_rescans: AtomicU64::new(0),
            }),
        }
    }

    /// Start watching. Returns `false` if already running or if there is no
    /// Tokio runtime to run on.
    pub fn start(&self) -> bool {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, DOM watcher not started");
            return false;
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let document = &self.inner.document;
        let mut listeners: Vec<ListenerId> = self
            .inner
            .policy
            .platform_events
            .iter()
            .map(|name| document.add_listener(EventTarget::Document, EventKind::Custom(name.clone())))
            .collect();
        listeners.push(document.add_listener(EventTarget::Window, EventKind::Unload));

        document.observe_mutations();

        let task = handle.spawn(Arc::clone(&self.inner).run(shutdown_rx, events_rx));
        *running = Some(Running {
            task,
            shutdown: shutdown_tx,
            events: events_tx,
            listeners,
        });
        info!(
            poll = ?self.inner.policy.poll_interval,
            debounce = ?self.inner.policy.debounce,
            "DOM watcher started"
        );
        true
    }

    /// Stop watching and remove the watcher's listeners. Returns `false`
    /// if it was not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.inner.running.lock().take() else {
            return false;
        };
        let _ = running.shutdown.send(());
        running.task.abort();
        for listener in running.listeners {
            self.inner.document.remove_listener(listener);
        }
        self.inner.document.unobserve_mutations();
        info!("DOM watcher stopped");
        true
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Forward a host event. Returns `true` if it will cause a rescan.
    pub fn platform_event(&self, name: &str) -> bool {
        if !self.inner.policy.platform_events.iter().any(|e| e == name) {
            return false;
        }
        self.inner
            .running
            .lock()
            .as_ref()
            .is_some_and(|running| running.events.send(name.to_string()).is_ok())
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            mutation_rescans: self.inner.mutation_rescans.load(Ordering::Relaxed),
            navigation_rescans: self.inner.navigation_rescans.load(Ordering::Relaxed),
            platform_rescans: self.inner.platform_rescans.load(Ordering::Relaxed),
        }
    }
}

impl WatcherInner {
    async fn run(
        self: Arc<Self>,
        mut shutdown: oneshot::Receiver<()>,
        mut events: mpsc::UnboundedReceiver<String>,
    ) {
        let signal = self.document.mutation_signal();
        let mut urls = UrlWatcher::new(self.document.location());
        let mut poll = tokio::time::interval(self.policy.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        poll.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                () = signal.notified() => {
                    // Let a burst of insertions settle.
                    loop {
                        tokio::select! {
                            _ = &mut shutdown => return,
                            () = signal.notified() => {}
                            () = tokio::time::sleep(self.policy.debounce) => break,
                        }
                    }
                    let mutations = self.document.take_mutations();
                    if mutations_affect_search_inputs(
                        &self.document,
                        &mutations,
                        self.injector.selectors(),
                    ) {
                        self.rescan(&RescanReason::Mutation);
                    }
                }
                _ = poll.tick() => {
                    if urls.check(&self.document.location()) {
                        self.rescan(&RescanReason::Navigation);
                    }
                }
                Some(name) = events.recv() => {
                    self.rescan(&RescanReason::Platform(name));
                }
            }
        }
    }

    fn rescan(&self, reason: &RescanReason) {
        let counter = match reason {
            RescanReason::Mutation => &self.mutation_rescans,
            RescanReason::Navigation => &self.navigation_rescans,
            RescanReason::Platform(_) => &self.platform_rescans,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let report = self.injector.inject_all();
        debug!(reason = ?reason, injected = report.injected.len(), "Rescan complete");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use visual_search_core::NodeId;

    use super::*;
    use crate::config::{ConfigHandle, WidgetConfig};

    fn setup() -> (DomWatcher, Injector, Document) {
        let document = Document::new(Url::parse("https://shop.example.com/").unwrap());
        let injector =
            Injector::new(document.clone(), ConfigHandle::new(WidgetConfig::default())).unwrap();
        let watcher = DomWatcher::new(injector.clone(), document.clone(), RescanPolicy::default());
        (watcher, injector, document)
    }

    fn add_search_input(document: &Document) -> NodeId {
        let wrapper = document.create_element("div");
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.append_child(wrapper, input).unwrap();
        document.append_child(document.body(), wrapper).unwrap();
        input
    }

    #[test]
    fn test_url_watcher() {
        let mut watcher = UrlWatcher::new(Url::parse("https://shop.example.com/").unwrap());
        let same = Url::parse("https://shop.example.com/").unwrap();
        let next = Url::parse("https://shop.example.com/collections/all").unwrap();
        assert!(!watcher.check(&same));
        assert!(watcher.check(&next));
        assert!(!watcher.check(&next));
        assert_eq!(watcher.last(), &next);
    }

    #[test]
    fn test_mutation_filter() {
        let (_, injector, document) = setup();
        let selectors = injector.selectors();
        document.observe_mutations();

        let div = document.create_element("div");
        document.append_child(document.body(), div).unwrap();
        assert!(!mutations_affect_search_inputs(
            &document,
            &document.take_mutations(),
            selectors
        ));

        add_search_input(&document);
        assert!(mutations_affect_search_inputs(
            &document,
            &document.take_mutations(),
            selectors
        ));

        // Added to a detached subtree: not on the page yet.
        let detached = document.create_element("div");
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.append_child(detached, input).unwrap();
        assert!(!mutations_affect_search_inputs(
            &document,
            &document.take_mutations(),
            selectors
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_once_only_and_stop_cleans_up() {
        let (watcher, _, document) = setup();
        assert!(watcher.start());
        assert!(!watcher.start());
        assert!(watcher.is_running());
        assert_eq!(document.listener_count(EventTarget::Document, None), 3);

        assert!(watcher.stop());
        assert!(!watcher.stop());
        assert_eq!(document.total_listeners(), 0);
        assert!(!watcher.platform_event("shopify:section:load"));

        // Nothing observes the page once stopped.
        add_search_input(&document);
        assert!(document.take_mutations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_rescan_is_debounced() {
        let (watcher, injector, document) = setup();
        watcher.start();
        tokio::task::yield_now().await;

        for _ in 0..3 {
            add_search_input(&document);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(injector.affordance_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(injector.affordance_count(), 3);
        assert_eq!(watcher.stats().mutation_rescans, 1);
        watcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_is_detected_by_polling() {
        let (watcher, injector, document) = setup();
        let existing = add_search_input(&document);
        injector.inject_all();

        // Rendered by the new route but not yet visible; no insertion fires.
        let wrapper = document.create_element("div");
        document.set_style(wrapper, "display", "none").unwrap();
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.append_child(wrapper, input).unwrap();
        document.append_child(document.body(), wrapper).unwrap();

        watcher.start();
        tokio::time::sleep(Duration::from_millis(500)).await;

        document.push_state(Url::parse("https://shop.example.com/collections/all").unwrap());
        document.remove_style(wrapper, "display");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(watcher.stats().navigation_rescans, 1);
        assert!(injector.affordance_for(input).is_some());
        assert!(injector.affordance_for(existing).is_some());
        assert_eq!(injector.affordance_count(), 2);
        watcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_events_trigger_rescan() {
        let (watcher, injector, document) = setup();
        watcher.start();
        tokio::task::yield_now().await;

        assert!(!watcher.platform_event("click"));
        add_search_input(&document);
        // Consume the insertion through the mutation path first.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(injector.affordance_count(), 1);

        // Our own affordance insertion is still settling; the event is
        // handled once the debounce window closes.
        assert!(watcher.platform_event("shopify:section:load"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(watcher.stats().platform_rescans, 1);
        assert_eq!(injector.affordance_count(), 1);
        watcher.stop();
    }
}
