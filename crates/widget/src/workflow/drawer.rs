//! The search drawer controller.
//!
//! # Architecture
//!
//! - At most one [`DrawerSession`] exists; opening tears down the previous one
//! - Each request carries a [`Ticket`]; a response whose ticket no longer
//!   matches the live session is dropped without touching the DOM
//! - The session lock is never held across an `.await`
//! - Every entry point resolves its own failures into a toast and a stable
//!   state; nothing is returned to the host page as an error

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};
use visual_search_core::{NodeId, Rect, RequestId, SearchResult, SessionId, Size};

use super::session::{DrawerSession, OPEN_HEADER, Picker, READY_HEADER, Ticket};
use super::state::DrawerState;
use super::view::{
    ANALYZE_CLASS, BACKDROP_CLASS, CAMERA_BUTTON_CLASS, CARD_CLASS, CARD_IMAGE_CLASS, CHIP_CLASS,
    CLOSE_CLASS, DrawerView, FILE_BUTTON_CLASS, SEARCH_ALL_CLASS, SEARCH_SELECTED_CLASS,
    UPLOAD_ANOTHER_CLASS, URL_BUTTON_CLASS,
};
use super::zindex::{DRAWER_Z_INDEX, ZIndexOverrides};
use crate::api::{Analysis, ApiError, SearchClient};
use crate::config::ConfigHandle;
use crate::dom::{Document, DomError, EventKind, EventTarget};
use crate::notify::{Notifier, TOAST_CONTAINER_ID};
use crate::validate::{ImageFile, UrlValidator, validate_file};

/// Which detected items a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemScope {
    All,
    Selected,
}

/// What became of a search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results are on screen.
    Results { rendered: usize, total: usize },
    /// The analysis found items to choose from.
    ItemsDetected(usize),
    /// The request failed; the message was shown as a toast.
    Failed(String),
    /// The session closed or a newer request superseded this one.
    Stale,
    /// Not possible in the current state.
    Ignored,
}

/// A read-only view of the open drawer.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawerSnapshot {
    pub session: SessionId,
    pub state: DrawerState,
    pub input: Option<NodeId>,
    pub root: NodeId,
    pub results_container: NodeId,
    pub header: String,
    pub count: String,
    pub cards: usize,
    pub skeletons: usize,
    pub detected: Vec<String>,
    pub selected: Vec<usize>,
    pub search_selected_enabled: bool,
    pub rendered: usize,
    pub total: usize,
    pub object_url: Option<String>,
    pub has_image: bool,
    pub zindex_overrides: usize,
    pub picker: Option<Picker>,
}

enum ClickAction {
    Close,
    Pick(Picker),
    Analyze,
    Chip(usize),
    Search(ItemScope),
    ResultImage(usize),
    Choose(usize),
    UploadAnother,
}

// =============================================================================
// DrawerController
// =============================================================================

/// Owns the drawer session and drives the search workflow. Cheap to clone.
#[derive(Clone)]
pub struct DrawerController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    document: Document,
    config: ConfigHandle,
    client: SearchClient,
    validator: UrlValidator,
    notifier: Notifier,
    session: Mutex<Option<DrawerSession>>,
    next_session: AtomicU64,
    next_request: AtomicU64,
}

impl std::fmt::Debug for DrawerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawerController")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl DrawerController {
    #[must_use]
    pub fn new(
        document: Document,
        config: ConfigHandle,
        client: SearchClient,
        notifier: Notifier,
    ) -> Self {
        let (timeout, max_size) = config.read(|c| (c.timing.fetch_timeout, c.max_file_size));
        let validator = UrlValidator::new(client.http().clone(), timeout).with_max_size(max_size);
        Self {
            inner: Arc::new(ControllerInner {
                document,
                config,
                client,
                validator,
                notifier,
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
                next_request: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.session.lock().as_ref().map(|s| s.id)
    }

    #[must_use]
    pub fn state(&self) -> DrawerState {
        self.inner
            .session
            .lock()
            .as_ref()
            .map_or(DrawerState::Closed, |s| s.state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a drawer for `input`, replacing any drawer already open.
    ///
    /// # Errors
    ///
    /// Returns `DomError` if the drawer cannot be attached to the page.
    #[instrument(skip(self))]
    pub fn open(&self, input: Option<NodeId>) -> Result<SessionId, DomError> {
        let document = &self.inner.document;
        let mut guard = self.inner.session.lock();

        // The previous overrides must be restored before new ones are taken.
        if let Some(previous) = guard.take() {
            info!(session = %previous.id, "Replacing open drawer");
            previous.teardown(document);
        }

        let id = SessionId::new(self.inner.next_session.fetch_add(1, Ordering::Relaxed));
        let config = self.inner.config.snapshot();
        let view = DrawerView::build(document, &config, id)?;
        view.set_header(document, OPEN_HEADER)?;

        let mut exclude = vec![view.root];
        exclude.extend(document.element_by_id(TOAST_CONTAINER_ID));
        let zindex = ZIndexOverrides::apply(document, DRAWER_Z_INDEX, &exclude);

        let listeners = vec![
            document.add_listener(EventTarget::Document, EventKind::KeyDown),
            document.add_listener(EventTarget::Node(view.root), EventKind::Click),
            document.add_listener(EventTarget::Node(view.results), EventKind::Scroll),
            document.add_listener(EventTarget::Window, EventKind::Resize),
        ];

        *guard = Some(DrawerSession::new(id, input, view, listeners, zindex));
        info!(session = %id, "Drawer opened");
        Ok(id)
    }

    /// Close the drawer, removing its DOM and listeners, releasing object
    /// URLs and restoring host z-indices. Returns `false` if none was open.
    pub fn close(&self) -> bool {
        let session = self.inner.session.lock().take();
        match session {
            Some(session) => {
                let id = session.id;
                session.teardown(&self.inner.document);
                info!(session = %id, "Drawer closed");
                true
            }
            None => false,
        }
    }

    /// Escape closes the drawer. Returns whether the key was handled.
    pub fn handle_key(&self, key: &str) -> bool {
        key == "Escape" && self.close()
    }

    // =========================================================================
    // Image acquisition
    // =========================================================================

    /// Accept a picked file. Rejected files leave the state unchanged and
    /// show a toast; nothing is sent.
    pub fn select_file(&self, file: ImageFile) -> bool {
        let Some(session) = self.session_id() else {
            return false;
        };
        self.accept_file(session, file)
    }

    /// Validate `raw` with a `HEAD` request, then fetch it and treat it as
    /// a picked file.
    #[instrument(skip(self))]
    pub async fn enter_url(&self, raw: &str) -> bool {
        let Some(session) = self.acquiring_session() else {
            return false;
        };

        let fetched = match self.inner.validator.validate(raw).await {
            Ok(url) => self.inner.validator.fetch(&url).await,
            Err(e) => Err(e),
        };
        match fetched {
            Ok(file) => self.accept_file(session, file),
            Err(e) => {
                warn!(error = %e, "Image URL rejected");
                self.inner.notifier.error(&e.user_message());
                false
            }
        }
    }

    fn acquiring_session(&self) -> Option<SessionId> {
        self.inner
            .session
            .lock()
            .as_ref()
            .filter(|s| matches!(s.state, DrawerState::UploadPending | DrawerState::ImagePreview))
            .map(|s| s.id)
    }

    fn accept_file(&self, session: SessionId, file: ImageFile) -> bool {
        let document = &self.inner.document;
        let rejection = {
            let mut guard = self.inner.session.lock();
            let Some(current) = guard.as_mut().filter(|s| s.id == session) else {
                debug!(%session, "File arrived for a closed drawer");
                return false;
            };
            if !matches!(
                current.state,
                DrawerState::UploadPending | DrawerState::ImagePreview
            ) {
                debug!(state = %current.state, "Ignoring file while busy");
                return false;
            }

            match self.inner.config.read(|c| validate_file(&file, c)) {
                Ok(mime) => {
                    debug!(file = %file.name, %mime, size = file.size(), "Image accepted");
                    let applied = current
                        .replace_image(document, file)
                        .and_then(|()| current.transition(document, DrawerState::ImagePreview))
                        .and_then(|_| current.view.set_header(document, READY_HEADER));
                    if let Err(e) = applied {
                        error!(error = %e, "Failed to show image preview");
                        return false;
                    }
                    return true;
                }
                Err(e) => e,
            }
        };

        warn!(error = %rejection, "Image rejected");
        self.inner.notifier.error(&rejection.user_message());
        false
    }

    /// Record the preview image's sizes once it has loaded.
    pub fn image_loaded(&self, natural: Size, displayed: Size) -> bool {
        let mut guard = self.inner.session.lock();
        let Some(session) = guard.as_mut().filter(|s| s.file.is_some()) else {
            return false;
        };
        session.image = crate::api::ImageState::new(session.view.preview_image, natural, displayed);
        session.image.is_some()
    }

    /// Recompute scale factors after the preview was resized.
    pub fn image_resized(&self, displayed: Size) -> bool {
        self.inner
            .session
            .lock()
            .as_mut()
            .and_then(|s| s.image.as_mut())
            .is_some_and(|image| image.resize(displayed))
    }

    // =========================================================================
    // Searching
    // =========================================================================

    /// Submit the whole current image.
    #[instrument(skip(self))]
    pub async fn analyze(&self) -> SearchOutcome {
        let Some((ticket, (url, name))) = self.begin(DrawerState::Analyzing, |s| {
            Some((s.object_url.clone()?, s.file.as_ref()?.name.clone()))
        }) else {
            return SearchOutcome::Ignored;
        };
        let outcome = self.inner.client.search_blob_url(&url, &name).await;
        self.finish(ticket, DrawerState::ImagePreview, outcome)
    }

    /// Submit a region of the current image, given in displayed pixels.
    #[instrument(skip(self))]
    pub async fn search_crop(&self, crop: Rect) -> SearchOutcome {
        let Some((ticket, (file, region))) = self.begin(DrawerState::Analyzing, |s| {
            let region = s.image.as_ref()?.to_natural(crop);
            if region.is_empty() {
                return None;
            }
            Some((s.file.clone()?, region))
        }) else {
            return SearchOutcome::Ignored;
        };
        let outcome = self.inner.client.search_crop(&file, region).await;
        self.finish(ticket, DrawerState::ImagePreview, outcome)
    }

    /// Search again using one result's image as the query.
    #[instrument(skip(self))]
    pub async fn search_result_image(&self, index: usize) -> SearchOutcome {
        let Some((ticket, image_url)) = self.begin(DrawerState::Analyzing, |s| {
            let result = s.paginator.as_ref()?.results().get(index)?;
            Some(result.image_url.clone())
        }) else {
            return SearchOutcome::Ignored;
        };

        let outcome = self.inner.client.search_by_result_image(&image_url).await;
        let analysis = match outcome {
            Ok((file, analysis)) => {
                let mut guard = self.inner.session.lock();
                if let Some(session) = guard.as_mut().filter(|s| s.is_current(ticket)) {
                    if let Err(e) = session.replace_image(&self.inner.document, file) {
                        error!(error = %e, "Failed to preview result image");
                    }
                }
                Ok(analysis)
            }
            Err(e) => Err(e),
        };
        self.finish(ticket, DrawerState::ImagePreview, analysis)
    }

    /// Flip one detected item's chip. Returns its new state.
    pub fn toggle_item(&self, index: usize) -> Option<bool> {
        let mut guard = self.inner.session.lock();
        let session = guard
            .as_mut()
            .filter(|s| s.state == DrawerState::ItemsDetected)?;
        let selected = session.selection.toggle(index)?;
        let any = !session.selection.is_empty();
        if let Err(e) = session
            .view
            .update_chip(&self.inner.document, index, selected, any)
        {
            warn!(error = %e, "Failed to update chip");
        }
        Some(selected)
    }

    /// Show the products of all or only the selected detected items.
    #[instrument(skip(self))]
    pub async fn search_detected(&self, scope: ItemScope) -> SearchOutcome {
        let Some((ticket, products)) = self.begin(DrawerState::Searching, |s| {
            if s.state != DrawerState::ItemsDetected {
                return None;
            }
            let chosen: Vec<usize> = match scope {
                ItemScope::All => (0..s.detected.len()).collect(),
                ItemScope::Selected if s.selection.is_empty() => return None,
                ItemScope::Selected => s.selection.selected(),
            };
            let mut products: Vec<SearchResult> = Vec::new();
            for item in chosen.iter().filter_map(|i| s.detected.get(*i)) {
                for product in &item.products {
                    if !products.contains(product) {
                        products.push(product.clone());
                    }
                }
            }
            Some(products)
        }) else {
            return SearchOutcome::Ignored;
        };

        let delay = self.inner.config.read(|c| c.timing.page_delay);
        tokio::time::sleep(delay).await;
        self.finish(ticket, DrawerState::ItemsDetected, Ok(Analysis::Results(products)))
    }

    /// Load the next page if the results container is scrolled near its
    /// end. Returns the number of cards appended.
    pub async fn on_scroll(&self) -> usize {
        let (threshold, delay) = self
            .inner
            .config
            .read(|c| (c.scroll_threshold, c.timing.page_delay));
        let ticket = {
            let mut guard = self.inner.session.lock();
            let Some(session) = guard
                .as_mut()
                .filter(|s| s.state == DrawerState::ResultsDisplayed && !s.loading_page)
            else {
                return 0;
            };
            let metrics = self.inner.document.scroll(session.view.results);
            if !session
                .paginator
                .as_ref()
                .is_some_and(|p| p.should_load_more(&metrics, threshold))
            {
                return 0;
            }
            session.loading_page = true;
            session.ticket()
        };

        tokio::time::sleep(delay).await;

        let document = &self.inner.document;
        let mut guard = self.inner.session.lock();
        let Some(session) = guard.as_mut().filter(|s| s.is_current(ticket)) else {
            return 0;
        };
        session.loading_page = false;
        let Some(paginator) = session.paginator.as_mut() else {
            return 0;
        };
        let start = paginator.rendered();
        let page = paginator.next_page().map(<[SearchResult]>::to_vec).unwrap_or_default();
        let status = paginator.status_text();
        let appended = session
            .view
            .append_cards(document, &page, start)
            .and_then(|()| session.view.set_count(document, &status));
        if let Err(e) = appended {
            error!(error = %e, "Failed to append results page");
            return 0;
        }
        debug!(appended = page.len(), %status, "Loaded next page");
        page.len()
    }

    /// Clear results and return to the preview so another image can be
    /// picked. Requests the file picker.
    pub fn upload_another(&self) -> bool {
        let document = &self.inner.document;
        let mut guard = self.inner.session.lock();
        let Some(session) = guard.as_mut().filter(|s| {
            matches!(s.state, DrawerState::ResultsDisplayed | DrawerState::ItemsDetected)
        }) else {
            return false;
        };
        session.detected.clear();
        session.selection = crate::workflow::ItemSelection::default();
        match session.recover(document, DrawerState::ImagePreview) {
            Ok(()) => {
                session.picker = Some(Picker::File);
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to reset drawer");
                false
            }
        }
    }

    /// Write a result's title into the originating search input and close.
    pub fn choose_result(&self, index: usize) -> Option<SearchResult> {
        let (result, input) = {
            let guard = self.inner.session.lock();
            let session = guard
                .as_ref()
                .filter(|s| s.state == DrawerState::ResultsDisplayed)?;
            let result = session.paginator.as_ref()?.results().get(index)?.clone();
            (result, session.input)
        };
        if let Some(input) = input {
            if let Err(e) = self.inner.document.set_attribute(input, "value", &result.title) {
                warn!(error = %e, "Search input disappeared");
            }
        }
        self.close();
        Some(result)
    }

    /// Route a click inside the drawer. Returns whether it was handled.
    pub async fn handle_click(&self, target: NodeId) -> bool {
        let Some(action) = self.click_action(target) else {
            return false;
        };
        match action {
            ClickAction::Close => self.close(),
            ClickAction::Pick(picker) => {
                let mut guard = self.inner.session.lock();
                let Some(session) = guard.as_mut() else {
                    return false;
                };
                session.picker = Some(picker);
                debug!(?picker, "Image picker requested");
                true
            }
            ClickAction::Analyze => !matches!(self.analyze().await, SearchOutcome::Ignored),
            ClickAction::Chip(index) => self.toggle_item(index).is_some(),
            ClickAction::Search(scope) => {
                !matches!(self.search_detected(scope).await, SearchOutcome::Ignored)
            }
            ClickAction::ResultImage(index) => {
                !matches!(self.search_result_image(index).await, SearchOutcome::Ignored)
            }
            ClickAction::Choose(index) => self.choose_result(index).is_some(),
            ClickAction::UploadAnother => self.upload_another(),
        }
    }

    fn click_action(&self, target: NodeId) -> Option<ClickAction> {
        let document = &self.inner.document;
        let guard = self.inner.session.lock();
        let view = guard.as_ref()?.view;
        if !document.contains(view.root, target) {
            return None;
        }
        if document.has_attribute(target, "disabled") {
            return None;
        }

        let within = |class: &str| view.within(document, target, class);
        let action = if within(CLOSE_CLASS) || within(BACKDROP_CLASS) {
            ClickAction::Close
        } else if within(FILE_BUTTON_CLASS) {
            ClickAction::Pick(Picker::File)
        } else if within(CAMERA_BUTTON_CLASS) {
            ClickAction::Pick(Picker::Camera)
        } else if within(URL_BUTTON_CLASS) {
            ClickAction::Pick(Picker::Url)
        } else if within(ANALYZE_CLASS) {
            ClickAction::Analyze
        } else if let Some(index) = view.indexed_ancestor(document, target, CHIP_CLASS) {
            ClickAction::Chip(index)
        } else if within(SEARCH_ALL_CLASS) {
            ClickAction::Search(ItemScope::All)
        } else if within(SEARCH_SELECTED_CLASS) {
            ClickAction::Search(ItemScope::Selected)
        } else if within(UPLOAD_ANOTHER_CLASS) {
            ClickAction::UploadAnother
        } else if within(CARD_IMAGE_CLASS) {
            ClickAction::ResultImage(view.indexed_ancestor(document, target, CARD_CLASS)?)
        } else if let Some(index) = view.indexed_ancestor(document, target, CARD_CLASS) {
            ClickAction::Choose(index)
        } else {
            return None;
        };
        Some(action)
    }

    /// Inspect the open drawer.
    #[must_use]
    pub fn snapshot(&self) -> Option<DrawerSnapshot> {
        let document = &self.inner.document;
        let guard = self.inner.session.lock();
        let session = guard.as_ref()?;
        let (cards, skeletons) = session.view.grid_counts(document);
        Some(DrawerSnapshot {
            session: session.id,
            state: session.state,
            input: session.input,
            root: session.view.root,
            results_container: session.view.results,
            header: session.view.header(document),
            count: session.view.count_text(document),
            cards,
            skeletons,
            detected: session.detected.iter().map(|d| d.label.clone()).collect(),
            selected: session.selection.selected(),
            search_selected_enabled: !document.has_attribute(session.view.search_selected, "disabled"),
            rendered: session.paginator.as_ref().map_or(0, |p| p.rendered()),
            total: session.paginator.as_ref().map_or(0, |p| p.total()),
            object_url: session.object_url.clone(),
            has_image: session.image.is_some(),
            zindex_overrides: session.zindex.len(),
            picker: session.picker,
        })
    }

    // =========================================================================
    // Request bookkeeping
    // =========================================================================

    /// Enter `next` and issue a ticket, if the session allows it and
    /// `prepare` finds what the request needs.
    fn begin<T>(
        &self,
        next: DrawerState,
        prepare: impl FnOnce(&DrawerSession) -> Option<T>,
    ) -> Option<(Ticket, T)> {
        let skeletons = self.inner.config.read(|c| c.skeleton_count);
        let mut guard = self.inner.session.lock();
        let session = guard.as_mut()?;
        if !session.state.can_transition_to(next) {
            debug!(state = %session.state, to = %next, "Request not possible now");
            return None;
        }
        let prepared = prepare(session)?;
        let request = RequestId::new(self.inner.next_request.fetch_add(1, Ordering::Relaxed));
        match session.start_request(&self.inner.document, next, request, skeletons) {
            Ok(ticket) => Some((ticket, prepared)),
            Err(e) => {
                error!(error = %e, "Failed to show loading state");
                None
            }
        }
    }

    /// Render a response if its ticket is still current.
    fn finish(
        &self,
        ticket: Ticket,
        fallback: DrawerState,
        outcome: Result<Analysis, ApiError>,
    ) -> SearchOutcome {
        let document = &self.inner.document;
        let page_size = self.inner.config.read(|c| c.page_size);

        let failure = {
            let mut guard = self.inner.session.lock();
            let Some(session) = guard.as_mut().filter(|s| s.is_current(ticket)) else {
                debug!(session = %ticket.session, request = %ticket.request, "Discarding stale response");
                return SearchOutcome::Stale;
            };

            let rendered = match outcome {
                Ok(Analysis::Results(results)) => session
                    .show_results(document, results, page_size)
                    .map(|(rendered, total)| SearchOutcome::Results { rendered, total })
                    .map_err(|e| ApiError::Request(e.to_string())),
                Ok(Analysis::Detected(items)) => session
                    .show_detected(document, items)
                    .map(SearchOutcome::ItemsDetected)
                    .map_err(|e| ApiError::Request(e.to_string())),
                Err(e) => Err(e),
            };
            match rendered {
                Ok(outcome) => return outcome,
                Err(e) => {
                    warn!(error = %e, "Search failed");
                    if let Err(dom) = session.recover(document, fallback) {
                        error!(error = %dom, "Failed to restore drawer");
                    }
                    e.user_message()
                }
            }
        };

        self.inner.notifier.error(&failure);
        SearchOutcome::Failed(failure)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use axum::Router;
    use axum::extract::State;
    use axum::http::{StatusCode, header};
    use axum::routing::{get, post};
    use bytes::Bytes;
    use serde_json::{Value, json};
    use url::Url;
    use visual_search_core::ShopDomain;

    use super::*;
    use crate::config::{Timing, WidgetConfig};
    use crate::dom::{ScrollMetrics, SelectorList};

    #[derive(Clone, Default)]
    struct Script {
        responses: Arc<Mutex<VecDeque<(u16, Value, u64)>>>,
        bodies: Arc<Mutex<Vec<String>>>,
        hits: Arc<AtomicUsize>,
    }

    impl Script {
        fn push(&self, status: u16, body: Value) {
            self.responses.lock().push_back((status, body, 0));
        }

        fn push_delayed(&self, body: Value, delay_ms: u64) {
            self.responses.lock().push_back((200, body, delay_ms));
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn search(State(script): State<Script>, body: Bytes) -> (StatusCode, axum::Json<Value>) {
        script.hits.fetch_add(1, Ordering::SeqCst);
        script
            .bodies
            .lock()
            .push(String::from_utf8_lossy(&body).into_owned());
        let next = script.responses.lock().pop_front();
        let (status, body, delay) = next.unwrap_or((200, json!([]), 0));
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        (StatusCode::from_u16(status).unwrap(), axum::Json(body))
    }

    struct Fixture {
        controller: DrawerController,
        document: Document,
        notifier: Notifier,
        script: Script,
        base: Url,
        input: NodeId,
    }

    async fn fixture() -> Fixture {
        let script = Script::default();
        let app = Router::new()
            .route("/search/{shop}", post(search))
            .route(
                "/images/{name}",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![9u8; 64]) }),
            )
            .route(
                "/page.html",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
            )
            .with_state(script.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        let base = Url::parse(&format!("http://{addr}/")).unwrap();

        let config = WidgetConfig {
            app_url: base.clone(),
            shop_domain: Some(ShopDomain::parse("demo.myshopify.com").unwrap()),
            page_size: 2,
            skeleton_count: 4,
            timing: Timing {
                page_delay: Duration::from_millis(5),
                ..Timing::default()
            },
            ..WidgetConfig::default()
        };
        let document = Document::new(base.join("collections/all").unwrap());
        let input = document.create_element("input");
        document.set_attribute(input, "type", "search").unwrap();
        document.append_child(document.body(), input).unwrap();

        let handle = ConfigHandle::new(config);
        let notifier = Notifier::new(document.clone(), Duration::from_secs(60));
        let client = SearchClient::new(handle.clone(), document.clone());
        let controller =
            DrawerController::new(document.clone(), handle, client, notifier.clone());
        Fixture {
            controller,
            document,
            notifier,
            script,
            base,
            input,
        }
    }

    fn jpeg() -> ImageFile {
        ImageFile::new("shirt.jpg", "image/jpeg", Bytes::from(vec![0u8; 100]))
    }

    fn products(n: usize) -> Value {
        let items: Vec<Value> = (0..n)
            .map(|i| json!({"image": format!("/images/{i}.png"), "title": format!("Item {i}"), "price": "$10"}))
            .collect();
        json!({ "products": items })
    }

    fn ready(f: &Fixture) {
        f.controller.open(Some(f.input)).unwrap();
        assert!(f.controller.select_file(jpeg()));
    }

    fn click(f: &Fixture, selector: &str) -> NodeId {
        f.document
            .query(&SelectorList::parse(selector).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_twice_keeps_one_drawer() {
        let f = fixture().await;
        let header = f.document.create_element("header");
        f.document.set_author_style(header, "position", "fixed").unwrap();
        f.document
            .set_author_style(header, "z-index", "2147483647")
            .unwrap();
        f.document.append_child(f.document.body(), header).unwrap();

        let first = f.controller.open(Some(f.input)).unwrap();
        assert_eq!(f.controller.snapshot().unwrap().zindex_overrides, 1);
        let second = f.controller.open(Some(f.input)).unwrap();
        assert_ne!(first, second);

        let drawers = SelectorList::parse("#vs-drawer").unwrap();
        assert_eq!(f.document.query_all(&drawers).len(), 1);
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.session, second);
        assert_eq!(snapshot.zindex_overrides, 1);
        assert_eq!(snapshot.header, "Search by image");
        assert_eq!(snapshot.state, DrawerState::UploadPending);
        assert_eq!(f.document.computed_style(header, "z-index"), "2147482999");
        assert_eq!(f.document.total_listeners(), 4);

        assert!(f.controller.close());
        assert!(!f.controller.close());
        assert!(f.document.query_all(&drawers).is_empty());
        assert_eq!(f.document.inline_style(header, "z-index"), None);
        assert_eq!(f.document.computed_style(header, "z-index"), "2147483647");
        assert_eq!(f.document.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_without_request() {
        let f = fixture().await;
        f.controller.open(Some(f.input)).unwrap();
        let big = ImageFile::new("big.png", "image/png", Bytes::from(vec![0u8; 6 * 1024 * 1024]));

        assert!(!f.controller.select_file(big));
        assert_eq!(f.controller.state(), DrawerState::UploadPending);
        assert_eq!(f.notifier.messages(), vec!["File is too large. Maximum size is 5MB."]);
        assert_eq!(f.script.hits(), 0);

        assert!(f.controller.select_file(jpeg()));
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ImagePreview);
        assert_eq!(snapshot.header, "Ready to search");
        assert!(snapshot.object_url.is_some());
        assert_eq!(f.document.live_object_urls(), 1);
    }

    #[tokio::test]
    async fn test_analyze_renders_results() {
        let f = fixture().await;
        f.script.push(
            200,
            json!({"products": [{"image": "a.jpg", "title": "Shirt", "price": "$10"}]}),
        );
        ready(&f);

        let outcome = f.controller.analyze().await;
        assert_eq!(outcome, SearchOutcome::Results { rendered: 1, total: 1 });
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ResultsDisplayed);
        assert_eq!(snapshot.header, "Found 1 similar products");
        assert_eq!(snapshot.count, "Showing 1 of 1");
        assert_eq!(snapshot.cards, 1);
        assert_eq!(snapshot.skeletons, 0);

        let card = click(&f, ".vs-card__title");
        assert_eq!(f.document.text_content(card), "Shirt");
    }

    #[tokio::test]
    async fn test_server_error_restores_preview() {
        let f = fixture().await;
        f.script.push(500, json!({"error": "boom"}));
        ready(&f);

        let outcome = f.controller.analyze().await;
        let message = "Something went wrong while searching. Please try again.";
        assert_eq!(outcome, SearchOutcome::Failed(message.to_string()));
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ImagePreview);
        assert_eq!(snapshot.skeletons, 0);
        assert_eq!(snapshot.header, "Ready to search");
        assert_eq!(f.notifier.messages(), vec![message]);

        // The drawer is usable again.
        f.script.push(200, products(1));
        assert!(matches!(f.controller.analyze().await, SearchOutcome::Results { .. }));
    }

    #[tokio::test]
    async fn test_payload_too_large_message() {
        let f = fixture().await;
        f.script.push(413, json!({}));
        ready(&f);

        assert_eq!(
            f.controller.analyze().await,
            SearchOutcome::Failed(
                "Image is too large to process. Please choose a smaller image.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let f = fixture().await;
        f.script.push_delayed(products(3), 200);
        ready(&f);

        let reopen = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.controller.open(Some(f.input)).unwrap()
        };
        let (outcome, reopened) = tokio::join!(f.controller.analyze(), reopen);

        assert_eq!(outcome, SearchOutcome::Stale);
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.session, reopened);
        assert_eq!(snapshot.state, DrawerState::UploadPending);
        assert_eq!(snapshot.cards, 0);
        assert!(f.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_scroll_pages_through_results() {
        let f = fixture().await;
        f.script.push(200, products(5));
        ready(&f);

        assert_eq!(
            f.controller.analyze().await,
            SearchOutcome::Results { rendered: 2, total: 5 }
        );
        let results = f.controller.snapshot().unwrap().results_container;
        let far = ScrollMetrics {
            scroll_top: 0.0,
            scroll_height: 2000.0,
            client_height: 400.0,
        };
        f.document.set_scroll(results, far).unwrap();
        assert_eq!(f.controller.on_scroll().await, 0);

        let near = ScrollMetrics {
            scroll_top: 1500.0,
            ..far
        };
        f.document.set_scroll(results, near).unwrap();
        assert_eq!(f.controller.on_scroll().await, 2);
        assert_eq!(f.controller.snapshot().unwrap().count, "Showing 4 of 5");
        assert_eq!(f.controller.on_scroll().await, 1);
        assert_eq!(f.controller.on_scroll().await, 0);

        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.count, "Showing 5 of 5");
        assert_eq!(snapshot.cards, 5);
        let cards = f
            .document
            .query_all(&SelectorList::parse(".vs-card").unwrap());
        let order: Vec<String> = cards
            .iter()
            .map(|c| f.document.attribute(*c, "data-index").unwrap())
            .collect();
        assert_eq!(order, ["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_detected_items_selection() {
        let f = fixture().await;
        f.script.push(
            200,
            json!({"detectedItems": [
                {"label": "Shirt", "products": [{"image": "a.jpg", "title": "A", "price": "$1"}]},
                {"category": "Shoes", "products": [
                    {"image": "b.jpg", "title": "B", "price": "$2"},
                    {"image": "a.jpg", "title": "A", "price": "$1"}
                ]}
            ]}),
        );
        ready(&f);

        assert_eq!(f.controller.analyze().await, SearchOutcome::ItemsDetected(2));
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.header, "We found 2 items in your photo");
        assert_eq!(snapshot.detected, vec!["Shirt", "Shoes"]);
        assert!(!snapshot.search_selected_enabled);

        assert_eq!(
            f.controller.search_detected(ItemScope::Selected).await,
            SearchOutcome::Ignored
        );
        assert_eq!(f.controller.toggle_item(0), Some(true));
        assert_eq!(f.controller.toggle_item(5), None);
        assert!(f.controller.snapshot().unwrap().search_selected_enabled);

        assert_eq!(
            f.controller.search_detected(ItemScope::Selected).await,
            SearchOutcome::Results { rendered: 1, total: 1 }
        );
        assert_eq!(f.script.hits(), 1);
    }

    #[tokio::test]
    async fn test_search_all_unions_products() {
        let f = fixture().await;
        f.script.push(
            200,
            json!({"detectedItems": [
                {"label": "Shirt", "products": [{"image": "a.jpg", "title": "A", "price": "$1"}]},
                {"label": "Shoes", "products": [
                    {"image": "b.jpg", "title": "B", "price": "$2"},
                    {"image": "a.jpg", "title": "A", "price": "$1"}
                ]}
            ]}),
        );
        ready(&f);
        f.controller.analyze().await;

        let search_all = click(&f, ".vs-search-all");
        assert!(f.controller.handle_click(search_all).await);
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ResultsDisplayed);
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.header, "Found 2 similar products");
    }

    #[tokio::test]
    async fn test_crop_is_sent_in_natural_pixels() {
        let f = fixture().await;
        f.script.push(200, products(1));
        ready(&f);

        let crop = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(f.controller.search_crop(crop).await, SearchOutcome::Ignored);
        assert!(f
            .controller
            .image_loaded(Size::new(1000.0, 500.0), Size::new(500.0, 250.0)));
        assert!(matches!(
            f.controller.search_crop(crop).await,
            SearchOutcome::Results { .. }
        ));

        let body = f.script.bodies.lock()[0].clone();
        for (field, value) in [("cropX", 20), ("cropY", 40), ("cropWidth", 200), ("cropHeight", 100)] {
            assert!(
                body.contains(&format!("name=\"{field}\"\r\n\r\n{value}\r\n")),
                "{field}"
            );
        }
    }

    #[tokio::test]
    async fn test_search_by_result_image_replaces_preview() {
        let f = fixture().await;
        f.script.push(200, products(2));
        f.script.push(200, products(1));
        ready(&f);
        f.controller.analyze().await;
        let before = f.controller.snapshot().unwrap().object_url;

        let image = click(&f, ".vs-card__image");
        assert!(f.controller.handle_click(image).await);

        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ResultsDisplayed);
        assert_eq!(snapshot.total, 1);
        assert_ne!(snapshot.object_url, before);
        assert_eq!(f.document.live_object_urls(), 1);
        assert_eq!(f.script.hits(), 2);
    }

    #[tokio::test]
    async fn test_choose_result_writes_back_and_closes() {
        let f = fixture().await;
        f.script.push(200, products(2));
        ready(&f);
        f.controller.analyze().await;

        let chosen = f.controller.choose_result(1).unwrap();
        assert_eq!(chosen.title, "Item 1");
        assert_eq!(f.document.attribute(f.input, "value").as_deref(), Some("Item 1"));
        assert!(!f.controller.is_open());
        assert_eq!(f.document.live_object_urls(), 0);
    }

    #[tokio::test]
    async fn test_upload_another_returns_to_preview() {
        let f = fixture().await;
        f.script.push(200, products(3));
        ready(&f);
        f.controller.analyze().await;

        assert!(f.controller.upload_another());
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ImagePreview);
        assert_eq!(snapshot.cards, 0);
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.picker, Some(Picker::File));
        assert!(!f.controller.upload_another());
    }

    #[tokio::test]
    async fn test_close_controls() {
        let f = fixture().await;
        f.controller.open(None).unwrap();
        assert!(!f.controller.handle_key("Enter"));
        assert!(f.controller.handle_key("Escape"));

        f.controller.open(None).unwrap();
        let camera = click(&f, ".vs-upload__camera");
        assert!(f.controller.handle_click(camera).await);
        assert_eq!(f.controller.snapshot().unwrap().picker, Some(Picker::Camera));

        let backdrop = click(&f, ".vs-drawer__backdrop");
        assert!(f.controller.handle_click(backdrop).await);
        assert!(!f.controller.is_open());

        f.controller.open(None).unwrap();
        let close = click(&f, ".vs-drawer__close");
        assert!(f.controller.handle_click(close).await);
        assert!(f.controller.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_enter_url() {
        let f = fixture().await;
        f.controller.open(Some(f.input)).unwrap();

        let page = f.base.join("page.html").unwrap();
        assert!(!f.controller.enter_url(page.as_str()).await);
        assert_eq!(f.controller.state(), DrawerState::UploadPending);
        assert_eq!(f.notifier.messages().len(), 1);

        let image = f.base.join("images/photo.png").unwrap();
        assert!(f.controller.enter_url(image.as_str()).await);
        let snapshot = f.controller.snapshot().unwrap();
        assert_eq!(snapshot.state, DrawerState::ImagePreview);
        assert!(snapshot.object_url.is_some());
        assert_eq!(f.script.hits(), 0);
    }

    #[tokio::test]
    async fn test_actions_ignored_when_closed() {
        let f = fixture().await;
        assert!(!f.controller.select_file(jpeg()));
        assert_eq!(f.controller.analyze().await, SearchOutcome::Ignored);
        assert_eq!(f.controller.on_scroll().await, 0);
        assert_eq!(f.controller.toggle_item(0), None);
        assert!(f.controller.choose_result(0).is_none());
        assert!(f.notifier.messages().is_empty());
    }
}
