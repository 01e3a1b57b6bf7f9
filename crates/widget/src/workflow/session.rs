//! One open drawer and everything it owns.

use tracing::{debug, warn};
use visual_search_core::{DetectedItem, ListenerId, NodeId, RequestId, SearchResult, SessionId};

use super::pagination::Paginator;
use super::selection::ItemSelection;
use super::state::DrawerState;
use super::view::DrawerView;
use super::zindex::ZIndexOverrides;
use crate::api::ImageState;
use crate::dom::{Document, DomError};
use crate::validate::ImageFile;

pub(crate) const OPEN_HEADER: &str = "Search by image";
pub(crate) const READY_HEADER: &str = "Ready to search";
pub(crate) const ANALYZING_HEADER: &str = "Analyzing image...";
pub(crate) const SEARCHING_HEADER: &str = "Searching for similar products...";
pub(crate) const EMPTY_HEADER: &str = "No similar products found";

pub(crate) fn found_header(count: usize) -> String {
    format!("Found {count} similar products")
}

pub(crate) fn detected_header(count: usize) -> String {
    if count == 1 {
        "We found 1 item in your photo".to_string()
    } else {
        format!("We found {count} items in your photo")
    }
}

/// Image source the shopper asked for but has not supplied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picker {
    File,
    Camera,
    Url,
}

/// Identifies the request a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub session: SessionId,
    pub request: RequestId,
}

#[derive(Debug)]
pub(crate) struct DrawerSession {
    pub id: SessionId,
    pub input: Option<NodeId>,
    pub view: DrawerView,
    pub state: DrawerState,
    pub file: Option<ImageFile>,
    pub object_url: Option<String>,
    pub image: Option<ImageState>,
    pub detected: Vec<DetectedItem>,
    pub selection: ItemSelection,
    pub paginator: Option<Paginator>,
    pub listeners: Vec<ListenerId>,
    pub zindex: ZIndexOverrides,
    pub generation: RequestId,
    pub loading_page: bool,
    pub picker: Option<Picker>,
}

impl DrawerSession {
    pub fn new(
        id: SessionId,
        input: Option<NodeId>,
        view: DrawerView,
        listeners: Vec<ListenerId>,
        zindex: ZIndexOverrides,
    ) -> Self {
        Self {
            id,
            input,
            view,
            state: DrawerState::UploadPending,
            file: None,
            object_url: None,
            image: None,
            detected: Vec::new(),
            selection: ItemSelection::default(),
            paginator: None,
            listeners,
            zindex,
            generation: RequestId::new(0),
            loading_page: false,
            picker: None,
        }
    }

    pub const fn ticket(&self) -> Ticket {
        Ticket {
            session: self.id,
            request: self.generation,
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.id == ticket.session && self.generation == ticket.request
    }

    /// Move to `next` if legal and show the matching sections.
    pub fn transition(&mut self, document: &Document, next: DrawerState) -> Result<bool, DomError> {
        if !self.state.can_transition_to(next) {
            warn!(session = %self.id, from = %self.state, to = %next, "Illegal drawer transition");
            return Ok(false);
        }
        debug!(session = %self.id, from = %self.state, to = %next, "Drawer transition");
        self.state = next;
        self.view.set_state(document, next)?;
        Ok(true)
    }

    /// Enter a loading state: bump the generation and show placeholders.
    pub fn start_request(
        &mut self,
        document: &Document,
        next: DrawerState,
        request: RequestId,
        skeletons: usize,
    ) -> Result<Ticket, DomError> {
        self.transition(document, next)?;
        self.generation = request;
        self.paginator = None;
        self.loading_page = false;
        if next == DrawerState::Analyzing {
            self.detected.clear();
            self.selection = ItemSelection::default();
        }
        self.view.show_skeletons(document, skeletons)?;
        self.view.set_header(
            document,
            if next == DrawerState::Searching {
                SEARCHING_HEADER
            } else {
                ANALYZING_HEADER
            },
        )?;
        self.view.set_count(document, "")?;
        Ok(self.ticket())
    }

    /// Use a new image, releasing the previous object URL.
    pub fn replace_image(&mut self, document: &Document, file: ImageFile) -> Result<(), DomError> {
        if let Some(previous) = self.object_url.take() {
            document.revoke_object_url(&previous);
        }
        let url = document.create_object_url(file.bytes.clone());
        self.view.set_preview(document, Some(&url))?;
        self.object_url = Some(url);
        self.file = Some(file);
        self.image = None;
        self.picker = None;
        Ok(())
    }

    pub fn show_results(
        &mut self,
        document: &Document,
        results: Vec<SearchResult>,
        page_size: usize,
    ) -> Result<(usize, usize), DomError> {
        self.view.clear_grid(document);
        let mut paginator = Paginator::new(results, page_size);
        let first = paginator.first_page().to_vec();
        self.view.append_cards(document, &first, 0)?;
        let total = paginator.total();
        let rendered = paginator.rendered();

        self.transition(document, DrawerState::ResultsDisplayed)?;
        if total == 0 {
            self.view.set_header(document, EMPTY_HEADER)?;
            self.view.set_count(document, "")?;
        } else {
            self.view.set_header(document, &found_header(total))?;
            self.view.set_count(document, &paginator.status_text())?;
        }
        self.paginator = Some(paginator);
        Ok((rendered, total))
    }

    pub fn show_detected(
        &mut self,
        document: &Document,
        items: Vec<DetectedItem>,
    ) -> Result<usize, DomError> {
        self.view.clear_grid(document);
        self.view.render_chips(document, &items)?;
        self.selection = ItemSelection::new(items.len());
        self.detected = items;
        self.transition(document, DrawerState::ItemsDetected)?;
        self.view.set_header(document, &detected_header(self.detected.len()))?;
        self.view.set_count(document, "")?;
        Ok(self.detected.len())
    }

    /// Drop placeholders and return to a state the shopper can act from.
    pub fn recover(&mut self, document: &Document, fallback: DrawerState) -> Result<(), DomError> {
        self.view.clear_grid(document);
        self.paginator = None;
        self.transition(document, fallback)?;
        let header = if fallback == DrawerState::ItemsDetected {
            detected_header(self.detected.len())
        } else {
            READY_HEADER.to_string()
        };
        self.view.set_header(document, &header)?;
        self.view.set_count(document, "")
    }

    /// Remove the drawer and release everything it holds.
    pub fn teardown(mut self, document: &Document) {
        for listener in self.listeners.drain(..) {
            document.remove_listener(listener);
        }
        if let Some(url) = self.object_url.take() {
            document.revoke_object_url(&url);
        }
        std::mem::take(&mut self.zindex).restore(document);
        document.remove(self.view.root);
        debug!(session = %self.id, "Drawer torn down");
    }
}
