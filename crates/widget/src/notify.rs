//! Transient toast notifications.
//!
//! Toasts live in one fixed-position container (`#vs-toasts`) in a screen
//! corner and dismiss themselves after the configured duration. They never
//! block; there is no `alert`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use visual_search_core::{NodeId, ToastId};

use crate::dom::{Document, DomError};

/// Element id of the toast container.
pub const TOAST_CONTAINER_ID: &str = "vs-toasts";

/// Severity of a toast, reflected in its class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Shows and dismisses toasts. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

#[derive(Debug)]
struct NotifierInner {
    document: Document,
    duration: Duration,
    next_id: AtomicU64,
    active: Mutex<BTreeMap<ToastId, (NodeId, String)>>,
}

impl Notifier {
    #[must_use]
    pub fn new(document: Document, duration: Duration) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                document,
                duration,
                next_id: AtomicU64::new(1),
                active: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Show a toast. It is dismissed automatically after the configured
    /// duration when a Tokio runtime is available.
    pub fn show(&self, kind: ToastKind, message: &str) -> ToastId {
        let id = ToastId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        match self.render(kind, message) {
            Ok(node) => {
                self.inner
                    .active
                    .lock()
                    .insert(id, (node, message.to_string()));
            }
            Err(e) => warn!(error = %e, "Failed to render toast"),
        }
        debug!(toast = %id, kind = kind.as_str(), message, "Toast shown");

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let notifier = self.clone();
            let duration = self.inner.duration;
            handle.spawn(async move {
                tokio::time::sleep(duration).await;
                notifier.dismiss(id);
            });
        }
        id
    }

    /// Shortcut for an error toast.
    pub fn error(&self, message: &str) -> ToastId {
        self.show(ToastKind::Error, message)
    }

    /// Remove a toast. Returns `false` if it was already gone.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let Some((node, _)) = self.inner.active.lock().remove(&id) else {
            return false;
        };
        self.inner.document.remove(node);
        true
    }

    /// Remove every toast.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.inner.active.lock());
        for (node, _) in drained.into_values() {
            self.inner.document.remove(node);
        }
    }

    /// Messages currently on screen, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner
            .active
            .lock()
            .values()
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn render(&self, kind: ToastKind, message: &str) -> Result<NodeId, DomError> {
        let document = &self.inner.document;
        let container = if let Some(existing) = document.element_by_id(TOAST_CONTAINER_ID) {
            existing
        } else {
            let container = document.create_element("div");
            document.set_attribute(container, "id", TOAST_CONTAINER_ID)?;
            document.set_attribute(container, "aria-live", "polite")?;
            document.set_style(container, "position", "fixed")?;
            document.set_style(container, "bottom", "20px")?;
            document.set_style(container, "right", "20px")?;
            document.set_style(container, "z-index", "2147483647")?;
            document.append_child(document.body(), container)?;
            container
        };

        let toast = document.create_element("div");
        document.set_attribute(toast, "class", &format!("vs-toast vs-toast--{}", kind.as_str()))?;
        document.set_attribute(toast, "role", "alert")?;
        document.set_text(toast, message)?;
        document.append_child(container, toast)?;
        Ok(toast)
    }
}
