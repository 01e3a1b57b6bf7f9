//! Drawer lifecycle states.

use std::fmt;

/// The state of one drawer session.
///
/// ```text
/// CLOSED ─> UPLOAD_PENDING ─> IMAGE_PREVIEW ─> ANALYZING ─┬─> RESULTS_DISPLAYED
///                                  ^               ^       └─> ITEMS_DETECTED ─> SEARCHING ─┘
///                                  │               │
///                                  └─ upload another / errors ─ re-crop, result image
/// ```
///
/// `Closed` is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawerState {
    Closed,
    UploadPending,
    ImagePreview,
    Analyzing,
    ItemsDetected,
    Searching,
    ResultsDisplayed,
}

impl DrawerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::UploadPending => "upload-pending",
            Self::ImagePreview => "image-preview",
            Self::Analyzing => "analyzing",
            Self::ItemsDetected => "items-detected",
            Self::Searching => "searching",
            Self::ResultsDisplayed => "results-displayed",
        }
    }

    /// Whether a request is in flight.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Analyzing | Self::Searching)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use DrawerState::{
            Analyzing, Closed, ImagePreview, ItemsDetected, ResultsDisplayed, Searching,
            UploadPending,
        };
        matches!(
            (self, next),
            (_, Closed)
                | (Closed, UploadPending)
                | (UploadPending | ImagePreview, ImagePreview)
                | (ImagePreview | ResultsDisplayed | ItemsDetected, Analyzing)
                | (Analyzing, ItemsDetected | ResultsDisplayed | ImagePreview)
                | (ItemsDetected | ResultsDisplayed, Searching)
                | (Searching, ResultsDisplayed | ItemsDetected)
                | (ResultsDisplayed | ItemsDetected, ImagePreview)
        )
    }
}

impl fmt::Display for DrawerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
