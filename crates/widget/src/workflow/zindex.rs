//! Temporary z-index lowering for host elements that would cover the drawer.

use tracing::{debug, warn};
use visual_search_core::NodeId;

use crate::dom::Document;

/// Stacking order of the drawer.
pub const DRAWER_Z_INDEX: i64 = 2_147_483_000;

/// Inline z-index values replaced while a drawer is open.
///
/// Restoring puts back the exact inline value (or its absence), so author
/// stylesheet rules take effect again unchanged.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use = "overrides must be restored when the drawer closes"]
pub struct ZIndexOverrides {
    saved: Vec<(NodeId, Option<String>)>,
}

impl ZIndexOverrides {
    /// Lower every positioned element whose z-index is at or above
    /// `modal_z`, skipping anything inside `exclude`.
    pub fn apply(document: &Document, modal_z: i64, exclude: &[NodeId]) -> Self {
        let root = document.document_element();
        let lowered = (modal_z - 1).to_string();
        let mut saved = Vec::new();

        for node in document.descendants(root) {
            if exclude.iter().any(|ex| document.contains(*ex, node)) {
                continue;
            }
            if document.computed_style(node, "position") == "static" {
                continue;
            }
            let Ok(z) = document.computed_style(node, "z-index").trim().parse::<i64>() else {
                continue;
            };
            if z < modal_z {
                continue;
            }
            let previous = document.inline_style(node, "z-index");
            if document.set_style(node, "z-index", &lowered).is_ok() {
                saved.push((node, previous));
            }
        }

        if !saved.is_empty() {
            debug!(count = saved.len(), "Lowered occluding host elements");
        }
        Self { saved }
    }

    /// Put every original value back.
    pub fn restore(self, document: &Document) {
        for (node, previous) in self.saved {
            match previous {
                Some(value) => {
                    // The host may have removed the element meanwhile.
                    if let Err(e) = document.set_style(node, "z-index", &value) {
                        warn!(%node, error = %e, "Could not restore z-index");
                    }
                }
                None => {
                    document.remove_style(node, "z-index");
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Elements currently lowered.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.saved.iter().map(|(node, _)| *node).collect()
    }
}
