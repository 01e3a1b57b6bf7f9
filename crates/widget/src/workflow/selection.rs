//! Chip selection over detected items.

use std::collections::BTreeSet;

/// Which detected items the shopper has toggled on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSelection {
    len: usize,
    selected: BTreeSet<usize>,
}

impl ItemSelection {
    /// An empty selection over `len` items.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            len,
            selected: BTreeSet::new(),
        }
    }

    /// Flip one item. Returns the new state, or `None` if out of range.
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        if self.selected.remove(&index) {
            Some(false)
        } else {
            self.selected.insert(index);
            Some(true)
        }
    }

    #[must_use]
    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Selected indices in ascending order.
    #[must_use]
    pub fn selected(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// "Search selected" is disabled while this is `true`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }
}
