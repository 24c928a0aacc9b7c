//! ``src/nav/memo.rs``
//! ============================================================================
//! # NavigationMemo: single-slot memo of the last resolution
//!
//! A front-end step usually issues several calls for the same path
//! (exists, is-container, list). The memo keeps the outcome of the most
//! recent resolution so those calls do not resolve or fetch again.
//!
//! The memo is owned by a session and passed explicitly; it never holds more
//! than one path. Results must be identical with the memo disabled.

use std::sync::{Mutex, MutexGuard, PoisonError};

use compact_str::CompactString;
use tracing::trace;

use crate::{
    model::node::NodeRef,
    util::path::{eq_ignore_case, trim_end_separators},
};

#[derive(Debug, Clone)]
struct MemoSlot {
    path: CompactString,
    trimmed: CompactString,
    node: Option<NodeRef>,
    children: Option<Vec<NodeRef>>,
}

#[derive(Debug)]
pub struct NavigationMemo {
    enabled: bool,
    slot: Mutex<Option<MemoSlot>>,
}

impl Default for NavigationMemo {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationMemo {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            slot: Mutex::new(None),
        }
    }

    /// A memo that never remembers anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<MemoSlot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the slot.
    pub fn record(&self, path: &str, node: Option<NodeRef>, children: Option<Vec<NodeRef>>) {
        if !self.enabled {
            return;
        }

        *self.slot() = Some(MemoSlot {
            path: CompactString::new(path),
            trimmed: CompactString::new(trim_end_separators(path)),
            node,
            children,
        });
    }

    /// Forgets everything except that `path` is the current step.
    pub fn reset(&self, path: &str) {
        self.record(path, None, None);
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|slot| eq_ignore_case(&slot.path, path))
    }

    /// Node recorded for exactly `path`.
    #[must_use]
    pub fn node_for(&self, path: &str) -> Option<NodeRef> {
        let slot = self.slot();
        let slot = slot.as_ref().filter(|slot| eq_ignore_case(&slot.path, path))?;

        let node: NodeRef = slot.node.clone()?;
        trace!(marker = "MEMO_HIT", operation_type = "memo", path, "Memo node hit");
        Some(node)
    }

    /// Node and children recorded for exactly `path`, when both are present.
    #[must_use]
    pub fn children_for(&self, path: &str) -> Option<(NodeRef, Vec<NodeRef>)> {
        let slot = self.slot();
        let slot = slot.as_ref().filter(|slot| eq_ignore_case(&slot.path, path))?;

        let found = (slot.node.clone()?, slot.children.clone()?);
        trace!(marker = "MEMO_HIT", operation_type = "memo", path, "Memo children hit");
        Some(found)
    }

    /// A child named `name` among the children recorded for directory `dir`.
    #[must_use]
    pub fn child_match(&self, dir: &str, name: &str) -> Option<NodeRef> {
        let slot = self.slot();
        let slot = slot
            .as_ref()
            .filter(|slot| eq_ignore_case(&slot.trimmed, trim_end_separators(dir)))?;

        let child: NodeRef = slot
            .children
            .as_ref()?
            .iter()
            .find(|child| eq_ignore_case(child.name(), name))
            .cloned()?;

        trace!(marker = "MEMO_HIT", operation_type = "memo", dir, name, "Memo child hit");
        Some(child)
    }
}
