//! ``src/nav/resolver.rs``
//! ============================================================================
//! # PathResolver: walk a path from the root, one container at a time
//!
//! Each hop answers from the child cache when the container trusts it and
//! fetches otherwise. A forced refresh applies to the last segment only.

use tracing::{debug, trace};

use crate::{
    model::node::NodeRef,
    mount::tree::NavTree,
    nav::{context::OperationContext, memo::NavigationMemo},
    source::invoker::FetchOutcome,
    util::path::{eq_ignore_case, split_segments},
};

/// Resolves paths against one tree, consulting and updating a session memo.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    tree: &'a NavTree,
    memo: &'a NavigationMemo,
}

impl<'a> PathResolver<'a> {
    #[must_use]
    pub const fn new(tree: &'a NavTree, memo: &'a NavigationMemo) -> Self {
        Self { tree, memo }
    }

    /// Node at `path`, or `None` when any hop is missing.
    ///
    /// Calls made on behalf of an unrecognised command resolve to nothing.
    pub async fn resolve(&self, ctx: &OperationContext, path: &str, force: bool) -> Option<NodeRef> {
        if ctx.command().is_none() {
            trace!(
                marker = "RESOLVE_FOREIGN_COMMAND",
                operation_type = "resolve",
                command = ctx.command_name(),
                path,
                "Ignoring resolution for unrecognised command"
            );
            return None;
        }

        let segments: Vec<&str> = split_segments(path);
        if segments.is_empty() {
            return Some(NodeRef::clone(self.tree.root()));
        }

        if !force {
            if let Some(node) = self.memo.node_for(path) {
                return Some(node);
            }
        }

        let last: usize = segments.len() - 1;
        let mut current: NodeRef = NodeRef::clone(self.tree.root());

        for (idx, segment) in segments.into_iter().enumerate() {
            if ctx.is_stopping() || !current.is_container() {
                return None;
            }

            current = self.child_of(&current, segment, force && idx == last, ctx).await?;
        }

        self.memo.record(path, Some(NodeRef::clone(&current)), None);
        Some(current)
    }

    /// Child `name` of `container`.
    ///
    /// A trusted cache answers alone: a miss is final and no fetch happens.
    pub async fn child_of(
        &self,
        container: &NodeRef,
        name: &str,
        force: bool,
        ctx: &OperationContext,
    ) -> Option<NodeRef> {
        let children = container.children()?;

        if !force && container.trusts_cache() {
            let hit: Option<NodeRef> = children.get(name);
            let marker: &str = if hit.is_some() {
                "CACHE_HIT"
            } else {
                "CACHE_MISS_TRUSTED"
            };
            debug!(
                marker,
                operation_type = "resolve",
                container = container.name(),
                child = name,
                "Answered from child cache"
            );
            return hit;
        }

        let outcome: FetchOutcome = self.tree.invoker().fetch_children(container, force, ctx).await;

        outcome
            .items
            .into_iter()
            .find(|child| eq_ignore_case(child.name(), name))
    }
}
