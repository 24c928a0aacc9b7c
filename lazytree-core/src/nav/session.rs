//! ``src/nav/session.rs``
//! ============================================================================
//! # Session: the calls a navigation front-end makes
//!
//! A session pairs a mounted tree with its own [`NavigationMemo`]. Every
//! entry point takes the request's [`OperationContext`]; the path operated on
//! is the context's user-facing path.
//!
//! Only item-level failures surface as `Err`: a path that cannot be found or
//! a command the namespace does not support. Per-item source problems end up
//! as diagnostics on the context.

use std::{fmt, sync::Arc};

use compact_str::CompactString;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    error::{CoreResult, TreeError},
    model::node::{NodeKind, NodeRef},
    mount::tree::NavTree,
    nav::{context::OperationContext, memo::NavigationMemo, resolver::PathResolver},
    source::invoker::FetchOutcome,
    util::path::{dir_of, is_root, leaf_name},
};

/// Presentation view of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemInfo {
    pub name: CompactString,
    pub type_name: CompactString,
    pub kind: NodeKind,
    pub mode: char,
}

impl From<&NodeRef> for ItemInfo {
    fn from(node: &NodeRef) -> Self {
        Self {
            name: CompactString::new(node.name()),
            type_name: CompactString::new(node.type_name()),
            kind: node.kind(),
            mode: node.mode(),
        }
    }
}

impl fmt::Display for ItemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {:<12} {}", self.mode, self.type_name, self.name)
    }
}

pub struct Session {
    tree: Arc<NavTree>,
    memo: NavigationMemo,
}

impl Session {
    #[must_use]
    pub fn new(tree: Arc<NavTree>) -> Self {
        Self {
            tree,
            memo: NavigationMemo::new(),
        }
    }

    /// A session that always resolves from scratch.
    #[must_use]
    pub fn without_memo(tree: Arc<NavTree>) -> Self {
        Self {
            tree,
            memo: NavigationMemo::disabled(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &Arc<NavTree> {
        &self.tree
    }

    #[must_use]
    pub const fn memo(&self) -> &NavigationMemo {
        &self.memo
    }

    #[must_use]
    pub fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.tree, &self.memo)
    }

    /// Rejects mutation commands with a user-visible error.
    pub fn reject_unsupported(&self, ctx: &OperationContext) -> CoreResult<()> {
        match ctx.command() {
            Some(command) => command.ensure_supported(ctx.path()),
            None => Ok(()),
        }
    }

    pub async fn exists(&self, ctx: &OperationContext) -> bool {
        self.find(ctx).await.is_some()
    }

    pub async fn is_container(&self, ctx: &OperationContext) -> bool {
        self.find(ctx).await.is_some_and(|node| node.is_container())
    }

    pub async fn get_item(&self, ctx: &OperationContext) -> CoreResult<ItemInfo> {
        self.reject_unsupported(ctx)?;

        self.find(ctx)
            .await
            .map(|node| ItemInfo::from(&node))
            .ok_or_else(|| TreeError::path_not_found(ctx.path()).trace())
    }

    /// Children of the container at the context path. A leaf has none.
    pub async fn list_children(&self, ctx: &OperationContext) -> CoreResult<Vec<NodeRef>> {
        self.reject_unsupported(ctx)?;
        let path: &str = ctx.path();

        if !ctx.is_force() && ctx.filter().is_none() {
            if let Some((_, children)) = self.memo.children_for(path) {
                return Ok(children);
            }
        }

        let node: NodeRef = self
            .resolver()
            .resolve(ctx, path, false)
            .await
            .ok_or_else(|| TreeError::path_not_found(path).trace())?;

        let Some(cache) = node.children() else {
            return Ok(Vec::new());
        };

        if !ctx.is_force() && ctx.filter().is_none() && node.trusts_cache() {
            let children: Vec<NodeRef> = cache.snapshot();
            debug!(
                marker = "LIST_FROM_CACHE",
                operation_type = "list_children",
                node = node.name(),
                count = children.len(),
                "Listing served from child cache"
            );
            self.memo.record(path, Some(node), Some(children.clone()));
            return Ok(children);
        }

        let outcome: FetchOutcome = self.tree.invoker().fetch_children(&node, ctx.is_force(), ctx).await;

        // An interrupted or failed fetch may have evicted `node`.
        if !outcome.is_success() {
            self.memo.clear();
        } else if ctx.filter().is_none() {
            self.memo.record(path, Some(node), Some(outcome.items.clone()));
        }

        Ok(outcome.items)
    }

    pub async fn get_content(&self, ctx: &OperationContext) -> CoreResult<Option<Vec<String>>> {
        self.reject_unsupported(ctx)?;

        let node: NodeRef = self
            .find(ctx)
            .await
            .ok_or_else(|| TreeError::path_not_found(ctx.path()).trace())?;

        Ok(self.tree.invoker().fetch_content(&node, ctx).await)
    }

    /// Writes `content` to the node at the context path and returns the
    /// nodes that replaced it.
    pub async fn set_content(&self, ctx: &OperationContext, content: String) -> CoreResult<Vec<NodeRef>> {
        self.reject_unsupported(ctx)?;
        let path: &str = ctx.path();

        // Nodes only hold weak links upward, so the parent is resolved and
        // held for the whole write.
        let (_parent, node): (Option<NodeRef>, NodeRef) = if is_root(path) {
            (None, NodeRef::clone(self.tree.root()))
        } else {
            let parent: NodeRef = self
                .resolver()
                .resolve(ctx, dir_of(path), false)
                .await
                .ok_or_else(|| TreeError::path_not_found(path).trace())?;
            let node: NodeRef = self
                .resolver()
                .child_of(&parent, leaf_name(path), ctx.is_force(), ctx)
                .await
                .ok_or_else(|| TreeError::path_not_found(path).trace())?;
            (Some(parent), node)
        };

        let written: Vec<NodeRef> = self.tree.invoker().write_content(&node, content, ctx).await?;
        self.memo.clear();

        info!(
            marker = "CONTENT_WRITTEN",
            operation_type = "set_content",
            path = ctx.path(),
            replaced = written.len(),
            "Content written"
        );

        Ok(written)
    }

    /// Memo-first lookup used by the single-item calls.
    async fn find(&self, ctx: &OperationContext) -> Option<NodeRef> {
        let path: &str = ctx.path();

        if !ctx.is_force() {
            if let Some(node) = self.memo.node_for(path) {
                return Some(node);
            }

            if !is_root(path) {
                if let Some(node) = self.memo.child_match(dir_of(path), leaf_name(path)) {
                    return Some(node);
                }
            }
        }

        self.memo.reset(path);
        self.resolver().resolve(ctx, path, ctx.is_force()).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("tree", &self.tree.name())
            .field("memo", &self.memo)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        config::Config,
        model::node::{NodeOptions, RawValue},
        mount::registry::{ModuleRegistry, NodeModule},
        source::contract::testing::StaticSource,
    };

    fn session(options: NodeOptions) -> (Session, Arc<AtomicUsize>) {
        let source = StaticSource::container(
            "Root",
            vec![
                RawValue::node("Erin", StaticSource::container("Person", vec![]).arc()),
                RawValue::node(
                    "Ethen",
                    StaticSource::leaf("Person").with_content(&["hi"]).arc(),
                ),
            ],
        )
        .with_options(options);
        let calls = source.calls();
        let source = source.arc();

        let mut registry = ModuleRegistry::new();
        registry.register(
            NodeModule::new("Test")
                .with_type("Root", move |_| Ok(RawValue::node("root", Arc::clone(&source)))),
        );

        let tree = NavTree::mount("T", "Test#Root", &registry, Config::default()).unwrap();
        (Session::new(tree), calls)
    }

    #[tokio::test]
    async fn test_list_then_exists_uses_memo() {
        let (session, calls) = session(NodeOptions::default());

        let listed = session
            .list_children(&OperationContext::new("Get-ChildItem", "T:/"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let ctx = OperationContext::new("Test-Path", "T:/ethen");
        assert!(session.exists(&ctx).await);
        assert!(!session.is_container(&ctx).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutation_commands_rejected() {
        let (session, calls) = session(NodeOptions::default());
        let ctx = OperationContext::new("Remove-Item", "T:/Erin");

        let err = session.get_item(&ctx).await.unwrap_err();
        assert!(matches!(err, TreeError::NotSupported { .. }));
        assert!(err.to_string().contains("T:/Erin"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_path_and_leaf_listing() {
        let (session, _) = session(NodeOptions::cached());

        let err = session
            .get_item(&OperationContext::new("Get-Item", "T:/Nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::PathNotFound(_)));

        let listed = session
            .list_children(&OperationContext::new("Get-ChildItem", "T:/Ethen"))
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_content_and_item_info() {
        let (session, _) = session(NodeOptions::cached());

        let content = session
            .get_content(&OperationContext::new("Get-Content", "T:/Ethen"))
            .await
            .unwrap();
        assert_eq!(content, Some(vec!["hi".to_owned()]));

        let info = session
            .get_item(&OperationContext::new("Get-Item", "T:/erin"))
            .await
            .unwrap();
        assert_eq!(info.name, "Erin");
        assert_eq!(info.mode, '+');
    }
}
