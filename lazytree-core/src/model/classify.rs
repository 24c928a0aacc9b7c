//! ``src/model/classify.rs``
//!
//! Turns raw values from a data source into nodes and merges them into the
//! parent's child cache.

use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    config::NodeTypeTable,
    error::TreeError,
    model::node::{Node, NodeRef, RawValue},
    nav::context::OperationContext,
};

/// How a classified node is merged into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Return the node; leave the parent's cache untouched.
    Detached,
    /// Add to the cache, rejecting duplicate container names.
    Add,
    /// Replace any same-named entry, e.g. after a content write.
    Replace,
}

/// Classifies `raw` under `parent` and merges it according to `mode`.
///
/// Returns `None` for skipped values: JSON `null`, a blank name (warned),
/// a duplicate involving a container (warned), or a duplicate leaf (dropped
/// silently, the first entry wins).
pub fn classify_and_add(
    parent: &NodeRef,
    raw: RawValue,
    mode: MergeMode,
    table: &NodeTypeTable,
    ctx: &OperationContext,
) -> Option<NodeRef> {
    let node: NodeRef = match raw {
        RawValue::Opaque(Value::Null) => return None,
        RawValue::Opaque(value) => Node::opaque_child(value, parent, table),
        RawValue::Node(typed) => Node::typed_child(typed, parent, table),
    };

    if node.name().trim().is_empty() {
        let err = TreeError::blank_name(parent.name());
        ctx.warn(err.error_marker(), err.to_string(), parent.name());
        return None;
    }

    let children = match (mode, parent.children()) {
        (MergeMode::Detached, _) | (_, None) => return Some(node),
        (_, Some(children)) => children,
    };

    if mode == MergeMode::Replace {
        children.replace(node.clone());
        debug!(
            marker = "CHILD_REPLACED",
            operation_type = "classify",
            parent = parent.name(),
            child = node.name(),
            "Replaced child in place"
        );
        return Some(node);
    }

    if let Some(existing) = children.get(node.name()) {
        if existing.is_container() || node.is_container() {
            ctx.warn(
                "DuplicateNodeName",
                format!(
                    "Node '{}' already exists under '{}'; the duplicate is skipped",
                    node.name(),
                    parent.name()
                ),
                parent.name(),
            );
        } else {
            trace!(
                marker = "DUPLICATE_LEAF_DROPPED",
                operation_type = "classify",
                parent = parent.name(),
                child = node.name(),
                "Dropped duplicate leaf"
            );
        }
        return None;
    }

    children.insert_if_absent(node.clone()).then_some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::node::{NodeOptions, TypedNode},
        nav::context::DiagnosticLevel,
        source::contract::testing::StaticSource,
    };
    use serde_json::json;

    fn cached_root() -> NodeRef {
        let source = StaticSource::container("Root", vec![])
            .with_options(NodeOptions::cached())
            .arc();
        Node::root(TypedNode::new("root", source), &NodeTypeTable::default())
    }

    fn container(name: &str) -> RawValue {
        RawValue::node(name, StaticSource::container("Dir", vec![]).arc())
    }

    fn leaf(name: &str) -> RawValue {
        RawValue::node(name, StaticSource::leaf("File").arc())
    }

    fn add(root: &NodeRef, raw: RawValue, ctx: &OperationContext) -> Option<NodeRef> {
        classify_and_add(root, raw, MergeMode::Add, &NodeTypeTable::default(), ctx)
    }

    #[test]
    fn test_duplicate_containers_warn_once() {
        let root = cached_root();
        let ctx = OperationContext::new("Get-ChildItem", "/");

        assert!(add(&root, container("Erin"), &ctx).is_some());
        assert!(add(&root, container("ERIN"), &ctx).is_none());

        assert_eq!(root.children().unwrap().len(), 1);
        let diagnostics = ctx.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].level, DiagnosticLevel::Warning);
        assert_eq!(diagnostics[0].id, "DuplicateNodeName");
    }

    #[test]
    fn test_duplicate_leaves_keep_first_silently() {
        let root = cached_root();
        let ctx = OperationContext::new("Get-ChildItem", "/");

        let first = add(&root, leaf("notes"), &ctx).unwrap();
        assert!(add(&root, leaf("Notes"), &ctx).is_none());

        let kept = root.children().unwrap().get("NOTES").unwrap();
        assert!(std::sync::Arc::ptr_eq(&kept, &first));
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_leaf_then_container_collision_is_warned() {
        let root = cached_root();
        let ctx = OperationContext::new("Get-ChildItem", "/");

        add(&root, leaf("x"), &ctx);
        assert!(add(&root, container("x"), &ctx).is_none());
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_blank_and_null_values_skipped() {
        let root = cached_root();
        let ctx = OperationContext::new("Get-ChildItem", "/");

        assert!(add(&root, RawValue::opaque(json!({"Name": "  "})), &ctx).is_none());
        assert!(add(&root, RawValue::opaque(Value::Null), &ctx).is_none());
        assert!(add(&root, RawValue::opaque("kept"), &ctx).is_some());

        assert_eq!(root.children().unwrap().names(), vec!["kept"]);
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_detached_and_replace_modes() {
        let root = cached_root();
        let ctx = OperationContext::new("Set-Content", "/a");
        let table = NodeTypeTable::default();

        let detached = classify_and_add(&root, leaf("a"), MergeMode::Detached, &table, &ctx);
        assert!(detached.is_some());
        assert!(root.children().unwrap().is_empty());

        add(&root, container("a"), &ctx);
        let replaced =
            classify_and_add(&root, leaf("A"), MergeMode::Replace, &table, &ctx).unwrap();
        let current = root.children().unwrap().get("a").unwrap();
        assert!(std::sync::Arc::ptr_eq(&current, &replaced));
        assert!(current.is_leaf());
    }
}
