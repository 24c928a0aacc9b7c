//! `src/model/node.rs`
//! ============================================================
//! Node model for the lazily populated namespace.
//!
//! Goals
//! -----
//! • A node is shared as `Arc<Node>`; the parent link is a `Weak` back-reference
//!   fixed at construction, never an ownership edge.
//! • Name, kind and options are immutable once built.
//! • Only containers carry mutable state: the child cache and the
//!   `navigated` flag.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cache::child_cache::ChildCache, config::NodeTypeTable, source::contract::NodeSource,
    util::path::make_safe_name,
};

/// Shared handle to a node.
pub type NodeRef = Arc<Node>;

/// Type name given to generic leaves wrapping opaque values.
pub const OPAQUE_TYPE_NAME: &str = "Value";

// ------------------------------------------------------------
// NodeKind — container or leaf.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Container,
    Leaf,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "Container"),
            Self::Leaf => write!(f, "Leaf"),
        }
    }
}

// ------------------------------------------------------------
// NodeOptions — static per-type behaviour switches.
// ------------------------------------------------------------

/// Per-node-type switches, fixed when a node is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeOptions {
    /// Keep the fetched child list and trust it on later navigation.
    pub use_cache: bool,

    /// Emit progress while a fetch is in flight.
    pub show_progress: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            show_progress: true,
        }
    }
}

impl NodeOptions {
    #[must_use]
    pub const fn cached() -> Self {
        Self {
            use_cache: true,
            show_progress: true,
        }
    }

    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

// ------------------------------------------------------------
// Raw values produced by data sources.
// ------------------------------------------------------------

/// A child already typed by its data source: a name plus the behaviour object
/// that decides its kind and how to fetch beneath it.
#[derive(Clone)]
pub struct TypedNode {
    pub name: CompactString,
    pub source: Arc<dyn NodeSource>,
}

impl TypedNode {
    pub fn new(name: impl Into<CompactString>, source: Arc<dyn NodeSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

impl fmt::Debug for TypedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedNode")
            .field("name", &self.name)
            .field("type_name", &self.source.type_name())
            .field("kind", &self.source.kind())
            .finish()
    }
}

/// One value returned by a data source before classification.
#[derive(Debug, Clone)]
pub enum RawValue {
    /// An already-typed container or leaf.
    Node(TypedNode),

    /// Anything else; wrapped in a generic leaf.
    Opaque(Value),
}

impl RawValue {
    pub fn node(name: impl Into<CompactString>, source: Arc<dyn NodeSource>) -> Self {
        Self::Node(TypedNode::new(name, source))
    }

    pub fn opaque(value: impl Into<Value>) -> Self {
        Self::Opaque(value.into())
    }
}

impl From<TypedNode> for RawValue {
    fn from(node: TypedNode) -> Self {
        Self::Node(node)
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self::Opaque(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Opaque(Value::String(value.to_owned()))
    }
}

// ------------------------------------------------------------
// Node
// ------------------------------------------------------------

enum Backing {
    Typed(Arc<dyn NodeSource>),
    Value(Value),
}

/// Mutable state owned by container nodes.
pub struct ContainerState {
    children: ChildCache,
    navigated: AtomicBool,
}

impl ContainerState {
    fn new() -> Self {
        Self {
            children: ChildCache::new(),
            navigated: AtomicBool::new(false),
        }
    }
}

pub struct Node {
    name: CompactString,
    type_name: CompactString,
    kind: NodeKind,
    options: NodeOptions,
    parent: Weak<Node>,
    backing: Backing,
    container: Option<ContainerState>,
}

impl Node {
    /// Builds the root of a tree. The root has no parent.
    #[must_use]
    pub fn root(typed: TypedNode, table: &NodeTypeTable) -> NodeRef {
        Self::from_typed(typed, Weak::new(), table)
    }

    /// Builds a node for an already-typed raw value under `parent`.
    #[must_use]
    pub fn typed_child(typed: TypedNode, parent: &NodeRef, table: &NodeTypeTable) -> NodeRef {
        Self::from_typed(typed, Arc::downgrade(parent), table)
    }

    /// Wraps an opaque value in a generic leaf under `parent`.
    ///
    /// The name comes from a `Name` property (matched case-insensitively),
    /// falling back to the value's string form.
    #[must_use]
    pub fn opaque_child(value: Value, parent: &NodeRef, table: &NodeTypeTable) -> NodeRef {
        let name: CompactString = make_safe_name(&opaque_name(&value));

        Arc::new(Self {
            name,
            type_name: CompactString::const_new(OPAQUE_TYPE_NAME),
            kind: NodeKind::Leaf,
            options: table.resolve(OPAQUE_TYPE_NAME, None),
            parent: Arc::downgrade(parent),
            backing: Backing::Value(value),
            container: None,
        })
    }

    fn from_typed(typed: TypedNode, parent: Weak<Self>, table: &NodeTypeTable) -> NodeRef {
        let kind: NodeKind = typed.source.kind();
        let type_name: CompactString = CompactString::new(typed.source.type_name());
        let options: NodeOptions = table.resolve(&type_name, typed.source.options());

        Arc::new(Self {
            name: make_safe_name(&typed.name),
            type_name,
            kind,
            options,
            parent,
            backing: Backing::Typed(typed.source),
            container: (kind == NodeKind::Container).then(ContainerState::new),
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    #[inline]
    #[must_use]
    pub const fn options(&self) -> NodeOptions {
        self.options
    }

    #[inline]
    #[must_use]
    pub const fn use_cache(&self) -> bool {
        self.options.use_cache
    }

    #[inline]
    #[must_use]
    pub const fn show_progress(&self) -> bool {
        self.options.show_progress
    }

    /// Item mode shown in listings: `+` for containers, `.` for leaves.
    #[must_use]
    pub const fn mode(&self) -> char {
        match self.kind {
            NodeKind::Container => '+',
            NodeKind::Leaf => '.',
        }
    }

    /// Owning container, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }

    /// Behaviour object for typed nodes; `None` for opaque leaves.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn NodeSource>> {
        match &self.backing {
            Backing::Typed(source) => Some(source),
            Backing::Value(_) => None,
        }
    }

    /// Wrapped value for opaque leaves.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match &self.backing {
            Backing::Typed(_) => None,
            Backing::Value(value) => Some(value),
        }
    }

    /// Child cache; `None` for leaves.
    #[must_use]
    pub fn children(&self) -> Option<&ChildCache> {
        self.container.as_ref().map(|state| &state.children)
    }

    /// True once a fetch for this container has succeeded.
    #[must_use]
    pub fn is_navigated(&self) -> bool {
        self.container
            .as_ref()
            .is_some_and(|state| state.navigated.load(Ordering::Acquire))
    }

    pub(crate) fn set_navigated(&self, navigated: bool) {
        if let Some(state) = &self.container {
            state.navigated.store(navigated, Ordering::Release);
        }
    }

    /// True when a resolution may answer from the child cache alone.
    #[must_use]
    pub fn trusts_cache(&self) -> bool {
        self.use_cache() && self.is_navigated()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("options", &self.options)
            .field("navigated", &self.is_navigated())
            .finish_non_exhaustive()
    }
}

/// Conventional name of an opaque value.
fn opaque_name(value: &Value) -> String {
    if let Value::Object(map) = value {
        let named = map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("name"))
            .map(|(_, v)| v);

        if let Some(v) = named {
            return value_string(v);
        }
    }

    value_string(value)
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
