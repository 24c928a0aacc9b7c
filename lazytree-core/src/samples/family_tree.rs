//! ``src/samples/family_tree.rs``
//! ============================================================================
//! # A small family tree, mountable as `FamilyTree#Root`
//!
//! ```text
//! Root
//! ├── Erin          (container)
//! │   └── Erin's kid (container)
//! │       └── "Hello I am Mike."
//! └── Ethen         (leaf, readable and writable)
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use compact_str::CompactString;
use futures::future::{self, BoxFuture};

use crate::{
    error::SourceError,
    model::node::{NodeKind, NodeOptions, RawValue},
    mount::registry::{ModuleRegistry, NodeModule},
    source::contract::{ItemSink, NodeSource, SourceRequest},
};

pub const MODULE_NAME: &str = "FamilyTree";
pub const ROOT_TYPE: &str = "Root";

/// Module exposing the family tree root type.
#[must_use]
pub fn module() -> NodeModule {
    NodeModule::new(MODULE_NAME)
        .with_type(ROOT_TYPE, |_| Ok(RawValue::node("Root", Arc::new(Root))))
}

/// Registry with only the family tree module.
#[must_use]
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(module());
    registry
}

fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, Result<T, SourceError>> {
    Box::pin(future::ready(Ok(value)))
}

struct Root;

impl NodeSource for Root {
    fn type_name(&self) -> &str {
        "Root"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Container
    }

    fn options(&self) -> Option<NodeOptions> {
        Some(NodeOptions::cached())
    }

    fn child_items(self: Arc<Self>, sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
        if sink.push(RawValue::node("Erin", Arc::new(Erin))) {
            sink.push(RawValue::node("Ethen", Ethen::new()));
        }
        ready(())
    }
}

struct Erin;

impl NodeSource for Erin {
    fn type_name(&self) -> &str {
        "Erin"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Container
    }

    fn child_items(self: Arc<Self>, sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
        sink.push(RawValue::node("Erin's kid", Arc::new(Mike)));
        ready(())
    }
}

struct Mike;

impl NodeSource for Mike {
    fn type_name(&self) -> &str {
        "Mike"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Container
    }

    fn child_items(self: Arc<Self>, sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
        sink.push("Hello I am Mike.");
        ready(())
    }
}

/// Leaf whose content can be read and replaced.
struct Ethen {
    lines: Mutex<Vec<String>>,
}

impl Ethen {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(vec!["Ethen has no children.".to_owned()]),
        })
    }
}

impl NodeSource for Ethen {
    fn type_name(&self) -> &str {
        "Ethen"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Leaf
    }

    fn content(
        self: Arc<Self>,
        _request: SourceRequest,
    ) -> BoxFuture<'static, Result<Option<Vec<String>>, SourceError>> {
        let lines: Vec<String> = self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone();
        ready(Some(lines))
    }

    fn set_content(
        self: Arc<Self>,
        content: String,
        _path: CompactString,
    ) -> BoxFuture<'static, Result<Vec<RawValue>, SourceError>> {
        *self.lines.lock().unwrap_or_else(PoisonError::into_inner) =
            content.lines().map(str::to_owned).collect();

        ready(vec![RawValue::node("Ethen", self)])
    }
}
