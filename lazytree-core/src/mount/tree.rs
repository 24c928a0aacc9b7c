//! ``src/mount/tree.rs``
//! ============================================================================
//! # NavTree: one mounted namespace
//!
//! Mounting turns a `Module#Type` root specification into a root container
//! node. Every failure here is fatal; once mounted, the tree is shared by
//! any number of sessions.

use std::sync::Arc;

use compact_str::{CompactString, format_compact};
use tracing::info;

use crate::{
    config::Config,
    error::{CoreResult, TreeError},
    model::node::{Node, NodeKind, NodeRef, RawValue, TypedNode},
    mount::registry::{ModuleRegistry, RootFactory, RootSpec},
    source::invoker::DataSourceInvoker,
};

pub struct NavTree {
    name: CompactString,
    spec: RootSpec,
    root: NodeRef,
    invoker: DataSourceInvoker,
    config: Config,
}

impl NavTree {
    /// Mounts the tree `name` from `root_spec`.
    pub fn mount(
        name: &str,
        root_spec: &str,
        registry: &ModuleRegistry,
        config: Config,
    ) -> CoreResult<Arc<Self>> {
        let spec: RootSpec = RootSpec::parse(root_spec).map_err(TreeError::trace)?;

        let module = registry.get(&spec.module).ok_or_else(|| {
            TreeError::ModuleNotFound {
                module: spec.module.clone(),
            }
            .trace()
        })?;

        let factory: RootFactory = module.factory(&spec.type_name).ok_or_else(|| {
            Self::cannot_create(&spec, CompactString::default())
        })?;

        let typed: TypedNode = match factory(&spec.type_name) {
            Ok(RawValue::Node(typed)) => typed,
            Ok(RawValue::Opaque(_)) => {
                return Err(TreeError::NotContainerNode {
                    type_name: spec.type_name.clone(),
                }
                .trace());
            }
            Err(err) => return Err(Self::cannot_create(&spec, format_compact!(": {err}"))),
        };

        if typed.name.trim().is_empty() {
            return Err(TreeError::blank_name("root").trace());
        }

        if typed.source.kind() == NodeKind::Leaf {
            return Err(TreeError::RootMustBeContainer {
                type_name: spec.type_name.clone(),
            }
            .trace());
        }

        let invoker = DataSourceInvoker::new(config.fetch.clone(), config.node_type_table());
        let root: NodeRef = Node::root(typed, invoker.table());

        info!(
            marker = "TREE_MOUNTED",
            operation_type = "mount",
            tree = name,
            root = %spec,
            root_name = root.name(),
            root_type = root.type_name(),
            use_cache = root.use_cache(),
            "Tree mounted"
        );

        Ok(Arc::new(Self {
            name: CompactString::new(name),
            spec,
            root,
            invoker,
            config,
        }))
    }

    fn cannot_create(spec: &RootSpec, detail: CompactString) -> TreeError {
        TreeError::CannotCreateInstance {
            type_name: spec.type_name.clone(),
            module: spec.module.clone(),
            detail,
        }
        .trace()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn spec(&self) -> &RootSpec {
        &self.spec
    }

    #[must_use]
    pub const fn root(&self) -> &NodeRef {
        &self.root
    }

    #[must_use]
    pub const fn invoker(&self) -> &DataSourceInvoker {
        &self.invoker
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for NavTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavTree")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
