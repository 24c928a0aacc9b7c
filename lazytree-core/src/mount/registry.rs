//! ``src/mount/registry.rs``
//! ============================================================================
//! # Module registry and root specifications
//!
//! A tree is mounted from a `Module#Type` root specification. Modules are
//! registered up front; each maps type names to root factories.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use ahash::RandomState;
use compact_str::CompactString;
use indexmap::IndexMap;

use crate::{
    error::{CoreResult, SourceError, TreeError},
    model::node::RawValue,
    util::path::{SEPARATORS, fold_case},
};

/// Builds the root value of a tree. Receives the type name it is
/// registered under.
pub type RootFactory = Arc<dyn Fn(&str) -> Result<RawValue, SourceError> + Send + Sync>;

/// A named set of root node types.
#[derive(Clone)]
pub struct NodeModule {
    name: CompactString,
    types: IndexMap<CompactString, (CompactString, RootFactory), RandomState>,
}

impl NodeModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            types: IndexMap::with_hasher(RandomState::new()),
        }
    }

    /// Registers a root factory under `type_name`.
    #[must_use]
    pub fn with_type<F>(mut self, type_name: &str, factory: F) -> Self
    where
        F: Fn(&str) -> Result<RawValue, SourceError> + Send + Sync + 'static,
    {
        self.types.insert(
            fold_case(type_name),
            (CompactString::new(type_name), Arc::new(factory)),
        );
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered type names, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.values().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn factory(&self, type_name: &str) -> Option<RootFactory> {
        self.types
            .get(&fold_case(type_name))
            .map(|(_, factory)| Arc::clone(factory))
    }
}

impl fmt::Debug for NodeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeModule")
            .field("name", &self.name)
            .field("types", &self.type_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Modules available for mounting, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<CompactString, Arc<NodeModule>, RandomState>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: NodeModule) -> &mut Self {
        self.modules.insert(fold_case(module.name()), Arc::new(module));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<NodeModule>> {
        self.modules.get(&fold_case(name)).cloned()
    }
}

/// Parsed `Module#Type` root specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpec {
    pub module: CompactString,
    pub type_name: CompactString,
}

impl RootSpec {
    /// Parses `Module#Type`, ignoring trailing separators. A fully
    /// qualified `Current#Type\Module#Type` form uses the part after the
    /// first separator.
    pub fn parse(root: &str) -> CoreResult<Self> {
        let root = root.trim();

        if root.is_empty() {
            return Err(TreeError::MissingRoot);
        }

        Self::parse_plain(root)
            .or_else(|| {
                root.split_once(SEPARATORS)
                    .and_then(|(_, rest)| Self::parse_plain(rest))
            })
            .ok_or_else(|| TreeError::invalid_root(root))
    }

    fn parse_plain(text: &str) -> Option<Self> {
        let text = text.trim_end_matches(SEPARATORS);
        let (module, type_name) = text.split_once('#')?;

        let module_ok = !module.trim().is_empty() && !module.contains(SEPARATORS);
        let type_ok = !type_name.trim().is_empty()
            && !type_name.contains('#')
            && !type_name.contains(SEPARATORS);

        (module_ok && type_ok).then(|| Self {
            module: CompactString::new(module.trim()),
            type_name: CompactString::new(type_name.trim()),
        })
    }
}

impl FromStr for RootSpec {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RootSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module, self.type_name)
    }
}
