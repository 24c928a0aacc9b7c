//! Core error handling module
//!
//! • `TreeError` covers mount, navigation and content failures
//! • `SourceError` is what a data source reports for a single fetch
//! • Payloads are `CompactString` so the hot path stays allocation-light
//! • First-class `tracing` integration through [`TreeError::trace`]
use std::io::{self, ErrorKind};

use compact_str::CompactString;
use smallvec::{SmallVec, smallvec};
use thiserror::Error;
use tracing::{Level, event};

/// Convenient alias carrying our unified error type
pub type CoreResult<T> = Result<T, TreeError>;

/// Primary error enumeration (grouped by concern)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TreeError {
    // ────────────────────────────────────────────────────────────
    // Mount / initialization (fatal)
    // ────────────────────────────────────────────────────────────
    #[error("The root of the tree must be specified")]
    MissingRoot,

    #[error("Invalid root format '{root}'. Expected 'Module#Type'")]
    InvalidRootFormat { root: CompactString },

    #[error("Cannot find module '{module}'")]
    ModuleNotFound { module: CompactString },

    #[error("Cannot create an instance of '{type_name}' from module '{module}'{detail}")]
    CannotCreateInstance {
        type_name: CompactString,
        module: CompactString,
        detail: CompactString,
    },

    #[error("The root value of '{type_name}' is not a node")]
    NotContainerNode { type_name: CompactString },

    #[error("Node name under '{parent}' is null or empty")]
    BlankNodeName { parent: CompactString },

    #[error("The root node '{type_name}' must be a container, not a leaf")]
    RootMustBeContainer { type_name: CompactString },

    // ────────────────────────────────────────────────────────────
    // Navigation
    // ────────────────────────────────────────────────────────────
    #[error("Cannot find path '{0}' because it does not exist")]
    PathNotFound(CompactString),

    #[error("'{command}' is not supported in this namespace: {path}")]
    NotSupported {
        command: CompactString,
        path: CompactString,
    },

    #[error("'set-content' is not supported for '{path}'{details}")]
    SetContentNotSupported {
        path: CompactString,
        details: CompactString,
    },

    #[error("Data source failed for '{node}': {source}")]
    Source {
        node: CompactString,
        #[source]
        source: SourceError,
    },

    // ────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("FS operation failed: {kind:?}")]
    FileSystem {
        kind: ErrorKind,
        #[source]
        source: Box<io::Error>,
    },

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(CompactString),
}

// ────────────────────────────────────────────────────────────────────────────
// Fast classification helpers
// ────────────────────────────────────────────────────────────────────────────
impl TreeError {
    /// Errors that abort tree initialization; everything else is recovered
    /// by the caller.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingRoot
                | Self::InvalidRootFormat { .. }
                | Self::ModuleNotFound { .. }
                | Self::CannotCreateInstance { .. }
                | Self::NotContainerNode { .. }
                | Self::BlankNodeName { .. }
                | Self::RootMustBeContainer { .. }
        )
    }

    /// Determine whether downstream logic may safely recover
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_)
                | Self::NotSupported { .. }
                | Self::SetContentNotSupported { .. }
                | Self::Source { .. }
        )
    }

    // ────────────────────────────────────────────────────────────
    // Attribute helpers – used for log grouping
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::MissingRoot
            | Self::InvalidRootFormat { .. }
            | Self::ModuleNotFound { .. }
            | Self::CannotCreateInstance { .. }
            | Self::NotContainerNode { .. }
            | Self::BlankNodeName { .. }
            | Self::RootMustBeContainer { .. } => "mount",

            Self::PathNotFound(_) => "path_resolution",

            Self::NotSupported { .. } | Self::SetContentNotSupported { .. } => "unsupported_command",

            Self::Source { .. } => "data_source",

            Self::ConfigParse(_) | Self::ConfigSerialize(_) => "configuration",

            Self::FileSystem { .. } => "file_system",

            Self::Other(_) => "unknown_error",
        }
    }

    #[inline]
    #[must_use]
    pub fn extract_trace_fields(&self) -> SmallVec<[(&'static str, CompactString); 4]> {
        match self {
            Self::InvalidRootFormat { root } => smallvec![("root", root.clone())],

            Self::ModuleNotFound { module } => smallvec![("module", module.clone())],

            Self::CannotCreateInstance {
                type_name, module, ..
            } => smallvec![
                ("type_name", type_name.clone()),
                ("module", module.clone()),
            ],

            Self::PathNotFound(path) => smallvec![("path", path.clone())],

            Self::NotSupported { command, path } => smallvec![
                ("command", command.clone()),
                ("path", path.clone()),
            ],

            Self::Source { node, source } => smallvec![
                ("node", node.clone()),
                ("source_error_id", source.id.clone()),
            ],

            _ => smallvec![],
        }
    }

    /// Emit one structured `tracing` event for this error and hand it back.
    #[must_use]
    pub fn trace(self) -> Self {
        let extra: SmallVec<[(&'static str, CompactString); 4]> = self.extract_trace_fields();

        event!(
            Level::ERROR,
            marker = self.error_marker(),
            op_type = self.operation_type(),
            error = %self,
            fatal = self.is_fatal(),
            recoverable = self.is_recoverable(),
            extra = ?extra,
        );

        self
    }

    // ────────────────────────────────────────────────────────────
    // Lightweight smart-constructors
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn path_not_found(path: &str) -> Self {
        Self::PathNotFound(CompactString::new(path))
    }

    #[inline]
    #[must_use]
    pub fn not_supported(command: &str, path: &str) -> Self {
        Self::NotSupported {
            command: CompactString::new(command),
            path: CompactString::new(path),
        }
    }

    #[inline]
    #[must_use]
    pub fn invalid_root(root: &str) -> Self {
        Self::InvalidRootFormat {
            root: CompactString::new(root),
        }
    }

    #[inline]
    #[must_use]
    pub fn blank_name(parent: &str) -> Self {
        Self::BlankNodeName {
            parent: CompactString::new(parent),
        }
    }

    #[inline]
    #[must_use]
    pub const fn error_marker(&self) -> &'static str {
        match self {
            Self::MissingRoot => "ERROR_MISSING_ROOT",
            Self::InvalidRootFormat { .. } => "ERROR_INVALID_ROOT_FORMAT",
            Self::ModuleNotFound { .. } => "ERROR_CANNOT_GET_MODULE",
            Self::CannotCreateInstance { .. } => "ERROR_CANNOT_CREATE_INSTANCE",
            Self::NotContainerNode { .. } => "ERROR_NOT_CONTAINER_NODE",
            Self::BlankNodeName { .. } => "ERROR_NODE_NAME_EMPTY",
            Self::RootMustBeContainer { .. } => "ERROR_ROOT_MUST_BE_CONTAINER",
            Self::PathNotFound(_) => "ERROR_PATH_NOT_FOUND",
            Self::NotSupported { .. } => "ERROR_NOT_SUPPORTED",
            Self::SetContentNotSupported { .. } => "ERROR_SET_CONTENT_NOT_SUPPORTED",
            Self::Source { .. } => "ERROR_DATA_SOURCE",
            Self::ConfigParse(_) | Self::ConfigSerialize(_) => "ERROR_CONFIG",
            Self::FileSystem { .. } => "ERROR_FILE_SYSTEM",
            Self::Other(_) => "ERROR_UNKNOWN",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loss-free mapping from std::io::Error
// ────────────────────────────────────────────────────────────────────────────
impl From<io::Error> for TreeError {
    fn from(err: io::Error) -> Self {
        Self::FileSystem {
            kind: err.kind(),
            source: Box::new(err),
        }
    }
}

impl From<anyhow::Error> for TreeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(CompactString::new(e.to_string()))
    }
}

/// An error reported by a data source while producing children or content.
///
/// Sources report these instead of failing the whole fetch so that partial
/// results stay usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    /// Fully qualified error identifier, e.g. `LoginFailed,MyModule`.
    pub id: CompactString,
    pub message: CompactString,
}

impl SourceError {
    #[must_use]
    pub fn new(id: &str, message: &str) -> Self {
        Self {
            id: CompactString::new(id),
            message: CompactString::new(message),
        }
    }

    #[must_use]
    pub fn not_supported(operation: &str) -> Self {
        Self {
            id: CompactString::const_new("NotSupported"),
            message: CompactString::new(format!("{operation} is not implemented by this node")),
        }
    }
}
