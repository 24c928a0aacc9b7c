pub mod error;

pub mod config;

pub mod cache {
    pub mod child_cache;
    pub use child_cache::{CacheStatsSnapshot, ChildCache};
}

pub mod model {
    pub mod node;
    pub use node::{Node, NodeKind, NodeOptions, NodeRef, RawValue, TypedNode};

    pub mod classify;
    pub use classify::{MergeMode, classify_and_add};
}

pub mod source {
    pub mod contract;
    pub use contract::{FetchEvent, ItemSink, NodeSource, SourceRequest};

    pub mod invoker;
    pub use invoker::{DataSourceInvoker, FetchOutcome};

    pub mod progress;
    pub use progress::{ChannelProgress, ProgressRecord, ProgressSink, ProgressState, TracingProgress};
}

pub mod mount {
    pub mod registry;
    pub use registry::{ModuleRegistry, NodeModule, RootFactory, RootSpec};

    pub mod tree;
    pub use tree::NavTree;
}

pub mod nav {
    pub mod commands;
    pub use commands::Command;

    pub mod context;
    pub use context::{Diagnostic, DiagnosticLevel, OperationContext};

    pub mod memo;
    pub use memo::NavigationMemo;

    pub mod resolver;
    pub use resolver::PathResolver;

    pub mod session;
    pub use session::{ItemInfo, Session};
}

pub mod samples {
    pub mod family_tree;
}

pub mod util {
    pub mod path;
}

pub mod logging;
pub use logging::Logger;

pub use config::Config;
pub use error::{CoreResult, SourceError, TreeError};
pub use mount::NavTree;
pub use nav::{OperationContext, Session};
