//! ``src/nav/context.rs``
//! ============================================================================
//! # Request-scoped operation context
//!
//! One `OperationContext` accompanies one front-end call: which command is
//! running, on which path, with which flags, plus the stop signal, the
//! progress sink and the diagnostics recovered along the way.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use compact_str::CompactString;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::{
    nav::commands::Command,
    source::{
        contract::SourceRequest,
        progress::{ProgressSink, TracingProgress},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

/// A per-item problem that was recovered rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub id: CompactString,
    pub message: CompactString,
    /// Node or path the problem is attached to.
    pub target: CompactString,
}

pub struct OperationContext {
    command: Option<Command>,
    command_name: CompactString,
    path: CompactString,
    force: bool,
    recurse: bool,
    filter: Option<CompactString>,
    stop: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl OperationContext {
    /// Context for `command` (matched case-insensitively) on the
    /// user-facing `path`.
    pub fn new(command: &str, path: &str) -> Self {
        Self {
            command: Command::parse(command),
            command_name: CompactString::new(command),
            path: CompactString::new(path),
            force: false,
            recurse: false,
            filter: None,
            stop: CancellationToken::new(),
            progress: Arc::new(TracingProgress),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(CompactString::new(filter));
        self
    }

    #[must_use]
    pub fn with_stop(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Recognised command, if any.
    #[must_use]
    pub const fn command(&self) -> Option<Command> {
        self.command
    }

    #[must_use]
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn is_force(&self) -> bool {
        self.force
    }

    #[must_use]
    pub const fn is_recurse(&self) -> bool {
        self.recurse
    }

    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Signals every fetch running on behalf of this call to stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    #[must_use]
    pub const fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    #[must_use]
    pub fn progress(&self) -> Arc<dyn ProgressSink> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn source_request(&self) -> SourceRequest {
        SourceRequest {
            force: self.force,
            recurse: self.recurse,
            filter: self.filter.clone(),
        }
    }

    pub fn warn(&self, id: &str, message: impl Into<CompactString>, target: &str) {
        self.push(DiagnosticLevel::Warning, id, message.into(), target);
    }

    pub fn error(&self, id: &str, message: impl Into<CompactString>, target: &str) {
        self.push(DiagnosticLevel::Error, id, message.into(), target);
    }

    fn push(&self, level: DiagnosticLevel, id: &str, message: CompactString, target: &str) {
        match level {
            DiagnosticLevel::Warning => warn!(
                marker = "DIAGNOSTIC_WARNING",
                operation_type = "diagnostic",
                id,
                node = target,
                command = %self.command_name,
                "{message}"
            ),
            DiagnosticLevel::Error => error!(
                marker = "DIAGNOSTIC_ERROR",
                operation_type = "diagnostic",
                id,
                node = target,
                command = %self.command_name,
                "{message}"
            ),
        }

        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic {
                level,
                id: CompactString::new(id),
                message,
                target: CompactString::new(target),
            });
    }

    /// Diagnostics recorded so far.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("command", &self.command_name)
            .field("path", &self.path)
            .field("force", &self.force)
            .field("recurse", &self.recurse)
            .field("filter", &self.filter)
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}
