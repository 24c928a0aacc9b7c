//! ``src/source/progress.rs``
//! ============================================================================
//! # Progress reporting for in-flight fetches
//!
//! A [`ProgressTracker`] is created per fetch and driven by the invoker's
//! poll loop. Records go to a [`ProgressSink`] supplied by the caller.

use std::{fmt, sync::Arc};

use compact_str::CompactString;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Highest percentage reported while a fetch is still running.
pub const MAX_RUNNING_PERCENT: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Processing,
    Completed,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub activity_id: u32,
    pub activity: CompactString,
    pub description: CompactString,
    pub percent: u8,
    pub state: ProgressState,
}

impl fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} {}%",
            self.activity_id, self.activity, self.description, self.percent
        )
    }
}

/// Receiver of progress records.
pub trait ProgressSink: Send + Sync {
    fn report(&self, record: &ProgressRecord);
}

/// Writes progress as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, record: &ProgressRecord) {
        info!(
            marker = "FETCH_PROGRESS",
            operation_type = "progress",
            activity_id = record.activity_id,
            percent = record.percent,
            completed = record.state == ProgressState::Completed,
            "{}",
            record.description
        );
    }
}

/// Forwards progress records over a channel, e.g. to a front-end task.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressRecord>,
}

impl ChannelProgress {
    #[must_use]
    pub const fn new(tx: UnboundedSender<ProgressRecord>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, record: &ProgressRecord) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.tx.send(record.clone());
    }
}

/// Progress state of a single fetch.
///
/// Nothing is reported until [`start`](Self::start); [`end`](Self::end)
/// reports the completed record at most once, and only after a start.
pub struct ProgressTracker {
    enabled: bool,
    activity_id: u32,
    activity: CompactString,
    description: CompactString,
    record: Option<ProgressRecord>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    pub fn new(
        activity_id: u32,
        activity: &str,
        description: CompactString,
        enabled: bool,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            enabled,
            activity_id,
            activity: CompactString::new(activity),
            description,
            record: None,
            sink,
        }
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.record.is_some()
    }

    pub fn start(&mut self) {
        if !self.enabled || self.record.is_some() {
            return;
        }

        let record = ProgressRecord {
            activity_id: self.activity_id,
            activity: self.activity.clone(),
            description: self.description.clone(),
            percent: 0,
            state: ProgressState::Processing,
        };

        self.sink.report(&record);
        self.record = Some(record);
    }

    /// Reports `percent`, clamped to [`MAX_RUNNING_PERCENT`].
    pub fn update(&mut self, percent: u32) {
        if !self.enabled {
            return;
        }

        if let Some(record) = self.record.as_mut() {
            record.percent = u8::try_from(percent.min(u32::from(MAX_RUNNING_PERCENT)))
                .unwrap_or(MAX_RUNNING_PERCENT);
            self.sink.report(record);
        }
    }

    pub fn end(&mut self) {
        if !self.enabled {
            return;
        }

        if let Some(record) = self.record.as_mut() {
            record.percent = 100;
            record.state = ProgressState::Completed;
            self.sink.report(record);
            self.enabled = false;
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("enabled", &self.enabled)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
