//! ``src/source/contract.rs``
//! ============================================================================
//! # Data-source contract
//!
//! A node type plugs into the tree by implementing [`NodeSource`]. Children
//! are streamed through an [`ItemSink`] so the invoker can observe each item
//! as it is produced, stop enumeration early, and keep partial results.

use std::{fmt, sync::Arc};

use compact_str::CompactString;
use futures::future::{self, BoxFuture};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::{
    error::SourceError,
    model::node::{NodeKind, NodeOptions, RawValue},
};

/// Per-invocation parameters a source may consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRequest {
    pub force: bool,
    pub recurse: bool,
    pub filter: Option<CompactString>,
}

/// Behaviour object behind every typed node.
pub trait NodeSource: Send + Sync + 'static {
    /// Registered type name, used for configuration lookup.
    fn type_name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    /// Static options for this node type. `None` defers to configuration.
    fn options(&self) -> Option<NodeOptions> {
        None
    }

    /// Streams this container's children into `sink`.
    ///
    /// Errors pushed through the sink are aggregated with a returned `Err`;
    /// neither aborts the items already produced.
    fn child_items(self: Arc<Self>, sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
        drop(sink);
        Box::pin(future::ready(Ok(())))
    }

    /// Content lines of this node, if it has any.
    fn content(
        self: Arc<Self>,
        request: SourceRequest,
    ) -> BoxFuture<'static, Result<Option<Vec<String>>, SourceError>> {
        drop(request);
        Box::pin(future::ready(Ok(None)))
    }

    /// Accepts `content` written to `path` and returns the values that
    /// replace the target node.
    fn set_content(
        self: Arc<Self>,
        content: String,
        path: CompactString,
    ) -> BoxFuture<'static, Result<Vec<RawValue>, SourceError>> {
        drop((content, path));
        Box::pin(future::ready(Err(SourceError::not_supported("set-content"))))
    }
}

/// One message from a running fetch.
#[derive(Debug)]
pub enum FetchEvent {
    Item(RawValue),
    Error(SourceError),
}

/// Producer side of a fetch.
#[derive(Clone)]
pub struct ItemSink {
    tx: UnboundedSender<FetchEvent>,
    stop: CancellationToken,
    request: Arc<SourceRequest>,
}

impl ItemSink {
    pub(crate) fn channel(
        stop: CancellationToken,
        request: SourceRequest,
    ) -> (Self, UnboundedReceiver<FetchEvent>) {
        let (tx, rx): (UnboundedSender<FetchEvent>, UnboundedReceiver<FetchEvent>) =
            mpsc::unbounded_channel();

        (
            Self {
                tx,
                stop,
                request: Arc::new(request),
            },
            rx,
        )
    }

    /// Hands one child to the invoker. Returns `false` once the caller is
    /// stopping; the source should stop enumerating then.
    pub fn push(&self, value: impl Into<RawValue>) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }

        self.tx.send(FetchEvent::Item(value.into())).is_ok()
    }

    /// Reports a non-fatal error for this fetch.
    pub fn error(&self, error: SourceError) {
        // The receiver only goes away after the invocation ended.
        let _ = self.tx.send(FetchEvent::Error(error));
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once the caller asks the fetch to stop.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    #[must_use]
    pub fn request(&self) -> &SourceRequest {
        &self.request
    }
}

impl fmt::Debug for ItemSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemSink")
            .field("stopping", &self.is_stopping())
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_refused_once_stopping() {
        let stop = CancellationToken::new();
        let (sink, mut rx) = ItemSink::channel(stop.clone(), SourceRequest::default());

        assert!(sink.push("first"));
        stop.cancel();
        assert!(!sink.push("second"));
        assert!(sink.is_stopping());

        sink.error(SourceError::new("Late", "still recorded"));
        drop(sink);

        let mut events: Vec<FetchEvent> = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FetchEvent::Item(RawValue::Opaque(_))));
        assert!(matches!(events[1], FetchEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_default_capabilities() {
        let source = testing::StaticSource::leaf("Leaf").arc();

        assert!(source.options().is_none());
        assert_eq!(Arc::clone(&source).content(SourceRequest::default()).await, Ok(None));

        let err = source
            .set_content("x".to_owned(), CompactString::new("/leaf"))
            .await
            .unwrap_err();
        assert_eq!(err.id, "NotSupported");
    }
}
