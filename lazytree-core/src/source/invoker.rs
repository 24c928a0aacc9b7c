//! ``src/source/invoker.rs``
//! ============================================================================
//! # DataSourceInvoker: bounded, cancellable fetches
//!
//! Every fetch runs the node's data source as its own tokio task while the
//! invoker selects over:
//! - the caller's stop signal (early, successful return of partial results)
//! - items and errors streamed by the source (classified as they arrive)
//! - task completion
//! - a progress tick that first fires one poll interval after dispatch
//!
//! Invocations are serialized through one execution context. Each one gets a
//! fresh child cancellation token and is torn down by [`InvocationGuard`] on
//! every exit path.

use std::time::{Duration, Instant};

use compact_str::{CompactString, format_compact};
use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, MutexGuard},
    task::{AbortHandle, JoinError, JoinHandle},
    time::{self, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::{FetchConfig, NodeTypeTable},
    error::{CoreResult, SourceError, TreeError},
    model::{
        classify::{MergeMode, classify_and_add},
        node::NodeRef,
    },
    nav::context::OperationContext,
    source::{
        contract::{FetchEvent, ItemSink, SourceRequest},
        progress::ProgressTracker,
    },
    util::path::dir_of,
};

/// Percentage reported on the first update after progress started.
const FIRST_UPDATE_PERCENT: u32 = 2;

/// Result of one child fetch.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Accepted children in data-source order.
    pub items: Vec<NodeRef>,
    /// Errors reported by the source, in arrival order.
    pub errors: Vec<SourceError>,
    /// The caller stopped the fetch before the source finished.
    pub cancelled: bool,
}

impl FetchOutcome {
    /// A fetch that was not cancelled and either reported no errors or
    /// still produced items.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && (self.errors.is_empty() || !self.items.is_empty())
    }
}

/// Tears an invocation down however the fetch loop is left.
struct InvocationGuard {
    token: CancellationToken,
    task: AbortHandle,
    tracker: ProgressTracker,
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
        self.tracker.end();
    }
}

pub struct DataSourceInvoker {
    fetch: FetchConfig,
    table: NodeTypeTable,
    runner: Mutex<()>,
}

impl DataSourceInvoker {
    #[must_use]
    pub fn new(fetch: FetchConfig, table: NodeTypeTable) -> Self {
        Self {
            fetch,
            table,
            runner: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn table(&self) -> &NodeTypeTable {
        &self.table
    }

    #[must_use]
    pub const fn fetch_config(&self) -> &FetchConfig {
        &self.fetch
    }

    fn poll_interval(&self) -> Duration {
        self.fetch.poll_interval.max(Duration::from_millis(1))
    }

    /// Fetches the children of `container` and merges them into its cache.
    ///
    /// A cached container is cleared first and refilled in return order;
    /// `navigated` is set only when the outcome is a success. A listing with a
    /// filter neither reads nor writes the cache. `force` applies to this
    /// container only, never to the rest of the request.
    pub async fn fetch_children(
        &self,
        container: &NodeRef,
        force: bool,
        ctx: &OperationContext,
    ) -> FetchOutcome {
        let Some(source) = container.source().cloned() else {
            return FetchOutcome::default();
        };

        if !container.is_container() {
            return FetchOutcome::default();
        }

        let _serial: MutexGuard<'_, ()> = self.runner.lock().await;

        let invocation_id: String = format!("fetch_{}", nanoid::nanoid!(8));
        let started: Instant = Instant::now();
        let use_cache: bool = container.use_cache() && ctx.filter().is_none();
        let mode: MergeMode = if use_cache {
            MergeMode::Add
        } else {
            MergeMode::Detached
        };

        if use_cache {
            if let Some(children) = container.children() {
                children.clear();
            }
            container.set_navigated(false);
        }

        info!(
            marker = "FETCH_START",
            operation_type = "fetch_children",
            invocation_id = %invocation_id,
            node = container.name(),
            use_cache,
            force,
            "Fetching children"
        );

        let token: CancellationToken = ctx.stop_token().child_token();
        let request = SourceRequest {
            force,
            ..ctx.source_request()
        };
        let (sink, mut rx) = ItemSink::channel(token.clone(), request);
        let mut handle: JoinHandle<Result<(), SourceError>> = tokio::spawn(source.child_items(sink));

        let mut guard = InvocationGuard {
            token,
            task: handle.abort_handle(),
            tracker: ProgressTracker::new(
                self.fetch.progress_activity_id,
                &self.fetch.progress_activity,
                format_compact!("Fetching data for '{}'", container.name()),
                container.show_progress() && !ctx.is_stopping(),
                ctx.progress(),
            ),
        };

        let poll: Duration = self.poll_interval();
        let mut ticks: Interval = time::interval_at(time::Instant::now() + poll, poll);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut outcome = FetchOutcome::default();
        let mut percent: u32 = FIRST_UPDATE_PERCENT - 1;

        loop {
            tokio::select! {
                biased;

                () = ctx.stop_token().cancelled() => {
                    outcome.cancelled = true;
                    break;
                }

                Some(event) = rx.recv() => {
                    self.accept(container, event, mode, ctx, &mut outcome);
                }

                joined = &mut handle => {
                    if let Some(err) = Self::task_error(joined) {
                        outcome.errors.push(err);
                    }
                    break;
                }

                _ = ticks.tick() => {
                    if ctx.is_stopping() {
                        continue;
                    }

                    if guard.tracker.is_started() {
                        percent += 1;
                        guard.tracker.update(percent);
                    } else {
                        guard.tracker.start();
                    }
                }
            }
        }

        // Keep whatever the source produced before the loop ended.
        while let Ok(event) = rx.try_recv() {
            self.accept(container, event, mode, ctx, &mut outcome);
        }

        drop(guard);

        self.settle(container, &outcome, mode, force, ctx);

        info!(
            marker = "FETCH_DONE",
            operation_type = "fetch_children",
            invocation_id = %invocation_id,
            node = container.name(),
            items = outcome.items.len(),
            errors = outcome.errors.len(),
            cancelled = outcome.cancelled,
            duration_ms = started.elapsed().as_millis(),
            "Fetch finished"
        );

        outcome
    }

    fn accept(
        &self,
        container: &NodeRef,
        event: FetchEvent,
        mode: MergeMode,
        ctx: &OperationContext,
        outcome: &mut FetchOutcome,
    ) {
        match event {
            FetchEvent::Item(raw) => {
                if let Some(node) = classify_and_add(container, raw, mode, &self.table, ctx) {
                    outcome.items.push(node);
                }
            }
            FetchEvent::Error(err) => outcome.errors.push(err),
        }
    }

    /// Applies the outcome to the container's state and reports errors.
    fn settle(
        &self,
        container: &NodeRef,
        outcome: &FetchOutcome,
        mode: MergeMode,
        force: bool,
        ctx: &OperationContext,
    ) {
        if !outcome.errors.is_empty() && force {
            if mode == MergeMode::Detached {
                if let Some(children) = container.children() {
                    children.clear();
                }
            }

            if let Some(parent) = container.parent() {
                if let Some(siblings) = parent.children() {
                    siblings.remove(container.name());
                }
            }
        }

        for err in &outcome.errors {
            ctx.error(&err.id, err.message.clone(), container.name());
        }

        if ctx.filter().is_none() {
            container.set_navigated(outcome.is_success());
        }

        debug!(
            marker = "FETCH_SETTLED",
            operation_type = "fetch_children",
            node = container.name(),
            navigated = container.is_navigated(),
            "Container state updated"
        );
    }

    /// Reads the content lines of `node`. Source errors are reported as
    /// diagnostics.
    pub async fn fetch_content(
        &self,
        node: &NodeRef,
        ctx: &OperationContext,
    ) -> Option<Vec<String>> {
        let source = node.source().cloned()?;

        match self.run_serial(ctx, source.content(ctx.source_request())).await? {
            Ok(lines) => lines,
            Err(err) => {
                ctx.error(&err.id, err.message.clone(), node.name());
                None
            }
        }
    }

    /// Hands `content` to the source of `node` and merges the returned
    /// values in place: into the parent for a leaf, into the node itself for
    /// a container. The caller keeps the parent of a leaf alive; a parent
    /// that is gone fails the write before the source runs.
    pub async fn write_content(
        &self,
        node: &NodeRef,
        content: String,
        ctx: &OperationContext,
    ) -> CoreResult<Vec<NodeRef>> {
        let path: CompactString = CompactString::new(ctx.path());

        let Some(source) = node.source().cloned() else {
            return Err(TreeError::SetContentNotSupported {
                path,
                details: CompactString::default(),
            }
            .trace());
        };

        let target: NodeRef = if node.is_leaf() {
            node.parent()
                .ok_or_else(|| TreeError::path_not_found(dir_of(&path)).trace())?
        } else {
            NodeRef::clone(node)
        };

        let values = match self.run_serial(ctx, source.set_content(content, path.clone())).await {
            None => return Ok(Vec::new()),
            Some(Err(err)) => {
                return Err(TreeError::SetContentNotSupported {
                    path,
                    details: format_compact!(": {err}"),
                }
                .trace());
            }
            Some(Ok(values)) => values,
        };

        let mode: MergeMode = if node.use_cache() {
            MergeMode::Replace
        } else {
            MergeMode::Detached
        };

        Ok(values
            .into_iter()
            .filter_map(|raw| classify_and_add(&target, raw, mode, &self.table, ctx))
            .collect())
    }

    /// Runs one source future in the serial execution context. `None` when
    /// the caller stopped first.
    async fn run_serial<T: Send + 'static>(
        &self,
        ctx: &OperationContext,
        future: BoxFuture<'static, Result<T, SourceError>>,
    ) -> Option<Result<T, SourceError>> {
        let _serial: MutexGuard<'_, ()> = self.runner.lock().await;

        let mut handle: JoinHandle<Result<T, SourceError>> = tokio::spawn(future);
        let abort: AbortHandle = handle.abort_handle();

        let result = tokio::select! {
            biased;

            () = ctx.stop_token().cancelled() => None,

            joined = &mut handle => Some(match joined {
                Ok(result) => result,
                Err(err) => Err(Self::join_failure(&err)),
            }),
        };

        abort.abort();
        result
    }

    fn task_error(joined: Result<Result<(), SourceError>, JoinError>) -> Option<SourceError> {
        match joined {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(err) => Some(Self::join_failure(&err)),
        }
    }

    fn join_failure(err: &JoinError) -> SourceError {
        if err.is_panic() {
            SourceError::new("SourcePanicked", "The data source panicked")
        } else {
            SourceError::new("SourceAborted", &err.to_string())
        }
    }
}

impl std::fmt::Debug for DataSourceInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceInvoker")
            .field("fetch", &self.fetch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{
        model::node::{Node, NodeKind, NodeOptions, TypedNode},
        source::{
            contract::{NodeSource, testing::StaticSource},
            progress::{ChannelProgress, ProgressRecord, ProgressState},
        },
    };
    use tokio::sync::mpsc;

    /// Yields `items` with a pause before each, then reports `errors`.
    struct PacedSource {
        items: Vec<&'static str>,
        pause: Duration,
        errors: Vec<SourceError>,
        options: NodeOptions,
        /// Cancels this token after yielding that many items.
        stop_after: Option<(usize, CancellationToken)>,
        calls: Arc<AtomicUsize>,
    }

    impl PacedSource {
        fn new(items: Vec<&'static str>) -> Self {
            Self {
                items,
                pause: Duration::ZERO,
                errors: Vec::new(),
                options: NodeOptions::cached(),
                stop_after: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl NodeSource for PacedSource {
        fn type_name(&self) -> &str {
            "Paced"
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Container
        }

        fn options(&self) -> Option<NodeOptions> {
            Some(self.options)
        }

        fn child_items(self: Arc<Self>, sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);

                for (yielded, item) in self.items.iter().enumerate() {
                    if let Some((limit, token)) = &self.stop_after {
                        if yielded == *limit {
                            token.cancel();
                        }
                    }

                    if !self.pause.is_zero() {
                        time::sleep(self.pause).await;
                    }

                    if !sink.push(*item) {
                        return Ok(());
                    }
                }

                for err in &self.errors {
                    sink.error(err.clone());
                }

                Ok(())
            })
        }
    }

    fn invoker(poll: Duration) -> DataSourceInvoker {
        let fetch = FetchConfig {
            poll_interval: poll,
            ..FetchConfig::default()
        };
        DataSourceInvoker::new(fetch, NodeTypeTable::default())
    }

    fn mount(source: Arc<dyn NodeSource>) -> (NodeRef, NodeRef) {
        let table = NodeTypeTable::default();
        let root = Node::root(
            TypedNode::new(
                "root",
                StaticSource::container("Root", vec![])
                    .with_options(NodeOptions::cached())
                    .arc(),
            ),
            &table,
        );
        let child = Node::typed_child(TypedNode::new("paced", source), &root, &table);
        root.children().unwrap().insert_if_absent(child.clone());
        (root, child)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressRecord>) -> Vec<ProgressRecord> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn test_fast_fetch_fills_cache_without_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_root, node) = mount(Arc::new(PacedSource::new(vec!["a", "b", "c"])));
        let ctx = OperationContext::new("Get-ChildItem", "/paced")
            .with_progress(Arc::new(ChannelProgress::new(tx)));

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(node.children().unwrap().names(), vec!["a", "b", "c"]);
        assert!(node.is_navigated());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_slow_fetch_reports_progress_then_completes_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = PacedSource::new(vec!["a", "b"]);
        source.pause = Duration::from_millis(60);
        let (_root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-ChildItem", "/paced")
            .with_progress(Arc::new(ChannelProgress::new(tx)));

        let outcome = invoker(Duration::from_millis(20)).fetch_children(&node, false, &ctx).await;
        assert_eq!(outcome.items.len(), 2);

        let records = drain(&mut rx);
        assert!(records.len() >= 2);
        assert_eq!(records[0].percent, 0);
        assert!(records.iter().all(|r| r.percent <= 95 || r.state == ProgressState::Completed));

        let completed: Vec<&ProgressRecord> = records
            .iter()
            .filter(|r| r.state == ProgressState::Completed)
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].percent, 100);
        assert_eq!(records.last().unwrap().state, ProgressState::Completed);
    }

    fn assert_completed_once_at_end(records: &[ProgressRecord]) {
        let completed: usize = records
            .iter()
            .filter(|r| r.state == ProgressState::Completed)
            .count();
        assert_eq!(completed, 1, "{records:?}");

        let last: &ProgressRecord = records.last().unwrap();
        assert_eq!(last.state, ProgressState::Completed);
        assert_eq!(last.percent, 100);
    }

    #[tokio::test]
    async fn test_cancelled_slow_fetch_completes_progress_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = OperationContext::new("Get-ChildItem", "/paced")
            .with_progress(Arc::new(ChannelProgress::new(tx)));
        let mut source = PacedSource::new(vec!["a", "b", "c", "d"]);
        source.pause = Duration::from_millis(60);
        source.stop_after = Some((2, ctx.stop_token().clone()));
        let (_root, node) = mount(Arc::new(source));

        let outcome = invoker(Duration::from_millis(20)).fetch_children(&node, false, &ctx).await;
        assert!(outcome.cancelled);

        let records = drain(&mut rx);
        assert_eq!(records[0].percent, 0);
        assert_completed_once_at_end(&records);
    }

    #[tokio::test]
    async fn test_failing_slow_fetch_completes_progress_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = OperationContext::new("Get-ChildItem", "/paced")
            .with_progress(Arc::new(ChannelProgress::new(tx)));
        let mut source = PacedSource::new(vec!["a", "b"]);
        source.pause = Duration::from_millis(60);
        source.errors = vec![SourceError::new("Throttled", "slow down")];
        let (_root, node) = mount(Arc::new(source));

        let outcome = invoker(Duration::from_millis(20)).fetch_children(&node, false, &ctx).await;
        assert_eq!(outcome.errors.len(), 1);

        let records = drain(&mut rx);
        assert_eq!(records[0].percent, 0);
        assert_completed_once_at_end(&records);
    }

    #[tokio::test]
    async fn test_progress_suppressed_when_disabled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = PacedSource::new(vec!["a"]);
        source.pause = Duration::from_millis(60);
        source.options = NodeOptions::cached().with_progress(false);
        let (_root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-ChildItem", "/paced")
            .with_progress(Arc::new(ChannelProgress::new(tx)));

        invoker(Duration::from_millis(10)).fetch_children(&node, false, &ctx).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_items() {
        let ctx = OperationContext::new("Get-ChildItem", "/paced");
        let mut source = PacedSource::new(vec!["a", "b", "c", "d", "e"]);
        source.stop_after = Some((2, ctx.stop_token().clone()));
        let calls = Arc::clone(&source.calls);
        let (_root, node) = mount(Arc::new(source));

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(node.children().unwrap().len(), 2);
        assert!(!node.is_navigated());
        assert!(outcome.errors.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_with_errors_is_retry_eligible() {
        let mut source = PacedSource::new(vec![]);
        source.errors = vec![SourceError::new("LoginFailed", "denied")];
        let (root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-ChildItem", "/paced");

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert!(!outcome.is_success());
        assert!(!node.is_navigated());
        assert!(root.children().unwrap().contains("paced"));
        assert_eq!(ctx.diagnostics()[0].id, "LoginFailed");
    }

    #[tokio::test]
    async fn test_forced_failure_evicts_from_parent() {
        let mut source = PacedSource::new(vec![]);
        source.errors = vec![SourceError::new("LoginFailed", "denied")];
        let (root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-ChildItem", "/paced").force(true);

        invoker(Duration::from_secs(5)).fetch_children(&node, true, &ctx).await;

        assert!(!root.children().unwrap().contains("paced"));
    }

    #[tokio::test]
    async fn test_unforced_hop_of_forced_request_keeps_node() {
        let mut source = PacedSource::new(vec![]);
        source.errors = vec![SourceError::new("Flaky", "try again")];
        let (root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-Item", "/paced/x").force(true);

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert!(!outcome.is_success());
        assert!(root.children().unwrap().contains("paced"));
    }

    #[tokio::test]
    async fn test_items_with_errors_still_navigated() {
        let mut source = PacedSource::new(vec!["a"]);
        source.errors = vec![SourceError::new("Partial", "one page failed")];
        let (_root, node) = mount(Arc::new(source));
        let ctx = OperationContext::new("Get-ChildItem", "/paced");

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert!(outcome.is_success());
        assert!(node.is_navigated());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_bypasses_cache() {
        let (_root, node) = mount(Arc::new(PacedSource::new(vec!["a", "b"])));
        let ctx = OperationContext::new("Get-ChildItem", "/paced").with_filter("a*");

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert_eq!(outcome.items.len(), 2);
        assert!(node.children().unwrap().is_empty());
        assert!(!node.is_navigated());
    }

    struct PanickingSource;

    impl PanickingSource {
        fn explode() -> Result<(), SourceError> {
            panic!("source bug")
        }
    }

    impl NodeSource for PanickingSource {
        fn type_name(&self) -> &str {
            "Panics"
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Container
        }

        fn child_items(self: Arc<Self>, _sink: ItemSink) -> BoxFuture<'static, Result<(), SourceError>> {
            Box::pin(async move { Self::explode() })
        }
    }

    #[tokio::test]
    async fn test_panicking_source_becomes_error() {
        let (_root, node) = mount(Arc::new(PanickingSource));
        let ctx = OperationContext::new("Get-ChildItem", "/paced");

        let outcome = invoker(Duration::from_secs(5)).fetch_children(&node, false, &ctx).await;

        assert_eq!(outcome.errors[0].id, "SourcePanicked");
        assert!(!node.is_navigated());
    }

    #[tokio::test]
    async fn test_content_and_unsupported_write() {
        let table = NodeTypeTable::default();
        let root = Node::root(
            TypedNode::new("root", StaticSource::container("Root", vec![]).arc()),
            &table,
        );
        let leaf = Node::typed_child(
            TypedNode::new("readme", StaticSource::leaf("File").with_content(&["hello"]).arc()),
            &root,
            &table,
        );
        let ctx = OperationContext::new("Get-Content", "/readme");
        let invoker = invoker(Duration::from_secs(5));

        assert_eq!(invoker.fetch_content(&leaf, &ctx).await, Some(vec!["hello".to_owned()]));

        let err = invoker
            .write_content(&leaf, "new".to_owned(), &OperationContext::new("Set-Content", "/readme"))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::SetContentNotSupported { .. }));
        assert!(err.to_string().contains("/readme"));
    }

    #[tokio::test]
    async fn test_write_to_orphaned_leaf_is_not_found() {
        let table = NodeTypeTable::default();
        let root = Node::root(
            TypedNode::new("root", StaticSource::container("Root", vec![]).arc()),
            &table,
        );
        let leaf = Node::typed_child(
            TypedNode::new("readme", StaticSource::leaf("File").arc()),
            &root,
            &table,
        );
        drop(root);

        let err = invoker(Duration::from_secs(5))
            .write_content(&leaf, "new".to_owned(), &OperationContext::new("Set-Content", "/readme"))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::PathNotFound(_)));
    }
}
