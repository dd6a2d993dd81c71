use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use odiag_remote::{
    AsyncRemoteAccess, ChildSink, ObjectId, ObjectRef, RemoteError, RemoteValue, RemoteVariable,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::capture::{CapturedRoots, PendingRoot};
use crate::classify::classify_scalar;
use crate::diagram::Diagram;
use crate::error::{ExploreError, Result};
use crate::explore::ExploreOptions;
use crate::pending::{PendingOps, PendingStats, PendingToken};

/// Snapshot state shared by every callback of one exploration.
struct SnapshotState {
    diagram: Mutex<Diagram>,
    failure: Mutex<Option<ExploreError>>,
    failed: AtomicBool,
    cancel: CancellationToken,
    pending: PendingOps,
}

impl SnapshotState {
    /// Callbacks only mutate a live snapshot.
    fn is_live(&self) -> bool {
        !self.failed.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    fn record_failure(&self, error: ExploreError) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut failure = self.failure.lock();
        if failure.is_none() {
            tracing::warn!(target: "odiag.explore", error = %error, "asynchronous exploration failed");
            *failure = Some(error);
            self.failed.store(true, Ordering::SeqCst);
        }
    }
}

struct AsyncExploration<A: AsyncRemoteAccess> {
    remote: Arc<A>,
    state: Arc<SnapshotState>,
}

impl<A: AsyncRemoteAccess> AsyncExploration<A> {
    /// Boxed and string roots become primitive root values, not nodes.
    fn explore_root(self: &Arc<Self>, root: PendingRoot, budget: u32, token: &PendingToken) {
        let value = RemoteValue::Object(root.object);
        let kind = match classify_scalar(&*self.remote, &value) {
            Ok(kind) => kind,
            Err(err) => {
                self.state.record_failure(err.into());
                return;
            }
        };
        if let Some(text) = kind.scalar_text() {
            self.state
                .diagram
                .lock()
                .add_primitive_root_value(root.name, root.declared_type, text);
            return;
        }
        if let Some(object) = kind.object() {
            self.explore_object(object, &root.name, None, budget, token);
        }
    }

    /// Adds the node and, while budget remains, requests its children.
    fn explore_object(
        self: &Arc<Self>,
        object: &ObjectRef,
        name: &str,
        link: Option<(ObjectId, &str)>,
        budget: u32,
        token: &PendingToken,
    ) {
        if !self.state.is_live() {
            return;
        }
        {
            let mut diagram = self.state.diagram.lock();
            diagram.add_object(object.id, object.runtime_type.as_str(), name);
            if let Some((from, role)) = link {
                diagram.add_link(from, object.id, role);
            }
        }
        if budget == 0 {
            return;
        }

        // Counted before the request is issued, while `token` keeps the
        // parent's count alive.
        let request = token.child();
        let sink = BatchSink {
            exploration: self.clone(),
            parent: object.id,
            budget: budget - 1,
            token: Some(request),
        };
        tracing::trace!(target: "odiag.explore", object = %object, budget, "fetching children");
        self.remote.fetch_children(object, Box::new(sink));
    }

    fn handle_child(self: &Arc<Self>, parent: ObjectId, budget: u32, child: RemoteVariable, token: &PendingToken) {
        let kind = match classify_scalar(&*self.remote, &child.value) {
            Ok(kind) => kind,
            Err(err) => {
                self.state.record_failure(err.into());
                return;
            }
        };
        if let Some(text) = kind.scalar_text() {
            self.state
                .diagram
                .lock()
                .add_attribute(parent, child.name, child.declared_type, text);
            return;
        }
        if let Some(object) = kind.object() {
            self.explore_object(object, &child.name, Some((parent, &child.name)), budget, token);
        }
    }
}

/// Receives the batches of one `fetch_children` request.
struct BatchSink<A: AsyncRemoteAccess> {
    exploration: Arc<AsyncExploration<A>>,
    parent: ObjectId,
    /// Budget given to the children delivered here.
    budget: u32,
    /// Held until the final batch has been processed.
    token: Option<PendingToken>,
}

impl<A: AsyncRemoteAccess> ChildSink for BatchSink<A> {
    fn add_children(&mut self, children: Vec<RemoteVariable>, last: bool) {
        let Some(token) = self.token.as_ref() else {
            tracing::warn!(target: "odiag.explore", parent = self.parent, "batch after the final one ignored");
            return;
        };
        if self.exploration.state.is_live() {
            for child in children {
                self.exploration
                    .handle_child(self.parent, self.budget, child, token);
            }
        }
        if last {
            if let Some(token) = self.token.take() {
                token.complete();
            }
        }
    }

    fn fail(&mut self, error: RemoteError) {
        if let Some(token) = self.token.take() {
            self.exploration.state.record_failure(error.into());
            token.complete();
        }
    }
}

impl<A: AsyncRemoteAccess> Drop for BatchSink<A> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.exploration
                .state
                .record_failure(ExploreError::Abandoned(self.parent));
            token.complete();
        }
    }
}

/// Expands captured roots through [`AsyncRemoteAccess::fetch_children`].
///
/// No visited set is kept: cyclic or shared structures repeat up to the depth
/// budget, and the diagram deduplicates nodes by id.
pub struct AsyncExplorer<A: AsyncRemoteAccess> {
    remote: Arc<A>,
    options: ExploreOptions,
}

impl<A: AsyncRemoteAccess> AsyncExplorer<A> {
    pub fn new(remote: Arc<A>, options: ExploreOptions) -> Self {
        Self { remote, options }
    }

    /// Issues the root requests and returns immediately.
    pub fn start(&self, captured: CapturedRoots, cancel: CancellationToken) -> AsyncSnapshot {
        let (done_tx, done_rx) = oneshot::channel();
        let pending = PendingOps::new(move || {
            let _ = done_tx.send(());
        });

        let CapturedRoots {
            primitives,
            pending: roots,
        } = captured;
        let mut diagram = Diagram::new();
        for root in primitives {
            diagram.insert_primitive_root_value(root);
        }

        let state = Arc::new(SnapshotState {
            diagram: Mutex::new(diagram),
            failure: Mutex::new(None),
            failed: AtomicBool::new(false),
            cancel,
            pending,
        });
        let exploration = Arc::new(AsyncExploration {
            remote: self.remote.clone(),
            state: state.clone(),
        });

        // Keeps the count above zero until every root request is issued.
        let seal = state.pending.begin();
        let root_count = roots.len();
        for root in roots.into_values() {
            exploration.explore_root(root, self.options.loading_depth, &seal);
        }
        seal.complete();

        tracing::debug!(
            target: "odiag.explore",
            roots = root_count,
            depth = self.options.loading_depth,
            "asynchronous exploration started"
        );
        AsyncSnapshot {
            done: done_rx,
            state,
        }
    }
}

/// An asynchronous exploration in flight.
pub struct AsyncSnapshot {
    done: oneshot::Receiver<()>,
    state: Arc<SnapshotState>,
}

impl AsyncSnapshot {
    pub fn stats(&self) -> PendingStats {
        self.state.pending.stats()
    }

    pub fn is_complete(&self) -> bool {
        self.state.pending.is_completed()
    }

    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    /// Resolves once every issued request has completed, or as soon as the
    /// snapshot is cancelled.
    pub async fn wait(self) -> Result<Diagram> {
        let Self { done, state } = self;
        tokio::select! {
            _ = done => {}
            _ = state.cancel.cancelled() => {}
        }

        if state.cancel.is_cancelled() {
            tracing::debug!(target: "odiag.explore", stats = ?state.pending.stats(), "asynchronous exploration cancelled");
            return Err(ExploreError::Cancelled);
        }
        if let Some(error) = state.failure.lock().take() {
            return Err(error);
        }

        let stats = state.pending.stats();
        debug_assert_eq!(stats.increments, stats.decrements);
        let diagram = std::mem::take(&mut *state.diagram.lock());
        tracing::debug!(
            target: "odiag.explore",
            objects = diagram.objects().len(),
            links = diagram.links().len(),
            requests = stats.increments.saturating_sub(1),
            "asynchronous exploration finished"
        );
        Ok(diagram)
    }
}
