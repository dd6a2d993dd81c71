use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::heap::MockHeap;
use crate::{
    AsyncRemoteAccess, ChildSink, FieldValue, ObjectRef, RemoteError, RemoteVariable, Result,
};

/// [`AsyncRemoteAccess`] double that answers every request from a spawned
/// `tokio` task, so callbacks arrive interleaved and on worker threads.
#[derive(Clone)]
pub struct MockAsyncRemote {
    heap: Arc<MockHeap>,
    batch_size: Option<usize>,
    delay: Option<Duration>,
    requests: Arc<AtomicUsize>,
}

impl MockAsyncRemote {
    pub fn new(heap: MockHeap) -> Self {
        Self::from_shared(Arc::new(heap))
    }

    pub fn from_shared(heap: Arc<MockHeap>) -> Self {
        Self {
            heap,
            batch_size: None,
            delay: None,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Split children into batches of at most `size` (each request still ends
    /// with exactly one `last == true` batch).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size.max(1));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `fetch_children` calls so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl AsyncRemoteAccess for MockAsyncRemote {
    fn fields(&self, object: &ObjectRef) -> Result<Vec<FieldValue>> {
        self.heap.fields(object.id)
    }

    fn string_value(&self, object: &ObjectRef) -> Result<String> {
        self.heap.string_value(object.id)
    }

    fn fetch_children(&self, object: &ObjectRef, mut sink: Box<dyn ChildSink>) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let heap = self.heap.clone();
        let id = object.id;
        let batch_size = self.batch_size;
        let delay = self.delay;

        let job = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            match heap.children(id) {
                Ok(children) => deliver(sink.as_mut(), children, batch_size),
                Err(err) => sink.fail(err),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(job);
            }
            Err(_) => {
                // Dropping the job drops the sink unfinished; the caller sees an
                // abandoned request.
                tracing::warn!(
                    target: "odiag.remote",
                    object = id,
                    "no tokio runtime; dropping asynchronous child request"
                );
                drop(job);
            }
        }
    }
}

fn deliver(sink: &mut dyn ChildSink, children: Vec<RemoteVariable>, batch_size: Option<usize>) {
    let Some(size) = batch_size else {
        sink.add_children(children, true);
        return;
    };
    if children.is_empty() {
        sink.add_children(Vec::new(), true);
        return;
    }
    let total = children.len();
    let mut iter = children.into_iter().peekable();
    let mut sent = 0;
    while iter.peek().is_some() {
        let batch: Vec<_> = iter.by_ref().take(size).collect();
        sent += batch.len();
        sink.add_children(batch, sent == total);
    }
}

/// A request captured by [`ManualAsyncRemote`], answered explicitly by the test.
pub struct PendingRequest {
    pub object: ObjectRef,
    heap: Arc<MockHeap>,
    sink: Box<dyn ChildSink>,
}

impl PendingRequest {
    /// Deliver every child in a single final batch.
    pub fn deliver(self) {
        self.deliver_in_batches(usize::MAX);
    }

    pub fn deliver_in_batches(mut self, size: usize) {
        match self.heap.children(self.object.id) {
            Ok(children) => deliver(self.sink.as_mut(), children, Some(size.max(1))),
            Err(err) => self.sink.fail(err),
        }
    }

    pub fn fail(mut self, error: RemoteError) {
        self.sink.fail(error);
    }
}

/// [`AsyncRemoteAccess`] double that queues requests instead of answering them.
///
/// Tests drain the queue with [`ManualAsyncRemote::take_pending`] and deliver
/// results in whatever order they need.
#[derive(Clone)]
pub struct ManualAsyncRemote {
    heap: Arc<MockHeap>,
    pending: Arc<Mutex<Vec<PendingRequest>>>,
    requests: Arc<AtomicUsize>,
}

impl ManualAsyncRemote {
    pub fn new(heap: MockHeap) -> Self {
        Self {
            heap: Arc::new(heap),
            pending: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn take_pending(&self) -> Vec<PendingRequest> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl AsyncRemoteAccess for ManualAsyncRemote {
    fn fields(&self, object: &ObjectRef) -> Result<Vec<FieldValue>> {
        self.heap.fields(object.id)
    }

    fn string_value(&self, object: &ObjectRef) -> Result<String> {
        self.heap.string_value(object.id)
    }

    fn fetch_children(&self, object: &ObjectRef, sink: Box<dyn ChildSink>) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push(PendingRequest {
            object: object.clone(),
            heap: self.heap.clone(),
            sink,
        });
    }
}
