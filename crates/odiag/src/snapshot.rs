//! Suspend/resume handling: one snapshot per suspend event, published to a
//! [`DiagramSink`].

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use odiag_config::{ExplorerMode, OdiagConfig};
use odiag_remote::{AsyncRemoteAccess, RemoteAccess, ThreadId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::capture::{capture_roots, top_frame};
use crate::diagram::Diagram;
use crate::error::{ExploreError, SnapshotError};
use crate::explore::{AsyncExplorer, ExploreOptions, SyncExplorer};

/// Receives every successfully completed diagram.
pub trait DiagramSink: Send {
    fn publish(&mut self, diagram: &Diagram) -> io::Result<()>;
}

/// Writes one JSON document per snapshot.
pub struct JsonSink<W: Write + Send> {
    writer: W,
    pretty: bool,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> DiagramSink for JsonSink<W> {
    fn publish(&mut self, diagram: &Diagram) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, diagram)?;
        } else {
            serde_json::to_writer(&mut self.writer, diagram)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Keeps every published diagram; clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    published: Arc<Mutex<Vec<Diagram>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Diagram> {
        self.published.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

impl DiagramSink for MemorySink {
    fn publish(&mut self, diagram: &Diagram) -> io::Result<()> {
        self.published.lock().push(diagram.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub enum SnapshotOutcome {
    /// Snapshots are switched off.
    Inactive,
    Published {
        generation: u64,
        diagram: Arc<Diagram>,
    },
    Failed {
        generation: u64,
        error: SnapshotError,
    },
}

impl SnapshotOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

#[derive(Default)]
struct ControllerState {
    generation: u64,
    in_flight: Option<CancellationToken>,
    last: Option<Arc<Diagram>>,
}

/// Turns suspend events into published diagrams.
///
/// Every suspend starts a new generation with its own cancellation token; a
/// newer suspend or a resume cancels the one in flight. Failed snapshots never
/// replace the last good diagram.
pub struct SnapshotController<S: DiagramSink> {
    config: OdiagConfig,
    active: AtomicBool,
    state: Mutex<ControllerState>,
    sink: Mutex<S>,
}

impl<S: DiagramSink> SnapshotController<S> {
    pub fn new(config: OdiagConfig, sink: S) -> Self {
        Self {
            active: AtomicBool::new(config.active),
            config,
            state: Mutex::new(ControllerState::default()),
            sink: Mutex::new(sink),
        }
    }

    pub fn config(&self) -> &OdiagConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Switches snapshots on or off at runtime. Affects the next suspend.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        tracing::info!(target: "odiag.snapshot", active, "snapshot activation changed");
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn last_diagram(&self) -> Option<Arc<Diagram>> {
        self.state.lock().last.clone()
    }

    /// Runs one snapshot for a freshly suspended `thread`.
    ///
    /// Roots are always captured through `remote`; the configured explorer
    /// then expands them through `remote` or `async_remote`.
    pub async fn on_suspend<R, A>(
        &self,
        remote: &mut R,
        async_remote: &Arc<A>,
        thread: ThreadId,
    ) -> SnapshotOutcome
    where
        R: RemoteAccess + ?Sized,
        A: AsyncRemoteAccess,
    {
        if !self.is_active() {
            tracing::debug!(target: "odiag.snapshot", thread, "snapshots inactive; suspend ignored");
            return SnapshotOutcome::Inactive;
        }

        let (generation, cancel) = self.begin_generation();
        let span = tracing::debug_span!(target: "odiag.snapshot", "snapshot", generation, thread);
        let result = self
            .take_snapshot(remote, async_remote, thread, &cancel)
            .instrument(span)
            .await;
        self.finish(generation, result)
    }

    /// Cancels the snapshot in flight, if any.
    pub fn on_resume(&self) {
        let mut state = self.state.lock();
        if let Some(cancel) = state.in_flight.take() {
            tracing::debug!(target: "odiag.snapshot", generation = state.generation, "resume cancels in-flight snapshot");
            cancel.cancel();
        }
    }

    fn begin_generation(&self) -> (u64, CancellationToken) {
        let mut state = self.state.lock();
        if let Some(previous) = state.in_flight.take() {
            previous.cancel();
        }
        state.generation += 1;
        let cancel = CancellationToken::new();
        state.in_flight = Some(cancel.clone());
        (state.generation, cancel)
    }

    async fn take_snapshot<R, A>(
        &self,
        remote: &mut R,
        async_remote: &Arc<A>,
        thread: ThreadId,
        cancel: &CancellationToken,
    ) -> Result<Diagram, ExploreError>
    where
        R: RemoteAccess + ?Sized,
        A: AsyncRemoteAccess,
    {
        let frame = top_frame(remote, thread)?;
        let captured = capture_roots(remote, frame.id, thread)?;
        let options = ExploreOptions::from(&self.config);

        match self.config.explorer {
            ExplorerMode::Sync => SyncExplorer::new(remote, thread, options)
                .with_cancellation(cancel.clone())
                .explore(captured),
            ExplorerMode::Async => {
                AsyncExplorer::new(async_remote.clone(), options)
                    .start(captured, cancel.clone())
                    .wait()
                    .await
            }
        }
    }

    fn finish(&self, generation: u64, result: Result<Diagram, ExploreError>) -> SnapshotOutcome {
        let diagram = {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.in_flight = None;
            }
            let superseded = state.generation != generation;
            match result {
                Ok(_) if superseded => Err(SnapshotError::Explore(ExploreError::Cancelled)),
                Ok(diagram) => Ok(diagram),
                Err(err) => Err(SnapshotError::Explore(err)),
            }
        };

        let result = diagram.and_then(|diagram| {
            self.sink
                .lock()
                .publish(&diagram)
                .map(|()| diagram)
                .map_err(SnapshotError::Publish)
        });

        match result {
            Ok(diagram) => {
                let diagram = Arc::new(diagram);
                self.state.lock().last = Some(diagram.clone());
                tracing::info!(
                    target: "odiag.snapshot",
                    generation,
                    objects = diagram.objects().len(),
                    links = diagram.links().len(),
                    "diagram published"
                );
                SnapshotOutcome::Published {
                    generation,
                    diagram,
                }
            }
            Err(error) if error.is_cancelled() => {
                tracing::debug!(target: "odiag.snapshot", generation, "snapshot cancelled");
                SnapshotOutcome::Failed { generation, error }
            }
            Err(error) => {
                tracing::error!(target: "odiag.snapshot", generation, error = %error, "snapshot failed; keeping previous diagram");
                SnapshotOutcome::Failed { generation, error }
            }
        }
    }
}
